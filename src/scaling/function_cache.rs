//缓存层实现
// function_cache.rs
use dashmap::DashMap;
use std::time::Duration;

use super::function_meta::FunctionMeta;
use super::service_query::ServiceQueryResponse;

/// TTL cache of `<fn>.<ns>` to the last replica snapshot read from the provider.
pub struct FunctionCache {
    cache: DashMap<String, FunctionMeta<ServiceQueryResponse>>,
    expiry: Duration,
}

impl FunctionCache {
    pub fn new(expiry: Duration) -> Self {
        Self {
            cache: DashMap::new(),
            expiry,
        }
    }

    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    // 过期的条目不算命中，但仍返回旧值
    pub fn get(&self, function: &str, namespace: &str) -> (ServiceQueryResponse, bool) {
        let key = format!("{}.{}", function, namespace);
        match self.cache.get(&key) {
            Some(entry) => (entry.value.clone(), !entry.is_expired(self.expiry)),
            None => (ServiceQueryResponse::default(), false),
        }
    }

    pub fn set(&self, function: &str, namespace: &str, snapshot: ServiceQueryResponse) {
        let key = format!("{}.{}", function, namespace);
        self.cache.insert(key, FunctionMeta::new(snapshot));
    }
}

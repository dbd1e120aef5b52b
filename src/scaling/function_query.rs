// function_query.rs
// 先查缓存，未命中再问 provider
use std::collections::HashMap;
use std::sync::Arc;

use super::function_cache::FunctionCache;
use super::scaling_error::ScalingError;
use super::service_query::{ServiceQuery, ServiceQueryResponse};

pub struct CachedFunctionQuery {
    cache: Arc<FunctionCache>,
    service_query: Arc<dyn ServiceQuery>,
}

impl CachedFunctionQuery {
    pub fn new(cache: Arc<FunctionCache>, service_query: Arc<dyn ServiceQuery>) -> Self {
        Self {
            cache,
            service_query,
        }
    }

    pub async fn get(&self, function: &str, namespace: &str) -> Result<ServiceQueryResponse, ScalingError> {
        let (cached, hit) = self.cache.get(function, namespace);
        if hit {
            return Ok(cached);
        }

        let snapshot = self.service_query.get_replicas(function, namespace).await?;
        self.cache.set(function, namespace, snapshot.clamped());
        Ok(snapshot)
    }

    pub async fn get_annotations(
        &self,
        function: &str,
        namespace: &str,
    ) -> Result<HashMap<String, String>, ScalingError> {
        self.get(function, namespace).await.map(|s| s.annotations)
    }
}

// single_flight.rs
// 合并同一个 key 的并发调用：第一个调用者执行，其余等待同一个结果
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

use super::scaling_error::ScalingError;
use super::service_query::{ServiceQuery, ServiceQueryResponse};

/// The shared execution for a key went away without producing a result.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("in-flight call {0} was abandoned")]
pub struct Abandoned(pub String);

type Slot<T> = watch::Receiver<Option<T>>;

pub struct SingleFlight<T> {
    calls: Arc<DashMap<String, Slot<T>>>,
}

// 执行结束（包括 panic）时删除 slot
struct SlotGuard<T> {
    calls: Arc<DashMap<String, Slot<T>>>,
    key: String,
}

impl<T> Drop for SlotGuard<T> {
    fn drop(&mut self) {
        self.calls.remove(&self.key);
    }
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            calls: Arc::new(DashMap::new()),
        }
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` unless a call for `key` is already in flight, in which case the
    /// caller waits for that call's result. The execution runs on its own task,
    /// so dropping a caller never cancels it.
    pub async fn work<F, Fut>(&self, key: &str, f: F) -> Result<T, Abandoned>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let mut rx = match self.calls.entry(key.to_string()) {
            Entry::Occupied(call) => call.get().clone(),
            Entry::Vacant(slot) => {
                let (tx, rx) = watch::channel(None);
                slot.insert(rx.clone());
                log::debug!("Miss, so running: {}", key);

                let guard = SlotGuard {
                    calls: Arc::clone(&self.calls),
                    key: key.to_string(),
                };
                let fut = f();
                tokio::spawn(async move {
                    let out = fut.await;
                    // 先删除 slot 再唤醒，晚到的调用者会重新执行
                    drop(guard);
                    tx.send_replace(Some(out));
                });
                rx
            }
        };

        let result = match rx.wait_for(Option::is_some).await {
            Ok(value) => value.clone(),
            Err(_) => None,
        };
        result.ok_or_else(|| Abandoned(key.to_string()))
    }

    pub fn in_flight(&self) -> usize {
        self.calls.len()
    }
}

/// ServiceQuery decorator: at most one GetReplicas and one SetReplicas per function
/// are in flight against the provider at any time.
pub struct SingleFlightServiceQuery {
    inner: Arc<dyn ServiceQuery>,
    gets: SingleFlight<Result<ServiceQueryResponse, ScalingError>>,
    sets: SingleFlight<Result<(), ScalingError>>,
}

impl SingleFlightServiceQuery {
    pub fn new(inner: Arc<dyn ServiceQuery>) -> Self {
        Self {
            inner,
            gets: SingleFlight::new(),
            sets: SingleFlight::new(),
        }
    }
}

#[async_trait]
impl ServiceQuery for SingleFlightServiceQuery {
    async fn get_replicas(
        &self,
        service: &str,
        namespace: &str,
    ) -> Result<ServiceQueryResponse, ScalingError> {
        let key = format!("GetReplicas-{}.{}", service, namespace);
        let inner = Arc::clone(&self.inner);
        let (service, namespace) = (service.to_string(), namespace.to_string());
        self.gets
            .work(&key, move || async move { inner.get_replicas(&service, &namespace).await })
            .await?
    }

    async fn set_replicas(
        &self,
        service: &str,
        namespace: &str,
        count: u64,
    ) -> Result<(), ScalingError> {
        let key = format!("SetReplicas-{}.{}", service, namespace);
        let inner = Arc::clone(&self.inner);
        let (service, namespace) = (service.to_string(), namespace.to_string());
        self.sets
            .work(&key, move || async move {
                inner.set_replicas(&service, &namespace, count).await
            })
            .await?
    }
}

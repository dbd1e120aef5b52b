// function_scaler.rs
// 从 0 扩容到最小副本数，并等待函数可用
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;

use super::function_cache::FunctionCache;
use super::retry::retry;
use super::scaling_config::ScalingConfig;
use super::scaling_error::ScalingError;

pub struct FunctionScaler {
    cache: Arc<FunctionCache>,
    config: ScalingConfig,
}

/// Outcome of one scale-from-zero attempt. `error` is `None` for a ready function
/// and for a function whose scaling is disabled.
#[derive(Debug, Clone)]
pub struct FunctionScaleResult {
    pub available: bool,
    pub found: bool,
    pub error: Option<ScalingError>,
    pub duration: Duration,
}

impl FunctionScaleResult {
    fn ready(start: Instant) -> Self {
        Self {
            available: true,
            found: true,
            error: None,
            duration: start.elapsed(),
        }
    }

    fn failed(err: ScalingError, start: Instant) -> Self {
        Self {
            available: false,
            found: !err.is_not_found(),
            error: Some(err),
            duration: start.elapsed(),
        }
    }
}

impl FunctionScaler {
    // config.service_query 应该是 SingleFlightServiceQuery，保证同一个函数没有并发的 Get/Set
    pub fn new(config: ScalingConfig, cache: Arc<FunctionCache>) -> Self {
        Self { cache, config }
    }

    pub async fn scale(&self, function_name: &str, namespace: &str) -> FunctionScaleResult {
        let start = Instant::now();

        let (cached, hit) = self.cache.get(function_name, namespace);
        if hit && cached.available_replicas > 0 {
            return FunctionScaleResult::ready(start);
        }

        let query = &self.config.service_query;
        let snapshot = match query.get_replicas(function_name, namespace).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                log::warn!("[Scale] function={}.{} lookup failed: {}", function_name, namespace, err);
                return FunctionScaleResult::failed(err, start);
            }
        };
        self.cache.set(function_name, namespace, snapshot.clamped());

        if snapshot.available_replicas > 0 {
            return FunctionScaleResult::ready(start);
        }

        // min_replicas 为 0：不允许从 0 扩容
        if snapshot.min_replicas == 0 {
            log::info!(
                "[Scale] function={}.{} has scaling disabled, min replicas is 0",
                function_name,
                namespace
            );
            return FunctionScaleResult {
                available: false,
                found: true,
                error: None,
                duration: start.elapsed(),
            };
        }

        let min_replicas = snapshot.min_replicas.max(1);
        if snapshot.replicas == 0 {
            let retries = self.config.set_scale_retries;
            let scaled = retry(
                "Scale",
                retries,
                self.config.function_poll_interval,
                |attempt| async move {
                    let current = query.get_replicas(function_name, namespace).await?;
                    self.cache.set(function_name, namespace, current.clamped());
                    if current.replicas > 0 {
                        return Ok(());
                    }

                    log::info!(
                        "[Scale {}/{}] function={} 0 => {} requested",
                        attempt + 1,
                        retries,
                        function_name,
                        min_replicas
                    );
                    query.set_replicas(function_name, namespace, min_replicas).await
                },
            )
            .await;

            if let Err(err) = scaled {
                let err = match err {
                    ScalingError::NotFound(_) => err,
                    other => ScalingError::ScaleFailed {
                        function: function_name.to_string(),
                        reason: other.to_string(),
                    },
                };
                log::warn!("{}", err);
                return FunctionScaleResult::failed(err, start);
            }
        }

        for _ in 0..self.config.max_poll_count {
            let current = match query.get_replicas(function_name, namespace).await {
                Ok(current) => current,
                Err(err) => {
                    log::warn!("[Poll] function={}.{} failed: {}", function_name, namespace, err);
                    return FunctionScaleResult::failed(err, start);
                }
            };
            self.cache.set(function_name, namespace, current.clamped());

            if current.available_replicas > 0 {
                log::info!(
                    "[Ready] function={} waited for - {:.4}s",
                    function_name,
                    start.elapsed().as_secs_f64()
                );
                return FunctionScaleResult::ready(start);
            }

            sleep(self.config.function_poll_interval).await;
        }

        log::warn!(
            "[Scale] function={}.{} 0 => {} timed-out after {:.4}s",
            function_name,
            namespace,
            min_replicas,
            start.elapsed().as_secs_f64()
        );
        FunctionScaleResult::failed(
            ScalingError::PollTimeout {
                function: function_name.to_string(),
                attempts: self.config.max_poll_count,
            },
            start,
        )
    }
}

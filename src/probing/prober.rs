// prober.rs
// 探测函数的 ready 端点，确认可以接收请求
use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::sleep;

use super::probe_cache::FunctionProbeResult;
use crate::middleware::resolver::BaseUrlResolver;
use crate::scaling::function_query::CachedFunctionQuery;

pub const READY_PATH_ANNOTATION: &str = "com.openfaas.ready.http.path";
pub const DEFAULT_READY_PATH: &str = "/_/ready";
pub const PROBE_USER_AGENT: &str = "com.openfaas.gateway/probe";

const MAX_PROBE_ATTEMPTS: u64 = 10;
const PROBE_INTERVAL: Duration = Duration::from_millis(50);

#[async_trait]
pub trait FunctionProber: Send + Sync {
    async fn probe(&self, function_name: &str, namespace: &str) -> FunctionProbeResult;
}

pub struct FunctionHttpProber {
    client: reqwest::Client,
    query: Arc<CachedFunctionQuery>,
    resolver: BaseUrlResolver,
    max_attempts: u64,
    interval: Duration,
}

impl FunctionHttpProber {
    pub fn new(client: reqwest::Client, query: Arc<CachedFunctionQuery>, resolver: BaseUrlResolver) -> Self {
        Self {
            client,
            query,
            resolver,
            max_attempts: MAX_PROBE_ATTEMPTS,
            interval: PROBE_INTERVAL,
        }
    }

    pub fn with_attempts(mut self, max_attempts: u64, interval: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.interval = interval;
        self
    }

    async fn ready_path(&self, function_name: &str, namespace: &str) -> String {
        // 查询失败时用默认路径
        match self.query.get_annotations(function_name, namespace).await {
            Ok(annotations) => annotations
                .get(READY_PATH_ANNOTATION)
                .filter(|path| !path.is_empty())
                .cloned()
                .unwrap_or_else(|| DEFAULT_READY_PATH.to_string()),
            Err(err) => {
                log::debug!(
                    "[Probe] no annotations for {}.{}: {}",
                    function_name,
                    namespace,
                    err
                );
                DEFAULT_READY_PATH.to_string()
            }
        }
    }

    async fn probe_once(&self, url: &str) -> Result<(), String> {
        let resp = self
            .client
            .get(url)
            .header(reqwest::header::USER_AGENT, PROBE_USER_AGENT)
            .send()
            .await
            .map_err(|e| format!("unable to probe {}: {}", url, e))?;

        let status = resp.status();
        log::info!("[Probe] {} => {}", url, status.as_u16());
        if status == reqwest::StatusCode::OK {
            Ok(())
        } else {
            Err(format!("unexpected status code from {}: {}", url, status.as_u16()))
        }
    }
}

#[async_trait]
impl FunctionProber for FunctionHttpProber {
    async fn probe(&self, function_name: &str, namespace: &str) -> FunctionProbeResult {
        let start = Instant::now();
        let path = self.ready_path(function_name, namespace).await;
        let url = self.resolver.build_url(function_name, namespace, &path);

        let mut last_err = String::from("no probe attempts were made");
        for attempt in 0..self.max_attempts {
            match self.probe_once(&url).await {
                Ok(()) => return FunctionProbeResult::available(start.elapsed()),
                Err(err) => {
                    log::debug!("[Probe] attempt {}/{}: {}", attempt + 1, self.max_attempts, err);
                    last_err = err;
                }
            }
            if attempt + 1 < self.max_attempts {
                sleep(self.interval).await;
            }
        }

        log::warn!(
            "[Probe] function={}.{} not ready after {} attempts: {}",
            function_name,
            namespace,
            self.max_attempts,
            last_err
        );
        FunctionProbeResult::unavailable(last_err, start.elapsed())
    }
}

/// Used when probing is switched off.
pub struct FunctionNonProber;

#[async_trait]
impl FunctionProber for FunctionNonProber {
    async fn probe(&self, _function_name: &str, _namespace: &str) -> FunctionProbeResult {
        FunctionProbeResult::available(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scaling::function_cache::FunctionCache;
    use crate::scaling::scaling_error::ScalingError;
    use crate::scaling::service_query::{ServiceQuery, ServiceQueryResponse};
    use std::collections::HashMap;

    struct StaticQuery {
        annotations: HashMap<String, String>,
    }

    #[async_trait]
    impl ServiceQuery for StaticQuery {
        async fn get_replicas(&self, _: &str, _: &str) -> Result<ServiceQueryResponse, ScalingError> {
            Ok(ServiceQueryResponse {
                replicas: 1,
                available_replicas: 1,
                annotations: self.annotations.clone(),
                ..Default::default()
            })
        }

        async fn set_replicas(&self, _: &str, _: &str, _: u64) -> Result<(), ScalingError> {
            Ok(())
        }
    }

    fn prober_for(server: &mockito::Server, annotations: &[(&str, &str)]) -> FunctionHttpProber {
        let query = CachedFunctionQuery::new(
            Arc::new(FunctionCache::new(Duration::from_secs(5))),
            Arc::new(StaticQuery {
                annotations: annotations
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            }),
        );
        FunctionHttpProber::new(
            reqwest::Client::new(),
            Arc::new(query),
            BaseUrlResolver::single_host(&server.url()),
        )
        .with_attempts(3, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_probe_default_ready_path() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/function/figlet.openfaas-fn/_/ready")
            .match_header("user-agent", PROBE_USER_AGENT)
            .with_status(200)
            .create_async()
            .await;

        let result = prober_for(&server, &[]).probe("figlet", "openfaas-fn").await;
        assert!(result.available);
        assert!(result.error.is_none());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_probe_custom_ready_path() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/function/figlet.openfaas-fn/healthz")
            .with_status(200)
            .create_async()
            .await;

        let result = prober_for(&server, &[(READY_PATH_ANNOTATION, "/healthz")])
            .probe("figlet", "openfaas-fn")
            .await;
        assert!(result.available);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_probe_gives_up_after_max_attempts() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/function/figlet.openfaas-fn/_/ready")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let result = prober_for(&server, &[]).probe("figlet", "openfaas-fn").await;
        assert!(!result.available);
        assert!(result.error.unwrap().contains("503"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_prober_is_always_available() {
        let result = FunctionNonProber.probe("figlet", "openfaas-fn").await;
        assert!(result.available);
        assert!(result.found);
    }
}

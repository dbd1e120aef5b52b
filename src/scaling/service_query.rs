//核心 Trait 定义（ServiceQuery）和 provider 的 HTTP 客户端
use super::ranges::{
    CLUSTER_MAX_REPLICAS, DEFAULT_MAX_REPLICAS, DEFAULT_MIN_REPLICAS, DEFAULT_SCALING_FACTOR,
    MAX_SCALE_LABEL, MIN_SCALE_LABEL, SCALE_FACTOR_LABEL,
};
use super::scaling_error::ScalingError;
use crate::middleware::auth_injector::AuthInjector;
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::cmp::min;
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(3);

//ServiceQuery接口
#[async_trait]
pub trait ServiceQuery: Send + Sync {
    async fn get_replicas(
        &self,
        service: &str,
        namespace: &str,
    ) -> Result<ServiceQueryResponse, ScalingError>;

    async fn set_replicas(
        &self,
        service: &str,
        namespace: &str,
        count: u64,
    ) -> Result<(), ScalingError>;

    /// Used by the alert path.
    async fn scale_alert(
        &self,
        service: &str,
        namespace: &str,
        desired: u64,
    ) -> Result<(), ScalingError> {
        self.set_replicas(service, namespace, desired).await
    }
}

/// Replica snapshot of one function as reported by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceQueryResponse {
    pub replicas: u64,
    pub min_replicas: u64, //最小
    pub max_replicas: u64,
    pub scaling_factor: u64, //步长百分比
    pub available_replicas: u64,
    pub annotations: HashMap<String, String>,
}

impl Default for ServiceQueryResponse {
    fn default() -> Self {
        Self {
            replicas: 0,
            min_replicas: DEFAULT_MIN_REPLICAS,
            max_replicas: DEFAULT_MAX_REPLICAS,
            scaling_factor: DEFAULT_SCALING_FACTOR,
            available_replicas: 0,
            annotations: HashMap::new(),
        }
    }
}

impl ServiceQueryResponse {
    /// Copy that satisfies `available <= replicas <= max`, used before writing to the cache.
    pub fn clamped(&self) -> Self {
        let mut snapshot = self.clone();
        if snapshot.max_replicas > 0 {
            snapshot.replicas = min(snapshot.replicas, snapshot.max_replicas);
        }
        snapshot.available_replicas = min(snapshot.available_replicas, snapshot.replicas);
        snapshot
    }
}

/// Function record exchanged with the provider. Unknown fields are kept so
/// list responses can be passed through unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionStatus {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default)]
    pub replicas: u64,
    #[serde(default)]
    pub available_replicas: u64,
    #[serde(default)]
    pub invocation_count: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<HashMap<String, String>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScaleServiceRequest<'a> {
    service_name: &'a str,
    replicas: u64,
}

//HTTP 客户端实现
#[derive(Clone)]
pub struct ExternalServiceQuery {
    client: reqwest::Client,
    base_url: Url,
    auth_injector: Option<Arc<dyn AuthInjector>>,
}

impl ExternalServiceQuery {
    pub fn new(base_url: Url, auth_injector: Option<Arc<dyn AuthInjector>>) -> reqwest::Result<Self> {
        let client = reqwest::ClientBuilder::new()
            .timeout(PROVIDER_TIMEOUT) //超时
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self::with_client(client, base_url, auth_injector))
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: Url,
        auth_injector: Option<Arc<dyn AuthInjector>>,
    ) -> Self {
        Self {
            client,
            base_url,
            auth_injector,
        }
    }

    // base_url 可能带也可能不带结尾的 /
    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_injector {
            Some(injector) => injector.inject(req),
            None => req,
        }
    }

    async fn dispatch(
        &self,
        req: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<(StatusCode, String), ScalingError> {
        let resp = self.authorize(req).send().await.map_err(|e| {
            log::warn!("Unable to reach provider at {}: {}", url, e);
            ScalingError::Transport(format!("{}: {}", url, e))
        })?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| {
            ScalingError::HttpError(status, format!("Failed to read response: {}", e))
        })?;
        Ok((status, body))
    }

    /// Lists the functions deployed in `namespace`. An empty namespace lets the provider pick.
    pub async fn list_functions(&self, namespace: &str) -> Result<Vec<FunctionStatus>, ScalingError> {
        let url = self.endpoint("system/functions");
        let mut req = self.client.get(&url);
        if !namespace.is_empty() {
            req = req.query(&[("namespace", namespace)]);
        }

        let (status, body) = self.dispatch(req, &url).await?;
        match status {
            StatusCode::OK => Ok(serde_json::from_str(&body)?),
            _ => Err(ScalingError::HttpError(status, body)),
        }
    }

    /// Namespaces known to the provider. A 404 means the provider is single-namespace.
    pub async fn list_namespaces(&self) -> Result<Vec<String>, ScalingError> {
        let url = self.endpoint("system/namespaces");
        let (status, body) = self.dispatch(self.client.get(&url), &url).await?;
        match status {
            StatusCode::OK => Ok(serde_json::from_str(&body)?),
            StatusCode::NOT_FOUND => Ok(Vec::new()),
            _ => Err(ScalingError::HttpError(status, body)),
        }
    }

    pub async fn provider_info(&self) -> Result<serde_json::Value, ScalingError> {
        let url = self.endpoint("system/info");
        let (status, body) = self.dispatch(self.client.get(&url), &url).await?;
        match status {
            StatusCode::OK => Ok(serde_json::from_str(&body)?),
            _ => Err(ScalingError::HttpError(status, body)),
        }
    }
}

#[async_trait]
impl ServiceQuery for ExternalServiceQuery {
    async fn get_replicas(
        &self,
        service: &str,
        namespace: &str,
    ) -> Result<ServiceQueryResponse, ScalingError> {
        // Url样例：http://gateway:8080/system/function/figlet?namespace=openfaas-fn
        let url = self.endpoint(&format!("system/function/{}", service));
        let req = self.client.get(&url).query(&[("namespace", namespace)]);

        let start = Instant::now();
        let (status, body) = self.dispatch(req, &url).await?;

        match status {
            StatusCode::OK => {
                let function: FunctionStatus = serde_json::from_str(&body)?;
                log::info!(
                    "GetReplicas [{}.{}] took: {:.4}s",
                    service,
                    namespace,
                    start.elapsed().as_secs_f64()
                );
                Ok(parse_function_status(function)) //标签解析
            }
            StatusCode::NOT_FOUND => Err(ScalingError::NotFound(format!("{}.{}", service, namespace))),
            _ => {
                log::warn!(
                    "GetReplicas [{}.{}] unexpected status: {}, {}",
                    service,
                    namespace,
                    status,
                    body
                );
                Err(ScalingError::HttpError(status, body))
            }
        }
    }

    async fn set_replicas(
        &self,
        service: &str,
        namespace: &str,
        count: u64,
    ) -> Result<(), ScalingError> {
        let replicas = if count > CLUSTER_MAX_REPLICAS {
            log::warn!(
                "SetReplicas [{}.{}] requested {} replicas, clamped to {}",
                service,
                namespace,
                count,
                CLUSTER_MAX_REPLICAS
            );
            CLUSTER_MAX_REPLICAS
        } else {
            count
        };

        let url = self.endpoint(&format!("system/scale-function/{}", service));
        let req = self
            .client
            .post(&url)
            .query(&[("namespace", namespace)])
            .json(&ScaleServiceRequest {
                service_name: service,
                replicas,
            });

        let start = Instant::now();
        let (status, body) = self.dispatch(req, &url).await?;

        log::info!(
            "SetReplicas [{}.{}] took: {:.4}s",
            service,
            namespace,
            start.elapsed().as_secs_f64()
        );

        match status {
            StatusCode::OK | StatusCode::ACCEPTED => Ok(()),
            StatusCode::NOT_FOUND => Err(ScalingError::NotFound(format!("{}.{}", service, namespace))),
            _ => Err(ScalingError::HttpError(
                status,
                format!("{} - {} - {} - {}", body, url, service, namespace),
            )),
        }
    }
}

pub(crate) fn parse_function_status(function: FunctionStatus) -> ServiceQueryResponse {
    let mut min_replicas = DEFAULT_MIN_REPLICAS;
    let mut max_replicas = DEFAULT_MAX_REPLICAS;
    let mut factor = DEFAULT_SCALING_FACTOR;

    if let Some(labels) = &function.labels {
        min_replicas = parse_label(labels, MIN_SCALE_LABEL, min_replicas);
        max_replicas = parse_label(labels, MAX_SCALE_LABEL, max_replicas);
        let parsed_factor = parse_label(labels, SCALE_FACTOR_LABEL, factor);
        if parsed_factor <= 100 {
            factor = parsed_factor;
        } else {
            log::warn!(
                "Bad Scaling Factor: {}, is not in range of [0 - 100]. Will fallback to {}",
                parsed_factor,
                factor
            );
        }
    }

    ServiceQueryResponse {
        replicas: function.replicas,
        max_replicas,
        min_replicas,
        scaling_factor: factor,
        available_replicas: function.available_replicas,
        annotations: function.annotations.unwrap_or_default(),
    }
}

// 标签解析工具函数，解析失败时回退到默认值
fn parse_label<T: FromStr + Display + Copy>(
    labels: &HashMap<String, String>,
    key: &str,
    default: T,
) -> T {
    match labels.get(key) {
        Some(value) if !value.is_empty() => value.parse().unwrap_or_else(|_| {
            log::warn!(
                "Provided label value {}={} should be an unsigned integer, using {}",
                key,
                value,
                default
            );
            default
        }),
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_with_labels(labels: &[(&str, &str)]) -> FunctionStatus {
        FunctionStatus {
            name: "figlet".into(),
            replicas: 2,
            available_replicas: 1,
            labels: Some(
                labels
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_defaults_without_labels() {
        let snapshot = parse_function_status(FunctionStatus::default());
        assert_eq!(snapshot.min_replicas, DEFAULT_MIN_REPLICAS);
        assert_eq!(snapshot.max_replicas, DEFAULT_MAX_REPLICAS);
        assert_eq!(snapshot.scaling_factor, DEFAULT_SCALING_FACTOR);
        assert!(snapshot.annotations.is_empty());
    }

    #[test]
    fn test_parse_scale_labels() {
        let snapshot = parse_function_status(status_with_labels(&[
            (MIN_SCALE_LABEL, "0"),
            (MAX_SCALE_LABEL, "20"),
            (SCALE_FACTOR_LABEL, "25"),
        ]));
        assert_eq!(snapshot.min_replicas, 0);
        assert_eq!(snapshot.max_replicas, 20);
        assert_eq!(snapshot.scaling_factor, 25);
        assert_eq!(snapshot.replicas, 2);
        assert_eq!(snapshot.available_replicas, 1);
    }

    #[test]
    fn test_bad_labels_fall_back() {
        let snapshot = parse_function_status(status_with_labels(&[
            (MIN_SCALE_LABEL, "one"),
            (MAX_SCALE_LABEL, "-3"),
            (SCALE_FACTOR_LABEL, "101"),
        ]));
        assert_eq!(snapshot.min_replicas, DEFAULT_MIN_REPLICAS);
        assert_eq!(snapshot.max_replicas, DEFAULT_MAX_REPLICAS);
        assert_eq!(snapshot.scaling_factor, DEFAULT_SCALING_FACTOR);
    }

    #[test]
    fn test_clamped_snapshot() {
        let snapshot = ServiceQueryResponse {
            replicas: 9,
            available_replicas: 12,
            max_replicas: 5,
            ..Default::default()
        };
        let clamped = snapshot.clamped();
        assert_eq!(clamped.replicas, 5);
        assert_eq!(clamped.available_replicas, 5);
    }

    #[test]
    fn test_function_status_keeps_unknown_fields() {
        let raw = r#"{"name":"figlet","image":"functions/figlet","replicas":1,"availableReplicas":1}"#;
        let status: FunctionStatus = serde_json::from_str(raw).unwrap();
        assert_eq!(status.extra.get("image").unwrap(), "functions/figlet");

        let out = serde_json::to_value(&status).unwrap();
        assert_eq!(out["image"], "functions/figlet");
        assert_eq!(out["availableReplicas"], 1);
    }
}

// prometheus_query.rs
// 查询 Prometheus 的调用次数，用来补全函数列表里的 invocationCount
use serde::Deserialize;

#[derive(thiserror::Error, Debug)]
pub enum QueryError {
    #[error("unable to query Prometheus: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status code from Prometheus want: 200, got: {0}, body: {1}")]
    Status(u16, String),

    #[error("error unmarshaling result: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Default, Deserialize)]
pub struct VectorQueryResponse {
    #[serde(default)]
    pub data: VectorData,
}

#[derive(Debug, Default, Deserialize)]
pub struct VectorData {
    #[serde(default)]
    pub result: Vec<VectorSample>,
}

#[derive(Debug, Deserialize)]
pub struct VectorSample {
    #[serde(default)]
    pub metric: SampleMetric,
    /// `[timestamp, "value"]`
    #[serde(default)]
    pub value: Vec<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SampleMetric {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub function_name: String,
}

impl VectorSample {
    pub fn value(&self) -> Option<f64> {
        self.value.get(1)?.as_str()?.parse().ok()
    }
}

pub struct PrometheusQuery {
    client: reqwest::Client,
    base_url: String,
}

impl PrometheusQuery {
    pub fn new(client: reqwest::Client, host: &str, port: u16) -> Self {
        Self::with_base_url(client, &format!("http://{}:{}", host, port))
    }

    pub fn with_base_url(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn fetch(&self, query: &str) -> Result<VectorQueryResponse, QueryError> {
        let res = self
            .client
            .get(format!("{}/api/v1/query", self.base_url))
            .query(&[("query", query)])
            .header(
                reqwest::header::USER_AGENT,
                format!("openfaas-gateway/{} (Prometheus query)", env!("CARGO_PKG_VERSION")),
            )
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;
        if status != reqwest::StatusCode::OK {
            return Err(QueryError::Status(status.as_u16(), body));
        }
        Ok(serde_json::from_str(&body)?)
    }
}

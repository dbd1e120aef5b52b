//Prometheus/AlertManager webhook 的结构体
use serde::{Deserialize, Serialize};

// 对应 PrometheusInnerAlertLabel
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrometheusInnerAlertLabel {
    #[serde(rename = "alertname", default)]
    pub alert_name: String,

    #[serde(rename = "function_name", default)]
    pub function_name: String,
}

// 对应 PrometheusInnerAlert
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrometheusInnerAlert {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub labels: PrometheusInnerAlertLabel,
}

impl PrometheusInnerAlertLabel {
    /// `None` for alerts that don't target a function.
    pub fn get_function_name(&self) -> Option<&str> {
        Some(self.function_name.as_str()).filter(|name| !name.is_empty())
    }
}

// 对应 PrometheusAlert
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PrometheusAlert {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub receiver: String,
    #[serde(default)]
    pub alerts: Vec<PrometheusInnerAlert>,
}

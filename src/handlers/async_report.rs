// async_report.rs
// queue worker 执行完异步调用后回报结果，这里只更新指标
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::GatewayError;
use crate::metrics::notifiers::PrometheusFunctionNotifier;
use crate::metrics::registry::MetricOptions;

#[derive(Debug, Deserialize)]
pub struct AsyncReport {
    #[serde(rename = "name")]
    pub function_name: String,
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    /// Seconds.
    #[serde(rename = "timeTaken", default)]
    pub time_taken: f64,
}

pub struct AsyncReportHandler {
    metrics: Arc<MetricOptions>,
    labels: PrometheusFunctionNotifier,
}

impl AsyncReportHandler {
    pub fn new(metrics: Arc<MetricOptions>, function_namespace: &str) -> Self {
        Self {
            labels: PrometheusFunctionNotifier::new(Arc::clone(&metrics), function_namespace),
            metrics,
        }
    }

    pub fn record(&self, report: &AsyncReport) {
        let function_name = self.labels.function_label(&report.function_name);
        let code = report.status_code.to_string();
        self.metrics
            .function_invocation
            .with_label_values(&[&function_name, &code])
            .inc();
        self.metrics
            .functions_histogram
            .with_label_values(&[&function_name])
            .observe(report.time_taken.max(0.0));
        log::debug!(
            "Async report {} - [{}] - {:.4}s",
            function_name,
            code,
            report.time_taken
        );
    }
}

pub async fn handle_async_report(
    body: web::Bytes,
    handler: web::Data<AsyncReportHandler>,
) -> Result<HttpResponse, GatewayError> {
    let report: AsyncReport = serde_json::from_slice(&body).map_err(|e| {
        log::warn!("Unable to parse async report: {}", e);
        GatewayError::BadRequest(format!("unable to parse report: {}", e))
    })?;
    handler.record(&report);
    Ok(HttpResponse::Ok().finish())
}

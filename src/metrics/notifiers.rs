// notifiers.rs
// 请求开始/结束时通知日志和指标
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::registry::MetricOptions;
use crate::middleware::resolver::get_service_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyEvent {
    Started,
    Completed,
}

impl fmt::Display for NotifyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyEvent::Started => write!(f, "started"),
            NotifyEvent::Completed => write!(f, "completed"),
        }
    }
}

/// Observer of forwarded HTTP requests.
pub trait HttpNotifier: Send + Sync {
    fn notify(
        &self,
        method: &str,
        url: &str,
        original_url: &str,
        status_code: u16,
        event: NotifyEvent,
        duration: Duration,
    );
}

pub(crate) fn url_to_label(path: &str) -> String {
    let path = path.trim_end_matches('/');
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

pub struct LoggingNotifier;

impl HttpNotifier for LoggingNotifier {
    fn notify(
        &self,
        method: &str,
        _url: &str,
        original_url: &str,
        status_code: u16,
        event: NotifyEvent,
        duration: Duration,
    ) {
        if event == NotifyEvent::Completed {
            log::info!(
                "Forwarded [{}] to {} - [{}] - {:.4}s",
                method,
                original_url,
                status_code,
                duration.as_secs_f64()
            );
        }
    }
}

pub struct PrometheusFunctionNotifier {
    metrics: Arc<MetricOptions>,
    function_namespace: String,
}

impl PrometheusFunctionNotifier {
    pub fn new(metrics: Arc<MetricOptions>, function_namespace: &str) -> Self {
        Self {
            metrics,
            function_namespace: function_namespace.to_string(),
        }
    }

    /// `function_name` label: the service name with the default namespace appended when absent.
    pub fn function_label(&self, service_name: &str) -> String {
        if !self.function_namespace.is_empty() && !service_name.contains('.') {
            format!("{}.{}", service_name, self.function_namespace)
        } else {
            service_name.to_string()
        }
    }
}

impl HttpNotifier for PrometheusFunctionNotifier {
    fn notify(
        &self,
        _method: &str,
        _url: &str,
        original_url: &str,
        status_code: u16,
        event: NotifyEvent,
        duration: Duration,
    ) {
        let service_name = self.function_label(&get_service_name(original_url));
        match event {
            NotifyEvent::Started => {
                self.metrics
                    .function_invocation_started
                    .with_label_values(&[&service_name])
                    .inc();
            }
            NotifyEvent::Completed => {
                let code = status_code.to_string();
                self.metrics
                    .functions_histogram
                    .with_label_values(&[&service_name])
                    .observe(duration.as_secs_f64());
                self.metrics
                    .function_invocation
                    .with_label_values(&[&service_name, &code])
                    .inc();
            }
        }
    }
}

pub struct PrometheusServiceNotifier {
    metrics: Arc<MetricOptions>,
}

impl PrometheusServiceNotifier {
    pub fn new(metrics: Arc<MetricOptions>) -> Self {
        Self { metrics }
    }
}

impl HttpNotifier for PrometheusServiceNotifier {
    fn notify(
        &self,
        method: &str,
        url: &str,
        _original_url: &str,
        status_code: u16,
        event: NotifyEvent,
        duration: Duration,
    ) {
        if event != NotifyEvent::Completed {
            return;
        }
        let code = status_code.to_string();
        let path = url_to_label(url);
        let labels = [method, path.as_str(), code.as_str()];
        self.metrics
            .service_histogram
            .with_label_values(&labels)
            .observe(duration.as_secs_f64());
        self.metrics.service_invocation.with_label_values(&labels).inc();
    }
}

// registry.rs
// 网关自己的指标，注册在独立的 Prometheus registry 上
use prometheus::{CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};

#[derive(thiserror::Error, Debug)]
pub enum MetricsError {
    #[error("failed to register metric: {0}")]
    Registration(#[from] prometheus::Error),

    #[error("failed to encode metrics: {0}")]
    Encoding(String),
}

/// All gateway metrics. One instance is shared by the notifiers, the async report
/// handler, the exporter and the `/metrics` endpoint.
pub struct MetricOptions {
    registry: Registry,
    pub function_invocation_started: CounterVec,
    pub function_invocation: CounterVec,
    pub functions_histogram: HistogramVec,
    pub service_invocation: CounterVec,
    pub service_histogram: HistogramVec,
    pub service_replicas: GaugeVec,
}

impl MetricOptions {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let function_invocation_started = CounterVec::new(
            Opts::new(
                "gateway_function_invocation_started",
                "The total number of function HTTP requests started.",
            ),
            &["function_name"],
        )?;
        registry.register(Box::new(function_invocation_started.clone()))?;

        let function_invocation = CounterVec::new(
            Opts::new("gateway_function_invocation_total", "Function metrics"),
            &["function_name", "code"],
        )?;
        registry.register(Box::new(function_invocation.clone()))?;

        // 默认 buckets 与 Prometheus 客户端一致
        let functions_histogram = HistogramVec::new(
            HistogramOpts::new("gateway_functions_seconds", "Function time taken"),
            &["function_name"],
        )?;
        registry.register(Box::new(functions_histogram.clone()))?;

        let service_invocation = CounterVec::new(
            Opts::new("gateway_service_invocation_total", "Gateway service requests"),
            &["method", "path", "code"],
        )?;
        registry.register(Box::new(service_invocation.clone()))?;

        let service_histogram = HistogramVec::new(
            HistogramOpts::new("gateway_service_seconds", "Gateway service time taken"),
            &["method", "path", "code"],
        )?;
        registry.register(Box::new(service_histogram.clone()))?;

        let service_replicas = GaugeVec::new(
            Opts::new("gateway_service_count", "Current count of replicas for function"),
            &["function_name"],
        )?;
        registry.register(Box::new(service_replicas.clone()))?;

        Ok(Self {
            registry,
            function_invocation_started,
            function_invocation,
            functions_histogram,
            service_invocation,
            service_histogram,
            service_replicas,
        })
    }

    /// Prometheus text exposition of every registered family.
    pub fn render(&self) -> Result<String, MetricsError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| MetricsError::Encoding(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Encoding(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_counter_with_labels() {
        let metrics = MetricOptions::new().unwrap();
        let ok = metrics.function_invocation.with_label_values(&["figlet.openfaas-fn", "200"]);
        ok.inc();
        ok.inc();
        metrics
            .function_invocation
            .with_label_values(&["figlet.openfaas-fn", "500"])
            .inc();

        let output = metrics.render().unwrap();
        assert!(output.contains("# TYPE gateway_function_invocation_total counter"));
        assert!(output.contains(r#"code="200",function_name="figlet.openfaas-fn"} 2"#));
        assert!(output.contains(r#"code="500",function_name="figlet.openfaas-fn"} 1"#));
        assert_eq!(ok.get(), 2.0);
    }

    #[test]
    fn render_histogram_buckets() {
        let metrics = MetricOptions::new().unwrap();
        let seconds = metrics.functions_histogram.with_label_values(&["figlet.openfaas-fn"]);
        seconds.observe(0.3);
        seconds.observe(3.0);

        let output = metrics.render().unwrap();
        assert!(output.contains("# TYPE gateway_functions_seconds histogram"));
        assert!(output.contains(r#"gateway_functions_seconds_bucket{function_name="figlet.openfaas-fn",le="0.25"} 0"#));
        assert!(output.contains(r#"gateway_functions_seconds_bucket{function_name="figlet.openfaas-fn",le="0.5"} 1"#));
        assert!(output.contains(r#"gateway_functions_seconds_bucket{function_name="figlet.openfaas-fn",le="+Inf"} 2"#));
        assert_eq!(seconds.get_sample_count(), 2);
    }

    #[test]
    fn gauge_reset_drops_series() {
        let metrics = MetricOptions::new().unwrap();
        metrics.service_replicas.with_label_values(&["figlet.openfaas-fn"]).set(3.0);
        assert!(metrics
            .render()
            .unwrap()
            .contains(r#"gateway_service_count{function_name="figlet.openfaas-fn"} 3"#));

        metrics.service_replicas.reset();
        assert!(!metrics.render().unwrap().contains("figlet.openfaas-fn"));
    }
}

// exporter.rs
// 定时从 provider 拉取各函数的副本数，写入 gateway_service_count
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::registry::MetricOptions;
use crate::scaling::scaling_error::ScalingError;
use crate::scaling::service_query::{ExternalServiceQuery, FunctionStatus};

pub const WATCH_INTERVAL: Duration = Duration::from_secs(5);

pub struct Exporter {
    provider: Arc<ExternalServiceQuery>,
    metrics: Arc<MetricOptions>,
    function_namespace: String,
}

impl Exporter {
    pub fn new(provider: Arc<ExternalServiceQuery>, metrics: Arc<MetricOptions>, function_namespace: &str) -> Self {
        Self {
            provider,
            metrics,
            function_namespace: function_namespace.to_string(),
        }
    }

    async fn services(&self) -> Result<Vec<FunctionStatus>, ScalingError> {
        let namespaces = self.provider.list_namespaces().await.unwrap_or_else(|e| {
            log::warn!("Error listing namespaces: {}", e);
            Vec::new()
        });

        // faasd 之类的 provider 没有命名空间
        if namespaces.is_empty() {
            return self.provider.list_functions(&self.function_namespace).await;
        }

        let mut services = Vec::new();
        for namespace in namespaces {
            match self.provider.list_functions(&namespace).await {
                Ok(found) => services.extend(found),
                Err(e) => log::warn!("Error getting functions from: {}, error: {}", namespace, e),
            }
        }
        Ok(services)
    }

    /// One refresh of the replica gauge. On error the previous values stay.
    pub async fn refresh(&self) {
        let services = match self.services().await {
            Ok(services) => services,
            Err(e) => {
                log::warn!("Error getting functions from: {}, error: {}", self.function_namespace, e);
                return;
            }
        };

        self.metrics.service_replicas.reset();
        for service in &services {
            let name = if service.namespace.is_empty() {
                service.name.clone()
            } else {
                format!("{}.{}", service.name, service.namespace)
            };
            self.metrics
                .service_replicas
                .with_label_values(&[&name])
                .set(service.replicas as f64);
        }
    }

    /// Runs `refresh` every `interval` until `shutdown` turns true or its sender goes away.
    pub fn start(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => self.refresh().await,
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            log::info!("Service watcher stopped");
                            return;
                        }
                    }
                }
            }
        })
    }
}

//alertmanger 处理器实现
// alert_handler.rs
use actix_web::{web, HttpResponse};
use std::sync::Arc;

use crate::error::GatewayError;
use crate::metrics::prometheus::PrometheusAlert;
use crate::middleware::resolver::get_namespace;
use crate::scaling::ranges::calculate_replicas;
use crate::scaling::scaling_error::ScalingError;
use crate::scaling::service_query::ServiceQuery;

pub struct AlertHandler {
    service_query: Arc<dyn ServiceQuery>,
    default_namespace: String,
}

impl AlertHandler {
    pub fn new(service_query: Arc<dyn ServiceQuery>, default_namespace: &str) -> Self {
        Self {
            service_query,
            default_namespace: default_namespace.to_string(),
        }
    }

    /// Scales every function named by the batch. Failures are collected, not short-circuited.
    pub async fn handle(&self, alert: &PrometheusAlert) -> Vec<String> {
        let mut errors: Vec<String> = Vec::new();
        for alert in &alert.alerts {
            log::info!("Processing alert: {:?}", alert);
            let Some(name) = alert.labels.get_function_name() else {
                continue;
            };
            let (function_name, namespace) = get_namespace(&self.default_namespace, name);
            if let Err(e) = self.scale_service(&function_name, &namespace, &alert.status).await {
                log::error!("[Scale] function={}.{} failed: {}", function_name, namespace, e);
                errors.push(e.to_string());
            }
        }
        errors
    }

    async fn scale_service(&self, function_name: &str, namespace: &str, status: &str) -> Result<(), ScalingError> {
        let resp = self.service_query.get_replicas(function_name, namespace).await?;

        let new_replicas = calculate_replicas(
            status,
            resp.replicas,
            resp.max_replicas,
            resp.min_replicas,
            resp.scaling_factor,
        );

        if new_replicas == resp.replicas {
            return Ok(());
        }

        log::info!(
            "[Scale] function={} {} => {}.",
            function_name,
            resp.replicas,
            new_replicas
        );
        self.service_query
            .scale_alert(function_name, namespace, new_replicas)
            .await
    }
}

pub async fn handle_alert(
    body: web::Bytes, //alertmanger 发送的 webhook，json 形式
    handler: web::Data<AlertHandler>,
) -> Result<HttpResponse, GatewayError> {
    let alert: PrometheusAlert = serde_json::from_slice(&body).map_err(|e| {
        log::warn!("Unable to parse alert: {}", e);
        GatewayError::BadRequest("Unable to parse alert, bad format.".to_string())
    })?;

    let errors = handler.handle(&alert).await;
    if errors.is_empty() {
        Ok(HttpResponse::Ok().finish())
    } else {
        Err(GatewayError::Internal(errors.join("\n")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scaling::service_query::ServiceQueryResponse;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FakeProvider {
        snapshot: ServiceQueryResponse,
        sets: Mutex<Vec<(String, String, u64)>>,
    }

    #[async_trait]
    impl ServiceQuery for FakeProvider {
        async fn get_replicas(&self, function: &str, _: &str) -> Result<ServiceQueryResponse, ScalingError> {
            if function == "missing" {
                return Err(ScalingError::NotFound(function.into()));
            }
            Ok(self.snapshot.clone())
        }

        async fn set_replicas(&self, function: &str, namespace: &str, count: u64) -> Result<(), ScalingError> {
            self.sets
                .lock()
                .unwrap()
                .push((function.to_string(), namespace.to_string(), count));
            Ok(())
        }
    }

    fn provider(replicas: u64, min: u64, max: u64, factor: u64) -> Arc<FakeProvider> {
        Arc::new(FakeProvider {
            snapshot: ServiceQueryResponse {
                replicas,
                min_replicas: min,
                max_replicas: max,
                scaling_factor: factor,
                available_replicas: replicas,
                ..Default::default()
            },
            sets: Mutex::new(Vec::new()),
        })
    }

    fn alert(status: &str, function_name: &str) -> String {
        format!(
            r#"{{"status":"{status}","receiver":"scale-up","alerts":[{{"status":"{status}","labels":{{"alertname":"APIHighInvocationRate","function_name":"{function_name}"}}}}]}}"#
        )
    }

    async fn post(provider: Arc<FakeProvider>, body: String) -> (StatusCode, String) {
        let handler = web::Data::new(AlertHandler::new(provider, "openfaas-fn"));
        let app = test::init_service(
            App::new()
                .app_data(handler)
                .route("/system/alert", web::post().to(handle_alert)),
        )
        .await;
        let req = test::TestRequest::post().uri("/system/alert").set_payload(body).to_request();
        let res = test::call_service(&app, req).await;
        let status = res.status();
        let body = test::read_body(res).await;
        (status, String::from_utf8_lossy(&body).to_string())
    }

    #[actix_rt::test]
    async fn test_firing_at_max_does_not_scale() {
        let provider = provider(20, 1, 20, 20);
        let (status, _) = post(provider.clone(), alert("firing", "figlet")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(provider.sets.lock().unwrap().is_empty());
    }

    #[actix_rt::test]
    async fn test_resolved_scales_to_min() {
        let provider = provider(8, 1, 20, 20);
        let (status, _) = post(provider.clone(), alert("resolved", "figlet")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            *provider.sets.lock().unwrap(),
            vec![("figlet".to_string(), "openfaas-fn".to_string(), 1)]
        );
    }

    #[actix_rt::test]
    async fn test_firing_steps_up_in_named_namespace() {
        let provider = provider(2, 1, 10, 30);
        let (status, _) = post(provider.clone(), alert("firing", "figlet.dev")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            *provider.sets.lock().unwrap(),
            vec![("figlet".to_string(), "dev".to_string(), 5)]
        );
    }

    #[actix_rt::test]
    async fn test_alert_without_function_is_ignored() {
        let provider = provider(8, 1, 20, 20);
        let (status, _) = post(provider.clone(), alert("resolved", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(provider.sets.lock().unwrap().is_empty());
    }

    #[actix_rt::test]
    async fn test_bad_json_is_400() {
        let (status, body) = post(provider(1, 1, 5, 10), "{not json".to_string()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Unable to parse alert, bad format.");
    }

    #[actix_rt::test]
    async fn test_provider_errors_are_reported() {
        let (status, body) = post(provider(1, 1, 5, 10), alert("firing", "missing")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("missing"));
    }
}

// list_functions.rs
// GET /system/functions：provider 的函数列表，加上 Prometheus 里的调用次数
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::GatewayError;
use crate::metrics::prometheus_query::{PrometheusQuery, VectorQueryResponse};
use crate::scaling::service_query::{ExternalServiceQuery, FunctionStatus};

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub namespace: String,
}

pub struct ListFunctionsHandler {
    provider: Arc<ExternalServiceQuery>,
    prometheus: PrometheusQuery,
}

impl ListFunctionsHandler {
    pub fn new(provider: Arc<ExternalServiceQuery>, prometheus: PrometheusQuery) -> Self {
        Self { provider, prometheus }
    }

    pub async fn list(&self, namespace: &str) -> Result<Vec<FunctionStatus>, GatewayError> {
        let mut functions = self.provider.list_functions(namespace).await.map_err(|e| {
            log::warn!("List functions failed: {}", e);
            GatewayError::Internal(
                "Metrics handler: unexpected status code from provider listing functions".to_string(),
            )
        })?;

        for function in functions.iter_mut() {
            function.invocation_count = 0.0;
        }

        let Some(first) = functions.first() else {
            return Ok(functions);
        };
        // 只查询该命名空间下的函数
        let query = format!(
            r#"sum(gateway_function_invocation_total{{function_name=~".*.{}"}}) by (function_name)"#,
            first.namespace
        );
        match self.prometheus.fetch(&query).await {
            Ok(results) => mix_in(&mut functions, &results),
            Err(e) => log::warn!("Error querying Prometheus: {}", e),
        }
        Ok(functions)
    }
}

fn mix_in(functions: &mut [FunctionStatus], metrics: &VectorQueryResponse) {
    for function in functions.iter_mut() {
        let label = format!("{}.{}", function.name, function.namespace);
        for sample in metrics.data.result.iter().filter(|s| s.metric.function_name == label) {
            match sample.value() {
                Some(value) => function.invocation_count += value,
                None => log::warn!("add_metrics: unable to convert value {:?} for {}", sample.value, label),
            }
        }
    }
}

pub async fn handle_list_functions(
    query: web::Query<ListQuery>,
    handler: web::Data<ListFunctionsHandler>,
) -> Result<HttpResponse, GatewayError> {
    let functions = handler.list(&query.namespace).await?;
    Ok(HttpResponse::Ok().json(functions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use mockito::Matcher;

    const FUNCTIONS: &str = r#"[
        {"name":"figlet","namespace":"openfaas-fn","replicas":1,"availableReplicas":1,"invocationCount":7,"image":"figlet:latest"},
        {"name":"nodeinfo","namespace":"openfaas-fn","replicas":0,"availableReplicas":0}
    ]"#;

    fn handler(provider: &mockito::Server, prometheus: &str) -> web::Data<ListFunctionsHandler> {
        let provider = ExternalServiceQuery::new(reqwest::Url::parse(&provider.url()).unwrap(), None).unwrap();
        web::Data::new(ListFunctionsHandler::new(
            Arc::new(provider),
            PrometheusQuery::with_base_url(reqwest::Client::new(), prometheus),
        ))
    }

    async fn get(handler: web::Data<ListFunctionsHandler>) -> (StatusCode, web::Bytes) {
        let app = test::init_service(
            App::new()
                .app_data(handler)
                .route("/system/functions", web::get().to(handle_list_functions)),
        )
        .await;
        let res = test::call_service(&app, test::TestRequest::get().uri("/system/functions").to_request()).await;
        let status = res.status();
        (status, test::read_body(res).await)
    }

    #[actix_rt::test]
    async fn test_invocation_counts_are_mixed_in() {
        let mut provider = mockito::Server::new_async().await;
        provider
            .mock("GET", "/system/functions")
            .with_status(200)
            .with_body(FUNCTIONS)
            .create_async()
            .await;
        let mut prometheus = mockito::Server::new_async().await;
        prometheus
            .mock("GET", "/api/v1/query")
            .match_query(Matcher::UrlEncoded(
                "query".into(),
                r#"sum(gateway_function_invocation_total{function_name=~".*.openfaas-fn"}) by (function_name)"#.into(),
            ))
            .with_status(200)
            .with_body(
                r#"{"data":{"result":[{"metric":{"function_name":"figlet.openfaas-fn"},"value":[1.0,"1337"]}]}}"#,
            )
            .create_async()
            .await;

        let (status, body) = get(handler(&provider, &prometheus.url())).await;
        assert_eq!(status, StatusCode::OK);

        let functions: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
        assert_eq!(functions[0]["invocationCount"], 1337.0);
        assert_eq!(functions[1]["invocationCount"], 0.0);
        // 未知字段原样保留
        assert_eq!(functions[0]["image"], "figlet:latest");
    }

    #[actix_rt::test]
    async fn test_prometheus_failure_returns_plain_list() {
        let mut provider = mockito::Server::new_async().await;
        provider
            .mock("GET", "/system/functions")
            .with_status(200)
            .with_body(FUNCTIONS)
            .create_async()
            .await;

        let (status, body) = get(handler(&provider, "http://127.0.0.1:1")).await;
        assert_eq!(status, StatusCode::OK);
        let functions: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
        assert_eq!(functions.len(), 2);
        assert_eq!(functions[0]["invocationCount"], 0.0);
    }

    #[actix_rt::test]
    async fn test_provider_error_is_500() {
        let mut provider = mockito::Server::new_async().await;
        provider
            .mock("GET", "/system/functions")
            .with_status(502)
            .create_async()
            .await;

        let (status, _) = get(handler(&provider, "http://127.0.0.1:1")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}

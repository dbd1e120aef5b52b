// queue_proxy.rs
// POST /async-function/{name}: 请求入队后立即返回 202
use actix_web::{web, HttpRequest, HttpResponse};
use std::sync::Arc;

use crate::error::GatewayError;
use crate::middleware::resolver::{get_namespace, get_service_name, PathTransformer};
use crate::queue::types::{header_map, AsyncRequest, RequestQueuer};
use crate::scaling::function_query::CachedFunctionQuery;

pub const CALLBACK_URL_HEADER: &str = "x-callback-url";
pub const QUEUE_NAME_HEADER: &str = "x-queue-name";
pub const QUEUE_ANNOTATION: &str = "com.openfaas.queue";

pub struct QueueProxy {
    queuer: Arc<dyn RequestQueuer>,
    transformer: PathTransformer,
    query: Arc<CachedFunctionQuery>,
    default_namespace: String,
}

impl QueueProxy {
    pub fn new(
        queuer: Arc<dyn RequestQueuer>,
        transformer: PathTransformer,
        query: Arc<CachedFunctionQuery>,
        default_namespace: &str,
    ) -> Self {
        Self {
            queuer,
            transformer,
            query,
            default_namespace: default_namespace.to_string(),
        }
    }

    fn header<'a>(req: &'a HttpRequest, name: &str) -> Option<&'a str> {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
    }

    // header 优先，其次是函数上的注解
    async fn queue_name(&self, req: &HttpRequest, name: &str) -> String {
        if let Some(queue) = Self::header(req, QUEUE_NAME_HEADER) {
            return queue.to_string();
        }

        let (function, namespace) = get_namespace(&self.default_namespace, name);
        match self.query.get_annotations(&function, &namespace).await {
            Ok(annotations) => annotations.get(QUEUE_ANNOTATION).cloned().unwrap_or_default(),
            Err(err) => {
                log::warn!("Unable to look up queue for {}.{}: {}", function, namespace, err);
                String::new()
            }
        }
    }

    pub async fn enqueue(&self, req: &HttpRequest, body: web::Bytes) -> Result<HttpResponse, GatewayError> {
        let callback_url = match Self::header(req, CALLBACK_URL_HEADER) {
            Some(value) => Some(
                reqwest::Url::parse(value)
                    .map_err(|e| GatewayError::BadRequest(format!("invalid X-Callback-Url {}: {}", value, e)))?
                    .to_string(),
            ),
            None => None,
        };

        let name = get_service_name(req.path());
        let queue_name = self.queue_name(req, &name).await;
        if !queue_name.is_empty() {
            log::info!("Queueing {} to: {}", name, queue_name);
        }

        let async_req = AsyncRequest {
            header: header_map(req.headers().iter().map(|(k, v)| (k.as_str(), v.as_bytes()))),
            host: req.connection_info().host().to_string(),
            body: body.to_vec(),
            method: req.method().to_string(),
            path: self.transformer.transform(req.path()),
            query_string: req.query_string().to_string(),
            function: name,
            queue_name,
            callback_url,
        };

        self.queuer.queue(&async_req).await.map_err(|e| {
            log::error!("Queue error: {}", e);
            GatewayError::QueueFull(e.to_string())
        })?;
        Ok(HttpResponse::Accepted().finish())
    }
}

pub async fn handle_async(
    req: HttpRequest,
    body: web::Bytes,
    proxy: web::Data<QueueProxy>,
) -> Result<HttpResponse, GatewayError> {
    proxy.enqueue(&req, body).await
}

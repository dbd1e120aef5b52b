// notifier.rs
// 包住整个处理链，拿到最终的状态码后通知所有 notifier
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::StatusCode,
    Error,
};
use futures_util::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::resolver::PathTransformer;
use crate::metrics::notifiers::{HttpNotifier, NotifyEvent};

#[derive(Clone)]
pub struct Notify {
    notifiers: Arc<Vec<Arc<dyn HttpNotifier>>>,
    transformer: PathTransformer,
}

impl Notify {
    pub fn new(notifiers: Vec<Arc<dyn HttpNotifier>>, transformer: PathTransformer) -> Self {
        Self {
            notifiers: Arc::new(notifiers),
            transformer,
        }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Notify
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = NotifyMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(NotifyMiddleware {
            service,
            notifiers: Arc::clone(&self.notifiers),
            transformer: self.transformer,
        }))
    }
}

pub struct NotifyMiddleware<S> {
    service: S,
    notifiers: Arc<Vec<Arc<dyn HttpNotifier>>>,
    transformer: PathTransformer,
}

impl<S, B> Service<ServiceRequest> for NotifyMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start = Instant::now();
        let method = req.method().to_string();
        let original_url = req.uri().to_string();
        let url = self.transformer.transform(req.path());

        for notifier in self.notifiers.iter() {
            notifier.notify(
                &method,
                &url,
                &original_url,
                StatusCode::PROCESSING.as_u16(),
                NotifyEvent::Started,
                Duration::ZERO,
            );
        }

        let notifiers = Arc::clone(&self.notifiers);
        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await;
            // 没有显式写状态码的 handler 默认是 200
            let status = match &res {
                Ok(res) => res.status(),
                Err(err) => err.as_response_error().status_code(),
            };
            let duration = start.elapsed();
            for notifier in notifiers.iter() {
                notifier.notify(
                    &method,
                    &url,
                    &original_url,
                    status.as_u16(),
                    NotifyEvent::Completed,
                    duration,
                );
            }
            res
        })
    }
}

// call_id.rs
// 为每个请求打上 X-Call-Id 和 X-Start-Time，并在响应里带回
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderName, HeaderValue},
    Error,
};
use futures_util::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

pub const CALL_ID_HEADER: HeaderName = HeaderName::from_static("x-call-id");
pub const START_TIME_HEADER: HeaderName = HeaderName::from_static("x-start-time");

pub struct CallId;

impl<S, B> Transform<S, ServiceRequest> for CallId
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = CallIdMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(CallIdMiddleware { service }))
    }
}

pub struct CallIdMiddleware<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for CallIdMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let existing = req
            .headers()
            .get(&CALL_ID_HEADER)
            .filter(|v| !v.is_empty())
            .cloned();
        let call_id = match existing {
            Some(id) => Some(id),
            None => {
                let id = HeaderValue::from_str(&Uuid::new_v4().to_string()).ok();
                if let Some(id) = &id {
                    req.headers_mut().insert(CALL_ID_HEADER, id.clone());
                }
                id
            }
        };

        // UTC 纳秒时间戳
        let start_nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let start_time = HeaderValue::from_str(&start_nanos.to_string()).ok();
        if let Some(start_time) = &start_time {
            req.headers_mut().insert(START_TIME_HEADER, start_time.clone());
        }

        let fut = self.service.call(req);
        Box::pin(async move {
            let mut res = fut.await?;
            if let Some(call_id) = call_id {
                res.headers_mut().insert(CALL_ID_HEADER, call_id);
            }
            if let Some(start_time) = start_time {
                res.headers_mut().insert(START_TIME_HEADER, start_time);
            }
            Ok(res)
        })
    }
}

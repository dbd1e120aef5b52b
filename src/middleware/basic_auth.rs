// basic_auth.rs
use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderMap, AUTHORIZATION},
    Error,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures_util::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::sync::Arc;

use crate::config::BasicAuthCredentials;
use crate::error::GatewayError;

/// Rejects requests whose basic-auth credentials don't match. With no credentials configured
/// every request passes.
#[derive(Clone)]
pub struct BasicAuth {
    credentials: Option<Arc<BasicAuthCredentials>>,
}

impl BasicAuth {
    pub fn new(credentials: Option<BasicAuthCredentials>) -> Self {
        Self {
            credentials: credentials.map(Arc::new),
        }
    }
}

fn decode_basic_auth(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}

impl<S, B> Transform<S, ServiceRequest> for BasicAuth
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = BasicAuthMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(BasicAuthMiddleware {
            service,
            credentials: self.credentials.clone(),
        }))
    }
}

pub struct BasicAuthMiddleware<S> {
    service: S,
    credentials: Option<Arc<BasicAuthCredentials>>,
}

impl<S, B> Service<ServiceRequest> for BasicAuthMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if let Some(expected) = &self.credentials {
            let matches = decode_basic_auth(req.headers())
                .map(|(user, password)| user == expected.user && password == expected.password)
                .unwrap_or(false);
            if !matches {
                log::warn!("Rejected request to {}: invalid credentials", req.path());
                let res = req.error_response(GatewayError::Unauthorized).map_into_right_body();
                return Box::pin(async move { Ok(res) });
            }
        }

        let fut = self.service.call(req);
        Box::pin(async move { fut.await.map(ServiceResponse::map_into_left_body) })
    }
}

// catch_panic.rs
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    error::InternalError,
    Error, HttpResponse,
};
use futures_util::future::{FutureExt, LocalBoxFuture};
use std::any::Any;
use std::future::{ready, Ready};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Turns a panic inside a handler into a 500 response.
pub struct CatchPanic;

impl<S, B> Transform<S, ServiceRequest> for CatchPanic
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = CatchPanicMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(CatchPanicMiddleware { service }))
    }
}

pub struct CatchPanicMiddleware<S> {
    service: S,
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

fn recovered(method: &str, path: &str, panic: &(dyn Any + Send)) -> Error {
    log::error!(
        "Recovered from panic while serving {} {}: {}",
        method,
        path,
        panic_message(panic)
    );
    InternalError::from_response(
        "handler panicked",
        HttpResponse::InternalServerError().body("Internal Server Error"),
    )
    .into()
}

impl<S, B> Service<ServiceRequest> for CatchPanicMiddleware<S>
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
        // 不持有 HttpRequest 的引用，内层还需要独占它
        let method = req.method().to_string();
        let path = req.path().to_string();

        let fut = match catch_unwind(AssertUnwindSafe(|| self.service.call(req))) {
            Ok(fut) => fut,
            Err(panic) => {
                let err = recovered(&method, &path, panic.as_ref());
                return Box::pin(async move { Err(err) });
            }
        };
        Box::pin(async move {
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(res) => res,
                Err(panic) => Err(recovered(&method, &path, panic.as_ref())),
            }
        })
    }
}

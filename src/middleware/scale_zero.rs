// scale_zero.rs
// 转发前先确保函数至少有一个可用副本
use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures_util::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::rc::Rc;
use std::sync::Arc;

use super::resolver::{get_namespace, get_service_name};
use crate::error::GatewayError;
use crate::scaling::function_scaler::{FunctionScaleResult, FunctionScaler};
use crate::scaling::scaling_error::ScalingError;

pub struct ScaleFromZero {
    scaler: Arc<FunctionScaler>,
    default_namespace: String,
}

impl ScaleFromZero {
    pub fn new(scaler: Arc<FunctionScaler>, default_namespace: &str) -> Self {
        Self {
            scaler,
            default_namespace: default_namespace.to_string(),
        }
    }
}

/// Maps a scale outcome to the response sent instead of forwarding. `None` means go ahead.
pub fn scale_error(result: &FunctionScaleResult, function_name: &str, namespace: &str) -> Option<GatewayError> {
    if result.available {
        return None;
    }

    let err = match &result.error {
        _ if !result.found => GatewayError::NotFound(format!(
            "error finding function {}.{}: {}",
            function_name,
            namespace,
            result
                .error
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default()
        )),
        None => GatewayError::FunctionUnavailable("function not available".to_string()),
        Some(ScalingError::HttpError(..))
        | Some(ScalingError::Transport(_))
        | Some(ScalingError::JsonError(_)) => GatewayError::FunctionUnavailable(format!(
            "error querying function {}.{}: {}",
            function_name,
            namespace,
            result.error.as_ref().map(ToString::to_string).unwrap_or_default()
        )),
        Some(err) => GatewayError::ScaleFailed(format!(
            "error scaling function {}.{}: {}",
            function_name, namespace, err
        )),
    };
    Some(err)
}

impl<S, B> Transform<S, ServiceRequest> for ScaleFromZero
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = ScaleFromZeroMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ScaleFromZeroMiddleware {
            service: Rc::new(service),
            scaler: Arc::clone(&self.scaler),
            default_namespace: self.default_namespace.clone(),
        }))
    }
}

pub struct ScaleFromZeroMiddleware<S> {
    service: Rc<S>,
    scaler: Arc<FunctionScaler>,
    default_namespace: String,
}

impl<S, B> Service<ServiceRequest> for ScaleFromZeroMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let scaler = Arc::clone(&self.scaler);
        // 从请求路径提取函数名
        let (function_name, namespace) = get_namespace(&self.default_namespace, &get_service_name(req.path()));

        Box::pin(async move {
            let result = scaler.scale(&function_name, &namespace).await;
            match scale_error(&result, &function_name, &namespace) {
                None => service.call(req).await.map(ServiceResponse::map_into_left_body),
                Some(err) => {
                    log::warn!("Scaling: {}", err);
                    Ok(req.error_response(err).map_into_right_body())
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scaling::function_cache::FunctionCache;
    use crate::scaling::scaling_config::ScalingConfig;
    use crate::scaling::service_query::{ServiceQuery, ServiceQueryResponse};
    use actix_web::http::StatusCode;
    use actix_web::{test, web, App, HttpResponse};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Provider {
        snapshot: Result<ServiceQueryResponse, ScalingError>,
        sets: AtomicUsize,
    }

    #[async_trait]
    impl ServiceQuery for Provider {
        async fn get_replicas(&self, _: &str, _: &str) -> Result<ServiceQueryResponse, ScalingError> {
            self.snapshot.clone()
        }

        async fn set_replicas(&self, _: &str, _: &str, _: u64) -> Result<(), ScalingError> {
            self.sets.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn scaler(provider: Arc<Provider>) -> Arc<FunctionScaler> {
        let config = ScalingConfig {
            max_poll_count: 2,
            function_poll_interval: Duration::from_millis(1),
            service_query: provider,
            set_scale_retries: 1,
        };
        Arc::new(FunctionScaler::new(
            config,
            Arc::new(FunctionCache::new(Duration::from_millis(250))),
        ))
    }

    async fn call(provider: Arc<Provider>) -> (StatusCode, String) {
        let app = test::init_service(
            App::new()
                .wrap(ScaleFromZero::new(scaler(provider), "openfaas-fn"))
                .route("/function/{name}", web::post().to(|| async { HttpResponse::Ok().body("hi") })),
        )
        .await;
        let res = test::call_service(&app, test::TestRequest::post().uri("/function/figlet").to_request()).await;
        let status = res.status();
        let body = test::read_body(res).await;
        (status, String::from_utf8_lossy(&body).to_string())
    }

    #[actix_rt::test]
    async fn test_available_function_is_forwarded() {
        let provider = Arc::new(Provider {
            snapshot: Ok(ServiceQueryResponse {
                replicas: 1,
                available_replicas: 1,
                ..Default::default()
            }),
            sets: AtomicUsize::new(0),
        });
        assert_eq!(call(provider).await, (StatusCode::OK, "hi".to_string()));
    }

    #[actix_rt::test]
    async fn test_scale_disabled_is_503() {
        let provider = Arc::new(Provider {
            snapshot: Ok(ServiceQueryResponse {
                min_replicas: 0,
                ..Default::default()
            }),
            sets: AtomicUsize::new(0),
        });
        let (status, body) = call(provider.clone()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, "function not available");
        assert_eq!(provider.sets.load(Ordering::SeqCst), 0);
    }

    #[actix_rt::test]
    async fn test_missing_function_is_404() {
        let provider = Arc::new(Provider {
            snapshot: Err(ScalingError::NotFound("figlet.openfaas-fn".into())),
            sets: AtomicUsize::new(0),
        });
        let (status, body) = call(provider).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("figlet.openfaas-fn"));
    }

    #[actix_rt::test]
    async fn test_provider_down_is_503() {
        let provider = Arc::new(Provider {
            snapshot: Err(ScalingError::Transport("connection refused".into())),
            sets: AtomicUsize::new(0),
        });
        let (status, _) = call(provider).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[actix_rt::test]
    async fn test_poll_timeout_is_500_with_name() {
        // 一直是 replicas=1, available=0
        let provider = Arc::new(Provider {
            snapshot: Ok(ServiceQueryResponse {
                replicas: 1,
                available_replicas: 0,
                ..Default::default()
            }),
            sets: AtomicUsize::new(0),
        });
        let (status, body) = call(provider).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("figlet"));
    }
}

// probe.rs
// 转发前确认函数的 ready 端点可用，同一个函数的并发探测只做一次
use actix_web::{
    body::EitherBody,
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures_util::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use super::resolver::{get_namespace, get_service_name};
use crate::error::GatewayError;
use crate::probing::probe_cache::{FunctionProbeResult, ProbeCache};
use crate::probing::prober::FunctionProber;
use crate::scaling::single_flight::SingleFlight;

#[derive(Clone)]
pub struct Probe {
    prober: Arc<dyn FunctionProber>,
    cache: Arc<ProbeCache>,
    flight: Arc<SingleFlight<FunctionProbeResult>>,
    default_namespace: String,
}

impl Probe {
    pub fn new(prober: Arc<dyn FunctionProber>, cache: Arc<ProbeCache>, default_namespace: &str) -> Self {
        Self {
            prober,
            cache,
            flight: Arc::new(SingleFlight::new()),
            default_namespace: default_namespace.to_string(),
        }
    }

    /// Cached result if there is a fresh one, otherwise a shared probe.
    pub async fn check(&self, function_name: &str, namespace: &str) -> FunctionProbeResult {
        let key = format!("Probe-{}.{}", function_name, namespace);
        let prober = Arc::clone(&self.prober);
        let cache = Arc::clone(&self.cache);
        let (function, ns) = (function_name.to_string(), namespace.to_string());

        let shared = self
            .flight
            .work(&key, move || async move {
                if let Some(hit) = cache.get(&function, &ns).filter(|hit| hit.available) {
                    return hit;
                }
                let result = prober.probe(&function, &ns).await;
                cache.set(&function, &ns, result.clone());
                result
            })
            .await;

        shared.unwrap_or_else(|err| FunctionProbeResult::unavailable(err.to_string(), Duration::ZERO))
    }
}

impl<S, B> Transform<S, ServiceRequest> for Probe
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = ProbeMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ProbeMiddleware {
            service: Rc::new(service),
            probe: self.clone(),
        }))
    }
}

pub struct ProbeMiddleware<S> {
    service: Rc<S>,
    probe: Probe,
}

impl<S, B> Service<ServiceRequest> for ProbeMiddleware<S>
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
        let probe = self.probe.clone();
        let (function_name, namespace) = get_namespace(&probe.default_namespace, &get_service_name(req.path()));

        Box::pin(async move {
            let result = probe.check(&function_name, &namespace).await;
            if result.available {
                return service.call(req).await.map(ServiceResponse::map_into_left_body);
            }

            let err = GatewayError::FunctionUnavailable(format!(
                "unable to probe function endpoint {}.{}: {}",
                function_name,
                namespace,
                result.error.unwrap_or_default()
            ));
            log::warn!("Probe: {}", err);
            Ok(req.error_response(err).map_into_right_body())
        })
    }
}

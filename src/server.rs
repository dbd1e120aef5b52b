// server.rs
// 组装所有依赖，并注册网关和指标端口上的路由
use actix_web::http::Method;
use actix_web::middleware::Condition;
use actix_web::{web, HttpResponse, Resource};
use std::sync::Arc;

use crate::config::{BasicAuthCredentials, GatewayConfig};
use crate::handlers::alert_handler::{handle_alert, AlertHandler};
use crate::handlers::async_report::{handle_async_report, AsyncReportHandler};
use crate::handlers::forwarding_proxy::{build_proxy_client, forward_to, ForwardingProxy, MAX_BODY_SIZE};
use crate::handlers::info_handler::handle_info;
use crate::handlers::list_functions::{handle_list_functions, ListFunctionsHandler};
use crate::handlers::queue_proxy::{handle_async, QueueProxy};
use crate::metrics::exporter::Exporter;
use crate::metrics::notifiers::{
    HttpNotifier, LoggingNotifier, PrometheusFunctionNotifier, PrometheusServiceNotifier,
};
use crate::metrics::prometheus_query::PrometheusQuery;
use crate::metrics::registry::{MetricOptions, MetricsError};
use crate::middleware::auth_injector::{AuthInjector, BasicAuthInjector};
use crate::middleware::basic_auth::BasicAuth;
use crate::middleware::call_id::CallId;
use crate::middleware::catch_panic::CatchPanic;
use crate::middleware::notifier::Notify;
use crate::middleware::probe::Probe;
use crate::middleware::resolver::{BaseUrlResolver, PathTransformer};
use crate::middleware::scale_zero::ScaleFromZero;
use crate::probing::probe_cache::ProbeCache;
use crate::probing::prober::{FunctionHttpProber, FunctionNonProber, FunctionProber};
use crate::queue::types::RequestQueuer;
use crate::scaling::function_cache::FunctionCache;
use crate::scaling::function_query::CachedFunctionQuery;
use crate::scaling::function_scaler::FunctionScaler;
use crate::scaling::scaling_config::ScalingConfig;
use crate::scaling::service_query::{ExternalServiceQuery, ServiceQuery};
use crate::scaling::single_flight::SingleFlightServiceQuery;

const NAME: &str = "/{name:[-a-zA-Z_0-9.]+}";
const NAME_SLASH: &str = "/{name:[-a-zA-Z_0-9.]+}/";
const NAME_PARAMS: &str = "/{name:[-a-zA-Z_0-9.]+}/{params:.*}";

#[derive(thiserror::Error, Debug)]
pub enum StartupError {
    #[error("unable to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error(transparent)]
    Metrics(#[from] MetricsError),
}

/// Every long-lived handler and middleware, built once at startup and cloned into each worker.
#[derive(Clone)]
pub struct Gateway {
    namespace: String,
    scale_from_zero: bool,
    credentials: Option<BasicAuthCredentials>,
    metrics: web::Data<MetricOptions>,
    provider: web::Data<Arc<ExternalServiceQuery>>,
    function_proxy: Arc<ForwardingProxy>,
    service_proxy: Arc<ForwardingProxy>,
    scaler: Arc<FunctionScaler>,
    probe: Probe,
    function_notifiers: Vec<Arc<dyn HttpNotifier>>,
    service_notifiers: Vec<Arc<dyn HttpNotifier>>,
    alerts: web::Data<AlertHandler>,
    list_functions: web::Data<ListFunctionsHandler>,
    async_report: web::Data<AsyncReportHandler>,
    queue: Option<web::Data<QueueProxy>>,
}

impl Gateway {
    pub fn new(
        config: &GatewayConfig,
        credentials: Option<BasicAuthCredentials>,
        queuer: Option<Arc<dyn RequestQueuer>>,
    ) -> Result<Self, StartupError> {
        let injector: Option<Arc<dyn AuthInjector>> = credentials
            .clone()
            .map(|c| Arc::new(BasicAuthInjector::new(c)) as Arc<dyn AuthInjector>);

        let provider = Arc::new(ExternalServiceQuery::new(
            config.functions_provider_url.clone(),
            injector.clone(),
        )?);
        // 所有对 provider 的 Get/Set 都经过同一个 singleflight
        let service_query: Arc<dyn ServiceQuery> = Arc::new(SingleFlightServiceQuery::new(provider.clone()));

        let function_cache = Arc::new(FunctionCache::new(config.cache_expiry));
        let scaler = Arc::new(FunctionScaler::new(
            ScalingConfig {
                max_poll_count: config.max_poll_count,
                function_poll_interval: config.function_poll_interval,
                service_query: Arc::clone(&service_query),
                set_scale_retries: config.set_scale_retries,
            },
            Arc::clone(&function_cache),
        ));
        let function_query = Arc::new(CachedFunctionQuery::new(
            Arc::clone(&function_cache),
            Arc::clone(&service_query),
        ));

        let service_resolver = BaseUrlResolver::single_host(config.functions_provider_url.as_str());
        let (function_resolver, function_transformer) = if config.direct_functions {
            (
                BaseUrlResolver::function_as_host(&config.direct_functions_suffix, &config.namespace),
                PathTransformer::FunctionPrefixTrimming,
            )
        } else {
            (service_resolver.clone(), PathTransformer::Transparent)
        };

        let client = build_proxy_client(config.upstream_timeout, config.max_idle_conns_per_host)?;
        let prober: Arc<dyn FunctionProber> = if config.probe_functions {
            Arc::new(FunctionHttpProber::new(
                client.clone(),
                Arc::clone(&function_query),
                function_resolver.clone(),
            ))
        } else {
            Arc::new(FunctionNonProber)
        };
        let probe = Probe::new(prober, Arc::new(ProbeCache::new(config.cache_expiry)), &config.namespace);

        let metrics = Arc::new(MetricOptions::new()?);
        let logging: Arc<dyn HttpNotifier> = Arc::new(LoggingNotifier);
        let function_notifiers: Vec<Arc<dyn HttpNotifier>> = vec![
            Arc::clone(&logging),
            Arc::new(PrometheusFunctionNotifier::new(Arc::clone(&metrics), &config.namespace)),
        ];
        let service_notifiers: Vec<Arc<dyn HttpNotifier>> = vec![
            logging,
            Arc::new(PrometheusServiceNotifier::new(Arc::clone(&metrics))),
        ];

        let queue = queuer.map(|queuer| {
            web::Data::new(QueueProxy::new(
                queuer,
                PathTransformer::FunctionPrefixTrimming,
                Arc::clone(&function_query),
                &config.namespace,
            ))
        });

        Ok(Self {
            namespace: config.namespace.clone(),
            scale_from_zero: config.scale_from_zero,
            credentials,
            alerts: web::Data::new(AlertHandler::new(Arc::clone(&service_query), &config.namespace)),
            list_functions: web::Data::new(ListFunctionsHandler::new(
                Arc::clone(&provider),
                PrometheusQuery::new(client.clone(), &config.prometheus_host, config.prometheus_port),
            )),
            async_report: web::Data::new(AsyncReportHandler::new(Arc::clone(&metrics), &config.namespace)),
            function_proxy: Arc::new(ForwardingProxy::new(
                client.clone(),
                function_resolver,
                function_transformer,
                None,
            )
            .with_deadline(config.upstream_timeout, config.write_timeout)),
            service_proxy: Arc::new(ForwardingProxy::new(
                client,
                service_resolver,
                PathTransformer::Transparent,
                injector,
            )),
            metrics: web::Data::from(metrics),
            provider: web::Data::new(provider),
            scaler,
            probe,
            function_notifiers,
            service_notifiers,
            queue,
        })
    }

    pub fn exporter(&self) -> Exporter {
        Exporter::new(
            Arc::clone(self.provider.get_ref()),
            self.metrics.clone().into_inner(),
            &self.namespace,
        )
    }

    fn forwarded(&self, path: &str, methods: &[Method]) -> Resource {
        methods.iter().fold(web::resource(path), |resource, method| {
            resource.route(forward_to(web::method(method.clone()), &self.service_proxy))
        })
    }

    /// Routes of the main listener.
    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(web::PayloadConfig::new(MAX_BODY_SIZE));

        let function_notify = Notify::new(self.function_notifiers.clone(), PathTransformer::FunctionPrefixTrimming);
        let proxy = &self.function_proxy;
        // 外层在后：CatchPanic -> CallId -> Notify -> ScaleFromZero -> Probe -> 转发
        cfg.service(
            web::scope("/function")
                .wrap(self.probe.clone())
                .wrap(Condition::new(
                    self.scale_from_zero,
                    ScaleFromZero::new(Arc::clone(&self.scaler), &self.namespace),
                ))
                .wrap(function_notify.clone())
                .wrap(CallId)
                .wrap(CatchPanic)
                .route(NAME, forward_to(web::route(), proxy))
                .route(NAME_SLASH, forward_to(web::route(), proxy))
                .route(NAME_PARAMS, forward_to(web::route(), proxy)),
        );

        if let Some(queue) = &self.queue {
            log::info!("Async enabled: Using NATS JetStream.");
            cfg.service(
                web::scope("/async-function")
                    .app_data(queue.clone())
                    .wrap(function_notify)
                    .wrap(CallId)
                    .wrap(CatchPanic)
                    .route(NAME, web::post().to(handle_async))
                    .route(NAME_SLASH, web::post().to(handle_async))
                    .route(NAME_PARAMS, web::post().to(handle_async)),
            );
        }

        // 队列 worker 内部调用，不走 basic auth
        cfg.service(
            web::resource("/system/async-report")
                .app_data(self.async_report.clone())
                .wrap(Notify::new(self.service_notifiers.clone(), PathTransformer::Transparent))
                .wrap(CatchPanic)
                .route(web::post().to(handle_async_report)),
        );

        cfg.service(
            web::scope("/system")
                .app_data(self.provider.clone())
                .app_data(self.alerts.clone())
                .app_data(self.list_functions.clone())
                .wrap(Notify::new(self.service_notifiers.clone(), PathTransformer::Transparent))
                .wrap(BasicAuth::new(self.credentials.clone()))
                .wrap(CatchPanic)
                .route("/info", web::get().to(handle_info))
                .route("/alert", web::post().to(handle_alert))
                .service(self.forwarded(&format!("/function{}", NAME), &[Method::GET]))
                .service(
                    self.forwarded("/functions", &[Method::POST, Method::PUT, Method::DELETE])
                        .route(web::get().to(handle_list_functions)),
                )
                .service(self.forwarded(&format!("/scale-function{}", NAME), &[Method::POST]))
                .service(self.forwarded(
                    "/secrets",
                    &[Method::GET, Method::PUT, Method::POST, Method::DELETE],
                ))
                .service(self.forwarded("/logs", &[Method::GET]))
                .service(self.forwarded("/namespaces", &[Method::GET]))
                .service(self.forwarded(
                    "/namespace/{namespace}",
                    &[Method::GET, Method::POST, Method::PUT, Method::DELETE],
                )),
        );

        cfg.service(self.forwarded("/healthz", &[Method::GET]));
    }

    /// Routes of the metrics listener.
    pub fn configure_metrics(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(self.metrics.clone())
            .route("/metrics", web::get().to(metrics_handler))
            .route("/healthz", web::get().to(healthz));
    }
}

async fn metrics_handler(metrics: web::Data<MetricOptions>) -> HttpResponse {
    match metrics.render() {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4; charset=utf-8")
            .body(body),
        Err(e) => {
            log::error!("{}", e);
            HttpResponse::InternalServerError().body(e.to_string())
        }
    }
}

async fn healthz() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}

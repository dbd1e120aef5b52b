// forwarding_proxy.rs
// 把请求原样转发到上游（函数或 provider），再把响应流式写回
use actix_web::http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, HOST};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse, Route};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::GatewayError;
use crate::middleware::auth_injector::AuthInjector;
use crate::middleware::call_id::START_TIME_HEADER;
use crate::middleware::resolver::{BaseUrlResolver, PathTransformer};

pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";
pub const MAX_BODY_SIZE: usize = 8 * 1024 * 1024;

const X_FORWARDED_HOST: &str = "x-forwarded-host";
const X_FORWARDED_FOR: &str = "x-forwarded-for";

// 逐跳头部，不转发
const HOP_HEADERS: [&str; 9] = [
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_header(name: &str) -> bool {
    HOP_HEADERS.iter().any(|hop| name.eq_ignore_ascii_case(hop))
}

/// Shared client used for every forwarded request: no redirects, bounded by the upstream timeout.
pub fn build_proxy_client(upstream_timeout: Duration, max_idle_conns_per_host: usize) -> reqwest::Result<reqwest::Client> {
    reqwest::ClientBuilder::new()
        .timeout(upstream_timeout)
        .redirect(reqwest::redirect::Policy::none())
        .pool_max_idle_per_host(max_idle_conns_per_host)
        .build()
}

#[derive(Debug, Clone, Copy)]
struct Deadline {
    upstream_timeout: Duration,
    write_timeout: Duration,
}

pub struct ForwardingProxy {
    client: reqwest::Client,
    resolver: BaseUrlResolver,
    transformer: PathTransformer,
    auth_injector: Option<Arc<dyn AuthInjector>>,
    deadline: Option<Deadline>,
}

impl ForwardingProxy {
    pub fn new(
        client: reqwest::Client,
        resolver: BaseUrlResolver,
        transformer: PathTransformer,
        auth_injector: Option<Arc<dyn AuthInjector>>,
    ) -> Self {
        Self {
            client,
            resolver,
            transformer,
            auth_injector,
            deadline: None,
        }
    }

    /// Caps each upstream call at whatever is left of `write_timeout`, counted from the
    /// request's `X-Start-Time`, and never above `upstream_timeout`.
    pub fn with_deadline(mut self, upstream_timeout: Duration, write_timeout: Duration) -> Self {
        self.deadline = Some(Deadline {
            upstream_timeout,
            write_timeout,
        });
        self
    }

    fn remaining(&self, req: &HttpRequest) -> Option<Duration> {
        let deadline = self.deadline?;
        let started: u128 = req.headers().get(START_TIME_HEADER)?.to_str().ok()?.parse().ok()?;
        let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_nanos();
        let elapsed = Duration::from_nanos(u64::try_from(now.saturating_sub(started)).unwrap_or(u64::MAX));
        Some(deadline.write_timeout.saturating_sub(elapsed).min(deadline.upstream_timeout))
    }

    pub fn upstream_url(&self, path: &str, query: &str) -> String {
        let mut url = format!("{}{}", self.resolver.resolve(path), self.transformer.transform(path));
        if !query.is_empty() {
            url.push('?');
            url.push_str(query);
        }
        url
    }

    pub async fn forward(&self, req: &HttpRequest, body: web::Bytes) -> Result<HttpResponse, GatewayError> {
        let url = self.upstream_url(req.path(), req.query_string());
        let method = reqwest::Method::from_bytes(req.method().as_str().as_bytes())
            .map_err(|e| GatewayError::BadRequest(format!("unsupported method {}: {}", req.method(), e)))?;

        let mut upstream = self.client.request(method, &url);
        if let Some(remaining) = self.remaining(req) {
            if remaining.is_zero() {
                log::error!("request deadline passed before forwarding to: {}", url);
                return Err(GatewayError::UpstreamTimeout(format!("upstream timed out: {}", url)));
            }
            upstream = upstream.timeout(remaining);
        }
        for (name, value) in req.headers().iter() {
            if is_hop_header(name.as_str()) || *name == HOST {
                continue;
            }
            upstream = upstream.header(name.as_str(), value.as_bytes());
        }

        if !req.headers().contains_key(X_FORWARDED_HOST) {
            let host = req.connection_info().host().to_string();
            upstream = upstream.header(X_FORWARDED_HOST, host);
        }
        if let Some(peer) = req.peer_addr() {
            let forwarded_for = match req.headers().get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
                Some(prior) if !prior.is_empty() => format!("{}, {}", prior, peer.ip()),
                _ => peer.ip().to_string(),
            };
            upstream = upstream.header(X_FORWARDED_FOR, forwarded_for);
        }

        if let Some(injector) = &self.auth_injector {
            upstream = injector.inject(upstream);
        }
        if !body.is_empty() {
            upstream = upstream.body(body);
        }

        let res = upstream.send().await.map_err(|e| {
            log::error!("error with proxy request to: {}, {}", url, e);
            if e.is_timeout() {
                GatewayError::UpstreamTimeout(format!("upstream timed out: {}", url))
            } else if e.is_connect() {
                GatewayError::FunctionUnavailable(format!("unable to reach upstream: {}", url))
            } else {
                GatewayError::BadGateway(format!("error forwarding request to {}: {}", url, e))
            }
        })?;

        let status = StatusCode::from_u16(res.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        let mut builder = HttpResponse::build(status);
        copy_response_headers(res.headers(), &mut builder);
        builder.insert_header((CONTENT_TYPE, content_type(res.headers(), req.headers())));

        Ok(builder.streaming(res.bytes_stream()))
    }
}

fn copy_response_headers(headers: &reqwest::header::HeaderMap, builder: &mut actix_web::HttpResponseBuilder) {
    for (name, value) in headers.iter() {
        let name = name.as_str();
        if is_hop_header(name) || name == "content-length" || name == "content-type" {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            builder.append_header((name, value));
        }
    }
}

// 响应 > 请求 > 默认值
fn content_type(upstream: &reqwest::header::HeaderMap, request: &HeaderMap) -> HeaderValue {
    upstream
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| HeaderValue::from_bytes(v.as_bytes()).ok())
        .or_else(|| request.get(CONTENT_TYPE).cloned())
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE))
}

/// Route that forwards everything it matches through `proxy`.
pub fn forward_to(route: Route, proxy: &Arc<ForwardingProxy>) -> Route {
    let proxy = Arc::clone(proxy);
    route.to(move |req: HttpRequest, body: web::Bytes| {
        let proxy = Arc::clone(&proxy);
        async move { proxy.forward(&req, body).await }
    })
}

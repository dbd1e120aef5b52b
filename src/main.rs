// main.rs
// http服务入口：8080 对外网关，8082 指标
use actix_web::{App, HttpServer};
use std::sync::Arc;
use tokio::sync::watch;

mod config;
mod error;
mod handlers;
mod metrics;
mod middleware;
mod probing;
mod queue;
mod scaling;
mod server;

use crate::config::{BasicAuthCredentials, GatewayConfig, OsEnv};
use crate::metrics::exporter::WATCH_INTERVAL;
use crate::queue::nats::NatsQueue;
use crate::queue::types::RequestQueuer;
use crate::server::Gateway;

const GATEWAY_PORT: u16 = 8080;
const METRICS_PORT: u16 = 8082;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match GatewayConfig::read(&OsEnv) {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid gateway configuration: {}", e);
            std::process::exit(1);
        }
    };

    log::info!("Binding to external function provider: {}", config.functions_provider_url);
    log::info!("Default namespace for functions: {}", config.namespace);

    let credentials = if config.use_basic_auth {
        match BasicAuthCredentials::read_from(&config.secret_mount_path) {
            Ok(credentials) => {
                log::info!("Basic auth enabled, secrets read from {}", config.secret_mount_path.display());
                Some(credentials)
            }
            Err(e) => {
                log::error!("{}", e);
                std::process::exit(1);
            }
        }
    } else {
        None
    };

    let queuer: Option<Arc<dyn RequestQueuer>> = match &config.nats {
        Some(nats) => match NatsQueue::connect(nats, "faas-gateway").await {
            Ok(queue) => Some(Arc::new(queue) as Arc<dyn RequestQueuer>),
            Err(e) => {
                log::error!("{}", e);
                std::process::exit(1);
            }
        },
        None => None,
    };

    let gateway = match Gateway::new(&config, credentials, queuer) {
        Ok(gateway) => gateway,
        Err(e) => {
            log::error!("Unable to start gateway: {}", e);
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let watcher = Arc::new(gateway.exporter()).start(WATCH_INTERVAL, shutdown_rx);

    let api = {
        let gateway = gateway.clone();
        HttpServer::new(move || App::new().configure(|cfg| gateway.configure(cfg)))
            .client_request_timeout(config.read_timeout)
            .client_disconnect_timeout(config.write_timeout)
            .keep_alive(config.write_timeout)
            .bind(("0.0.0.0", GATEWAY_PORT))?
            .run()
    };
    let metrics = HttpServer::new(move || App::new().configure(|cfg| gateway.configure_metrics(cfg)))
        .client_request_timeout(config.read_timeout)
        .bind(("0.0.0.0", METRICS_PORT))?
        .run();

    log::info!("Gateway listening on :{}, metrics on :{}", GATEWAY_PORT, METRICS_PORT);

    let result = tokio::try_join!(api, metrics).map(|_| ());
    let _ = shutdown_tx.send(true);
    let _ = watcher.await;
    result
}

// config.rs
// 从环境变量读取网关配置
use reqwest::Url;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);
const DEFAULT_MAX_IDLE_CONNS: usize = 1024;
const DEFAULT_NATS_PORT: u16 = 4222;
const DEFAULT_PROMETHEUS_PORT: u16 = 9090;
const DEFAULT_SECRET_MOUNT_PATH: &str = "/run/secrets/";
const DEFAULT_FUNCTION_NAMESPACE: &str = "openfaas-fn";

const DEFAULT_MAX_POLL_COUNT: u64 = 1000;
const DEFAULT_SET_SCALE_RETRIES: u64 = 20;
const DEFAULT_FUNCTION_POLL_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_CACHE_EXPIRY: Duration = Duration::from_millis(250);

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("functions_provider_url is required")]
    MissingProviderUrl,

    #[error("{key} is not a valid URL: {value}")]
    InvalidUrl { key: String, value: String },

    #[error("{key} invalid number: {value}")]
    InvalidNumber { key: String, value: String },

    #[error("function_namespace must be a sub-string of direct_functions_suffix")]
    NamespaceNotInSuffix,

    #[error("unable to read secret {path}: {source}")]
    Secret {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Source of configuration values, so tests don't touch the process environment.
pub trait HasEnv {
    fn getenv(&self, key: &str) -> Option<String>;
}

pub struct OsEnv;

impl HasEnv for OsEnv {
    fn getenv(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl HasEnv for HashMap<String, String> {
    fn getenv(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicAuthCredentials {
    pub user: String,
    pub password: String,
}

impl BasicAuthCredentials {
    // 文件内容原样使用，不做 trim
    pub fn read_from(secret_mount_path: &Path) -> Result<Self, ConfigError> {
        let read = |name: &str| {
            let path = secret_mount_path.join(name);
            std::fs::read_to_string(&path).map_err(|source| ConfigError::Secret { path, source })
        };
        Ok(Self {
            user: read("basic-auth-user")?,
            password: read("basic-auth-password")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NatsConfig {
    pub address: String,
    pub port: u16,
    pub channel: String,
    pub cluster_name: String,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub upstream_timeout: Duration,
    pub functions_provider_url: Url,

    /// Async invocations are enabled when this is set.
    pub nats: Option<NatsConfig>,
    pub prometheus_host: String,
    pub prometheus_port: u16,

    pub direct_functions: bool,
    pub direct_functions_suffix: String,
    pub use_basic_auth: bool,
    pub secret_mount_path: PathBuf,
    pub scale_from_zero: bool,
    /// Check each function's ready path before forwarding.
    pub probe_functions: bool,
    /// reqwest caps idle connections per host only, so `max_idle_conns` is not read.
    pub max_idle_conns_per_host: usize,
    pub namespace: String,

    pub max_poll_count: u64,
    pub function_poll_interval: Duration,
    pub set_scale_retries: u64,
    pub cache_expiry: Duration,
}

impl GatewayConfig {
    pub fn read(env: &impl HasEnv) -> Result<Self, ConfigError> {
        let get = |key: &str| env.getenv(key).filter(|v| !v.is_empty());

        let provider = get("functions_provider_url").ok_or(ConfigError::MissingProviderUrl)?;
        let functions_provider_url = Url::parse(&provider).map_err(|_| ConfigError::InvalidUrl {
            key: "functions_provider_url".into(),
            value: provider.clone(),
        })?;

        let nats = match get("faas_nats_address") {
            Some(address) => Some(NatsConfig {
                address,
                port: parse_number(get("faas_nats_port"), "faas_nats_port", DEFAULT_NATS_PORT)?,
                channel: get("faas_nats_channel").unwrap_or_else(|| "faas-request".into()),
                cluster_name: get("faas_nats_cluster_name").unwrap_or_else(|| "faas-cluster".into()),
            }),
            None => None,
        };

        let direct_functions_suffix = get("direct_functions_suffix").unwrap_or_default();
        let explicit_namespace = get("function_namespace");
        if let Some(namespace) = &explicit_namespace {
            if !direct_functions_suffix.is_empty() && !direct_functions_suffix.starts_with(namespace.as_str()) {
                return Err(ConfigError::NamespaceNotInSuffix);
            }
        }

        Ok(Self {
            read_timeout: parse_int_or_duration(get("read_timeout"), DEFAULT_TIMEOUT),
            write_timeout: parse_int_or_duration(get("write_timeout"), DEFAULT_TIMEOUT),
            upstream_timeout: parse_int_or_duration(get("upstream_timeout"), DEFAULT_TIMEOUT),
            functions_provider_url,
            nats,
            prometheus_host: get("faas_prometheus_host").unwrap_or_else(|| "prometheus".into()),
            prometheus_port: parse_number(
                get("faas_prometheus_port"),
                "faas_prometheus_port",
                DEFAULT_PROMETHEUS_PORT,
            )?,
            direct_functions: parse_bool(get("direct_functions")),
            direct_functions_suffix,
            use_basic_auth: parse_bool(get("basic_auth")),
            secret_mount_path: PathBuf::from(
                get("secret_mount_path").unwrap_or_else(|| DEFAULT_SECRET_MOUNT_PATH.into()),
            ),
            scale_from_zero: parse_bool(get("scale_from_zero")),
            probe_functions: get("probe_functions").map_or(true, |v| v == "true"),
            max_idle_conns_per_host: parse_number(
                get("max_idle_conns_per_host"),
                "max_idle_conns_per_host",
                DEFAULT_MAX_IDLE_CONNS,
            )?,
            namespace: explicit_namespace.unwrap_or_else(|| DEFAULT_FUNCTION_NAMESPACE.into()),
            max_poll_count: parse_number(get("max_poll_count"), "max_poll_count", DEFAULT_MAX_POLL_COUNT)?,
            function_poll_interval: parse_int_or_duration(
                get("function_poll_interval"),
                DEFAULT_FUNCTION_POLL_INTERVAL,
            ),
            set_scale_retries: parse_number(
                get("set_scale_retries"),
                "set_scale_retries",
                DEFAULT_SET_SCALE_RETRIES,
            )?,
            cache_expiry: parse_int_or_duration(get("cache_expiry"), DEFAULT_CACHE_EXPIRY),
        })
    }
}

fn parse_bool(value: Option<String>) -> bool {
    value.as_deref() == Some("true")
}

fn parse_number<T: std::str::FromStr>(value: Option<String>, key: &str, default: T) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) => v.trim().parse().map_err(|_| ConfigError::InvalidNumber {
            key: key.to_string(),
            value: v,
        }),
    }
}

/// Whole seconds (`"10"`) or a Go style duration (`"500ms"`, `"1m30s"`). Anything else gives `fallback`.
pub fn parse_int_or_duration(value: Option<String>, fallback: Duration) -> Duration {
    let Some(value) = value else {
        return fallback;
    };
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Duration::from_secs(seconds);
    }
    parse_duration(value).unwrap_or(fallback)
}

/// Go style duration. Fractional single-unit values such as `1.5s` are scaled from the
/// unit's length, since humantime only takes whole numbers.
pub fn parse_duration(s: &str) -> Option<Duration> {
    if s == "0" {
        return Some(Duration::ZERO);
    }
    if let Ok(duration) = humantime::parse_duration(s) {
        return Some(duration);
    }

    let split = s.find(|c: char| !(c.is_ascii_digit() || c == '.'))?;
    let (number, unit) = s.split_at(split);
    if !number.contains('.') {
        return None;
    }
    let number: f64 = number.parse().ok()?;
    let unit = humantime::parse_duration(&format!("1{}", unit)).ok()?;
    Some(unit.mul_f64(number))
}

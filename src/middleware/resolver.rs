// resolver.rs
// 把路由到的请求映射到上游地址，以及改写上游路径
use once_cell::sync::Lazy;
use regex::Regex;

static FUNCTION_MATCHER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/?(?:async-)?function/([^/?]+)([^?]*)").expect("function matcher is a valid regex")
});

const WATCHDOG_PORT: u16 = 8080;

/// Picks the upstream base URL for a request.
#[derive(Debug, Clone)]
pub enum BaseUrlResolver {
    /// All traffic goes through one base URL, normally the provider.
    SingleHost { base_url: String },
    /// Calls each function's service directly: `http://<svc>.<suffix>:8080`.
    FunctionAsHost {
        function_suffix: String,
        function_namespace: String,
    },
}

impl BaseUrlResolver {
    pub fn single_host(base_url: &str) -> Self {
        BaseUrlResolver::SingleHost {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn function_as_host(function_suffix: &str, function_namespace: &str) -> Self {
        BaseUrlResolver::FunctionAsHost {
            function_suffix: function_suffix.to_string(),
            function_namespace: function_namespace.to_string(),
        }
    }

    pub fn resolve(&self, path: &str) -> String {
        match self {
            BaseUrlResolver::SingleHost { base_url } => base_url.clone(),
            BaseUrlResolver::FunctionAsHost {
                function_suffix,
                function_namespace,
            } => {
                let service_name = get_service_name(path);
                let suffix = if function_suffix.is_empty() {
                    String::new()
                } else if has_namespace(&service_name) {
                    // 名字里已经带了命名空间，去掉后缀里的默认命名空间
                    function_suffix.replace(function_namespace.as_str(), "")
                } else {
                    format!(".{}", function_suffix)
                };
                format!("http://{}{}:{}", service_name, suffix, WATCHDOG_PORT)
            }
        }
    }

    /// Absolute URL for `health_path` on one function, used by the prober.
    pub fn build_url(&self, function: &str, namespace: &str, health_path: &str) -> String {
        let health_path = health_path.trim_start_matches('/');
        match self {
            BaseUrlResolver::SingleHost { base_url } => {
                format!("{}/function/{}.{}/{}", base_url, function, namespace, health_path)
            }
            BaseUrlResolver::FunctionAsHost {
                function_suffix,
                function_namespace,
            } => {
                let suffix = if function_suffix.is_empty() {
                    String::new()
                } else {
                    format!(".{}", function_suffix.replacen(function_namespace.as_str(), namespace, 1))
                };
                format!(
                    "http://{}{}:{}/{}",
                    function, suffix, WATCHDOG_PORT, health_path
                )
            }
        }
    }
}

/// Rewrites the inbound request path into the upstream path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathTransformer {
    Transparent,
    /// `/function/<name>/<rest>` becomes `/<rest>`.
    FunctionPrefixTrimming,
}

impl PathTransformer {
    pub fn transform(&self, path: &str) -> String {
        match self {
            PathTransformer::Transparent => path.to_string(),
            PathTransformer::FunctionPrefixTrimming => match FUNCTION_MATCHER.captures(path) {
                Some(groups) => groups.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
                None => path.to_string(),
            },
        }
    }
}

fn has_namespace(service_name: &str) -> bool {
    matches!(service_name.rfind('.'), Some(index) if index + 1 < service_name.len())
}

/// Function name as written in the URL, possibly carrying a `.namespace` suffix.
pub fn get_service_name(url: &str) -> String {
    FUNCTION_MATCHER
        .captures(url)
        .and_then(|groups| groups.get(1))
        .map(|m| m.as_str().trim_matches('/').to_string())
        .unwrap_or_default()
}

/// Splits on the rightmost dot; names without one get `default_namespace`.
pub fn get_namespace(default_namespace: &str, full_name: &str) -> (String, String) {
    match full_name.rfind('.') {
        Some(index) if index + 1 < full_name.len() => (
            full_name[..index].to_string(),
            full_name[index + 1..].to_string(),
        ),
        _ => (
            full_name.trim_end_matches('.').to_string(),
            default_namespace.to_string(),
        ),
    }
}

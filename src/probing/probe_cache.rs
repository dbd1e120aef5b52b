// probe_cache.rs
use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::scaling::function_meta::expired;

#[derive(Debug, Clone)]
pub struct FunctionProbeResult {
    pub available: bool,
    pub found: bool,
    pub error: Option<String>,
    pub duration: Duration,
    pub updated: Instant,
}

impl FunctionProbeResult {
    pub fn available(duration: Duration) -> Self {
        Self {
            available: true,
            found: true,
            error: None,
            duration,
            updated: Instant::now(),
        }
    }

    pub fn unavailable(error: String, duration: Duration) -> Self {
        Self {
            available: false,
            found: true,
            error: Some(error),
            duration,
            updated: Instant::now(),
        }
    }

    pub fn is_expired(&self, expiry: Duration) -> bool {
        expired(self.updated, expiry)
    }
}

/// Last probe result per `<fn>.<ns>`, same expiry rule as the function cache.
pub struct ProbeCache {
    cache: DashMap<String, FunctionProbeResult>,
    expiry: Duration,
}

impl ProbeCache {
    pub fn new(expiry: Duration) -> Self {
        Self {
            cache: DashMap::new(),
            expiry,
        }
    }

    /// Only unexpired results are returned.
    pub fn get(&self, function: &str, namespace: &str) -> Option<FunctionProbeResult> {
        let key = format!("{}.{}", function, namespace);
        self.cache
            .get(&key)
            .filter(|entry| !entry.is_expired(self.expiry))
            .map(|entry| entry.value().clone())
    }

    pub fn set(&self, function: &str, namespace: &str, result: FunctionProbeResult) {
        self.cache.insert(format!("{}.{}", function, namespace), result);
    }
}

use std::time::{Duration, Instant};

// FunctionMeta holds the last refresh time of a cached value.
#[derive(Debug, Clone)]
pub struct FunctionMeta<T> {
    pub last_refresh: Instant,
    pub value: T,
}

impl<T> FunctionMeta<T> {
    pub fn new(value: T) -> Self {
        Self {
            last_refresh: Instant::now(),
            value,
        }
    }

    // Check if the cache item has expired given the expiry duration
    pub fn is_expired(&self, expiry: Duration) -> bool {
        expired(self.last_refresh, expiry)
    }
}

/// `now > since + expiry`
pub fn expired(since: Instant, expiry: Duration) -> bool {
    since.elapsed() > expiry
}

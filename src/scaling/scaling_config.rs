use std::sync::Arc;
use std::time::Duration;

use super::service_query::ServiceQuery;

#[derive(Clone)]
pub struct ScalingConfig {
    /// Readiness polls after a scale request.
    pub max_poll_count: u64,
    /// Delay between polls and between scale retries.
    pub function_poll_interval: Duration,
    pub service_query: Arc<dyn ServiceQuery>,
    /// SetReplicas attempts before giving up.
    pub set_scale_retries: u64,
}

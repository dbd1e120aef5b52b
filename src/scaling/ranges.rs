// ranges.rs
// 副本数的默认范围和告警扩缩容的计算
use std::cmp::{max, min};

pub const DEFAULT_MIN_REPLICAS: u64 = 1;
pub const DEFAULT_MAX_REPLICAS: u64 = 5;
pub const DEFAULT_SCALING_FACTOR: u64 = 10;
/// Hard ceiling applied before any SetReplicas call leaves the gateway.
pub const CLUSTER_MAX_REPLICAS: u64 = 100;

pub const MIN_SCALE_LABEL: &str = "com.openfaas.scale.min";
pub const MAX_SCALE_LABEL: &str = "com.openfaas.scale.max";
pub const SCALE_FACTOR_LABEL: &str = "com.openfaas.scale.factor";

/// Replica target for a single alert. `factor` is a percentage of `max_replicas`.
pub fn calculate_replicas(
    status: &str,
    current: u64,
    max_replicas: u64,
    min_replicas: u64,
    factor: u64,
) -> u64 {
    // factor 为 0 表示关闭告警扩缩容
    if factor == 0 {
        return min_replicas;
    }

    if status != "firing" {
        return min_replicas;
    }

    if current >= max_replicas {
        return max_replicas;
    }

    // 步长向下取整，但至少为 1
    let step = max(max_replicas.saturating_mul(factor) / 100, 1);
    let base = max(current, min_replicas);
    min(base.saturating_add(step), max_replicas)
}

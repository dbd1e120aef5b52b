pub mod exporter;
pub mod notifiers;
pub mod prometheus;
pub mod prometheus_query;
pub mod registry;

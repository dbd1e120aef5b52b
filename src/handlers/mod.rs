pub mod alert_handler;
pub mod async_report;
pub mod forwarding_proxy;
pub mod info_handler;
pub mod list_functions;
pub mod queue_proxy;

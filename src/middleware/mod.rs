pub mod auth_injector;
pub mod basic_auth;
pub mod call_id;
pub mod catch_panic;
pub mod notifier;
pub mod probe;
pub mod resolver;
pub mod scale_zero;

pub mod function_cache;
pub mod function_meta;
pub mod function_query;
pub mod function_scaler;
pub mod ranges;
pub mod retry;
pub mod scaling_config;
pub mod scaling_error;
pub mod service_query;
pub mod single_flight;

#[cfg(test)]
mod test_service_query;

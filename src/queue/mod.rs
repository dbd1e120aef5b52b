pub mod nats;
pub mod types;

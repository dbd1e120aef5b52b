// nats.rs
// 通过 NATS JetStream 发布异步请求
use async_nats::jetstream;
use async_trait::async_trait;
use std::time::Duration;

use super::types::{AsyncRequest, QueueError, RequestQueuer};
use crate::config::NatsConfig;

const MAX_RECONNECTS: usize = 60;
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

pub struct NatsQueue {
    jetstream: jetstream::Context,
    stream: String,
}

impl NatsQueue {
    pub async fn connect(config: &NatsConfig, client_name: &str) -> Result<Self, QueueError> {
        let address = format!("nats://{}:{}", config.address, config.port);
        let client = async_nats::ConnectOptions::new()
            .name(client_name)
            .max_reconnects(MAX_RECONNECTS)
            .reconnect_delay_callback(|_attempts| RECONNECT_DELAY)
            .event_callback(|event| async move {
                log::warn!("NATS event: {}", event);
            })
            .connect(address.as_str())
            .await
            .map_err(|e| QueueError::Connect {
                address: address.clone(),
                reason: e.to_string(),
            })?;
        log::info!("Connected to NATS at {} (cluster {})", address, config.cluster_name);

        Ok(Self {
            jetstream: jetstream::new(client),
            stream: config.channel.clone(),
        })
    }
}

// 请求里指定了队列名就用它，否则用默认 stream
fn subject(default_stream: &str, req: &AsyncRequest) -> String {
    if req.queue_name.is_empty() {
        default_stream.to_string()
    } else {
        req.queue_name.clone()
    }
}

#[async_trait]
impl RequestQueuer for NatsQueue {
    async fn queue(&self, req: &AsyncRequest) -> Result<(), QueueError> {
        log::info!("NatsQueue - submitting request: {}.", req.function);
        let payload = serde_json::to_vec(req)?;
        let subject = subject(&self.stream, req);

        let publish_err = |e: &dyn std::fmt::Display| QueueError::Publish {
            subject: subject.clone(),
            reason: e.to_string(),
        };
        let ack = self
            .jetstream
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|e| publish_err(&e))?;
        ack.await.map_err(|e| publish_err(&e))?;
        Ok(())
    }
}

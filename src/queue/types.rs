// types.rs
// 异步调用的消息体，字段名与 queue worker 约定一致
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(thiserror::Error, Debug)]
pub enum QueueError {
    #[error("error connecting to NATS on {address}: {reason}")]
    Connect { address: String, reason: String },

    #[error("unable to serialize request: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("unable to publish to {subject}: {reason}")]
    Publish { subject: String, reason: String },
}

/// Request accepted for asynchronous processing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AsyncRequest {
    pub header: HashMap<String, Vec<String>>,
    pub host: String,
    #[serde(with = "base64_body")]
    pub body: Vec<u8>,
    pub method: String,
    pub path: String,
    pub query_string: String,
    /// Name as routed, possibly `<fn>.<ns>`.
    pub function: String,
    /// Stream to publish to; empty means the default stream.
    pub queue_name: String,
    #[serde(rename = "CallbackUrl", default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
}

#[async_trait]
pub trait RequestQueuer: Send + Sync {
    async fn queue(&self, req: &AsyncRequest) -> Result<(), QueueError>;
}

/// `content-type` becomes `Content-Type`.
pub fn canonical_header_key(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        if upper {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
        upper = c == '-';
    }
    out
}

/// Header map keyed by canonical name, repeated headers kept in order.
pub fn header_map<'a, I>(headers: I) -> HashMap<String, Vec<String>>
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let mut out: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in headers {
        out.entry(canonical_header_key(name))
            .or_default()
            .push(String::from_utf8_lossy(value).to_string());
    }
    out
}

// 与 Go 的 []byte 一样，body 以 base64 字符串传输
mod base64_body {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(body))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

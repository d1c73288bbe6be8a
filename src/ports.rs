use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// The HTTP surface the relay needs from the outside world. Components talk
/// to this port; production wires in the reqwest adapter from `infra`.
#[async_trait]
pub trait HttpPort: Send + Sync {
    async fn get(&self, url: &str, headers: &[(&str, String)]) -> Result<HttpResponse>;
    async fn post_json(
        &self,
        url: &str,
        body: &Value,
        headers: &[(&str, String)],
    ) -> Result<HttpResponse>;
}

#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub bytes: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json(&self) -> Result<Value> {
        Ok(serde_json::from_slice(&self.bytes)?)
    }
}

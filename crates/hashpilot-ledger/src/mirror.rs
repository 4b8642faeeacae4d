//! Read-only mirror node REST client

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::MirrorError;

/// Query parameters, in the order they are sent
pub type Query = Vec<(&'static str, String)>;

/// Mirror node REST API
#[async_trait]
pub trait MirrorNode: Send + Sync {
    /// GET `{base_url}{path}` with `query`, returning the JSON body
    async fn get(&self, base_url: &str, path: &str, query: &Query) -> Result<Value, MirrorError>;
}

/// Mirror node over HTTP
pub struct HttpMirrorNode {
    client: reqwest::Client,
}

impl HttpMirrorNode {
    pub fn new() -> Result<Self, MirrorError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("Hashpilot/0.1")
            .build()
            .map_err(|e| MirrorError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    fn request(&self, base_url: &str, path: &str, query: &Query) -> reqwest::RequestBuilder {
        self.client.get(endpoint(base_url, path)).query(query)
    }
}

pub fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

#[async_trait]
impl MirrorNode for HttpMirrorNode {
    async fn get(&self, base_url: &str, path: &str, query: &Query) -> Result<Value, MirrorError> {
        debug!(base_url, path, params = query.len(), "Querying mirror node");

        let response = self
            .request(base_url, path, query)
            .send()
            .await
            .map_err(|e| MirrorError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MirrorError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(MirrorError::Status {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|e| MirrorError::Malformed(e.to_string()))
    }
}

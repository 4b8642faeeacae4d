//! Direct OpenAI-compatible gateway

use async_trait::async_trait;
use tracing::debug;

use super::logging::{LogEntry, log_interaction};
use super::{ChatCompletion, ModelGateway, ModelParams, request_body};
use crate::conversation::ChatBody;
use crate::error::GatewayError;
use crate::tools::ToolDeclaration;

/// Calls `{base_url}/chat/completions` with a bearer key
pub struct OpenAiGateway {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
}

impl OpenAiGateway {
    pub fn new(api_key: impl Into<String>, base_url: &str) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send(
        &self,
        messages: &[ChatBody],
        tools: &[ToolDeclaration],
        params: &ModelParams,
    ) -> Result<ChatCompletion, GatewayError> {
        let body = request_body(messages, tools, params);
        debug!(
            endpoint = %self.endpoint,
            model = %params.model,
            messages = messages.len(),
            tools = tools.len(),
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(status.as_u16(), body));
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| GatewayError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl ModelGateway for OpenAiGateway {
    fn name(&self) -> &str {
        "openai"
    }

    async fn process(
        &self,
        messages: &[ChatBody],
        tools: &[ToolDeclaration],
        params: &ModelParams,
    ) -> Result<ChatCompletion, GatewayError> {
        let result = self.send(messages, tools, params).await;
        let error = result.as_ref().err().map(|e| e.to_string());
        log_interaction(LogEntry {
            model: &params.model,
            gateway: self.name(),
            messages,
            tools,
            completion: result.as_ref().ok(),
            error: error.as_deref(),
        });
        result
    }
}

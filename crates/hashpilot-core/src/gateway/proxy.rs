//! Gateway that reaches the model through a backend function
//!
//! The backend holds the provider key. It receives the same request body as
//! the direct gateway and answers with an execution envelope:
//!
//! ```text
//! {"status": "completed", "responseBody": "{\"success\": true, \"data\": <completion>}"}
//! ```
//!
//! Either layer may be absent; a bare completion is accepted as-is.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::logging::{LogEntry, log_interaction};
use super::{ChatCompletion, ModelGateway, ModelParams, request_body};
use crate::conversation::ChatBody;
use crate::error::GatewayError;
use crate::tools::ToolDeclaration;

/// POSTs chat requests to a backend function URL
pub struct ProxyGateway {
    client: reqwest::Client,
    url: String,
    headers: HashMap<String, String>,
}

impl ProxyGateway {
    pub fn new(url: impl Into<String>) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            url: url.into(),
            headers: HashMap::new(),
        })
    }

    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    async fn send(
        &self,
        messages: &[ChatBody],
        tools: &[ToolDeclaration],
        params: &ModelParams,
    ) -> Result<ChatCompletion, GatewayError> {
        let body = request_body(messages, tools, params);
        debug!(url = %self.url, model = %params.model, "Invoking model function");

        let mut request = self.client.post(&self.url).json(&body);
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::from_status(status.as_u16(), body));
        }

        let text = response.text().await?;
        let value: Value =
            serde_json::from_str(&text).map_err(|e| GatewayError::Malformed(e.to_string()))?;
        unwrap_envelope(value)
    }
}

/// Peel the execution and success envelopes off a function response
pub fn unwrap_envelope(mut value: Value) -> Result<ChatCompletion, GatewayError> {
    if let Some(response_body) = value.get("responseBody") {
        let completed = value
            .get("status")
            .and_then(Value::as_str)
            .is_none_or(|status| status == "completed");
        if !completed {
            return Err(GatewayError::Proxy("Couldn't invoke AI Model".to_string()));
        }
        value = match response_body {
            Value::String(raw) => serde_json::from_str(raw)
                .map_err(|e| GatewayError::Malformed(format!("responseBody: {}", e)))?,
            other => other.clone(),
        };
    }

    if let Some(success) = value.get("success").and_then(Value::as_bool) {
        if !success {
            let message = match value.get("error") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => "model function reported failure".to_string(),
            };
            return Err(GatewayError::Proxy(message));
        }
        value = value.get("data").cloned().unwrap_or(Value::Null);
    }

    serde_json::from_value(value).map_err(|e| GatewayError::Malformed(e.to_string()))
}

#[async_trait]
impl ModelGateway for ProxyGateway {
    fn name(&self) -> &str {
        "proxy"
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

//! Model gateways
//!
//! A gateway sends the conversation's provider bodies plus tool declarations
//! to a chat-completions model and returns its parsed reply. The orchestrator
//! only sees the [`ModelGateway`] trait, so hosts and tests can inject their
//! own implementation.

mod logging;
mod openai;
mod proxy;
mod retry;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::config::{GatewayConfig, GatewayKind};
use crate::conversation::ChatBody;
use crate::error::{Error, GatewayError, Result};
use crate::tools::ToolDeclaration;

pub use logging::{LogEntry, log_interaction};
pub use openai::OpenAiGateway;
pub use proxy::{ProxyGateway, unwrap_envelope};
pub use retry::{RetryPolicy, RetryingGateway, retry_delay};

/// Finish reason signalling that the model wants tools run
pub const FINISH_TOOL_CALLS: &str = "tool_calls";

/// Caller-supplied request parameters
///
/// `extra` is flattened into the request body, so any provider option
/// (`temperature`, `max_tokens`, `tool_choice`, ...) passes through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub model: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ModelParams {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            extra: Map::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Parameters implied by the gateway configuration
    pub fn from_config(config: &GatewayConfig) -> Self {
        let mut params = Self::new(config.model.clone());
        if let Some(temperature) = config.temperature {
            params = params.with("temperature", temperature);
        }
        if let Some(max_tokens) = config.max_tokens {
            params = params.with("max_tokens", max_tokens);
        }
        params
    }
}

/// Token accounting reported by the provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// One candidate reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub finish_reason: Option<String>,
    pub message: ChatBody,
}

impl Choice {
    /// Whether the model asked for tool calls rather than answering
    pub fn wants_tools(&self) -> bool {
        self.finish_reason.as_deref() == Some(FINISH_TOOL_CALLS)
    }
}

/// Parsed chat-completions response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ChatCompletion {
    /// Completion with a single choice, mostly for fakes and tests
    pub fn single(finish_reason: impl Into<String>, message: ChatBody) -> Self {
        Self {
            id: None,
            model: None,
            choices: vec![Choice {
                index: 0,
                finish_reason: Some(finish_reason.into()),
                message,
            }],
            usage: None,
        }
    }

    /// The first choice, which is the only one the orchestrator uses
    pub fn first_choice(&self) -> std::result::Result<&Choice, GatewayError> {
        self.choices
            .first()
            .ok_or_else(|| GatewayError::Malformed("response has no choices".to_string()))
    }
}

/// Anything that can answer a chat-completions request
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// Gateway name for logs
    fn name(&self) -> &str;

    async fn process(
        &self,
        messages: &[ChatBody],
        tools: &[ToolDeclaration],
        params: &ModelParams,
    ) -> std::result::Result<ChatCompletion, GatewayError>;
}

#[async_trait]
impl<G: ModelGateway + ?Sized> ModelGateway for Arc<G> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn process(
        &self,
        messages: &[ChatBody],
        tools: &[ToolDeclaration],
        params: &ModelParams,
    ) -> std::result::Result<ChatCompletion, GatewayError> {
        (**self).process(messages, tools, params).await
    }
}

/// Request body shared by the direct and proxied gateways:
/// `{model, messages, tools?, ...params}`
pub fn request_body(messages: &[ChatBody], tools: &[ToolDeclaration], params: &ModelParams) -> Value {
    let mut body = Map::new();
    body.insert("model".to_string(), Value::String(params.model.clone()));
    body.insert("messages".to_string(), json!(messages));
    if !tools.is_empty() {
        body.insert("tools".to_string(), json!(tools));
    }
    for (key, value) in &params.extra {
        body.insert(key.clone(), value.clone());
    }
    Value::Object(body)
}

/// Build the configured gateway, wrapped with timeout and retry handling
pub fn build_gateway(config: &GatewayConfig) -> Result<Arc<dyn ModelGateway>> {
    let policy = RetryPolicy {
        timeout: Some(Duration::from_secs(config.timeout_secs)),
        retries: config.retries,
        retry_delay_ms: config.retry_delay_ms,
    };

    let gateway: Arc<dyn ModelGateway> = match config.kind {
        GatewayKind::Direct => {
            let api_key = config
                .get_api_key()
                .ok_or_else(|| GatewayError::MissingApiKey(config.api_key_env.clone()))?;
            Arc::new(RetryingGateway::new(
                OpenAiGateway::new(api_key, config.base_url())?,
                policy,
            ))
        }
        GatewayKind::Proxy => {
            let url = config
                .proxy_url
                .clone()
                .ok_or_else(|| Error::Config("gateway.proxy_url is required for the proxy gateway".to_string()))?;
            let gateway = ProxyGateway::new(url)?.with_headers(config.proxy_headers.clone());
            Arc::new(RetryingGateway::new(gateway, policy))
        }
    };
    Ok(gateway)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_flattens_params() {
        let params = ModelParams::new("gpt-4o-mini").with("temperature", 0.2);
        let body = request_body(&[ChatBody::user("hi")], &[], &params);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["temperature"], 0.2);
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_parse_openai_response() {
        let raw = json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "finish_reason": "tool_calls",
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "get_account_info_tool", "arguments": "{}"}
                    }]
                }
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        });
        let completion: ChatCompletion = serde_json::from_value(raw).unwrap();
        let choice = completion.first_choice().unwrap();
        assert!(choice.wants_tools());
        assert_eq!(choice.message.tool_calls()[0].id, "call_1");
        assert_eq!(completion.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn test_no_choices_is_malformed() {
        let completion = ChatCompletion {
            id: None,
            model: None,
            choices: vec![],
            usage: None,
        };
        assert!(matches!(completion.first_choice(), Err(GatewayError::Malformed(_))));
    }

    #[test]
    fn test_model_params_from_config() {
        let config = GatewayConfig {
            temperature: Some(0.5),
            max_tokens: Some(256),
            ..Default::default()
        };
        let params = ModelParams::from_config(&config);
        assert_eq!(params.model, "gpt-4o-mini");
        assert_eq!(params.extra["temperature"], 0.5);
        assert_eq!(params.extra["max_tokens"], 256);
    }
}

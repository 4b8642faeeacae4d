//! Message model
//!
//! A `Message` is one transcript entry. Its `raw_chat_body` is the exact
//! payload exchanged with the model provider; `content` and `is_visible` are
//! UI concerns layered on top.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Text shown in the placeholder assistant message while a round is in flight
pub const PROCESSING_TEXT: &str = "Processing...";

/// Conversation role of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool => "tool",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque message identifier, sortable by creation order
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MessageId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for MessageId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Function name and JSON-encoded arguments of a tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Arguments as the provider sent them: a JSON document in a string
    #[serde(default)]
    pub arguments: String,
}

/// A tool call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: function_kind(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// The provider-facing body of a message
///
/// Unknown provider fields (`refusal`, `annotations`, ...) are preserved in
/// `extra` so an assistant turn is sent back exactly as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatBody {
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatBody {
    pub fn new(role: Role, content: Option<String>) -> Self {
        Self {
            role,
            content,
            tool_calls: None,
            tool_call_id: None,
            extra: Map::new(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, Some(content.into()))
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, Some(content.into()))
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, Some(content.into()))
    }

    /// Tool result fed back to the model, correlated by call id
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::new(Role::Tool, Some(content.into()))
        }
    }

    pub fn assistant_with_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: Some(tool_calls),
            ..Self::new(Role::Assistant, content)
        }
    }

    /// Requested tool calls, empty when none
    pub fn tool_calls(&self) -> &[ToolCall] {
        self.tool_calls.as_deref().unwrap_or_default()
    }
}

/// One turn in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    #[serde(rename = "type")]
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default = "visible_by_default")]
    pub is_visible: bool,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub raw_chat_body: Option<ChatBody>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn visible_by_default() -> bool {
    true
}

impl Message {
    /// Build a visible message whose content mirrors its chat body
    pub fn from_body(body: ChatBody) -> Self {
        Self {
            id: MessageId::new(),
            role: body.role,
            content: body.content.clone(),
            is_visible: true,
            metadata: Map::new(),
            raw_chat_body: Some(body),
            created_at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::from_body(ChatBody::user(content))
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::from_body(ChatBody::system(content))
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::from_body(ChatBody::assistant(content))
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::from_body(ChatBody::tool(tool_call_id, content))
    }

    /// Provisional assistant message reserving the slot of an in-flight round.
    ///
    /// It carries no chat body, so it is never sent to the model.
    pub fn placeholder() -> Self {
        Self {
            id: MessageId::new(),
            role: Role::Assistant,
            content: Some(PROCESSING_TEXT.to_string()),
            is_visible: true,
            metadata: Map::new(),
            raw_chat_body: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<MessageId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn hidden(mut self) -> Self {
        self.is_visible = false;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Apply a partial update in place
    pub fn apply(&mut self, patch: MessagePatch) {
        if let Some(role) = patch.role {
            self.role = role;
        }
        if let Some(content) = patch.content {
            self.content = content;
        }
        if let Some(visible) = patch.is_visible {
            self.is_visible = visible;
        }
        if let Some(body) = patch.raw_chat_body {
            self.raw_chat_body = body;
        }
        self.metadata.extend(patch.metadata);
    }
}

/// Partial fields merged into an existing message by `update_by_id`
///
/// Nested options distinguish "leave unchanged" (`None`) from "set to none"
/// (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessagePatch {
    pub role: Option<Role>,
    pub content: Option<Option<String>>,
    pub is_visible: Option<bool>,
    pub raw_chat_body: Option<Option<ChatBody>>,
    pub metadata: Map<String, Value>,
}

impl MessagePatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace role, content and body with those of a provider message
    pub fn from_body(body: ChatBody) -> Self {
        Self {
            role: Some(body.role),
            content: Some(body.content.clone()),
            raw_chat_body: Some(Some(body)),
            ..Self::default()
        }
    }

    pub fn role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn content(mut self, content: Option<String>) -> Self {
        self.content = Some(content);
        self
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.is_visible = Some(visible);
        self
    }

    pub fn raw_chat_body(mut self, body: Option<ChatBody>) -> Self {
        self.raw_chat_body = Some(body);
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_body_wire_shape() {
        let body = ChatBody::tool("call_1", "42 HBAR");
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(
            value,
            json!({"role": "tool", "content": "42 HBAR", "tool_call_id": "call_1"})
        );
    }

    #[test]
    fn test_assistant_body_preserves_provider_fields() {
        let raw = json!({
            "role": "assistant",
            "content": null,
            "refusal": null,
            "tool_calls": [{
                "id": "call_9",
                "type": "function",
                "function": {"name": "get_balance", "arguments": "{\"accountId\":\"0.0.100\"}"}
            }]
        });
        let body: ChatBody = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(body.tool_calls().len(), 1);
        assert_eq!(body.tool_calls()[0].function.name, "get_balance");
        assert!(body.extra.contains_key("refusal"));
        assert_eq!(serde_json::to_value(&body).unwrap(), raw);
    }

    #[test]
    fn test_message_host_json_uses_camel_case() {
        let msg = Message::user("Hello").with_id("m1");
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["type"], "user");
        assert_eq!(value["isVisible"], true);
        assert_eq!(value["rawChatBody"]["content"], "Hello");
    }

    #[test]
    fn test_placeholder_has_no_body() {
        let msg = Message::placeholder();
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.content.as_deref(), Some(PROCESSING_TEXT));
        assert!(msg.raw_chat_body.is_none());
    }

    #[test]
    fn test_patch_merges_only_given_fields() {
        let mut msg = Message::user("Hello");
        let original_body = msg.raw_chat_body.clone();
        msg.apply(MessagePatch::new().visible(false).metadata("k", 1));
        assert!(!msg.is_visible);
        assert_eq!(msg.content.as_deref(), Some("Hello"));
        assert_eq!(msg.raw_chat_body, original_body);
        assert_eq!(msg.metadata["k"], 1);

        msg.apply(MessagePatch::new().content(None));
        assert!(msg.content.is_none());
    }

    #[test]
    fn test_ids_sort_by_creation() {
        let first = MessageId::new();
        let second = MessageId::new();
        assert!(first < second);
    }
}

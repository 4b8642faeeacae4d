//! Tool system
//!
//! Tools are the side-effecting actions the model may request. Each tool has:
//! - A name and description for the model
//! - A JSON schema compiled from its typed parameters
//! - An invoke method receiving validated params and the conversation context
//!
//! Most tools are built with [`ToolBuilder`], which adds validation, hooks and
//! error-to-content conversion around a plain async function.

mod builder;
mod catalog;
mod schema;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::ToolError;

pub use builder::{StructuredTool, ToolBuilder};
pub use catalog::ToolCatalog;
pub use schema::{ParamsValidator, declaration_for};

/// Boxed future type for object-safe async trait methods
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Function signature advertised to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Tool declaration in the provider's function-calling format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionDeclaration,
}

impl ToolDeclaration {
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self {
            kind: "function".to_string(),
            function: FunctionDeclaration {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }
}

/// A hook failure that did not change the tool's result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolWarning {
    pub tool: String,
    pub message: String,
}

/// Output of a tool invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Text fed back to the model
    pub content: String,
    /// Structured data for the host, never sent to the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Value>,
    #[serde(skip)]
    pub warnings: Vec<ToolWarning>,
}

impl ToolResult {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_artifact(mut self, artifact: Value) -> Self {
        self.artifact = Some(artifact);
        self
    }

    /// Error reported as ordinary output: `Error in tool "<name>": <message>`
    pub fn from_error(err: &ToolError) -> Self {
        Self {
            content: err.to_string(),
            artifact: Some(json!({ "error": err.message() })),
            warnings: Vec::new(),
        }
    }
}

impl From<String> for ToolResult {
    fn from(content: String) -> Self {
        Self::text(content)
    }
}

impl From<&str> for ToolResult {
    fn from(content: &str) -> Self {
        Self::text(content)
    }
}

/// Core trait for all tools
///
/// `C` is the conversation context shared by every tool in a catalog.
pub trait Tool<C>: Send + Sync {
    /// Tool name (used by the model to invoke)
    fn name(&self) -> &str;

    /// Description of what the tool does
    fn description(&self) -> &str;

    /// Compiled declaration sent to the model
    fn declaration(&self) -> &ToolDeclaration;

    /// Validate `params` and run the tool against a context snapshot
    fn invoke(&self, params: Value, ctx: Arc<C>) -> BoxFuture<'_, Result<ToolResult, ToolError>>;
}

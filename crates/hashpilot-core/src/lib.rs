//! Hashpilot Core - tool-calling orchestration for a ledger chat assistant
//!
//! This crate provides the core functionality for Hashpilot:
//! - Conversation transcript with observable, atomic mutations
//! - Typed tool construction, validation and an ordered tool catalog
//! - Model gateways (direct, proxied, retrying) behind one trait
//! - The orchestrator that loops model rounds and tool dispatch
//! - Configuration and error types

pub mod config;
pub mod conversation;
pub mod error;
pub mod gateway;
pub mod orchestrator;
pub mod tools;

pub use config::{Config, ConfigManager, GatewayConfig, GatewayKind, OrchestratorConfig};
pub use conversation::{
    ChatBody, ConversationStore, FunctionCall, Message, MessageId, MessagePatch, Role, ToolCall,
};
pub use error::{Error, GatewayError, Result, ToolError};
pub use gateway::{
    ChatCompletion, Choice, ModelGateway, ModelParams, OpenAiGateway, ProxyGateway, RetryPolicy,
    RetryingGateway, build_gateway,
};
pub use orchestrator::{Orchestrator, OrchestratorEvent, OrchestratorState, OrchestratorStatus};
pub use tools::{
    StructuredTool, Tool, ToolBuilder, ToolCatalog, ToolDeclaration, ToolResult, ToolWarning,
};

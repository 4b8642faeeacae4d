//! Tool-call dispatch for one round

use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::events::OrchestratorEvent;
use crate::conversation::{Message, ToolCall};
use crate::error::ToolError;
use crate::tools::{ToolCatalog, ToolResult};

/// Result text for a call naming a tool the catalog does not have
pub const TOOL_NOT_FOUND: &str = "Tool Not found";

/// Run every call of a round concurrently and return their result messages in
/// call order.
///
/// Each call is isolated: unknown tools, malformed arguments and validation
/// failures all become result content. Only an error raised by a tool that
/// propagates its failures aborts the batch.
pub(crate) async fn dispatch_calls<C>(
    catalog: &ToolCatalog<C>,
    ctx: Arc<C>,
    calls: &[ToolCall],
    events: &broadcast::Sender<OrchestratorEvent>,
) -> Result<Vec<Message>, ToolError>
where
    C: Send + Sync + 'static,
{
    let pending = calls
        .iter()
        .map(|call| dispatch_one(catalog, Arc::clone(&ctx), call, events));
    join_all(pending).await.into_iter().collect()
}

async fn dispatch_one<C>(
    catalog: &ToolCatalog<C>,
    ctx: Arc<C>,
    call: &ToolCall,
    events: &broadcast::Sender<OrchestratorEvent>,
) -> Result<Message, ToolError>
where
    C: Send + Sync + 'static,
{
    let name = call.function.name.as_str();
    let parsed = parse_arguments(&call.function.arguments);
    // Arguments are echoed as the model sent them
    let args = match &parsed {
        Ok(value) if call.function.arguments.trim().is_empty() => value.to_string(),
        _ => call.function.arguments.clone(),
    };

    let _ = events.send(OrchestratorEvent::ToolStarted {
        call_id: call.id.clone(),
        tool: name.to_string(),
    });

    let Some(tool) = catalog.get(name) else {
        debug!(tool = %name, call_id = %call.id, "Model requested unknown tool");
        let _ = events.send(OrchestratorEvent::ToolFinished {
            call_id: call.id.clone(),
            tool: name.to_string(),
            found: false,
            is_error: false,
        });
        return Ok(result_message(call, &args, &ToolResult::text(TOOL_NOT_FOUND)));
    };

    let result = match parsed {
        Err(message) => ToolResult::from_error(&ToolError::InvalidParams {
            tool: name.to_string(),
            message,
        }),
        Ok(params) => match tool.invoke(params, ctx).await {
            Ok(result) => result,
            Err(err @ ToolError::InvalidParams { .. }) => ToolResult::from_error(&err),
            Err(err) => {
                warn!(tool = %name, call_id = %call.id, error = %err, "Tool raised, aborting round");
                let _ = events.send(OrchestratorEvent::ToolFinished {
                    call_id: call.id.clone(),
                    tool: name.to_string(),
                    found: true,
                    is_error: true,
                });
                return Err(err);
            }
        },
    };

    for warning in &result.warnings {
        let _ = events.send(OrchestratorEvent::HookFailed {
            tool: warning.tool.clone(),
            message: warning.message.clone(),
        });
    }

    let is_error = result
        .artifact
        .as_ref()
        .is_some_and(|artifact| artifact.get("error").is_some());
    let _ = events.send(OrchestratorEvent::ToolFinished {
        call_id: call.id.clone(),
        tool: name.to_string(),
        found: true,
        is_error,
    });

    Ok(result_message(call, &args, &result))
}

/// Arguments arrive as a JSON document inside a string; blank means none
fn parse_arguments(raw: &str) -> Result<Value, String> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw).map_err(|e| format!("arguments are not valid JSON: {}", e))
}

fn result_message(call: &ToolCall, args: &str, result: &ToolResult) -> Message {
    let content = format!(
        "Called {} with {} result -> {}",
        call.function.name, args, result.content
    );
    let mut message = Message::tool_result(call.id.clone(), content)
        .with_metadata("tool", call.function.name.clone());
    if let Some(artifact) = &result.artifact {
        message = message.with_metadata("artifact", artifact.clone());
    }
    message
}

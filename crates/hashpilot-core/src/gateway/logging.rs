//! Model request/response logging
//!
//! Set the `LLM_LOG_FILE` environment variable to append one JSON line per
//! gateway call (request summary, parsed response or error).
//!
//! Example: `LLM_LOG_FILE=/tmp/llm.log hashpilot`

use std::io::Write;

use serde_json::json;
use tracing::{debug, warn};

use super::ChatCompletion;
use crate::conversation::ChatBody;
use crate::tools::ToolDeclaration;

/// Everything recorded for one gateway call
#[derive(Default)]
pub struct LogEntry<'a> {
    /// The model used for this request
    pub model: &'a str,
    /// Gateway name (e.g., "openai", "proxy")
    pub gateway: &'a str,
    /// Messages in the request
    pub messages: &'a [ChatBody],
    /// Tools offered with the request
    pub tools: &'a [ToolDeclaration],
    /// Parsed completion
    pub completion: Option<&'a ChatCompletion>,
    /// Error message if the request failed
    pub error: Option<&'a str>,
}

/// Append `entry` to the log file if `LLM_LOG_FILE` is set
pub fn log_interaction(entry: LogEntry<'_>) {
    let log_file = match std::env::var("LLM_LOG_FILE") {
        Ok(path) => path,
        Err(_) => return,
    };
    write_entry(&log_file, &entry);
}

fn write_entry(log_file: &str, entry: &LogEntry<'_>) {
    let choice = entry.completion.and_then(|c| c.choices.first());
    let record = json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "model": entry.model,
        "gateway": entry.gateway,
        "request": {
            "messages": entry.messages,
            "message_count": entry.messages.len(),
            "tools": entry.tools.iter().map(|t| t.name()).collect::<Vec<_>>(),
            "tool_count": entry.tools.len(),
        },
        "response": choice.map(|c| json!({
            "finish_reason": c.finish_reason,
            "content": c.message.content,
            "tool_calls": c.message.tool_calls(),
        })),
        "usage": entry.completion.and_then(|c| c.usage.as_ref()),
        "error": entry.error,
    });

    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
    {
        Ok(mut file) => {
            let line = serde_json::to_string(&record).unwrap_or_default();
            if let Err(e) = writeln!(file, "{}", line) {
                warn!("Failed to write to LLM log file: {}", e);
            }
        }
        Err(e) => {
            warn!("Failed to open LLM log file {}: {}", log_file, e);
        }
    }

    debug!("Logged model interaction to {}", log_file);
}

//! Observable surface of the orchestrator: status and events

use serde::Serialize;

/// Phase of the round driver, derived from the transcript tail and the
/// in-flight flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    Idle,
    AwaitingModel,
    DispatchingTools,
}

/// What a host UI shows: a busy flag and the last round's error
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrchestratorStatus {
    pub in_progress: bool,
    pub error: Option<String>,
}

/// Progress notifications, one stream per orchestrator
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    RoundStarted {
        round: usize,
    },
    ModelResponded {
        finish_reason: Option<String>,
        tool_calls: usize,
    },
    ToolStarted {
        call_id: String,
        tool: String,
    },
    ToolFinished {
        call_id: String,
        tool: String,
        found: bool,
        is_error: bool,
    },
    /// An after-callback failed; the tool's result was kept
    HookFailed {
        tool: String,
        message: String,
    },
    RoundFailed {
        error: String,
    },
    Idle,
}

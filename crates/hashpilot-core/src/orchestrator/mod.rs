//! Tool-calling orchestrator
//!
//! Drives the conversation as a state machine keyed on the transcript tail:
//! a `user` or `tool` tail warrants a model round, anything else is idle.
//!
//! One round appends a placeholder assistant message, sends the transcript's
//! provider bodies to the gateway, then either overwrites the placeholder with
//! the final answer or turns it into the hidden tool-call request and appends
//! every tool result as one batch. The new `tool` tail triggers the next round.

mod dispatch;
mod events;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::conversation::{ConversationStore, Message, MessageId, MessagePatch, Role};
use crate::error::{Error, Result};
use crate::gateway::{ModelGateway, ModelParams};
use crate::tools::ToolCatalog;

pub use dispatch::TOOL_NOT_FOUND;
pub use events::{OrchestratorEvent, OrchestratorState, OrchestratorStatus};

/// Model calls allowed per user turn unless configured otherwise
pub const DEFAULT_MAX_ROUNDS: usize = 10;

const EVENT_CAPACITY: usize = 256;

/// Runs model rounds over a shared [`ConversationStore`]
pub struct Orchestrator<C> {
    store: ConversationStore,
    gateway: Arc<dyn ModelGateway>,
    catalog: RwLock<Arc<ToolCatalog<C>>>,
    context: RwLock<Arc<C>>,
    params: RwLock<ModelParams>,
    max_rounds: usize,
    in_flight: AtomicBool,
    phase: Mutex<OrchestratorState>,
    /// Tail that hit the round limit and must not re-trigger
    parked: Mutex<Option<MessageId>>,
    status: watch::Sender<OrchestratorStatus>,
    events: broadcast::Sender<OrchestratorEvent>,
}

/// Clears the in-flight flag when a round ends, however it ends
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<C> Orchestrator<C>
where
    C: Send + Sync + 'static,
{
    pub fn new(
        store: ConversationStore,
        gateway: Arc<dyn ModelGateway>,
        catalog: ToolCatalog<C>,
        context: C,
        params: ModelParams,
    ) -> Self {
        let (status, _) = watch::channel(OrchestratorStatus::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            store,
            gateway,
            catalog: RwLock::new(Arc::new(catalog)),
            context: RwLock::new(Arc::new(context)),
            params: RwLock::new(params),
            max_rounds: DEFAULT_MAX_ROUNDS,
            in_flight: AtomicBool::new(false),
            phase: Mutex::new(OrchestratorState::Idle),
            parked: Mutex::new(None),
            status,
            events,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub fn catalog(&self) -> Arc<ToolCatalog<C>> {
        Arc::clone(&self.catalog.read())
    }

    /// Swap the tool catalog; takes effect at the next round
    pub fn set_catalog(&self, catalog: ToolCatalog<C>) {
        *self.catalog.write() = Arc::new(catalog);
    }

    pub fn context(&self) -> Arc<C> {
        Arc::clone(&self.context.read())
    }

    /// Replace the conversation context; takes effect at the next round
    pub fn set_context(&self, context: C) {
        *self.context.write() = Arc::new(context);
    }

    pub fn set_params(&self, params: ModelParams) {
        *self.params.write() = params;
    }

    pub fn status(&self) -> OrchestratorStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<OrchestratorStatus> {
        self.status.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.events.subscribe()
    }

    /// Clear a surfaced error, as a host does when the user dismisses it
    pub fn dismiss_error(&self) {
        self.status.send_if_modified(|status| status.error.take().is_some());
    }

    /// Current phase
    pub fn state(&self) -> OrchestratorState {
        *self.phase.lock()
    }

    /// Whether the transcript tail warrants a model round
    pub fn needs_round(&self, messages: &[Message]) -> bool {
        let Some(tail) = messages.last() else {
            return false;
        };
        if !matches!(tail.role, Role::User | Role::Tool) {
            return false;
        }
        self.parked.lock().as_ref() != Some(&tail.id)
    }

    /// Run at most one round. Returns `Ok(false)` when the tail is idle.
    pub async fn step(&self) -> Result<bool> {
        if !self.needs_round(&self.store.snapshot()) {
            return Ok(false);
        }
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::Busy);
        }
        let _guard = InFlight(&self.in_flight);

        let result = self.round().await;
        *self.phase.lock() = OrchestratorState::Idle;
        let _ = self.events.send(OrchestratorEvent::Idle);
        result.map(|()| true)
    }

    /// Drive rounds until the transcript tail is idle.
    ///
    /// Stops at the first failing round and returns its error.
    pub async fn run_until_idle(&self) -> Result<()> {
        while self.step().await? {}
        Ok(())
    }

    /// Spawn the event-driven driver: a round runs whenever a store change
    /// leaves a tail that warrants one.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run().await })
    }

    /// Event-driven driver loop; runs until the task is dropped
    pub async fn run(&self) {
        let mut rx = self.store.subscribe();
        loop {
            let warranted = {
                let messages = rx.borrow_and_update();
                self.needs_round(&messages)
            };
            if warranted {
                match self.step().await {
                    Ok(_) => continue,
                    Err(Error::Busy) => {}
                    Err(err) => {
                        warn!(error = %err, "Round failed");
                        continue;
                    }
                }
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    async fn round(&self) -> Result<()> {
        let messages = self.store.snapshot();
        let used = rounds_this_turn(&messages);
        if used >= self.max_rounds {
            *self.parked.lock() = messages.last().map(|m| m.id.clone());
            let err = Error::MaxRounds(self.max_rounds);
            warn!(max_rounds = self.max_rounds, "Round limit reached, parking conversation");
            self.surface(&err);
            return Err(err);
        }

        let round = used + 1;
        let catalog = self.catalog();
        let ctx = self.context();
        let params = self.params.read().clone();

        self.status.send_replace(OrchestratorStatus {
            in_progress: true,
            error: None,
        });
        *self.phase.lock() = OrchestratorState::AwaitingModel;
        let _ = self.events.send(OrchestratorEvent::RoundStarted { round });
        info!(round, model = %params.model, tools = catalog.len(), "Starting model round");

        let placeholder = Message::placeholder();
        let placeholder_id = placeholder.id.clone();
        self.store.append(placeholder);

        match self.complete(&placeholder_id, &catalog, ctx, &params).await {
            Ok(()) => {
                self.status.send_replace(OrchestratorStatus::default());
                Ok(())
            }
            Err(err) => {
                warn!(round, error = %err, "Model round failed");
                self.store.update_by_id(
                    &placeholder_id,
                    MessagePatch::new()
                        .role(Role::Assistant)
                        .content(Some(format!("Error: {}", err)))
                        .raw_chat_body(None)
                        .visible(true)
                        .metadata("error", true),
                );
                self.surface(&err);
                Err(err)
            }
        }
    }

    async fn complete(
        &self,
        placeholder_id: &MessageId,
        catalog: &ToolCatalog<C>,
        ctx: Arc<C>,
        params: &ModelParams,
    ) -> Result<()> {
        let bodies = self.store.chat_bodies();
        let completion = self
            .gateway
            .process(&bodies, catalog.declarations(), params)
            .await?;
        let choice = completion.first_choice()?.clone();

        let tool_calls = choice.message.tool_calls().to_vec();
        let _ = self.events.send(OrchestratorEvent::ModelResponded {
            finish_reason: choice.finish_reason.clone(),
            tool_calls: tool_calls.len(),
        });

        // A tool_calls finish without any calls is a final answer
        if !choice.wants_tools() || tool_calls.is_empty() {
            debug!(finish_reason = ?choice.finish_reason, "Model answered");
            let mut message = choice.message;
            if tool_calls.is_empty() {
                message.tool_calls = None;
            }
            self.store.update_by_id(
                placeholder_id,
                MessagePatch::from_body(message).visible(true),
            );
            return Ok(());
        }

        self.store.update_by_id(
            placeholder_id,
            MessagePatch::from_body(choice.message).visible(false),
        );
        *self.phase.lock() = OrchestratorState::DispatchingTools;
        debug!(calls = tool_calls.len(), "Dispatching tool calls");

        let results = dispatch::dispatch_calls(catalog, ctx, &tool_calls, &self.events).await?;
        self.store.append_many(results);
        Ok(())
    }

    fn surface(&self, err: &Error) {
        self.status.send_replace(OrchestratorStatus {
            in_progress: false,
            error: Some(err.to_string()),
        });
        let _ = self.events.send(OrchestratorEvent::RoundFailed {
            error: err.to_string(),
        });
    }
}

/// Model rounds already spent since the latest user message. Every round
/// leaves exactly one assistant message behind.
fn rounds_this_turn(messages: &[Message]) -> usize {
    messages
        .iter()
        .rev()
        .take_while(|m| m.role != Role::User)
        .filter(|m| m.role == Role::Assistant)
        .count()
}

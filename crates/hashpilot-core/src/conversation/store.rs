//! Observable conversation store
//!
//! The store is the only shared mutable state of a conversation. Every
//! mutation goes through a `watch` channel so subscribers always see the full
//! ordered transcript, and each mutation publishes exactly one snapshot.

use std::sync::Arc;

use tokio::sync::watch;

use super::message::{ChatBody, Message, MessageId, MessagePatch, Role};

/// Ordered, observable message sequence
///
/// Cloning is cheap; clones share the same transcript.
#[derive(Clone)]
pub struct ConversationStore {
    tx: Arc<watch::Sender<Vec<Message>>>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConversationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationStore")
            .field("len", &self.len())
            .finish()
    }
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::with_messages(Vec::new())
    }

    /// Seed the store with an initial transcript
    pub fn with_messages(messages: Vec<Message>) -> Self {
        let (tx, _rx) = watch::channel(messages);
        Self { tx: Arc::new(tx) }
    }

    /// Receive the full transcript after every mutation
    pub fn subscribe(&self) -> watch::Receiver<Vec<Message>> {
        self.tx.subscribe()
    }

    /// Copy of the current transcript
    pub fn snapshot(&self) -> Vec<Message> {
        self.tx.borrow().clone()
    }

    /// Provider bodies of the transcript, skipping messages without one.
    ///
    /// Tool results always directly follow the assistant turn that requested
    /// them, even when other messages were appended while the calls ran.
    pub fn chat_bodies(&self) -> Vec<ChatBody> {
        let bodies = self
            .tx
            .borrow()
            .iter()
            .filter_map(|m| m.raw_chat_body.clone())
            .collect();
        pair_tool_results(bodies)
    }

    pub fn last(&self) -> Option<Message> {
        self.tx.borrow().last().cloned()
    }

    pub fn get(&self, id: &MessageId) -> Option<Message> {
        self.tx.borrow().iter().find(|m| &m.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.tx.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.borrow().is_empty()
    }

    pub fn append(&self, message: Message) {
        self.tx.send_modify(|messages| messages.push(message));
    }

    /// Append several messages as one observable change
    pub fn append_many(&self, batch: Vec<Message>) {
        if batch.is_empty() {
            return;
        }
        self.tx.send_modify(|messages| messages.extend(batch));
    }

    /// Merge `patch` into the message with `id`, keeping its position.
    ///
    /// Returns `false` when no message has that id.
    pub fn update_by_id(&self, id: &MessageId, patch: MessagePatch) -> bool {
        self.tx.send_if_modified(|messages| {
            match messages.iter_mut().find(|m| &m.id == id) {
                Some(message) => {
                    message.apply(patch);
                    true
                }
                None => false,
            }
        })
    }

    /// Remove the message with `id`. Returns `false` when absent.
    pub fn remove_by_id(&self, id: &MessageId) -> bool {
        self.tx.send_if_modified(|messages| {
            match messages.iter().position(|m| &m.id == id) {
                Some(index) => {
                    messages.remove(index);
                    true
                }
                None => false,
            }
        })
    }

    pub fn clear(&self) {
        self.tx.send_modify(Vec::clear);
    }

    /// The head message when it is the system instruction
    pub fn system_message(&self) -> Option<Message> {
        self.tx
            .borrow()
            .first()
            .filter(|m| m.role == Role::System)
            .cloned()
    }

    /// Replace the head system message in place.
    ///
    /// No-op (returns `false`) when the head is not a system message or the
    /// replacement is not one either.
    pub fn update_system_message(&self, message: Message) -> bool {
        if message.role != Role::System {
            return false;
        }
        self.tx.send_if_modified(|messages| match messages.first_mut() {
            Some(head) if head.role == Role::System => {
                *head = message;
                true
            }
            _ => false,
        })
    }
}

fn pair_tool_results(bodies: Vec<ChatBody>) -> Vec<ChatBody> {
    let mut slots: Vec<Option<ChatBody>> = bodies.into_iter().map(Some).collect();
    let mut ordered = Vec::with_capacity(slots.len());
    for i in 0..slots.len() {
        let Some(body) = slots[i].take() else {
            continue;
        };
        let call_ids: Vec<String> = body.tool_calls().iter().map(|c| c.id.clone()).collect();
        ordered.push(body);
        for id in &call_ids {
            let result = slots[i + 1..].iter_mut().find(|slot| {
                slot.as_ref().is_some_and(|b| {
                    b.role == Role::Tool && b.tool_call_id.as_deref() == Some(id.as_str())
                })
            });
            if let Some(slot) = result {
                ordered.extend(slot.take());
            }
        }
    }
    ordered
}

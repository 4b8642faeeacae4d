//! Conversation transcript: message model and the observable store

mod message;
mod store;

pub use message::{
    ChatBody, FunctionCall, Message, MessageId, MessagePatch, PROCESSING_TEXT, Role, ToolCall,
};
pub use store::ConversationStore;

//! Persisted conversation logs, unread counters and change notifications.

pub mod bus;
pub mod message;
pub mod store;
pub mod timefmt;

pub use bus::{ConversationBus, ConversationEvent};
pub use message::{Message, MessageDraft, MessageKind, Sender};
pub use store::ConversationStore;

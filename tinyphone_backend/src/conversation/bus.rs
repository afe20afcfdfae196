use std::sync::Mutex;

use flume::{Receiver, Sender};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationEvent {
    /// The persisted log for a contact changed.
    Updated { contact_id: String },
    UnreadChanged { contact_id: String, count: u32 },
    ReplyFailed { contact_id: String, error: String },
    PlaybackFinished { contact_id: String },
}

impl ConversationEvent {
    pub fn contact_id(&self) -> &str {
        match self {
            ConversationEvent::Updated { contact_id }
            | ConversationEvent::UnreadChanged { contact_id, .. }
            | ConversationEvent::ReplyFailed { contact_id, .. }
            | ConversationEvent::PlaybackFinished { contact_id } => contact_id,
        }
    }
}

struct Subscriber {
    contact_id: Option<String>,
    tx: Sender<ConversationEvent>,
}

/// Fan-out of conversation events to any number of flume receivers.
///
/// Dropped receivers are pruned on the next publish.
#[derive(Default)]
pub struct ConversationBus {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl ConversationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receives every event, or only those for `contact_id` when given.
    pub fn subscribe(&self, contact_id: Option<&str>) -> Receiver<ConversationEvent> {
        let (tx, rx) = flume::unbounded();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(Subscriber {
                contact_id: contact_id.map(str::to_string),
                tx,
            });
        }
        rx
    }

    pub fn publish(&self, event: ConversationEvent) {
        let Ok(mut subscribers) = self.subscribers.lock() else {
            tracing::warn!("Conversation bus lock poisoned; dropping {:?}", event);
            return;
        };
        subscribers.retain(|subscriber| {
            if subscriber.tx.is_disconnected() {
                return false;
            }
            let wanted = subscriber
                .contact_id
                .as_deref()
                .map_or(true, |id| id == event.contact_id());
            !wanted || subscriber.tx.send(event.clone()).is_ok()
        });
    }
}

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;

use super::bus::{ConversationBus, ConversationEvent};
use super::message::{Message, MessageDraft};
use super::timefmt::clock_label;
use crate::database::AppDatabase;

pub const CHAT_LOG_PREFIX: &str = "chat_log:";
pub const UNREAD_PREFIX: &str = "unread:";

/// Spacing between synthetic timestamps given to legacy messages.
const BACKFILL_STEP_MS: i64 = 60_000;

fn log_key(contact_id: &str) -> String {
    format!("{}{}", CHAT_LOG_PREFIX, contact_id)
}

fn unread_key(contact_id: &str) -> String {
    format!("{}{}", UNREAD_PREFIX, contact_id)
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn parse_log(contact_id: &str, raw: Option<&str>) -> Vec<Message> {
    let Some(raw) = raw else {
        return Vec::new();
    };
    match serde_json::from_str(raw) {
        Ok(log) => log,
        Err(e) => {
            tracing::warn!("Unreadable conversation log for '{}': {}", contact_id, e);
            Vec::new()
        }
    }
}

/// Gives untimed messages ascending timestamps one minute apart, ending
/// `log.len()` minutes before `now`. Returns whether anything changed.
fn backfill_timestamps(log: &mut [Message], now: i64) -> bool {
    let base = now - log.len() as i64 * BACKFILL_STEP_MS;
    let mut changed = false;
    for (index, message) in log.iter_mut().enumerate() {
        if message.timestamp.is_some() {
            continue;
        }
        let ts = base + index as i64 * BACKFILL_STEP_MS;
        message.timestamp = Some(ts);
        if message.display_time_label.trim().is_empty() {
            message.display_time_label = clock_label(ts);
        }
        changed = true;
    }
    changed
}

/// Persisted per-contact conversation logs and unread counters.
///
/// Every write to a log goes through [`AppDatabase::update_state`], so
/// concurrent appends for one contact are serialized instead of racing a
/// read-full/write-full cycle. Storage failures are logged and the caller
/// gets the in-memory result.
pub struct ConversationStore {
    db: Arc<AppDatabase>,
    bus: Arc<ConversationBus>,
    epochs: Mutex<HashMap<String, u64>>,
}

impl ConversationStore {
    pub fn new(db: Arc<AppDatabase>, bus: Arc<ConversationBus>) -> Self {
        Self {
            db,
            bus,
            epochs: Mutex::new(HashMap::new()),
        }
    }

    pub fn bus(&self) -> &Arc<ConversationBus> {
        &self.bus
    }

    pub fn load_log(&self, contact_id: &str) -> Vec<Message> {
        let key = log_key(contact_id);
        let raw = match self.db.get_state(&key) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("Failed to read conversation '{}': {:#}", contact_id, e);
                return Vec::new();
            }
        };

        let log = parse_log(contact_id, raw.as_deref());
        if log.iter().all(|m| m.timestamp.is_some()) {
            return log;
        }
        self.backfill(contact_id, log)
    }

    /// Persists backfilled timestamps so later loads see the same values.
    fn backfill(&self, contact_id: &str, mut fallback: Vec<Message>) -> Vec<Message> {
        let now = now_ms();
        let result = self.db.update_state(&log_key(contact_id), |raw| {
            let mut log = parse_log(contact_id, raw);
            if !backfill_timestamps(&mut log, now) {
                return Ok((raw.map(str::to_string), log));
            }
            Ok((Some(serde_json::to_string(&log)?), log))
        });

        match result {
            Ok(log) => {
                tracing::debug!("Backfilled legacy timestamps for '{}'", contact_id);
                log
            }
            Err(e) => {
                tracing::warn!("Failed to backfill conversation '{}': {:#}", contact_id, e);
                backfill_timestamps(&mut fallback, now);
                fallback
            }
        }
    }

    fn append_locked(&self, contact_id: &str, draft: MessageDraft) -> Message {
        let now = now_ms();
        let result: Result<Message> = self.db.update_state(&log_key(contact_id), |raw| {
            let mut log = parse_log(contact_id, raw);
            let next_id = log.iter().map(|m| m.id).max().unwrap_or(0) + 1;
            let message = draft.clone().into_message(next_id, now);
            log.push(message.clone());
            Ok((Some(serde_json::to_string(&log)?), message))
        });

        let message = match result {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(
                    "Failed to append to conversation '{}': {:#}",
                    contact_id,
                    e
                );
                let next_id = self.load_log(contact_id).last().map_or(1, |m| m.id + 1);
                draft.into_message(next_id, now)
            }
        };

        self.bus.publish(ConversationEvent::Updated {
            contact_id: contact_id.to_string(),
        });
        message
    }

    /// Appends one message with the next id and the current time.
    pub fn append(&self, contact_id: &str, draft: MessageDraft) -> Message {
        self.append_locked(contact_id, draft)
    }

    /// Appends only if `contact_id` has not been cleared since `epoch` was
    /// read. The epoch check and the write happen under one lock that
    /// [`clear`](Self::clear) also takes.
    pub fn append_in_epoch(
        &self,
        contact_id: &str,
        epoch: u64,
        draft: MessageDraft,
    ) -> Option<Message> {
        let epochs = match self.epochs.lock() {
            Ok(epochs) => epochs,
            Err(poisoned) => poisoned.into_inner(),
        };
        let current = epochs.get(contact_id).copied().unwrap_or(0);
        if current != epoch {
            return None;
        }
        let message = self.append_locked(contact_id, draft);
        drop(epochs);
        Some(message)
    }

    /// Writes `messages` as the whole log if the log is still empty.
    /// Returns whether they were written.
    pub fn seed(&self, contact_id: &str, messages: &[Message]) -> bool {
        let result = self.db.update_state(&log_key(contact_id), |raw| {
            if !parse_log(contact_id, raw).is_empty() {
                return Ok((raw.map(str::to_string), false));
            }
            Ok((Some(serde_json::to_string(messages)?), true))
        });

        match result {
            Ok(seeded) => {
                if seeded {
                    self.bus.publish(ConversationEvent::Updated {
                        contact_id: contact_id.to_string(),
                    });
                }
                seeded
            }
            Err(e) => {
                tracing::warn!("Failed to seed conversation '{}': {:#}", contact_id, e);
                false
            }
        }
    }

    /// Deletes the persisted log and starts a new epoch for the contact.
    pub fn clear(&self, contact_id: &str) {
        {
            let mut epochs = match self.epochs.lock() {
                Ok(epochs) => epochs,
                Err(poisoned) => poisoned.into_inner(),
            };
            *epochs.entry(contact_id.to_string()).or_insert(0) += 1;
            if let Err(e) = self.db.delete_state(&log_key(contact_id)) {
                tracing::warn!("Failed to clear conversation '{}': {:#}", contact_id, e);
            }
        }
        tracing::info!("Cleared conversation '{}'", contact_id);
        self.bus.publish(ConversationEvent::Updated {
            contact_id: contact_id.to_string(),
        });
    }

    pub fn epoch(&self, contact_id: &str) -> u64 {
        match self.epochs.lock() {
            Ok(epochs) => epochs.get(contact_id).copied().unwrap_or(0),
            Err(poisoned) => poisoned.into_inner().get(contact_id).copied().unwrap_or(0),
        }
    }

    pub fn unread(&self, contact_id: &str) -> u32 {
        match self.db.get_state(&unread_key(contact_id)) {
            Ok(raw) => raw.and_then(|v| v.trim().parse().ok()).unwrap_or(0),
            Err(e) => {
                tracing::warn!("Failed to read unread count for '{}': {:#}", contact_id, e);
                0
            }
        }
    }

    pub fn increment_unread(&self, contact_id: &str) -> u32 {
        let result = self.db.update_state(&unread_key(contact_id), |raw| {
            let count = raw
                .and_then(|v| v.trim().parse::<u32>().ok())
                .unwrap_or(0)
                .saturating_add(1);
            Ok((Some(count.to_string()), count))
        });

        let count = result.unwrap_or_else(|e| {
            tracing::warn!("Failed to bump unread count for '{}': {:#}", contact_id, e);
            self.unread(contact_id).saturating_add(1)
        });
        self.bus.publish(ConversationEvent::UnreadChanged {
            contact_id: contact_id.to_string(),
            count,
        });
        count
    }

    pub fn reset_unread(&self, contact_id: &str) {
        let result = self.db.update_state(&unread_key(contact_id), |raw| {
            let previous = raw.and_then(|v| v.trim().parse::<u32>().ok()).unwrap_or(0);
            Ok((Some("0".to_string()), previous))
        });

        match result {
            Ok(0) => {}
            Ok(_) => self.bus.publish(ConversationEvent::UnreadChanged {
                contact_id: contact_id.to_string(),
                count: 0,
            }),
            Err(e) => {
                tracing::warn!("Failed to reset unread count for '{}': {:#}", contact_id, e)
            }
        }
    }

    pub fn last_message(&self, contact_id: &str) -> Option<Message> {
        self.load_log(contact_id).pop()
    }

    /// Contact ids with a persisted log.
    pub fn contacts_with_logs(&self) -> Vec<String> {
        match self.db.keys_with_prefix(CHAT_LOG_PREFIX) {
            Ok(keys) => keys
                .into_iter()
                .filter_map(|k| k.strip_prefix(CHAT_LOG_PREFIX).map(str::to_string))
                .collect(),
            Err(e) => {
                tracing::warn!("Failed to list conversations: {:#}", e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{MessageKind, Sender};

    fn store() -> ConversationStore {
        ConversationStore::new(
            Arc::new(AppDatabase::in_memory().expect("db")),
            Arc::new(ConversationBus::new()),
        )
    }

    #[test]
    fn append_assigns_increasing_ids() {
        let store = store();
        let a = store.append("c", MessageDraft::user_text("一"));
        let b = store.append("c", MessageDraft::companion_text("二"));
        let c = store.append("other", MessageDraft::user_text("三"));

        assert_eq!((a.id, b.id), (1, 2));
        assert_eq!(c.id, 1);
        let log = store.load_log("c");
        assert_eq!(log, vec![a, b]);
    }

    #[test]
    fn concurrent_appends_lose_nothing() {
        let store = Arc::new(store());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..10 {
                        store.append("c", MessageDraft::user_text(format!("{}-{}", t, i)));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("thread");
        }

        let ids: Vec<u64> = store.load_log("c").iter().map(|m| m.id).collect();
        assert_eq!(ids, (1..=40).collect::<Vec<_>>());
    }

    #[test]
    fn legacy_log_is_backfilled_once() {
        let store = store();
        store
            .db
            .set_state(
                &log_key("c"),
                r#"[{"id":1,"from":"other","text":"嗨","timeLabel":"09:00"},
                    {"id":2,"from":"me","text":"在"}]"#,
            )
            .expect("seed legacy");

        let first = store.load_log("c");
        let (t1, t2) = (
            first[0].timestamp.expect("backfilled"),
            first[1].timestamp.expect("backfilled"),
        );
        assert_eq!(t2 - t1, BACKFILL_STEP_MS);
        assert_eq!(first[0].display_time_label, "09:00");
        assert_eq!(first[1].sender, Sender::User);
        assert_eq!(first[1].kind, MessageKind::Text);

        let second = store.load_log("c");
        assert_eq!(first, second);
    }

    #[test]
    fn unreadable_log_reads_as_empty_and_is_replaced_on_append() {
        let store = store();
        store.db.set_state(&log_key("c"), "not json").expect("raw");

        assert!(store.load_log("c").is_empty());
        let message = store.append("c", MessageDraft::user_text("hi"));
        assert_eq!(message.id, 1);
        assert_eq!(store.load_log("c").len(), 1);
    }

    #[test]
    fn seed_only_writes_an_empty_log() {
        let store = store();
        let opener = MessageDraft::companion_text("嗨～").into_message(1, 1);
        assert!(store.seed("c", std::slice::from_ref(&opener)));
        assert!(!store.seed("c", &[MessageDraft::companion_text("again").into_message(1, 2)]));
        assert_eq!(store.load_log("c"), vec![opener]);
    }

    #[test]
    fn clear_rejects_appends_from_older_epochs() {
        let store = store();
        let epoch = store.epoch("c");
        assert!(store
            .append_in_epoch("c", epoch, MessageDraft::companion_text("a"))
            .is_some());

        store.clear("c");
        assert!(store.load_log("c").is_empty());
        assert_eq!(store.epoch("c"), epoch + 1);
        assert!(store
            .append_in_epoch("c", epoch, MessageDraft::companion_text("stale"))
            .is_none());
        assert!(store.load_log("c").is_empty());
        assert_eq!(store.epoch("other"), 0);
    }

    #[test]
    fn unread_counts_increment_and_reset() {
        let store = store();
        let events = store.bus().subscribe(Some("c"));

        assert_eq!(store.unread("c"), 0);
        assert_eq!(store.increment_unread("c"), 1);
        assert_eq!(store.increment_unread("c"), 2);
        store.reset_unread("c");
        store.reset_unread("c");
        assert_eq!(store.unread("c"), 0);

        let counts: Vec<u32> = events
            .drain()
            .filter_map(|e| match e {
                ConversationEvent::UnreadChanged { count, .. } => Some(count),
                _ => None,
            })
            .collect();
        assert_eq!(counts, vec![1, 2, 0]);
    }

    #[test]
    fn appends_publish_updates_and_list_contacts() {
        let store = store();
        let events = store.bus().subscribe(None);
        store.append("a", MessageDraft::user_text("x"));
        store.append("b", MessageDraft::user_text("y"));

        assert_eq!(events.drain().count(), 2);
        let mut ids = store.contacts_with_logs();
        ids.sort();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(
            store.last_message("b").map(|m| m.text),
            Some("y".to_string())
        );
    }
}

use chrono::{DateTime, Local};
use tokio::sync::Mutex;

use tinyphone_backend::chat::ChatSession;
use tinyphone_backend::conversation::timefmt::{message_time_label, needs_time_separator};
use tinyphone_backend::conversation::{Message, MessageKind, Sender};
use tinyphone_backend::persona::ContactProfile;

pub fn render_message(message: &Message, contact: &ContactProfile) -> String {
    let speaker = match message.sender {
        Sender::User => "我".to_string(),
        Sender::Companion => format!("{} {}", contact.avatar, contact.display_name),
    };
    let body = match message.kind {
        MessageKind::Text => message.text.clone(),
        MessageKind::Voice => format!(
            "🔊 {}\"  「{}」",
            message.voice_duration_seconds.unwrap_or(1),
            message.transcript()
        ),
        MessageKind::Sticker => format!(
            "[表情:{}] {}",
            message.sticker_name.as_deref().unwrap_or_default(),
            message.sticker_url.as_deref().unwrap_or_default()
        ),
    };
    format!("{}: {}", speaker, body)
}

pub fn render_separator(message: &Message, now: &DateTime<Local>) -> String {
    format!("—— {} ——", message_time_label(message, now))
}

/// Lines for `messages`, continuing after `previous`.
pub fn render_log(
    messages: &[Message],
    previous: Option<&Message>,
    contact: &ContactProfile,
    now: &DateTime<Local>,
) -> Vec<String> {
    let mut lines = Vec::new();
    let mut previous = previous;
    for message in messages {
        if needs_time_separator(previous, message) {
            lines.push(render_separator(message, now));
        }
        lines.push(render_message(message, contact));
        previous = Some(message);
    }
    lines
}

#[derive(Default)]
struct Cursor {
    contact_id: Option<String>,
    last: Option<Message>,
}

/// Prints each message of the active conversation exactly once.
#[derive(Default)]
pub struct ChatPrinter {
    cursor: Mutex<Cursor>,
}

impl ChatPrinter {
    /// Prints the whole active log from the top.
    pub async fn reset(&self, session: &ChatSession) {
        let mut cursor = self.cursor.lock().await;
        *cursor = Cursor::default();
        Self::print_after(&mut cursor, session).await;
    }

    /// Prints whatever the active view gained since the last call.
    pub async fn flush(&self, session: &ChatSession) {
        let mut cursor = self.cursor.lock().await;
        Self::print_after(&mut cursor, session).await;
    }

    async fn print_after(cursor: &mut Cursor, session: &ChatSession) {
        let Some(contact_id) = session.active_contact().await else {
            *cursor = Cursor::default();
            return;
        };
        if cursor.contact_id.as_deref() != Some(contact_id.as_str()) {
            *cursor = Cursor {
                contact_id: Some(contact_id.clone()),
                last: None,
            };
        }

        let messages = session.messages().await;
        let last_id = cursor.last.as_ref().map_or(0, |m| m.id);
        let fresh: Vec<Message> = messages.into_iter().filter(|m| m.id > last_id).collect();
        if fresh.is_empty() {
            return;
        }

        let contact = session.settings().contact(&contact_id);
        for line in render_log(&fresh, cursor.last.as_ref(), &contact, &Local::now()) {
            println!("{}", line);
        }
        cursor.last = fresh.last().cloned();
    }
}

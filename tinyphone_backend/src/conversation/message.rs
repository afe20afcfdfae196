use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use super::timefmt::clock_label;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    #[serde(alias = "me")]
    User,
    #[serde(alias = "other")]
    Companion,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    Voice,
    Sticker,
}

/// One entry of a persisted conversation log.
///
/// Which payload fields are set follows `kind`: text messages carry `text`,
/// voice messages carry the duration and transcript, sticker messages carry
/// the sticker URL and name. Use [`MessageDraft`] to build them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    #[serde(alias = "from")]
    pub sender: Sender,
    /// Milliseconds since the Unix epoch. Absent only in legacy data, which
    /// the store backfills on load.
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default, alias = "timeLabel")]
    pub display_time_label: String,
    #[serde(default)]
    pub kind: MessageKind,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_duration_seconds: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_transcript: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sticker_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sticker_name: Option<String>,
}

impl Message {
    /// Text this message contributes to a prompt.
    ///
    /// A user's voice message is tagged with its length so the companion
    /// knows it was spoken, e.g. `[语音消息 0:05] 想你了`.
    pub fn prompt_content(&self) -> Cow<'_, str> {
        match (self.kind, self.sender) {
            (MessageKind::Text, _) => Cow::Borrowed(&self.text),
            (MessageKind::Voice, Sender::User) => Cow::Owned(format!(
                "[语音消息 {}] {}",
                voice_clock(self.voice_duration_seconds.unwrap_or(1)),
                self.voice_transcript.as_deref().unwrap_or(&self.text)
            )),
            (MessageKind::Voice, Sender::Companion) => {
                Cow::Borrowed(self.voice_transcript.as_deref().unwrap_or(&self.text))
            }
            (MessageKind::Sticker, _) => {
                Cow::Borrowed(self.sticker_name.as_deref().unwrap_or(&self.text))
            }
        }
    }

    /// The spoken words of a voice message; the text for anything else.
    pub fn transcript(&self) -> &str {
        self.voice_transcript.as_deref().unwrap_or(&self.text)
    }

    /// One-line summary for contact lists.
    pub fn preview(&self) -> String {
        match self.kind {
            MessageKind::Text => self.text.clone(),
            MessageKind::Voice => format!("[语音] {}\"", self.voice_duration_seconds.unwrap_or(1)),
            MessageKind::Sticker => format!(
                "[表情] {}",
                self.sticker_name.as_deref().unwrap_or_default()
            ),
        }
    }
}

/// `m:ss` for a voice duration.
fn voice_clock(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// A message before the store assigns its id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDraft {
    pub sender: Sender,
    pub kind: MessageKind,
    pub text: String,
    pub voice_duration_seconds: Option<u32>,
    pub voice_transcript: Option<String>,
    pub sticker_url: Option<String>,
    pub sticker_name: Option<String>,
}

impl MessageDraft {
    fn text(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            sender,
            kind: MessageKind::Text,
            text: text.into(),
            voice_duration_seconds: None,
            voice_transcript: None,
            sticker_url: None,
            sticker_name: None,
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::text(Sender::User, text)
    }

    pub fn companion_text(text: impl Into<String>) -> Self {
        Self::text(Sender::Companion, text)
    }

    fn voice(sender: Sender, transcript: impl Into<String>, duration_seconds: u32) -> Self {
        Self {
            kind: MessageKind::Voice,
            voice_duration_seconds: Some(duration_seconds),
            voice_transcript: Some(transcript.into()),
            ..Self::text(sender, "")
        }
    }

    /// A voice message the user recorded.
    pub fn user_voice(transcript: impl Into<String>, duration_seconds: u32) -> Self {
        Self::voice(Sender::User, transcript, duration_seconds)
    }

    pub fn companion_voice(transcript: impl Into<String>, duration_seconds: u32) -> Self {
        Self::voice(Sender::Companion, transcript, duration_seconds)
    }

    pub fn companion_sticker(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Sticker,
            sticker_url: Some(url.into()),
            sticker_name: Some(name.into()),
            ..Self::text(Sender::Companion, "")
        }
    }

    pub fn into_message(self, id: u64, timestamp_ms: i64) -> Message {
        Message {
            id,
            sender: self.sender,
            timestamp: Some(timestamp_ms),
            display_time_label: clock_label(timestamp_ms),
            kind: self.kind,
            text: self.text,
            voice_duration_seconds: self.voice_duration_seconds,
            voice_transcript: self.voice_transcript,
            sticker_url: self.sticker_url,
            sticker_name: self.sticker_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_messages_deserialize_with_defaults() {
        let raw = r#"[
            {"id": 1, "from": "other", "text": "嗨～", "timeLabel": "13:05"},
            {"id": 2, "from": "me", "text": "你好", "timestamp": 1700000000000}
        ]"#;
        let messages: Vec<Message> = serde_json::from_str(raw).expect("legacy log");
        assert_eq!(messages[0].sender, Sender::Companion);
        assert_eq!(messages[0].kind, MessageKind::Text);
        assert_eq!(messages[0].display_time_label, "13:05");
        assert_eq!(messages[0].timestamp, None);
        assert_eq!(messages[1].sender, Sender::User);
        assert_eq!(messages[1].timestamp, Some(1_700_000_000_000));
    }

    #[test]
    fn drafts_populate_only_their_payload() {
        let voice = MessageDraft::companion_voice("晚安", 1).into_message(3, 0);
        assert_eq!(voice.kind, MessageKind::Voice);
        assert!(voice.text.is_empty());
        assert!(voice.sticker_url.is_none());
        assert_eq!(voice.prompt_content(), "晚安");

        let sticker = MessageDraft::companion_sticker("u", "抱抱").into_message(4, 0);
        assert_eq!(sticker.kind, MessageKind::Sticker);
        assert!(sticker.text.is_empty());
        assert!(sticker.voice_transcript.is_none());
        assert_eq!(sticker.preview(), "[表情] 抱抱");
    }

    #[test]
    fn user_voice_is_tagged_in_prompts() {
        let voice = MessageDraft::user_voice("想你了", 75).into_message(5, 0);
        assert_eq!(voice.sender, Sender::User);
        assert_eq!(voice.kind, MessageKind::Voice);
        assert!(voice.text.is_empty());
        assert_eq!(voice.transcript(), "想你了");
        assert_eq!(voice.prompt_content(), "[语音消息 1:15] 想你了");
        assert_eq!(voice.preview(), "[语音] 75\"");
    }

    #[test]
    fn round_trip_keeps_every_payload() {
        let log = vec![
            MessageDraft::user_text("在吗").into_message(1, 10),
            MessageDraft::companion_voice("在的", 1).into_message(2, 20),
            MessageDraft::companion_sticker("u", "开心").into_message(3, 30),
        ];
        let json = serde_json::to_string(&log).expect("serialize");
        let back: Vec<Message> = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, log);
    }
}

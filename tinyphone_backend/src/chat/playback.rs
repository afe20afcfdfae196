//! Paced reveal of a completed reply, one classified segment at a time.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::RwLock;

use super::session::ViewState;
use crate::conversation::{ConversationEvent, ConversationStore, MessageDraft};
use crate::persona::Sticker;
use crate::segmenter::{reveal_delay_ms, split_reply, voice_duration_seconds, voice_transcript};
use crate::settings::SettingsStore;
use crate::sticker::StickerMatcher;

/// Source of the voice/text coin flip.
pub trait VoiceDice: Send + Sync {
    /// A value in `[0, 1)`.
    fn roll(&self) -> f64;
}

pub struct RandomDice {
    rng: Mutex<StdRng>,
}

impl RandomDice {
    /// Seeded dice repeat the same sequence across runs.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng: Mutex::new(rng),
        }
    }
}

impl VoiceDice for RandomDice {
    fn roll(&self) -> f64 {
        match self.rng.lock() {
            Ok(mut rng) => rng.gen::<f64>(),
            Err(poisoned) => poisoned.into_inner().gen::<f64>(),
        }
    }
}

/// Always rolls the same value.
#[derive(Debug, Clone, Copy)]
pub struct FixedDice(pub f64);

impl VoiceDice for FixedDice {
    fn roll(&self) -> f64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct VoicePolicy {
    pub probability: f64,
    /// Segments must be strictly longer than this to become voice.
    pub min_chars: usize,
}

impl Default for VoicePolicy {
    fn default() -> Self {
        Self {
            probability: 0.5,
            min_chars: 10,
        }
    }
}

/// Sticker first, then voice, then plain text.
pub fn classify_segment(
    segment: &str,
    library: &[Sticker],
    matcher: &dyn StickerMatcher,
    dice: &dyn VoiceDice,
    policy: VoicePolicy,
) -> MessageDraft {
    if let Some(sticker) = matcher.classify(segment, library) {
        return MessageDraft::companion_sticker(sticker.url, sticker.name);
    }

    if segment.chars().count() > policy.min_chars && dice.roll() < policy.probability {
        // Pure stage directions have nothing to say out loud.
        if let Some(transcript) = voice_transcript(segment) {
            let duration = voice_duration_seconds(&transcript);
            return MessageDraft::companion_voice(transcript, duration);
        }
    }

    MessageDraft::companion_text(segment)
}

/// Everything a reveal task needs, detached from the session that
/// started it.
pub(crate) struct Playback {
    pub store: Arc<ConversationStore>,
    pub settings: Arc<SettingsStore>,
    pub matcher: Arc<dyn StickerMatcher>,
    pub dice: Arc<dyn VoiceDice>,
    pub policy: VoicePolicy,
    pub view: Arc<RwLock<ViewState>>,
}

impl Playback {
    pub async fn run(self, contact_id: String, epoch: u64, reply: String) {
        let segments = split_reply(&reply);
        let library = self.settings.sticker_library();
        tracing::debug!(
            "Revealing {} segment(s) for '{}'",
            segments.len(),
            contact_id
        );

        for segment in &segments {
            let draft = classify_segment(
                segment,
                &library,
                self.matcher.as_ref(),
                self.dice.as_ref(),
                self.policy,
            );

            {
                let mut view = self.view.write().await;
                let Some(message) = self.store.append_in_epoch(&contact_id, epoch, draft) else {
                    tracing::info!(
                        "Conversation '{}' was cleared; dropping the rest of the reply",
                        contact_id
                    );
                    break;
                };
                tracing::debug!(
                    "Appended {:?} message {} to '{}'",
                    message.kind,
                    message.id,
                    contact_id
                );

                if view.active.as_deref() == Some(contact_id.as_str()) {
                    view.messages.push(message);
                } else {
                    self.store.increment_unread(&contact_id);
                }
            }

            let delay = reveal_delay_ms(segment.chars().count());
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        {
            let mut view = self.view.write().await;
            view.loading = false;
            view.pending.clear();
        }
        self.store
            .bus()
            .publish(ConversationEvent::PlaybackFinished { contact_id });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::MessageKind;
    use crate::persona::StickerFormat;
    use crate::sticker::KeywordStickerMatcher;

    fn library() -> Vec<Sticker> {
        vec![Sticker {
            id: "s1".to_string(),
            name: "感谢".to_string(),
            url: "https://stickers.test/thanks.png".to_string(),
            format: StickerFormat::Static,
        }]
    }

    #[test]
    fn sticker_match_wins_over_voice() {
        let draft = classify_segment(
            "谢谢你一直陪着我度过这么漫长的夜晚",
            &library(),
            &KeywordStickerMatcher::default(),
            &FixedDice(0.0),
            VoicePolicy::default(),
        );
        assert_eq!(draft.kind, MessageKind::Sticker);
        assert!(draft.text.is_empty());
        assert_eq!(draft.sticker_name.as_deref(), Some("感谢"));
    }

    #[test]
    fn short_segments_stay_text() {
        let draft = classify_segment(
            "谢谢你陪我",
            &[],
            &KeywordStickerMatcher::default(),
            &FixedDice(0.0),
            VoicePolicy::default(),
        );
        assert_eq!(draft.kind, MessageKind::Text);
        assert_eq!(draft.text, "谢谢你陪我");
    }

    #[test]
    fn long_segments_follow_the_dice() {
        let segment = "[靠近] 今天的月亮好圆，我们一起去看吧";
        let voice = classify_segment(
            segment,
            &[],
            &KeywordStickerMatcher::default(),
            &FixedDice(0.49),
            VoicePolicy::default(),
        );
        assert_eq!(voice.kind, MessageKind::Voice);
        assert_eq!(
            voice.voice_transcript.as_deref(),
            Some("今天的月亮好圆，我们一起去看吧")
        );
        assert_eq!(voice.voice_duration_seconds, Some(5));

        let text = classify_segment(
            segment,
            &[],
            &KeywordStickerMatcher::default(),
            &FixedDice(0.5),
            VoicePolicy::default(),
        );
        assert_eq!(text.kind, MessageKind::Text);
    }

    #[test]
    fn pure_stage_directions_stay_text() {
        let segment = "[轻轻抱住你，在你耳边慢慢地哼着歌]";
        let draft = classify_segment(
            segment,
            &[],
            &KeywordStickerMatcher::default(),
            &FixedDice(0.0),
            VoicePolicy::default(),
        );
        assert_eq!(draft.kind, MessageKind::Text);
        assert_eq!(draft.text, segment);
        assert!(draft.voice_transcript.is_none());
    }

    #[test]
    fn seeded_dice_repeat() {
        let a = RandomDice::new(Some(7));
        let b = RandomDice::new(Some(7));
        for _ in 0..5 {
            let roll = a.roll();
            assert!((0.0..1.0).contains(&roll));
            assert_eq!(roll, b.roll());
        }
    }
}

use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::playback::{Playback, VoiceDice, VoicePolicy};
use crate::conversation::{ConversationEvent, ConversationStore, Message, MessageDraft};
use crate::error::{ChatError, ChatResult};
use crate::llm_client::{CompletionBackend, ModelInfo};
use crate::persona::ContactProfile;
use crate::prompt::{assemble_prompt, PromptOptions};
use crate::segmenter::MAX_VOICE_SECONDS;
use crate::settings::SettingsStore;
use crate::sticker::StickerMatcher;

/// In-memory state of the conversation view.
#[derive(Debug, Default)]
pub struct ViewState {
    pub(crate) active: Option<String>,
    pub(crate) messages: Vec<Message>,
    /// User turns appended since the last send cycle.
    pub(crate) pending: Vec<Message>,
    pub(crate) loading: bool,
    pub(crate) error: Option<String>,
    /// `messages` holds a synthesized opening line that is not stored yet.
    pub(crate) opening_unpersisted: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChatOptions {
    pub voice: VoicePolicy,
    pub prompt: PromptOptions,
}

/// One row of the contact list.
#[derive(Debug, Clone)]
pub struct ContactSummary {
    pub profile: ContactProfile,
    pub unread: u32,
    pub last_message: Option<Message>,
}

/// The conversation view's handle on the engine.
///
/// Cheap to clone; clones share the same view state.
#[derive(Clone)]
pub struct ChatSession {
    settings: Arc<SettingsStore>,
    store: Arc<ConversationStore>,
    backend: Arc<dyn CompletionBackend>,
    matcher: Arc<dyn StickerMatcher>,
    dice: Arc<dyn VoiceDice>,
    options: ChatOptions,
    view: Arc<RwLock<ViewState>>,
}

fn opening_message(profile: &ContactProfile) -> Option<Message> {
    profile.opening_line().map(|line| {
        MessageDraft::companion_text(line)
            .into_message(1, chrono::Utc::now().timestamp_millis())
    })
}

impl ChatSession {
    pub fn new(
        settings: Arc<SettingsStore>,
        store: Arc<ConversationStore>,
        backend: Arc<dyn CompletionBackend>,
        matcher: Arc<dyn StickerMatcher>,
        dice: Arc<dyn VoiceDice>,
        options: ChatOptions,
    ) -> Self {
        Self {
            settings,
            store,
            backend,
            matcher,
            dice,
            options,
            view: Arc::new(RwLock::new(ViewState::default())),
        }
    }

    pub fn settings(&self) -> &Arc<SettingsStore> {
        &self.settings
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Loads the stored log (or the synthesized opener) and clears the
    /// contact's unread count.
    pub async fn activate(&self, contact_id: &str) -> Vec<Message> {
        let profile = self.settings.contact(contact_id);
        let mut view = self.view.write().await;

        let log = self.store.load_log(contact_id);
        let (messages, opening_unpersisted) = if log.is_empty() {
            match opening_message(&profile) {
                Some(opener) => (vec![opener], true),
                None => (Vec::new(), false),
            }
        } else {
            (log, false)
        };
        self.store.reset_unread(contact_id);

        if view.active.as_deref() != Some(contact_id) {
            view.pending.clear();
            view.error = None;
        }
        view.active = Some(contact_id.to_string());
        view.messages = messages.clone();
        view.opening_unpersisted = opening_unpersisted;
        tracing::debug!(
            "Activated '{}' with {} message(s)",
            contact_id,
            messages.len()
        );
        messages
    }

    /// Leaves the conversation view; later replies count as unread.
    pub async fn deactivate(&self) {
        let mut view = self.view.write().await;
        view.active = None;
        view.messages.clear();
        view.pending.clear();
        view.opening_unpersisted = false;
    }

    pub async fn active_contact(&self) -> Option<String> {
        self.view.read().await.active.clone()
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.view.read().await.messages.clone()
    }

    pub async fn pending_count(&self) -> usize {
        self.view.read().await.pending.len()
    }

    pub async fn is_loading(&self) -> bool {
        self.view.read().await.loading
    }

    pub async fn last_error(&self) -> Option<String> {
        self.view.read().await.error.clone()
    }

    fn enqueue_locked(
        &self,
        view: &mut ViewState,
        contact_id: &str,
        draft: MessageDraft,
    ) -> Message {
        if view.opening_unpersisted {
            self.store.seed(contact_id, &view.messages);
            view.opening_unpersisted = false;
        }
        let message = self.store.append(contact_id, draft);
        view.messages.push(message.clone());
        view.pending.push(message.clone());
        message
    }

    async fn enqueue_draft(&self, draft: MessageDraft) -> ChatResult<Message> {
        let mut view = self.view.write().await;
        let contact_id = view
            .active
            .clone()
            .ok_or_else(|| ChatError::InvalidContact("no conversation is open".to_string()))?;
        Ok(self.enqueue_locked(&mut view, &contact_id, draft))
    }

    /// Appends a user line without asking for a reply. Blank input is
    /// ignored.
    pub async fn enqueue(&self, text: &str) -> ChatResult<Option<Message>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }
        self.enqueue_draft(MessageDraft::user_text(text)).await.map(Some)
    }

    /// Appends a user voice message of `duration_seconds` without asking
    /// for a reply. A blank transcript is ignored; the duration is kept
    /// within 1..=60 seconds.
    pub async fn enqueue_voice(
        &self,
        transcript: &str,
        duration_seconds: u32,
    ) -> ChatResult<Option<Message>> {
        let transcript = transcript.trim();
        if transcript.is_empty() {
            return Ok(None);
        }
        let duration = duration_seconds.clamp(1, MAX_VOICE_SECONDS);
        self.enqueue_draft(MessageDraft::user_voice(transcript, duration))
            .await
            .map(Some)
    }

    /// Sends every pending turn, plus `extra` when given, and starts the
    /// reveal of the reply.
    ///
    /// Returns `Ok(None)` when there is nothing to send or the conversation
    /// was cleared while the request was in flight. The returned handle
    /// finishes when the last segment has been revealed.
    pub async fn trigger_reply(&self, extra: Option<&str>) -> ChatResult<Option<JoinHandle<()>>> {
        let extra = extra.map(str::trim).filter(|t| !t.is_empty());

        let (contact_id, epoch, extra_message, in_memory) = {
            let mut view = self.view.write().await;
            if view.loading {
                return Err(ChatError::Busy);
            }
            let contact_id = view.active.clone().ok_or_else(|| {
                ChatError::InvalidContact("no conversation is open".to_string())
            })?;
            let extra_message = extra.map(|text| {
                self.enqueue_locked(&mut view, &contact_id, MessageDraft::user_text(text))
            });
            if view.pending.is_empty() {
                return Ok(None);
            }
            view.loading = true;
            view.error = None;
            let epoch = self.store.epoch(&contact_id);
            (contact_id, epoch, extra_message, view.messages.clone())
        };

        let profile = self.settings.contact(&contact_id);
        let config = self.settings.snapshot().ai_config.clone();

        let mut history = self.store.load_log(&contact_id);
        if history.is_empty() {
            history = in_memory;
        }
        let unsent_extra = extra_message
            .as_ref()
            .filter(|m| !history.iter().any(|h| h.id == m.id && h.text == m.text))
            .map(|m| m.text.as_str());

        let prompt = assemble_prompt(&profile, &history, unsent_extra, self.options.prompt);
        tracing::info!(
            "Requesting reply for '{}' ({} prompt message(s))",
            contact_id,
            prompt.len()
        );

        let reply = match self.backend.send_completion(&config, &prompt).await {
            Ok(reply) => {
                tracing::debug!(
                    "Reply for '{}' received ({} chars)",
                    contact_id,
                    reply.chars().count()
                );
                reply
            }
            Err(e) => {
                tracing::warn!("Reply for '{}' failed: {}", contact_id, e);
                {
                    let mut view = self.view.write().await;
                    view.error = Some(e.to_string());
                    view.pending.clear();
                    view.loading = false;
                }
                self.store.bus().publish(ConversationEvent::ReplyFailed {
                    contact_id,
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        if self.store.epoch(&contact_id) != epoch {
            tracing::info!(
                "Conversation '{}' was cleared during the request; dropping the reply",
                contact_id
            );
            {
                let mut view = self.view.write().await;
                view.pending.clear();
                view.loading = false;
            }
            self.store
                .bus()
                .publish(ConversationEvent::PlaybackFinished { contact_id });
            return Ok(None);
        }

        let playback = Playback {
            store: self.store.clone(),
            settings: self.settings.clone(),
            matcher: self.matcher.clone(),
            dice: self.dice.clone(),
            policy: self.options.voice,
            view: self.view.clone(),
        };
        Ok(Some(tokio::spawn(playback.run(contact_id, epoch, reply))))
    }

    /// Empties the active conversation, leaving only the opening line if
    /// the profile has one.
    pub async fn clear_conversation(&self) -> Vec<Message> {
        let mut view = self.view.write().await;
        let Some(contact_id) = view.active.clone() else {
            return Vec::new();
        };
        self.store.clear(&contact_id);

        let profile = self.settings.contact(&contact_id);
        let messages: Vec<Message> = opening_message(&profile).into_iter().collect();
        view.opening_unpersisted = !messages.is_empty();
        view.messages = messages.clone();
        view.pending.clear();
        view.error = None;
        messages
    }

    /// Replaces the in-memory messages with the stored log when the log is
    /// non-empty and differs. Returns whether anything changed.
    pub async fn reconcile(&self) -> bool {
        let mut view = self.view.write().await;
        let Some(contact_id) = view.active.clone() else {
            return false;
        };
        let log = self.store.load_log(&contact_id);
        if log.is_empty() || log == view.messages {
            return false;
        }
        tracing::debug!(
            "Reconciled '{}': {} -> {} message(s)",
            contact_id,
            view.messages.len(),
            log.len()
        );
        view.messages = log;
        view.opening_unpersisted = false;
        true
    }

    pub async fn contact_list(&self) -> Vec<ContactSummary> {
        self.settings
            .contacts()
            .into_iter()
            .map(|profile| ContactSummary {
                unread: self.store.unread(&profile.id),
                last_message: self.store.last_message(&profile.id),
                profile,
            })
            .collect()
    }

    pub async fn list_models(&self) -> ChatResult<Vec<ModelInfo>> {
        let config = self.settings.snapshot().ai_config.clone();
        self.backend.list_models(&config).await
    }
}

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::task::JoinHandle;

use crate::chat::{spawn_reconciler, ChatOptions, ChatSession, RandomDice, VoicePolicy};
use crate::config::AppConfig;
use crate::conversation::{ConversationBus, ConversationStore};
use crate::database::AppDatabase;
use crate::http_client::build_http_client_with_timeout;
use crate::llm_client::LlmClient;
use crate::prompt::PromptOptions;
use crate::settings::{AiConfigPatch, SettingsStore};
use crate::sticker::KeywordStickerMatcher;

/// A wired-up engine: storage, settings, and the session a view drives.
pub struct AppRuntime {
    pub config: AppConfig,
    pub database: Arc<AppDatabase>,
    pub bus: Arc<ConversationBus>,
    pub settings: Arc<SettingsStore>,
    pub session: ChatSession,
}

impl AppRuntime {
    pub fn bootstrap(config: AppConfig) -> Result<Self> {
        let database = Arc::new(
            AppDatabase::new(&config.database_path).with_context(|| {
                format!("Failed to open database at {}", config.database_path)
            })?,
        );
        Ok(Self::with_database(config, database))
    }

    pub fn with_database(config: AppConfig, database: Arc<AppDatabase>) -> Self {
        let settings = Arc::new(SettingsStore::load(database.clone()));
        apply_endpoint_seeds(&config, &settings);

        let bus = Arc::new(ConversationBus::new());
        let store = Arc::new(ConversationStore::new(database.clone(), bus.clone()));

        let http = build_http_client_with_timeout(
            config.request_timeout_secs.map(Duration::from_secs),
        );
        let options = ChatOptions {
            voice: VoicePolicy {
                probability: config.voice_probability.clamp(0.0, 1.0),
                min_chars: config.voice_min_chars,
            },
            prompt: PromptOptions {
                voice_rule: config.voice_only_speech_instruction,
            },
        };
        let stored_conversations = store.contacts_with_logs().len();
        let session = ChatSession::new(
            settings.clone(),
            store,
            Arc::new(LlmClient::new(http)),
            Arc::new(KeywordStickerMatcher::default()),
            Arc::new(RandomDice::new(config.voice_seed)),
            options,
        );

        tracing::info!(
            "Runtime ready (db: {}, {} stored conversation(s), voice p={}, poll {}ms)",
            config.database_path,
            stored_conversations,
            options.voice.probability,
            config.reconcile_poll_ms
        );

        Self {
            config,
            database,
            bus,
            settings,
            session,
        }
    }

    /// Starts keeping the active view in step with storage.
    pub fn spawn_reconciler(&self) -> JoinHandle<()> {
        spawn_reconciler(
            self.session.clone(),
            Duration::from_millis(self.config.reconcile_poll_ms),
        )
    }
}

fn apply_endpoint_seeds(config: &AppConfig, settings: &SettingsStore) {
    let non_blank = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    let patch = AiConfigPatch {
        base_url: non_blank(&config.api_base_url),
        api_key: non_blank(&config.api_key),
        model: non_blank(&config.model),
    };
    if patch.base_url.is_none() && patch.api_key.is_none() && patch.model.is_none() {
        return;
    }
    tracing::info!("Seeding AI endpoint settings from config");
    settings.update_ai_config(patch);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn config_seeds_only_set_fields() {
        let database = Arc::new(AppDatabase::in_memory().expect("db"));
        let settings = SettingsStore::load(database.clone());
        settings.update_ai_config(AiConfigPatch {
            api_key: Some("stored-key".to_string()),
            ..Default::default()
        });

        let config = AppConfig {
            api_base_url: Some("https://api.x.com/v1".to_string()),
            model: Some("  ".to_string()),
            ..AppConfig::default()
        };
        let runtime = AppRuntime::with_database(config, database);
        let ai = runtime.settings.snapshot().ai_config.clone();

        assert_eq!(ai.base_url, "https://api.x.com/v1");
        assert_eq!(ai.api_key, "stored-key");
        assert_eq!(ai.model, "");
    }

    #[tokio::test]
    async fn bootstrap_opens_a_file_database() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = AppConfig {
            database_path: dir.path().join("phone.db").to_string_lossy().into_owned(),
            ..AppConfig::default()
        };
        let runtime = AppRuntime::bootstrap(config).expect("bootstrap");
        assert_eq!(runtime.session.contact_list().await.len(), 1);
    }
}

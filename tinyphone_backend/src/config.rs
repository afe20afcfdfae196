use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    // Persistence
    #[serde(default = "default_database_path")]
    pub database_path: String,

    // AI endpoint seeds (OpenAI-compatible). Only applied to the settings
    // store when present; the settings store stays the source of truth.
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,

    // Active view reconciliation
    #[serde(default = "default_reconcile_poll_ms")]
    pub reconcile_poll_ms: u64,

    // Reply playback
    #[serde(default = "default_voice_probability")]
    pub voice_probability: f64,
    #[serde(default = "default_voice_min_chars")]
    pub voice_min_chars: usize,
    #[serde(default)]
    pub voice_seed: Option<u64>,
    #[serde(default = "default_true")]
    pub voice_only_speech_instruction: bool,
}

fn default_database_path() -> String {
    "tinyphone.db".to_string()
}

fn default_reconcile_poll_ms() -> u64 {
    500
}

fn default_voice_probability() -> f64 {
    0.5
}

fn default_voice_min_chars() -> usize {
    10
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            api_base_url: None,
            api_key: None,
            model: None,
            request_timeout_secs: None,
            reconcile_poll_ms: default_reconcile_poll_ms(),
            voice_probability: default_voice_probability(),
            voice_min_chars: default_voice_min_chars(),
            voice_seed: None,
            voice_only_speech_instruction: true,
        }
    }
}

impl AppConfig {
    /// Get the directory containing the executable
    fn get_base_dir() -> PathBuf {
        match std::env::current_exe() {
            Ok(exe_path) => exe_path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".")),
            Err(_) => PathBuf::from("."),
        }
    }

    /// Get the path to the config file (relative to executable)
    pub fn config_path() -> PathBuf {
        Self::get_base_dir().join("tinyphone_config.toml")
    }

    /// Load config from tinyphone_config.toml (next to executable), then
    /// layer environment overrides on top.
    pub fn load() -> Self {
        let path = Self::config_path();

        let base = match fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str::<AppConfig>(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {:?}", path);
                    config
                }
                Err(e) => {
                    tracing::error!("Failed to parse {:?}: {}", path, e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::warn!("No config file found, using defaults + env vars");
                Self::default()
            }
        };

        base.with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(path) = env::var("TINYPHONE_DATABASE_PATH") {
            if !path.trim().is_empty() {
                self.database_path = path;
            }
        }

        if let Ok(url) = env::var("TINYPHONE_API_BASE_URL") {
            self.api_base_url = Some(url);
        }

        if let Ok(key) = env::var("TINYPHONE_API_KEY") {
            self.api_key = Some(key);
        }

        if let Ok(model) = env::var("TINYPHONE_MODEL") {
            self.model = Some(model);
        }

        if let Ok(interval) = env::var("TINYPHONE_RECONCILE_POLL_MS") {
            if let Ok(ms) = interval.parse() {
                self.reconcile_poll_ms = ms;
            }
        }

        if let Ok(probability) = env::var("TINYPHONE_VOICE_PROBABILITY") {
            if let Ok(p) = probability.parse::<f64>() {
                self.voice_probability = p.clamp(0.0, 1.0);
            }
        }

        if let Ok(seed) = env::var("TINYPHONE_VOICE_SEED") {
            if let Ok(seed) = seed.parse() {
                self.voice_seed = Some(seed);
            }
        }

        self
    }
}

pub mod chat;
pub mod config;
pub mod conversation;
pub mod database;
pub mod error;
pub mod http_client;
pub mod llm_client;
pub mod persona;
pub mod prompt;
pub mod runtime;
pub mod segmenter;
pub mod settings;
pub mod sticker;

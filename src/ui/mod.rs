pub mod chat;
pub mod commands;
pub mod contacts;
pub mod manage;

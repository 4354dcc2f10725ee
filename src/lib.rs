pub mod ai;
pub mod auth;
pub mod chat;
pub mod core;
pub mod dashboards;
pub mod email;
pub mod llm;
pub mod main_module;
pub mod notifications;
pub mod security;
pub mod settings;
pub mod tickets;

pub use crate::core::shared;

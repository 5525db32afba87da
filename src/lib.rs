pub mod config;
pub mod dao;
pub mod db;
pub mod extract;
pub mod filter;
pub mod mapping;
pub mod monitor;
pub mod notify;
pub mod render;
pub mod storage;
pub mod types;

#[cfg(test)]
mod testing;

// --- Library API for embedding ---

/// Convenience re-exports for embedders.
pub mod prelude {
    pub use crate::config::{AppConfig, RendererKind, SiteConfig};
    pub use crate::db::Database;
    pub use crate::extract::{Extraction, Extractor};
    pub use crate::monitor::{Monitor, RunSummary, SiteOutcome, SiteReport};
    pub use crate::notify::{Delivery, DiscordWebhook, Notification, Notifier};
    pub use crate::render::{
        connect_renderer, HttpRenderer, Renderer, WaitPolicy, WebDriverRenderer,
    };
    pub use crate::storage::{HistoryRecord, HistoryStore};
    pub use crate::types::{DropReason, Item};
}

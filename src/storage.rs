use anyhow::Result;
use async_trait::async_trait;

/// A link that has already been pushed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRecord {
    pub site_name: String,
    pub url: String,
    pub title: String,
    pub timestamp: Option<String>,
}

/// Persistent set of notified links, keyed by url.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn exists(&self, url: &str) -> Result<bool>;
    /// Record `url`. Returns false when it was already present; never errors on duplicates.
    async fn insert_if_absent(&self, site_name: &str, url: &str, title: &str) -> Result<bool>;
}

use anyhow::{Context, Result};
use directories::ProjectDirs;
use sqlx::{any::AnyConnectOptions, AnyPool, ConnectOptions, migrate::Migrator};
use sqlx::any::AnyPoolOptions;
use std::{path::{Path, PathBuf}, str::FromStr};
use std::sync::Once;

use crate::config::DatabaseConfig;
use crate::dao::{self, HistoryInsert};
use crate::storage::{HistoryRecord, HistoryStore};

// Ensure drivers are installed exactly once for sqlx::any
static INSTALL_DRIVERS: Once = Once::new();

// Embed SQL migrations from the migrations/ directory
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub const DATABASE_URL_ENV: &str = "PAGEWATCH_DATABASE_URL";

#[derive(Clone)]
pub struct Database {
    pool: AnyPool,
}

impl Database {
    /// Open the history database. `PAGEWATCH_DATABASE_URL` wins over the config;
    /// with nothing configured, a sqlite file in the user's data directory is used.
    pub async fn open(cfg: &DatabaseConfig) -> Result<Self> {
        let url = match std::env::var(DATABASE_URL_ENV).ok().filter(|u| !u.trim().is_empty()) {
            Some(u) => u,
            None => match (&cfg.url, &cfg.db_path) {
                (Some(u), _) if !u.trim().is_empty() => u.clone(),
                (_, Some(p)) if !p.trim().is_empty() => sqlite_url_for(Path::new(p))?,
                _ => default_sqlite_url()?,
            },
        };
        let db = Self::connect(&url).await?;
        db.run_migrations().await?;
        Ok(db)
    }

    pub async fn connect(url: &str) -> Result<Self> {
        // Register compiled-in drivers for sqlx::any
        INSTALL_DRIVERS.call_once(sqlx::any::install_default_drivers);

        let opts = AnyConnectOptions::from_str(url)
            .with_context(|| format!("invalid database URL: {url}"))?;
        // Quiet by default; callers can enable SQLX_LOG if they want
        let opts = opts.disable_statement_logging();

        // One connection: each operation checks it out and hands it back.
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await
            .with_context(|| format!("failed to connect to database: {url}"))?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await.context("running migrations")
    }

    pub fn pool(&self) -> &AnyPool { &self.pool }

    pub async fn recent(&self, site_name: Option<&str>, limit: i64) -> Result<Vec<HistoryRecord>> {
        dao::recent_history(&self.pool, site_name, limit).await
    }

    pub async fn count(&self, site_name: Option<&str>) -> Result<i64> {
        dao::count_history(&self.pool, site_name).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait::async_trait]
impl HistoryStore for Database {
    async fn exists(&self, url: &str) -> Result<bool> {
        dao::history_exists(&self.pool, url).await
    }

    async fn insert_if_absent(&self, site_name: &str, url: &str, title: &str) -> Result<bool> {
        let row = HistoryInsert {
            site_name: site_name.to_string(),
            url: url.to_string(),
            title: title.to_string(),
        };
        dao::insert_history(&self.pool, &row).await
    }
}

/// sqlite URL for a file path, creating parent directories as needed.
pub fn sqlite_url_for(path: &Path) -> Result<String> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating db parent dir: {}", parent.display()))?;
    }
    // Encode spaces in the path for a valid sqlite URL
    let mut path_str = path.to_string_lossy().to_string();
    if path_str.contains(' ') { path_str = path_str.replace(' ', "%20"); }
    Ok(format!("sqlite://{path_str}?mode=rwc"))
}

fn default_sqlite_url() -> Result<String> {
    let proj = ProjectDirs::from("dev", "pagewatch", "pagewatch")
        .context("unable to determine data directory for default sqlite path")?;
    let mut path: PathBuf = proj.data_dir().to_path_buf();
    path.push("pagewatch.db");
    sqlite_url_for(&path)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_db(dir: &tempfile::TempDir) -> Database {
        let url = sqlite_url_for(&dir.path().join("history.db")).unwrap();
        let db = Database::connect(&url).await.unwrap();
        db.run_migrations().await.unwrap();
        db
    }

    #[tokio::test]
    async fn insert_if_absent_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let db = temp_db(&dir).await;

        assert!(!db.exists("https://s.test/a").await.unwrap());
        assert!(db.insert_if_absent("demo", "https://s.test/a", "A").await.unwrap());
        assert!(db.exists("https://s.test/a").await.unwrap());

        // Duplicate insert is a silent no-op.
        assert!(!db.insert_if_absent("demo", "https://s.test/a", "A again").await.unwrap());
        assert_eq!(db.count(None).await.unwrap(), 1);

        let recent = db.recent(None, 10).await.unwrap();
        assert_eq!(recent[0].title, "A");
        assert!(recent[0].timestamp.is_some());
    }

    #[tokio::test]
    async fn recent_filters_by_site_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let db = temp_db(&dir).await;
        db.insert_if_absent("one", "https://one.test/1", "1").await.unwrap();
        db.insert_if_absent("two", "https://two.test/1", "2").await.unwrap();
        db.insert_if_absent("one", "https://one.test/2", "3").await.unwrap();

        let recent = db.recent(Some("one"), 10).await.unwrap();
        let urls: Vec<_> = recent.into_iter().map(|r| r.url).collect();
        assert_eq!(urls, vec!["https://one.test/2", "https://one.test/1"]);
        assert_eq!(db.count(Some("two")).await.unwrap(), 1);
        assert_eq!(db.recent(None, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("h.db").to_string_lossy().to_string();
        let cfg = DatabaseConfig { url: None, db_path: Some(db_path) };
        let db = Database::open(&cfg).await.unwrap();
        db.insert_if_absent("demo", "https://s.test/a", "A").await.unwrap();
        db.close().await;

        let db = Database::open(&cfg).await.unwrap();
        assert!(db.exists("https://s.test/a").await.unwrap());
    }

    #[test]
    fn sqlite_url_encodes_spaces() {
        let url = sqlite_url_for(Path::new("my db.sqlite")).unwrap();
        assert_eq!(url, "sqlite://my%20db.sqlite?mode=rwc");
    }
}

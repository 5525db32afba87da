use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::extract::SiteSelectors;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Whole-run configuration. Built once by [`AppConfig::load`] and passed by reference.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub sites: Vec<SiteConfig>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DatabaseConfig {
    /// Full sqlx connection URL; wins over `db_path`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub db_path: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotifierConfig {
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    /// Name of the environment variable holding the webhook URL.
    #[serde(default = "default_webhook_env")]
    pub webhook_url_env: String,
    #[serde(default = "default_true")]
    pub announce_startup: bool,
}

/// Which [`Renderer`](crate::render::Renderer) loads the pages.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RendererKind {
    /// Plain HTTP fetch, no scripts. Enough for static listing pages.
    #[default]
    Http,
    /// A browser driven over WebDriver (chromedriver).
    WebDriver,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BrowserConfig {
    #[serde(default)]
    pub engine: RendererKind,
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
    #[serde(default = "default_true")]
    pub headless: bool,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Static headers sent with every page request (http engine only).
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default = "default_navigation_timeout")]
    pub navigation_timeout_secs: u64,
    /// Delay after the network goes idle on SPA sites. A heuristic, not a
    /// readiness signal.
    #[serde(default = "default_spa_settle")]
    pub spa_settle_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    /// Image attributes in priority order; lazy-load attributes first.
    #[serde(default = "default_image_attrs")]
    pub image_attrs: Vec<String>,
    #[serde(default = "default_placeholder_suffixes")]
    pub placeholder_suffixes: Vec<String>,
    #[serde(default = "default_placeholder_markers")]
    pub placeholder_markers: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SiteConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub is_spa: bool,
    pub item_list_selector: String,
    pub title_selector: String,
    #[serde(default)]
    pub title_attr: Option<String>,
    pub link_selector: String,
    #[serde(default = "default_link_attr")]
    pub link_attr: String,
    pub image_selector: String,
}

fn default_username() -> String { "pagewatch".to_string() }
fn default_webhook_env() -> String { "DISCORD_WEBHOOK_URL".to_string() }
fn default_true() -> bool { true }
fn default_webdriver_url() -> String { "http://localhost:9515".to_string() }
fn default_user_agent() -> String { DEFAULT_USER_AGENT.to_string() }
fn default_navigation_timeout() -> u64 { 60 }
fn default_spa_settle() -> u64 { 2_000 }
fn default_link_attr() -> String { "href".to_string() }
fn default_image_attrs() -> Vec<String> {
    ["data-original", "data-src", "data-lazy-src", "src"].iter().map(|s| s.to_string()).collect()
}
fn default_placeholder_suffixes() -> Vec<String> { vec![".gif".to_string()] }
fn default_placeholder_markers() -> Vec<String> { vec!["loading".to_string()] }

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            username: default_username(),
            avatar_url: None,
            webhook_url_env: default_webhook_env(),
            announce_startup: true,
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            engine: RendererKind::Http,
            webdriver_url: default_webdriver_url(),
            headless: true,
            user_agent: default_user_agent(),
            headers: BTreeMap::new(),
            navigation_timeout_secs: default_navigation_timeout(),
            spa_settle_ms: default_spa_settle(),
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            image_attrs: default_image_attrs(),
            placeholder_suffixes: default_placeholder_suffixes(),
            placeholder_markers: default_placeholder_markers(),
        }
    }
}

impl BrowserConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs.max(1))
    }

    pub fn spa_settle(&self) -> Duration { Duration::from_millis(self.spa_settle_ms) }
}

impl SiteConfig {
    pub fn base_url(&self) -> Result<Url> {
        Url::parse(&self.url)
            .with_context(|| format!("site {}: invalid url {}", self.name, self.url))
    }
}

impl AppConfig {
    /// Read, parse and validate a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg = Self::from_toml(&text)
            .with_context(|| format!("loading config: {}", path.display()))?;
        Ok(cfg)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let cfg: AppConfig = toml::from_str(text).context("parsing TOML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn site(&self, name: &str) -> Option<&SiteConfig> {
        self.sites.iter().find(|s| s.name == name)
    }

    fn validate(&self) -> Result<()> {
        if self.sites.is_empty() {
            bail!("no [[sites]] configured");
        }
        let mut seen = HashSet::new();
        for site in &self.sites {
            if site.name.trim().is_empty() {
                bail!("site with url {} has an empty name", site.url);
            }
            if !seen.insert(site.name.as_str()) {
                bail!("duplicate site name: {}", site.name);
            }
            let base = site.base_url()?;
            match base.scheme() {
                "http" | "https" => {}
                other => {
                    return Err(anyhow!("site {}: unsupported url scheme `{}`", site.name, other))
                }
            }
            if site.link_attr.trim().is_empty() {
                bail!("site {}: link_attr must not be empty", site.name);
            }
            SiteSelectors::compile(site)?;
        }
        if self.extraction.image_attrs.is_empty() {
            bail!("extraction.image_attrs must list at least one attribute");
        }
        if self.browser.engine == RendererKind::WebDriver {
            Url::parse(&self.browser.webdriver_url).with_context(|| {
                format!("browser.webdriver_url is not a valid url: {}", self.browser.webdriver_url)
            })?;
        }
        if self.notifier.webhook_url_env.trim().is_empty() {
            bail!("notifier.webhook_url_env must not be empty");
        }
        Ok(())
    }
}

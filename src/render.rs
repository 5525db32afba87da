//! Loading listing pages.
//!
//! A [`Renderer`] holds one page at a time: [`Renderer::navigate`] loads a
//! URL, [`Renderer::settle`] waits until it is ready, and
//! [`Renderer::content`] hands back the HTML. Only navigation is bounded by
//! the configured timeout.
//!
//! [`HttpRenderer`] fetches static pages over HTTP and does not run scripts.
//! [`WebDriverRenderer`] drives one browser session through a WebDriver
//! server (chromedriver) and reuses its window for every site of a run.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thirtyfour::{ChromiumLikeCapabilities, DesiredCapabilities, WebDriver};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{BrowserConfig, RendererKind, SiteConfig};

/// How long to wait before the page is considered ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Static page: ready once the document is loaded.
    DomReady,
    /// Client-rendered page: wait for the network to go quiet, scroll to the
    /// bottom to trigger lazy content, then wait the settle delay.
    Settle(Duration),
}

impl WaitPolicy {
    pub fn for_site(site: &SiteConfig, browser: &BrowserConfig) -> Self {
        if site.is_spa { WaitPolicy::Settle(browser.spa_settle()) } else { WaitPolicy::DomReady }
    }
}

#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// Final URL after redirects.
    pub url: String,
    pub html: String,
}

#[async_trait]
pub trait Renderer: Send + Sync {
    /// Load `url`, replacing the current page.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Wait until the loaded page is ready for extraction.
    async fn settle(&self, wait: WaitPolicy) -> Result<()>;

    /// HTML of the loaded page.
    async fn content(&self) -> Result<RenderedPage>;

    /// Release the page. Called once, after the last site.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Build the renderer selected by `[browser] engine`.
pub async fn connect_renderer(cfg: &BrowserConfig) -> Result<Arc<dyn Renderer>> {
    match cfg.engine {
        RendererKind::Http => Ok(Arc::new(HttpRenderer::new(cfg)?)),
        RendererKind::WebDriver => Ok(Arc::new(WebDriverRenderer::connect(cfg).await?)),
    }
}

/// Plain HTTP renderer. One client is reused for every site of a run.
pub struct HttpRenderer {
    client: reqwest::Client,
    current: Mutex<Option<RenderedPage>>,
}

impl HttpRenderer {
    pub fn new(cfg: &BrowserConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        for (name, value) in &cfg.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .with_context(|| format!("invalid header name: {name}"))?;
            let value = HeaderValue::from_str(value)
                .with_context(|| format!("invalid value for header {name}"))?;
            headers.insert(name, value);
        }
        let client = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("failed to create HTTP client")?;
        Ok(Self { client, current: Mutex::new(None) })
    }

    fn set_current(&self, page: Option<RenderedPage>) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = page;
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.set_current(None);
        let response = self.client.get(url).send().await.with_context(|| format!("GET {url}"))?;
        let status = response.status();
        if !status.is_success() {
            bail!("HTTP {} for {}", status, url);
        }
        let final_url = response.url().to_string();
        let html = response.text().await.context("failed to read response body")?;
        self.set_current(Some(RenderedPage { url: final_url, html }));
        Ok(())
    }

    async fn settle(&self, wait: WaitPolicy) -> Result<()> {
        if let WaitPolicy::Settle(_) = wait {
            warn!(
                "the http engine does not run page scripts; \
                 use engine = \"webdriver\" for SPA sites"
            );
        }
        Ok(())
    }

    async fn content(&self) -> Result<RenderedPage> {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or_else(|| anyhow!("no page loaded"))
    }
}

const READY_STATE: &str = "return document.readyState;";
const RESOURCE_COUNT: &str = "return performance.getEntriesByType('resource').length;";
const SCROLL_TO_BOTTOM: &str = "window.scrollTo(0, document.body.scrollHeight);";

/// No new network requests for this long counts as idle.
const IDLE_WINDOW: Duration = Duration::from_millis(500);
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Browser renderer over a WebDriver session. One window serves every site.
pub struct WebDriverRenderer {
    driver: tokio::sync::Mutex<Option<WebDriver>>,
    idle_limit: Duration,
}

impl WebDriverRenderer {
    pub async fn connect(cfg: &BrowserConfig) -> Result<Self> {
        let mut caps = DesiredCapabilities::chrome();
        if cfg.headless {
            caps.add_arg("--headless=new")?;
        }
        caps.add_arg("--no-sandbox")?;
        caps.add_arg("--disable-dev-shm-usage")?;
        caps.add_arg(&format!("--user-agent={}", cfg.user_agent))?;
        if !cfg.headers.is_empty() {
            debug!("static headers apply to the http engine only");
        }

        let driver = WebDriver::new(cfg.webdriver_url.as_str(), caps)
            .await
            .with_context(|| format!("connecting to WebDriver at {}", cfg.webdriver_url))?;
        driver
            .set_page_load_timeout(cfg.navigation_timeout())
            .await
            .context("setting page load timeout")?;
        info!(url = %cfg.webdriver_url, "browser session started");
        Ok(Self {
            driver: tokio::sync::Mutex::new(Some(driver)),
            idle_limit: cfg.navigation_timeout(),
        })
    }
}

/// Wait until the document is complete and no resource has been requested
/// for [`IDLE_WINDOW`]. Gives up quietly after `limit`.
async fn wait_for_network_idle(driver: &WebDriver, limit: Duration) -> Result<()> {
    let deadline = Instant::now() + limit;
    let mut last_count = None;
    let mut quiet_since = Instant::now();
    loop {
        let state: String = driver.execute(READY_STATE, Vec::new()).await?.convert()?;
        let count: u64 = driver.execute(RESOURCE_COUNT, Vec::new()).await?.convert()?;
        let now = Instant::now();
        if state == "complete" && last_count == Some(count) {
            if now.duration_since(quiet_since) >= IDLE_WINDOW {
                return Ok(());
            }
        } else {
            last_count = Some(count);
            quiet_since = now;
        }
        if now >= deadline {
            debug!(?limit, "network did not go idle; continuing");
            return Ok(());
        }
        tokio::time::sleep(IDLE_POLL).await;
    }
}

#[async_trait]
impl Renderer for WebDriverRenderer {
    async fn navigate(&self, url: &str) -> Result<()> {
        let guard = self.driver.lock().await;
        let driver = guard.as_ref().ok_or_else(|| anyhow!("browser session is closed"))?;
        driver.goto(url).await.with_context(|| format!("navigating to {url}"))?;
        Ok(())
    }

    async fn settle(&self, wait: WaitPolicy) -> Result<()> {
        let WaitPolicy::Settle(delay) = wait else {
            return Ok(());
        };
        let guard = self.driver.lock().await;
        let driver = guard.as_ref().ok_or_else(|| anyhow!("browser session is closed"))?;
        wait_for_network_idle(driver, self.idle_limit).await?;
        driver.execute(SCROLL_TO_BOTTOM, Vec::new()).await.context("scrolling page")?;
        debug!(?delay, "settling SPA page");
        tokio::time::sleep(delay).await;
        Ok(())
    }

    async fn content(&self) -> Result<RenderedPage> {
        let guard = self.driver.lock().await;
        let driver = guard.as_ref().ok_or_else(|| anyhow!("browser session is closed"))?;
        let url = driver.current_url().await.context("reading page url")?.to_string();
        let html = driver.source().await.context("reading page source")?;
        Ok(RenderedPage { url, html })
    }

    async fn close(&self) -> Result<()> {
        if let Some(driver) = self.driver.lock().await.take() {
            driver.quit().await.context("closing browser session")?;
            info!("browser session closed");
        }
        Ok(())
    }
}

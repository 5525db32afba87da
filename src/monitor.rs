use anyhow::{anyhow, Context, Result};
use scraper::Html;
use std::fmt;
use std::sync::Arc;
use tracing::{info, info_span, warn, Instrument};

use crate::config::{AppConfig, BrowserConfig, ExtractionConfig, RendererKind, SiteConfig};
use crate::db::Database;
use crate::extract::{Extraction, Extractor};
use crate::filter::notify_new_items;
use crate::mapping::{local_timestamp, startup_notification};
use crate::notify::{Delivery, DiscordWebhook, Notifier};
use crate::render::{connect_renderer, RenderedPage, Renderer, WaitPolicy};
use crate::storage::HistoryStore;

/// Stage a site pass was in. Used to report where a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SitePhase {
    Rendering,
    Extracting,
    Notifying,
}

impl fmt::Display for SitePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SitePhase::Rendering => "rendering",
            SitePhase::Extracting => "extracting",
            SitePhase::Notifying => "notifying",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteStats {
    pub extracted: usize,
    pub dropped: usize,
    pub notified: usize,
    pub already_seen: usize,
    pub failed_deliveries: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteOutcome {
    Done(SiteStats),
    Failed { phase: SitePhase, error: String },
}

#[derive(Debug, Clone)]
pub struct SiteReport {
    pub site: String,
    pub outcome: SiteOutcome,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub sites: Vec<SiteReport>,
}

impl RunSummary {
    pub fn failed_sites(&self) -> usize {
        self.sites.iter().filter(|s| matches!(s.outcome, SiteOutcome::Failed { .. })).count()
    }

    pub fn notified(&self) -> usize {
        self.sites
            .iter()
            .map(|s| match &s.outcome { SiteOutcome::Done(st) => st.notified, _ => 0 })
            .sum()
    }
}

/// One batch pass over the configured sites: render, extract, diff, push.
pub struct Monitor {
    config: AppConfig,
    renderer: Arc<dyn Renderer>,
    history: Arc<dyn HistoryStore>,
    notifier: Arc<dyn Notifier>,
}

impl Monitor {
    pub fn new(
        config: AppConfig,
        renderer: Arc<dyn Renderer>,
        history: Arc<dyn HistoryStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self { config, renderer, history, notifier }
    }

    /// Wire up the sqlite history, the configured renderer and the webhook.
    pub async fn from_config(config: AppConfig) -> Result<Self> {
        let db = Database::open(&config.database).await?;
        let notifier = DiscordWebhook::from_config(&config.notifier)?;
        let has_spa = config.sites.iter().any(|s| s.is_spa);
        if has_spa && config.browser.engine == RendererKind::Http {
            warn!("SPA sites need [browser] engine = \"webdriver\"; http runs no scripts");
        }
        let renderer = connect_renderer(&config.browser).await?;
        Ok(Self::new(config, renderer, Arc::new(db), Arc::new(notifier)))
    }

    pub fn config(&self) -> &AppConfig { &self.config }

    /// Visit every site in configuration order. Site failures are logged and
    /// reported, never propagated.
    pub async fn run(&self) -> RunSummary {
        if self.config.notifier.announce_startup && self.notifier.is_configured() {
            self.announce_startup().await;
        }
        let mut summary = RunSummary::default();
        for site in &self.config.sites {
            let span = info_span!("site", name = %site.name);
            let report = self.run_site(site).instrument(span).await;
            summary.sites.push(report);
        }
        info!(
            sites = summary.sites.len(),
            failed = summary.failed_sites(),
            notified = summary.notified(),
            "run finished"
        );
        summary
    }

    pub async fn run_site(&self, site: &SiteConfig) -> SiteReport {
        let mut phase = SitePhase::Rendering;
        let outcome = match self.process_site(site, &mut phase).await {
            Ok(stats) => {
                info!(
                    extracted = stats.extracted,
                    dropped = stats.dropped,
                    new = stats.notified,
                    "{} done",
                    site.name
                );
                SiteOutcome::Done(stats)
            }
            Err(e) => {
                warn!("error scraping {} while {}: {:#}", site.name, phase, e);
                SiteOutcome::Failed { phase, error: format!("{e:#}") }
            }
        };
        SiteReport { site: site.name.clone(), outcome }
    }

    async fn process_site(&self, site: &SiteConfig, phase: &mut SitePhase) -> Result<SiteStats> {
        *phase = SitePhase::Rendering;
        info!("scraping: {} ({})", site.name, site.url);
        let page = fetch_page(&self.config.browser, self.renderer.as_ref(), site).await?;

        *phase = SitePhase::Extracting;
        let extraction = extract_page(&self.config.extraction, site, &page)?;

        *phase = SitePhase::Notifying;
        let report = notify_new_items(
            &extraction.items,
            self.history.as_ref(),
            self.notifier.as_ref(),
            &self.config.notifier,
        )
        .await?;

        Ok(SiteStats {
            extracted: extraction.items.len(),
            dropped: extraction.dropped.len(),
            notified: report.notified.len(),
            already_seen: report.already_seen,
            failed_deliveries: report.failed_deliveries,
        })
    }

    /// Render and extract one site without touching history or the webhook.
    pub async fn check(&self, site_name: &str) -> Result<Extraction> {
        check_site(&self.config, self.renderer.as_ref(), site_name).await
    }

    /// Release the renderer's page. Call once when done with the monitor.
    pub async fn shutdown(&self) {
        if let Err(e) = self.renderer.close().await {
            warn!("closing renderer: {e:#}");
        }
    }

    async fn announce_startup(&self) {
        let message = startup_notification(&self.config.notifier, &local_timestamp());
        match self.notifier.notify(&message).await {
            Ok(Delivery::Sent) => info!("startup notification sent"),
            Ok(Delivery::Rejected { status, body }) => {
                warn!(status, %body, "startup notification rejected")
            }
            Err(e) => warn!("startup notification failed: {e:#}"),
        }
    }
}

pub async fn check_site(
    config: &AppConfig,
    renderer: &dyn Renderer,
    site_name: &str,
) -> Result<Extraction> {
    let site = config
        .site(site_name)
        .ok_or_else(|| anyhow!("no site named {site_name} in configuration"))?;
    let page = fetch_page(&config.browser, renderer, site).await?;
    extract_page(&config.extraction, site, &page)
}

/// Navigate, settle, read. The timeout bounds navigation only; the settle
/// wait runs outside it.
async fn fetch_page(
    browser: &BrowserConfig,
    renderer: &dyn Renderer,
    site: &SiteConfig,
) -> Result<RenderedPage> {
    let timeout = browser.navigation_timeout();
    tokio::time::timeout(timeout, renderer.navigate(&site.url))
        .await
        .map_err(|_| anyhow!("navigation timed out after {:?}", timeout))?
        .with_context(|| format!("rendering {}", site.url))?;
    renderer
        .settle(WaitPolicy::for_site(site, browser))
        .await
        .with_context(|| format!("waiting for {} to settle", site.url))?;
    renderer.content().await.with_context(|| format!("reading {}", site.url))
}

// Parsed documents are !Send; keep them out of async fns.
fn extract_page(
    rules: &ExtractionConfig,
    site: &SiteConfig,
    page: &RenderedPage,
) -> Result<Extraction> {
    let extractor = Extractor::new(site, rules)?;
    let document = Html::parse_document(&page.html);
    Ok(extractor.extract(&document))
}

//! Change detection against history, and delivery order.
//!
//! Listing pages are newest-first, so items are walked in reverse: the oldest
//! unseen item is pushed first. Each item is checked and recorded on its own,
//! so an interrupted run leaves history matching exactly what was sent.

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::NotifierConfig;
use crate::mapping::{local_timestamp, notification_from_item};
use crate::notify::{Delivery, Notifier};
use crate::storage::HistoryStore;
use crate::types::Item;

#[derive(Debug, Clone, Default)]
pub struct FilterReport {
    /// New items, in the order they were pushed.
    pub notified: Vec<Item>,
    pub already_seen: usize,
    /// Deliveries that failed. These items are still recorded in history.
    pub failed_deliveries: usize,
}

pub async fn notify_new_items<H, N>(
    items: &[Item],
    history: &H,
    notifier: &N,
    identity: &NotifierConfig,
) -> Result<FilterReport>
where
    H: HistoryStore + ?Sized,
    N: Notifier + ?Sized,
{
    let mut report = FilterReport::default();
    for item in items.iter().rev() {
        let seen = history
            .exists(&item.link)
            .await
            .with_context(|| format!("checking history for {}", item.link))?;
        if seen {
            report.already_seen += 1;
            continue;
        }

        let message = notification_from_item(item, identity, &local_timestamp());
        match notifier.notify(&message).await {
            Ok(Delivery::Sent) => info!(site = %item.site_name, "pushed: {}", item.title),
            Ok(Delivery::Rejected { status, body }) => {
                report.failed_deliveries += 1;
                warn!(site = %item.site_name, status, %body, "push rejected: {}", item.title);
            }
            Err(e) => {
                report.failed_deliveries += 1;
                warn!(site = %item.site_name, "push failed: {}: {e:#}", item.title);
            }
        }

        // Recorded whatever the delivery outcome; failed pushes are not retried.
        history
            .insert_if_absent(&item.site_name, &item.link, &item.title)
            .await
            .with_context(|| format!("recording history for {}", item.link))?;
        report.notified.push(item.clone());
    }
    Ok(report)
}

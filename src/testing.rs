//! In-memory stand-ins for the I/O seams, used by unit tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::notify::{Delivery, Notification, Notifier};
use crate::render::{RenderedPage, Renderer, WaitPolicy};
use crate::storage::HistoryStore;
use crate::types::Item;

pub(crate) fn item(site: &str, title: &str) -> Item {
    Item {
        site_name: site.to_string(),
        title: title.to_string(),
        link: format!("https://s.test/{title}"),
        image: None,
    }
}

#[derive(Default)]
pub(crate) struct MemoryHistory {
    rows: Mutex<Vec<(String, String)>>,
}

impl MemoryHistory {
    pub(crate) fn with_urls(urls: &[&str]) -> Self {
        let rows = urls.iter().map(|u| ("seed".to_string(), u.to_string())).collect();
        Self { rows: Mutex::new(rows) }
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.rows.lock().unwrap().iter().map(|(_, u)| u.clone()).collect()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistory {
    async fn exists(&self, url: &str) -> Result<bool> {
        Ok(self.rows.lock().unwrap().iter().any(|(_, u)| u == url))
    }

    async fn insert_if_absent(&self, site_name: &str, url: &str, _title: &str) -> Result<bool> {
        let mut rows = self.rows.lock().unwrap();
        if rows.iter().any(|(_, u)| u == url) {
            return Ok(false);
        }
        rows.push((site_name.to_string(), url.to_string()));
        Ok(true)
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    reject_with: Option<u16>,
    unconfigured: bool,
}

impl RecordingNotifier {
    pub(crate) fn rejecting(status: u16) -> Self {
        Self { reject_with: Some(status), ..Self::default() }
    }

    /// Reports no destination, like a webhook whose env var is unset.
    pub(crate) fn unconfigured() -> Self {
        Self { unconfigured: true, ..Self::default() }
    }

    pub(crate) fn titles(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|n| n.title.clone()).collect()
    }

    pub(crate) fn messages(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn is_configured(&self) -> bool {
        !self.unconfigured
    }

    async fn notify(&self, message: &Notification) -> Result<Delivery> {
        self.sent.lock().unwrap().push(message.clone());
        Ok(match self.reject_with {
            Some(status) => Delivery::Rejected { status, body: "rejected".to_string() },
            None => Delivery::Sent,
        })
    }
}

/// Serves canned HTML per URL; unknown URLs fail like a navigation error.
/// `Settle` waits really sleep, so they show up on a paused clock.
#[derive(Default)]
pub(crate) struct StaticRenderer {
    pages: Mutex<HashMap<String, String>>,
    current: Mutex<Option<String>>,
    visited: Mutex<Vec<String>>,
    waits: Mutex<Vec<WaitPolicy>>,
}

impl StaticRenderer {
    pub(crate) fn page(self, url: &str, html: &str) -> Self {
        self.set_page(url, html);
        self
    }

    pub(crate) fn set_page(&self, url: &str, html: &str) {
        self.pages.lock().unwrap().insert(url.to_string(), html.to_string());
    }

    pub(crate) fn visited(&self) -> Vec<String> {
        self.visited.lock().unwrap().clone()
    }

    pub(crate) fn waits(&self) -> Vec<WaitPolicy> {
        self.waits.lock().unwrap().clone()
    }
}

#[async_trait]
impl Renderer for StaticRenderer {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.visited.lock().unwrap().push(url.to_string());
        if !self.pages.lock().unwrap().contains_key(url) {
            return Err(anyhow!("navigation failed: {url}"));
        }
        *self.current.lock().unwrap() = Some(url.to_string());
        Ok(())
    }

    async fn settle(&self, wait: WaitPolicy) -> Result<()> {
        self.waits.lock().unwrap().push(wait);
        if let WaitPolicy::Settle(delay) = wait {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn content(&self) -> Result<RenderedPage> {
        let url = self.current.lock().unwrap().clone().ok_or_else(|| anyhow!("no page loaded"))?;
        let html = self.pages.lock().unwrap().get(&url).cloned().unwrap_or_default();
        Ok(RenderedPage { url, html })
    }
}

/// Answers one HTTP request on a loopback port with `status` and `body`.
/// Returns the URL to request.
pub(crate) async fn serve_once(status: &str, body: &str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/", listener.local_addr().unwrap());
    let mut response = format!("HTTP/1.1 {status}\r\nConnection: close\r\n");
    if !body.is_empty() {
        response.push_str(&format!(
            "Content-Type: text/html\r\nContent-Length: {}\r\n",
            body.len()
        ));
    }
    response.push_str("\r\n");
    response.push_str(body);

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;
        socket.write_all(response.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
    });
    url
}

// Reads headers and any Content-Length body so the client sees a clean close.
async fn read_request(socket: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
        let body_len = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buf.len() >= end + 4 + body_len {
            return;
        }
    }
}

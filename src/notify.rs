use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use rand::Rng;
use serde::Serialize;
use tracing::error;

use crate::config::NotifierConfig;

/// One outbound message, independent of the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub title: String,
    pub url: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub footer: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Transport failures are errors; a non-2xx answer is `Delivery::Rejected`.
    async fn notify(&self, message: &Notification) -> Result<Delivery>;

    /// Whether there is a destination to deliver to at all.
    fn is_configured(&self) -> bool {
        true
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    username: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    avatar_url: Option<&'a str>,
    embeds: [Embed<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Embed<'a> {
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<EmbedImage<'a>>,
    footer: EmbedFooter<'a>,
}

#[derive(Debug, Serialize)]
struct EmbedImage<'a> { url: &'a str }

#[derive(Debug, Serialize)]
struct EmbedFooter<'a> { text: &'a str }

fn payload(message: &Notification, color: u32) -> WebhookPayload<'_> {
    WebhookPayload {
        username: &message.display_name,
        avatar_url: message.avatar_url.as_deref(),
        embeds: [Embed {
            title: &message.title,
            url: message.url.as_deref(),
            description: message.description.as_deref(),
            color,
            image: message.image_url.as_deref().map(|url| EmbedImage { url }),
            footer: EmbedFooter { text: &message.footer },
        }],
    }
}

/// Discord-style webhook. The endpoint comes from an environment variable.
pub struct DiscordWebhook {
    client: reqwest::Client,
    endpoint: Option<String>,
    env_name: String,
}

impl DiscordWebhook {
    pub fn from_config(cfg: &NotifierConfig) -> Result<Self> {
        let endpoint = std::env::var(&cfg.webhook_url_env).ok().filter(|v| !v.trim().is_empty());
        if endpoint.is_none() {
            error!("{} is not set; notifications will fail", cfg.webhook_url_env);
        }
        Self::with_endpoint(endpoint, &cfg.webhook_url_env)
    }

    pub fn with_endpoint(endpoint: Option<String>, env_name: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("failed to create webhook client")?;
        Ok(Self { client, endpoint, env_name: env_name.to_string() })
    }
}

#[async_trait]
impl Notifier for DiscordWebhook {
    fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }

    async fn notify(&self, message: &Notification) -> Result<Delivery> {
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or_else(|| anyhow!("{} is not set", self.env_name))?;
        let color = rand::thread_rng().gen_range(0..=0xFF_FFFF);
        let response = self
            .client
            .post(endpoint)
            .json(&payload(message, color))
            .send()
            .await
            .context("webhook request failed")?;
        let status = response.status();
        if status.is_success() {
            return Ok(Delivery::Sent);
        }
        let body = response.text().await.unwrap_or_default();
        Ok(Delivery::Rejected { status: status.as_u16(), body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::serve_once;

    fn message() -> Notification {
        Notification {
            display_name: "Watcher".into(),
            avatar_url: None,
            title: "A".into(),
            url: Some("https://s.test/a".into()),
            description: None,
            image_url: Some("https://s.test/a.jpg".into()),
            footer: "From demo • 2024-01-01 00:00:00".into(),
        }
    }

    #[test]
    fn payload_shape() {
        let json = serde_json::to_value(payload(&message(), 0x123456)).unwrap();
        assert_eq!(json["username"], "Watcher");
        assert!(json.get("avatar_url").is_none());
        let embed = &json["embeds"][0];
        assert_eq!(embed["title"], "A");
        assert_eq!(embed["url"], "https://s.test/a");
        assert_eq!(embed["color"], 0x123456);
        assert_eq!(embed["image"]["url"], "https://s.test/a.jpg");
        assert_eq!(embed["footer"]["text"], "From demo • 2024-01-01 00:00:00");
        assert!(embed.get("description").is_none());
    }

    #[tokio::test]
    async fn missing_endpoint_is_an_error() {
        let hook = DiscordWebhook::with_endpoint(None, "SOME_HOOK").unwrap();
        assert!(!hook.is_configured());
        let err = hook.notify(&message()).await.unwrap_err();
        assert!(err.to_string().contains("SOME_HOOK"));
    }

    #[tokio::test]
    async fn accepted_push_is_sent() {
        let url = serve_once("204 No Content", "").await;
        let hook = DiscordWebhook::with_endpoint(Some(url), "SOME_HOOK").unwrap();
        assert!(hook.is_configured());

        let delivery = hook.notify(&message()).await.unwrap();

        assert_eq!(delivery, Delivery::Sent);
    }

    #[tokio::test]
    async fn server_error_is_rejected_with_body() {
        let url = serve_once("500 Internal Server Error", "rate limited").await;
        let hook = DiscordWebhook::with_endpoint(Some(url), "SOME_HOOK").unwrap();

        let delivery = hook.notify(&message()).await.unwrap();

        assert_eq!(delivery, Delivery::Rejected { status: 500, body: "rate limited".into() });
    }
}

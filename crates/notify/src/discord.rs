//! Discord webhook backend.
//!
//! Posts a JSON message matching the webhook schema (`content` field) to a
//! preconfigured webhook URL.

use serde::Serialize;

use crate::{NotifyError, SEND_TIMEOUT, check_status};

/// Webhook message payload.
#[derive(Serialize)]
struct WebhookMessage<'a> {
    content: &'a str,
}

/// Delivers notifications to a Discord webhook.
///
/// No `Debug` impl: the webhook URL is itself the credential.
pub struct DiscordNotifier {
    http: reqwest::Client,
    webhook_url: String,
}

impl DiscordNotifier {
    pub fn new(webhook_url: &str) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder().timeout(SEND_TIMEOUT).build()?;
        Ok(Self {
            http,
            webhook_url: webhook_url.to_string(),
        })
    }

    /// Posts one notification. The title rides along in the content as bold
    /// text, since the bare webhook schema has no title field.
    pub async fn send(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        let content = format!("**{title}**\n{body}");
        let resp = self
            .http
            .post(&self.webhook_url)
            .json(&WebhookMessage { content: &content })
            .send()
            .await?;

        check_status(resp).await?;
        tracing::debug!("Discord notification delivered");
        Ok(())
    }
}

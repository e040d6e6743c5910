//! ntfy push notification backend.
//!
//! Posts the body as plain text to `{base_url}/{topic}` with the title in
//! the `Title` header, per the ntfy publish API. Works against the public
//! instance or a self-hosted one.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};

use crate::{NotifyError, SEND_TIMEOUT, check_status, header_value};

/// The public ntfy instance, used when no base URL is configured.
pub const DEFAULT_NTFY_URL: &str = "https://ntfy.sh";

/// Delivers notifications to an ntfy topic.
///
/// No `Debug` impl: the bearer token must not appear in log or panic
/// output.
pub struct NtfyNotifier {
    http: reqwest::Client,
    topic_url: String,
    token: Option<String>,
}

impl NtfyNotifier {
    /// Creates a notifier posting to `topic` on `base_url`, with optional
    /// bearer-token authentication.
    pub fn new(base_url: &str, topic: &str, token: Option<String>) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder().timeout(SEND_TIMEOUT).build()?;
        Ok(Self {
            http,
            topic_url: format!("{}/{topic}", base_url.trim_end_matches('/')),
            token,
        })
    }

    /// Posts one notification. Single attempt, no retry.
    pub async fn send(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        let mut request = self
            .http
            .post(&self.topic_url)
            .header("Title", header_value(title)?)
            .header(CONTENT_TYPE, "text/plain; charset=utf-8")
            .body(body.to_string());

        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, header_value(&format!("Bearer {token}"))?);
        }

        check_status(request.send().await?).await?;
        tracing::debug!(url = %self.topic_url, "ntfy notification delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mock_server;

    #[tokio::test]
    async fn posts_title_header_and_plain_text_body() {
        let (url, mut requests) = mock_server(200).await;

        let notifier = NtfyNotifier::new(&url, "minecraft", None).unwrap();
        notifier
            .send("Minecraft Server", "Alice joined the server")
            .await
            .unwrap();

        let request = requests.recv().await.unwrap();
        assert!(request.starts_with("POST /minecraft "), "{request}");
        assert!(request.contains("title: Minecraft Server") || request.contains("Title: Minecraft Server"));
        assert!(request.contains("text/plain"));
        assert!(request.ends_with("Alice joined the server"));
        assert!(!request.to_ascii_lowercase().contains("authorization:"));
    }

    #[tokio::test]
    async fn sends_bearer_token_when_configured() {
        let (url, mut requests) = mock_server(200).await;

        let notifier = NtfyNotifier::new(&url, "minecraft", Some("s3cret".into())).unwrap();
        notifier.send("Subject", "body").await.unwrap();

        let request = requests.recv().await.unwrap();
        assert!(
            request.contains("authorization: Bearer s3cret")
                || request.contains("Authorization: Bearer s3cret"),
            "{request}"
        );
    }

    #[tokio::test]
    async fn trailing_slash_on_base_url_is_tolerated() {
        let (url, mut requests) = mock_server(200).await;

        let notifier = NtfyNotifier::new(&format!("{url}/"), "alerts", None).unwrap();
        notifier.send("Subject", "body").await.unwrap();

        let request = requests.recv().await.unwrap();
        assert!(request.starts_with("POST /alerts "), "{request}");
    }

    #[tokio::test]
    async fn non_2xx_response_is_an_error() {
        let (url, _requests) = mock_server(500).await;

        let notifier = NtfyNotifier::new(&url, "minecraft", None).unwrap();
        let err = notifier.send("Subject", "body").await.unwrap_err();

        assert!(matches!(err, NotifyError::Status { status: 500, .. }), "{err}");
    }

    #[tokio::test]
    async fn unsendable_title_is_a_config_error() {
        let notifier = NtfyNotifier::new("http://127.0.0.1:1", "t", None).unwrap();
        let err = notifier.send("bad\ntitle", "body").await.unwrap_err();
        assert!(matches!(err, NotifyError::InvalidConfig(_)), "{err}");
    }
}

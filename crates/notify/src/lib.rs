//! Notification delivery backends.
//!
//! One capability — `send(title, body)` — over a closed set of backends
//! selected once at startup. Delivery is best effort: a single attempt with
//! a bounded timeout and no retry; a failure is reported to the caller and
//! must not take anything else down.

use std::time::Duration;

mod discord;
mod ntfy;

pub use discord::DiscordNotifier;
pub use ntfy::{DEFAULT_NTFY_URL, NtfyNotifier};

/// Timeout applied to every delivery attempt so a hung endpoint cannot
/// wedge the caller.
pub(crate) const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from a notification delivery attempt.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid notifier configuration: {0}")]
    InvalidConfig(String),
}

/// The configured delivery backend. Selected once at startup; every event
/// goes through the same variant. Carries credentials, so no `Debug` impl.
pub enum Notifier {
    Ntfy(NtfyNotifier),
    Discord(DiscordNotifier),
}

impl Notifier {
    /// Delivers one notification with the given title and body.
    pub async fn send(&self, title: &str, body: &str) -> Result<(), NotifyError> {
        match self {
            Notifier::Ntfy(notifier) => notifier.send(title, body).await,
            Notifier::Discord(notifier) => notifier.send(title, body).await,
        }
    }
}

/// Builds a header value, rejecting text that cannot go on the wire.
pub(crate) fn header_value(value: &str) -> Result<reqwest::header::HeaderValue, NotifyError> {
    reqwest::header::HeaderValue::from_str(value)
        .map_err(|_| NotifyError::InvalidConfig(format!("value is not header-safe: {value:?}")))
}

/// Maps a non-2xx response to an error, draining the body for context.
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<(), NotifyError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(NotifyError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(())
}

#[cfg(any(test, feature = "test-util"))]
#[doc(hidden)]
pub mod testing {
    //! Minimal mock HTTP server for backend and dispatcher tests.

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    /// Starts a mock HTTP server answering each request with `status` and
    /// forwarding the raw request text on the returned channel.
    pub async fn mock_server(status: u16) -> (String, mpsc::UnboundedReceiver<String>) {
        mock_server_with(vec![status]).await
    }

    /// Like [`mock_server`], but answers the n-th request with the n-th
    /// status (repeating the last one after that).
    pub async fn mock_server_with(
        statuses: Vec<u16>,
    ) -> (String, mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let url = format!("http://127.0.0.1:{port}");
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut served = 0usize;
            while let Ok((mut stream, _)) = listener.accept().await {
                let request = read_request(&mut stream).await;
                let status = *statuses.get(served).or(statuses.last()).unwrap_or(&200);
                served += 1;

                let resp = format!(
                    "HTTP/1.1 {status} Mock\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                );
                let _ = stream.write_all(resp.as_bytes()).await;
                let _ = stream.shutdown().await;

                if tx.send(request).is_err() {
                    break;
                }
            }
        });

        (url, rx)
    }

    /// Reads one HTTP request: headers, then as many body bytes as the
    /// Content-Length header announces.
    async fn read_request(stream: &mut tokio::net::TcpStream) -> String {
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];

        loop {
            let Ok(n) = stream.read(&mut buf).await else {
                break;
            };
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);

            let text = String::from_utf8_lossy(&raw);
            if let Some(header_end) = text.find("\r\n\r\n") {
                let content_length = text
                    .lines()
                    .find_map(|line| {
                        let lower = line.to_ascii_lowercase();
                        let value = lower.strip_prefix("content-length:")?;
                        value.trim().parse::<usize>().ok()
                    })
                    .unwrap_or(0);
                if raw.len() >= header_end + 4 + content_length {
                    break;
                }
            }
        }

        String::from_utf8_lossy(&raw).to_string()
    }
}

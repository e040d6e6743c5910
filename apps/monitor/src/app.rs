//! Dispatch loop: follow the log, classify lines, deliver notifications.
//!
//! Failure isolation lives here: a delivery failure is logged and the loop
//! moves on to the next line, while a fatal follower error propagates out
//! and ends the process — without a readable log there is nothing to do.

use blockwatch_events::{Event, classify};
use blockwatch_follow::{FollowError, LogFollower};
use blockwatch_notify::{DiscordNotifier, Notifier, NotifyError, NtfyNotifier};

use crate::config::{Backend, Config};

/// Builds the delivery backend selected by the configuration.
pub fn build_notifier(config: &Config) -> Result<Notifier, NotifyError> {
    Ok(match &config.backend {
        Backend::Ntfy { url, topic, token } => {
            Notifier::Ntfy(NtfyNotifier::new(url, topic, token.clone())?)
        }
        Backend::Discord { webhook_url } => {
            Notifier::Discord(DiscordNotifier::new(webhook_url)?)
        }
    })
}

/// Runs the dispatch loop until the follower is cancelled or fails
/// permanently.
pub async fn run(
    config: &Config,
    notifier: &Notifier,
    mut follower: LogFollower,
) -> Result<(), FollowError> {
    while let Some(line) = follower.next_line().await? {
        let Some(event) = classify(&line) else {
            continue;
        };
        let kind = event.kind();

        if !config.enabled(kind) {
            tracing::debug!(player = event.player(), ?kind, "event suppressed by toggle");
            continue;
        }

        let body = format_body(&event);
        match notifier.send(&config.subject, &body).await {
            Ok(()) => {
                tracing::info!(player = event.player(), ?kind, "notification sent");
            }
            Err(e) => {
                // Best effort only: log and keep processing lines.
                tracing::error!(
                    player = event.player(),
                    ?kind,
                    error = %e,
                    "failed to send notification"
                );
            }
        }
    }

    Ok(())
}

/// Human-readable notification body for an event.
fn format_body(event: &Event) -> String {
    match event {
        Event::Join { player } => format!("{player} joined the server"),
        Event::Leave { player } => format!("{player} left the server"),
        Event::WhitelistFailure { player } => {
            format!("{player} failed to join (not whitelisted)")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use blockwatch_notify::testing::mock_server_with as mock_ntfy;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    const FAST_POLL: Duration = Duration::from_millis(10);

    fn append(path: &Path, data: &str) {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        file.write_all(data.as_bytes()).unwrap();
    }

    fn test_config(log_file: PathBuf, ntfy_url: &str) -> Config {
        Config {
            log_file,
            subject: "My Awesome Minecraft Server".into(),
            backend: Backend::Ntfy {
                url: ntfy_url.into(),
                topic: "mc".into(),
                token: None,
            },
            notify_join: true,
            notify_leave: true,
            notify_whitelist: true,
        }
    }

    async fn recv_request(requests: &mut mpsc::UnboundedReceiver<String>) -> String {
        tokio::time::timeout(Duration::from_secs(5), requests.recv())
            .await
            .expect("timed out waiting for a notification request")
            .expect("mock server stopped")
    }

    #[tokio::test]
    async fn join_line_triggers_exactly_one_ntfy_notification() {
        let tmp = tempfile::tempdir().unwrap();
        let log = tmp.path().join("latest.log");
        append(&log, "");

        let (url, mut requests) = mock_ntfy(vec![200]).await;
        let config = test_config(log.clone(), &url);
        let notifier = build_notifier(&config).unwrap();

        let cancel = CancellationToken::new();
        let follower = LogFollower::new(log.clone(), cancel.clone()).with_poll_interval(FAST_POLL);
        let loop_task = {
            let config = config.clone();
            tokio::spawn(async move { run(&config, &notifier, follower).await })
        };

        // Give the follower a moment to seek to the end.
        tokio::time::sleep(Duration::from_millis(100)).await;
        append(&log, "[Server] Alice joined the game\n");

        let request = recv_request(&mut requests).await;
        assert!(request.starts_with("POST /mc "), "{request}");
        assert!(request.contains("My Awesome Minecraft Server"));
        assert!(request.contains("Alice joined the server"));

        // No second delivery for a single line.
        let extra = tokio::time::timeout(Duration::from_millis(300), requests.recv()).await;
        assert!(extra.is_err(), "unexpected extra request: {extra:?}");

        cancel.cancel();
        loop_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn delivery_failure_does_not_stop_the_loop() {
        let tmp = tempfile::tempdir().unwrap();
        let log = tmp.path().join("latest.log");
        append(&log, "");

        // First delivery fails with a 500, the next succeeds.
        let (url, mut requests) = mock_ntfy(vec![500, 200]).await;
        let config = test_config(log.clone(), &url);
        let notifier = build_notifier(&config).unwrap();

        let cancel = CancellationToken::new();
        let follower = LogFollower::new(log.clone(), cancel.clone()).with_poll_interval(FAST_POLL);
        let loop_task = {
            let config = config.clone();
            tokio::spawn(async move { run(&config, &notifier, follower).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        append(&log, "[Server thread/INFO]: Alice joined the game\n");
        let first = recv_request(&mut requests).await;
        assert!(first.contains("Alice joined the server"));

        append(&log, "[Server thread/INFO]: Bob joined the game\n");
        let second = recv_request(&mut requests).await;
        assert!(second.contains("Bob joined the server"));

        cancel.cancel();
        loop_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn disabled_toggle_suppresses_delivery() {
        let tmp = tempfile::tempdir().unwrap();
        let log = tmp.path().join("latest.log");
        append(&log, "");

        let (url, mut requests) = mock_ntfy(vec![200]).await;
        let mut config = test_config(log.clone(), &url);
        config.notify_leave = false;
        let notifier = build_notifier(&config).unwrap();

        let cancel = CancellationToken::new();
        let follower = LogFollower::new(log.clone(), cancel.clone()).with_poll_interval(FAST_POLL);
        let loop_task = {
            let config = config.clone();
            tokio::spawn(async move { run(&config, &notifier, follower).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        // The leave is classified but must not be delivered; the join after
        // it must be the first request the endpoint sees.
        append(&log, "[Server thread/INFO]: Alice left the game\n");
        append(&log, "[Server thread/INFO]: Bob joined the game\n");

        let first = recv_request(&mut requests).await;
        assert!(first.contains("Bob joined the server"), "{first}");
        assert!(!first.contains("Alice"));

        cancel.cancel();
        loop_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn whitelist_failure_body_names_the_player() {
        let tmp = tempfile::tempdir().unwrap();
        let log = tmp.path().join("latest.log");
        append(&log, "");

        let (url, mut requests) = mock_ntfy(vec![200]).await;
        let config = test_config(log.clone(), &url);
        let notifier = build_notifier(&config).unwrap();

        let cancel = CancellationToken::new();
        let follower = LogFollower::new(log.clone(), cancel.clone()).with_poll_interval(FAST_POLL);
        let loop_task = {
            let config = config.clone();
            tokio::spawn(async move { run(&config, &notifier, follower).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        append(
            &log,
            "[Server thread/INFO]: Mallory was kicked due to: \
             You are not white-listed on this server!\n",
        );

        let request = recv_request(&mut requests).await;
        assert!(
            request.contains("Mallory failed to join (not whitelisted)"),
            "{request}"
        );

        cancel.cancel();
        loop_task.await.unwrap().unwrap();
    }

    #[test]
    fn bodies_embed_player_and_event_kind() {
        assert_eq!(
            format_body(&Event::Join {
                player: "Alice".into()
            }),
            "Alice joined the server"
        );
        assert_eq!(
            format_body(&Event::Leave {
                player: "Bob".into()
            }),
            "Bob left the server"
        );
        assert_eq!(
            format_body(&Event::WhitelistFailure {
                player: "Eve".into()
            }),
            "Eve failed to join (not whitelisted)"
        );
    }
}

//! Environment-derived configuration.
//!
//! Everything is read once at startup and treated as immutable for the
//! process lifetime. Any problem here is fatal: the process refuses to
//! start rather than run half-configured.

use std::path::PathBuf;

use blockwatch_events::EventKind;
use blockwatch_notify::DEFAULT_NTFY_URL;

/// Fatal configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("{0} must not be empty")]
    EmptyVar(&'static str),

    #[error("invalid NOTIFY_SERVICE {0:?}: must be \"ntfy\" or \"discord\"")]
    InvalidService(String),

    #[error("{var} must be \"true\" or \"false\", got {value:?}")]
    InvalidToggle { var: &'static str, value: String },

    #[error("{var} does not look like a valid URL: {value:?}")]
    InvalidUrl { var: &'static str, value: String },
}

/// The selected delivery backend and its parameters. Only the variables of
/// the selected backend are read; the other backend's are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Ntfy {
        url: String,
        topic: String,
        token: Option<String>,
    },
    Discord {
        webhook_url: String,
    },
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Ntfy { .. } => "ntfy",
            Backend::Discord { .. } => "discord",
        }
    }
}

/// Immutable process-wide configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_file: PathBuf,
    pub subject: String,
    pub backend: Backend,
    pub notify_join: bool,
    pub notify_leave: bool,
    pub notify_whitelist: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&|key| std::env::var(key).ok())
    }

    /// Builds a configuration from a variable lookup. Split out from
    /// [`from_env`](Config::from_env) so tests do not have to mutate the
    /// process environment.
    pub fn from_vars(var: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let log_file =
            non_empty(var, "LOG_FILE")?.unwrap_or_else(|| "/logs/latest.log".to_string());
        let subject =
            non_empty(var, "NOTIFY_SUBJECT")?.unwrap_or_else(|| "Minecraft Server".to_string());

        let service = var("NOTIFY_SERVICE")
            .unwrap_or_else(|| "ntfy".to_string())
            .to_lowercase();
        let backend = match service.as_str() {
            "ntfy" => {
                let topic =
                    non_empty(var, "NTFY_TOPIC")?.ok_or(ConfigError::MissingVar("NTFY_TOPIC"))?;
                let url =
                    non_empty(var, "NTFY_URL")?.unwrap_or_else(|| DEFAULT_NTFY_URL.to_string());
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(ConfigError::InvalidUrl {
                        var: "NTFY_URL",
                        value: url,
                    });
                }
                Backend::Ntfy {
                    url,
                    topic,
                    token: var("NTFY_TOKEN").filter(|t| !t.is_empty()),
                }
            }
            "discord" => {
                let webhook_url = non_empty(var, "DISCORD_WEBHOOK_URL")?
                    .ok_or(ConfigError::MissingVar("DISCORD_WEBHOOK_URL"))?;
                if !webhook_url.starts_with("https://discord.com/api/webhooks/") {
                    return Err(ConfigError::InvalidUrl {
                        var: "DISCORD_WEBHOOK_URL",
                        value: webhook_url,
                    });
                }
                Backend::Discord { webhook_url }
            }
            _ => return Err(ConfigError::InvalidService(service)),
        };

        Ok(Self {
            log_file: PathBuf::from(log_file),
            subject,
            backend,
            notify_join: toggle(var, "NOTIFY_JOIN")?,
            notify_leave: toggle(var, "NOTIFY_LEAVE")?,
            notify_whitelist: toggle(var, "NOTIFY_WHITELIST")?,
        })
    }

    /// Returns whether notifications for this event category are enabled.
    pub fn enabled(&self, kind: EventKind) -> bool {
        match kind {
            EventKind::Join => self.notify_join,
            EventKind::Leave => self.notify_leave,
            EventKind::WhitelistFailure => self.notify_whitelist,
        }
    }
}

fn non_empty(
    var: &dyn Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<String>, ConfigError> {
    match var(name) {
        None => Ok(None),
        Some(value) if value.trim().is_empty() => Err(ConfigError::EmptyVar(name)),
        Some(value) => Ok(Some(value)),
    }
}

/// Toggles default to enabled; anything other than `true`/`false`
/// (case-insensitive) is a fatal error rather than a silent guess.
fn toggle(var: &dyn Fn(&str) -> Option<String>, name: &'static str) -> Result<bool, ConfigError> {
    match var(name) {
        None => Ok(true),
        Some(value) => match value.to_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(ConfigError::InvalidToggle { var: name, value }),
        },
    }
}

//! Classification of Minecraft server log lines into player events.
//!
//! [`classify`] is a pure function over the line text: the same line always
//! yields the same result. Most log lines are unrelated chatter and yield
//! `None`, which is the expected case, not an error.

use std::sync::LazyLock;

use regex::Regex;

static WHITELIST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\w+) was kicked due to: You are not white-listed on this server!").unwrap()
});
static JOIN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\w+) joined the game").unwrap());
static LEAVE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\w+) left the game").unwrap());

/// Player activity detected in a single log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Join { player: String },
    Leave { player: String },
    WhitelistFailure { player: String },
}

/// Event categories, used for per-category notification toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Join,
    Leave,
    WhitelistFailure,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Join { .. } => EventKind::Join,
            Event::Leave { .. } => EventKind::Leave,
            Event::WhitelistFailure { .. } => EventKind::WhitelistFailure,
        }
    }

    pub fn player(&self) -> &str {
        match self {
            Event::Join { player }
            | Event::Leave { player }
            | Event::WhitelistFailure { player } => player,
        }
    }
}

/// Classifies a log line into at most one player event.
///
/// Matching is case-sensitive. Priority is fixed: whitelist rejection is
/// checked before join and leave, so a rejection line can never be mistaken
/// for an ordinary leave. The first match wins; a line never produces more
/// than one event.
pub fn classify(line: &str) -> Option<Event> {
    if let Some(caps) = WHITELIST_RE.captures(line) {
        return Some(Event::WhitelistFailure {
            player: caps[1].to_string(),
        });
    }
    if let Some(caps) = JOIN_RE.captures(line) {
        return Some(Event::Join {
            player: caps[1].to_string(),
        });
    }
    if let Some(caps) = LEAVE_RE.captures(line) {
        return Some(Event::Leave {
            player: caps[1].to_string(),
        });
    }
    None
}

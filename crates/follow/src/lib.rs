//! Follow a live-growing log file, `tail -F` style.
//!
//! [`LogFollower`] emits complete lines appended to a file after following
//! begins. It survives rotation (the file replaced at the same path),
//! truncation, and the file not existing yet, without re-emitting a line
//! that was already delivered.

mod follower;

pub use follower::{DEFAULT_POLL_INTERVAL, DEFAULT_RETRY_BUDGET, FollowError, LogFollower};

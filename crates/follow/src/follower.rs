//! Poll-based log file follower.
//!
//! The follower is an explicit state machine:
//!
//! - `Reopening` — the file is not open; try to open it on every poll.
//! - `Following` — an open handle is being drained of appended lines.
//! - `Backoff` — a transient I/O error occurred; wait one poll interval
//!   before resuming.
//!
//! Recovery policy: when the file identity changes under us (rotation) or
//! the file shrinks below the read cursor (truncation), the old handle is
//! drained first, then the path is reopened and read from the beginning of
//! the replacement file. A rotated-in file is new, so everything in it
//! postdates the rotation: nothing is emitted twice and nothing is lost.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

/// Default delay between file-growth checks when the file is idle.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default budget for persistent I/O failures before giving up. Generous on
/// purpose: container volume mounts can take a while to settle.
pub const DEFAULT_RETRY_BUDGET: Duration = Duration::from_secs(300);

/// Errors produced while following a log file.
///
/// Transient failures are retried internally; only a failure that persists
/// past the retry budget surfaces here.
#[derive(Debug, thiserror::Error)]
pub enum FollowError {
    #[error("retry budget exhausted for {}: {source}", path.display())]
    RetriesExhausted {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Identifies a physical file so a replacement at the same path is detected.
///
/// On non-unix targets the identity is degenerate and rotation is detected
/// through truncation only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileIdentity {
    #[cfg(unix)]
    dev: u64,
    #[cfg(unix)]
    ino: u64,
}

fn identity_of(meta: &std::fs::Metadata) -> FileIdentity {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        FileIdentity {
            dev: meta.dev(),
            ino: meta.ino(),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = meta;
        FileIdentity {}
    }
}

/// An open handle plus the read cursor over it.
struct Cursor {
    reader: BufReader<File>,
    identity: FileIdentity,
    /// Bytes consumed from the file, including any buffered partial line.
    offset: u64,
    /// Trailing bytes of a line whose newline has not arrived yet.
    partial: Vec<u8>,
}

enum FollowState {
    Reopening {
        read_from_start: bool,
    },
    Following(Cursor),
    /// Waiting out a transient failure. Carries everything needed to resume
    /// exactly where we left off; in particular the reopen mode, so a
    /// failure during the initial open still ends up seeking to
    /// end-of-file instead of replaying pre-existing lines.
    Backoff {
        cursor: Option<Cursor>,
        read_from_start: bool,
    },
}

enum Step {
    Emit(String),
    Continue,
    Pause,
}

enum FileStatus {
    Unchanged,
    Rotated,
    Truncated,
}

/// Tails a single log file, emitting newline-terminated lines appended
/// after following begins.
///
/// The constructor performs no I/O; the file is opened on the first call to
/// [`next_line`](LogFollower::next_line). A file that already exists at that
/// point is read from its end (no historic replay); a file that appears
/// later is read from its beginning, since its whole content is new.
pub struct LogFollower {
    path: PathBuf,
    cancel: CancellationToken,
    state: FollowState,
    poll_interval: Duration,
    retry_budget: Duration,
    /// Set when the first I/O failure of the current streak was seen,
    /// cleared on any success.
    failing_since: Option<Instant>,
}

impl LogFollower {
    /// Creates a follower for `path`. Cancelling `cancel` makes
    /// [`next_line`](LogFollower::next_line) return `Ok(None)`.
    pub fn new(path: impl Into<PathBuf>, cancel: CancellationToken) -> Self {
        Self {
            path: path.into(),
            cancel,
            state: FollowState::Reopening {
                read_from_start: false,
            },
            poll_interval: DEFAULT_POLL_INTERVAL,
            retry_budget: DEFAULT_RETRY_BUDGET,
            failing_since: None,
        }
    }

    /// Overrides the delay between file-growth checks.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Overrides the budget for persistent I/O failures.
    pub fn with_retry_budget(mut self, budget: Duration) -> Self {
        self.retry_budget = budget;
        self
    }

    /// Returns the next complete line appended to the file.
    ///
    /// Suspends (without busy-spinning) until a line is available. Returns
    /// `Ok(None)` once the cancellation token fires, or an error when the
    /// retry budget is exhausted on a persistently failing file.
    pub async fn next_line(&mut self) -> Result<Option<String>, FollowError> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(None);
            }
            match self.step()? {
                Step::Emit(line) => return Ok(Some(line)),
                Step::Continue => {}
                Step::Pause => {
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Ok(None),
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
            }
        }
    }

    /// Advances the state machine by one synchronous step. All awaiting
    /// happens in `next_line`, so a dropped future never loses the cursor.
    fn step(&mut self) -> Result<Step, FollowError> {
        let state = std::mem::replace(
            &mut self.state,
            FollowState::Reopening {
                read_from_start: true,
            },
        );

        match state {
            FollowState::Reopening { read_from_start } => {
                match open_cursor(&self.path, read_from_start) {
                    Ok(cursor) => {
                        tracing::info!(
                            path = %self.path.display(),
                            offset = cursor.offset,
                            "following log file"
                        );
                        self.failing_since = None;
                        self.state = FollowState::Following(cursor);
                        Ok(Step::Continue)
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        // Not an error: the server may create the file later.
                        // Anything written to it then is new, so read it from
                        // the start once it appears.
                        if read_from_start {
                            tracing::debug!(path = %self.path.display(), "log file still absent");
                        } else {
                            tracing::info!(
                                path = %self.path.display(),
                                "log file not found, waiting for it to appear"
                            );
                        }
                        self.state = FollowState::Reopening {
                            read_from_start: true,
                        };
                        Ok(Step::Pause)
                    }
                    Err(e) => {
                        self.register_failure(&e)?;
                        tracing::warn!(
                            path = %self.path.display(),
                            error = %e,
                            "failed to open log file, retrying"
                        );
                        self.state = FollowState::Backoff {
                            cursor: None,
                            read_from_start,
                        };
                        Ok(Step::Pause)
                    }
                }
            }

            FollowState::Following(mut cursor) => match read_complete_line(&mut cursor) {
                Ok(Some(line)) => {
                    self.failing_since = None;
                    self.state = FollowState::Following(cursor);
                    Ok(Step::Emit(line))
                }
                Ok(None) => self.check_for_replacement(cursor),
                Err(e) => {
                    self.register_failure(&e)?;
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %e,
                        "error reading log file, retrying"
                    );
                    self.state = FollowState::Backoff {
                        cursor: Some(cursor),
                        read_from_start: true,
                    };
                    Ok(Step::Pause)
                }
            },

            FollowState::Backoff {
                cursor,
                read_from_start,
            } => {
                // The pause already happened; resume where we left off.
                self.state = match cursor {
                    Some(cursor) => FollowState::Following(cursor),
                    None => FollowState::Reopening { read_from_start },
                };
                Ok(Step::Continue)
            }
        }
    }

    /// Handles EOF on the current handle: decide between idling, reopening
    /// after rotation/truncation, or backing off on a stat failure.
    fn check_for_replacement(&mut self, cursor: Cursor) -> Result<Step, FollowError> {
        match file_status(&self.path, &cursor) {
            Ok(FileStatus::Unchanged) => {
                self.failing_since = None;
                self.state = FollowState::Following(cursor);
                Ok(Step::Pause)
            }
            Ok(FileStatus::Rotated) => {
                tracing::info!(path = %self.path.display(), "log file rotated, reopening");
                Ok(self.reopen_after_replacement(cursor))
            }
            Ok(FileStatus::Truncated) => {
                tracing::info!(path = %self.path.display(), "log file truncated, reopening");
                Ok(self.reopen_after_replacement(cursor))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "log file removed, waiting");
                Ok(self.reopen_after_replacement(cursor))
            }
            Err(e) => {
                self.register_failure(&e)?;
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "failed to stat log file, retrying"
                );
                self.state = FollowState::Backoff {
                    cursor: Some(cursor),
                    read_from_start: true,
                };
                Ok(Step::Pause)
            }
        }
    }

    /// Discards the stale handle and arranges to read the replacement file
    /// from its beginning. A pending partial line from the old file is
    /// flushed first so nothing written before the boundary is lost.
    fn reopen_after_replacement(&mut self, cursor: Cursor) -> Step {
        self.failing_since = None;
        self.state = FollowState::Reopening {
            read_from_start: true,
        };
        if !cursor.partial.is_empty() {
            let line = decode_line(&cursor.partial);
            if !line.is_empty() {
                return Step::Emit(line);
            }
        }
        Step::Continue
    }

    /// Tracks a failure streak against the retry budget.
    fn register_failure(&mut self, err: &std::io::Error) -> Result<(), FollowError> {
        let since = *self.failing_since.get_or_insert_with(Instant::now);
        if since.elapsed() >= self.retry_budget {
            return Err(FollowError::RetriesExhausted {
                path: self.path.clone(),
                source: std::io::Error::new(err.kind(), err.to_string()),
            });
        }
        Ok(())
    }
}

/// Opens the file and positions the cursor: at the end for the initial open
/// of a pre-existing file, at the start for a replacement.
fn open_cursor(path: &Path, from_start: bool) -> std::io::Result<Cursor> {
    let mut file = File::open(path)?;
    let meta = file.metadata()?;
    let offset = if from_start {
        0
    } else {
        file.seek(SeekFrom::End(0))?
    };
    Ok(Cursor {
        reader: BufReader::new(file),
        identity: identity_of(&meta),
        offset,
        partial: Vec::new(),
    })
}

/// Reads until a newline-terminated line is available or EOF is hit.
///
/// A trailing fragment without its newline (the writer is mid-line) is
/// stashed in `cursor.partial` and completed on a later poll, so a line is
/// never emitted in two pieces. Blank lines are skipped.
fn read_complete_line(cursor: &mut Cursor) -> std::io::Result<Option<String>> {
    loop {
        let mut buf = Vec::new();
        let n = cursor.reader.read_until(b'\n', &mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        cursor.offset += n as u64;

        if buf.ends_with(b"\n") {
            let mut bytes = std::mem::take(&mut cursor.partial);
            bytes.extend_from_slice(&buf);
            let line = decode_line(&bytes);
            if line.is_empty() {
                continue;
            }
            return Ok(Some(line));
        }

        // Newline not written yet; keep the fragment for the next poll.
        cursor.partial.extend_from_slice(&buf);
    }
}

/// Stats the path fresh and compares it against the open handle.
fn file_status(path: &Path, cursor: &Cursor) -> std::io::Result<FileStatus> {
    let meta = std::fs::metadata(path)?;
    if identity_of(&meta) != cursor.identity {
        return Ok(FileStatus::Rotated);
    }
    if meta.len() < cursor.offset {
        return Ok(FileStatus::Truncated);
    }
    Ok(FileStatus::Unchanged)
}

/// Lossy UTF-8 decode with line endings stripped. A stray invalid byte must
/// not wedge the follower.
fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(['\n', '\r'])
        .to_string()
}

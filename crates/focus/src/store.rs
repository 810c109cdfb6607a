//! Session history storage
//!
//! One JSON file holds the append-only list of closed sessions plus a mirror
//! of the session currently in flight, so that a later invocation (possibly
//! from another terminal) can pick it up:
//!
//! ```json
//! { "sessions": [...], "currentSession": {...} | null, "schemaVersion": 1 }
//! ```
//!
//! Writes go through `atomic::replace_with_backup`; a torn write found on
//! open is rolled back before anything is read.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::atomic;
use crate::error::{FocusError, Result};
use crate::session::{Mode, Session};

/// Current on-disk schema of the session file
pub const SESSION_SCHEMA_VERSION: u32 = 1;

/// Set when the history was cleared
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryMetadata {
    pub cleared_at: DateTime<Utc>,
    /// Snapshot taken right before clearing
    pub backup_path: PathBuf,
}

/// Contents of the session file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHistory {
    /// Closed sessions in the order they ended
    pub sessions: Vec<Session>,
    /// The open session, if any
    pub current_session: Option<Session>,
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HistoryMetadata>,
}

impl Default for SessionHistory {
    fn default() -> Self {
        Self {
            sessions: Vec::new(),
            current_session: None,
            schema_version: SESSION_SCHEMA_VERSION,
            metadata: None,
        }
    }
}

/// Loosely typed view used to skip bad records instead of failing the load
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawHistory {
    #[serde(default)]
    sessions: Vec<Value>,
    #[serde(default)]
    current_session: Option<Value>,
    #[serde(default)]
    schema_version: Option<u32>,
    #[serde(default)]
    metadata: Option<Value>,
}

/// Session history store
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Open the store at `path`, rolling back any interrupted write
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| FocusError::io("create directory", parent, e))?;
        }
        atomic::recover(path, atomic::is_json)?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole file. A missing file is an empty history.
    ///
    /// Individual sessions that fail validation are skipped with a warning,
    /// as is an unreadable current-session mirror.
    pub fn load(&self) -> Result<SessionHistory> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(SessionHistory::default()),
            Err(e) => return Err(FocusError::io("read", &self.path, e)),
        };
        if content.trim().is_empty() {
            return Ok(SessionHistory::default());
        }

        let raw: RawHistory =
            serde_json::from_str(&content).map_err(|e| FocusError::corrupt(&self.path, e))?;

        let schema_version = raw.schema_version.unwrap_or(SESSION_SCHEMA_VERSION);
        if schema_version > SESSION_SCHEMA_VERSION {
            return Err(FocusError::corrupt(
                &self.path,
                format!("unsupported schemaVersion {}", schema_version),
            ));
        }

        let mut sessions = Vec::with_capacity(raw.sessions.len());
        for (index, value) in raw.sessions.into_iter().enumerate() {
            match parse_session(value) {
                Ok(session) if !session.is_open() => sessions.push(session),
                Ok(session) => {
                    warn!(index, session_id = %session.session_id, "skipping open session found in history");
                }
                Err(reason) => warn!(index, %reason, "skipping malformed session record"),
            }
        }

        let current_session = match raw.current_session {
            None | Some(Value::Null) => None,
            Some(value) => match parse_session(value) {
                Ok(session) if session.is_open() => Some(session),
                Ok(session) => {
                    warn!(session_id = %session.session_id, "current session mirror is already closed, ignoring");
                    None
                }
                Err(reason) => {
                    warn!(%reason, "ignoring malformed current session mirror");
                    None
                }
            },
        };

        let metadata = raw
            .metadata
            .and_then(|value| serde_json::from_value(value).ok());

        Ok(SessionHistory {
            sessions,
            current_session,
            schema_version: SESSION_SCHEMA_VERSION,
            metadata,
        })
    }

    /// Replace the whole file
    pub fn save(&self, history: &SessionHistory) -> Result<()> {
        let json = serde_json::to_string_pretty(history)
            .map_err(|e| FocusError::corrupt(&self.path, e))?;
        atomic::replace_with_backup(&self.path, json.as_bytes())
    }

    /// Close `session` at `at` (unless already closed) and append it to the
    /// history. The current-session mirror is cleared if it points at it.
    pub fn append_and_close(&self, session: Session, at: DateTime<Utc>) -> Result<Session> {
        let closed = if session.is_open() { session.close(at) } else { session };

        let mut history = self.load()?;
        if history
            .current_session
            .as_ref()
            .is_some_and(|current| current.session_id == closed.session_id)
        {
            history.current_session = None;
        }
        history.sessions.push(closed.clone());
        self.save(&history)?;
        Ok(closed)
    }

    /// Mirror the in-flight session so other invocations can find it
    pub fn save_current(&self, mode: Mode, start_time: DateTime<Utc>, session_id: &str) -> Result<()> {
        let mut history = self.load()?;
        history.current_session = Some(Session::with_id(session_id.to_string(), mode, start_time));
        self.save(&history)
    }

    /// Drop the current-session mirror
    pub fn clear_current(&self) -> Result<()> {
        let mut history = self.load()?;
        if history.current_session.is_none() {
            return Ok(());
        }
        history.current_session = None;
        self.save(&history)
    }

    /// The mirrored in-flight session. Anything unreadable means none.
    pub fn restore_current(&self) -> Option<Session> {
        match self.load() {
            Ok(history) => history.current_session,
            Err(e) => {
                warn!(error = %e, "could not read session file, assuming no active session");
                None
            }
        }
    }

    /// Erase all closed sessions after snapshotting the file.
    ///
    /// The in-flight session is kept so the current mode survives. Returns
    /// the backup path, which is also recorded in the file's metadata.
    pub fn clear_all(&self) -> Result<PathBuf> {
        let history = self.load()?;
        if !self.path.exists() {
            self.save(&history)?;
        }
        let backup = atomic::snapshot(&self.path, "backup")?;

        let cleared = SessionHistory {
            sessions: Vec::new(),
            current_session: history.current_session,
            schema_version: SESSION_SCHEMA_VERSION,
            metadata: Some(HistoryMetadata {
                cleared_at: Utc::now(),
                backup_path: backup.clone(),
            }),
        };
        self.save(&cleared)?;

        info!(removed = history.sessions.len(), backup = %backup.display(), "session history cleared");
        Ok(backup)
    }

    /// Start over with only `current` in the file, keeping a snapshot of
    /// whatever was there. Used when a forced transition meets an
    /// unreadable file.
    pub fn reset_with_current(&self, current: &Session) -> Result<Option<PathBuf>> {
        let backup = if self.path.exists() {
            Some(atomic::snapshot(&self.path, "corrupt")?)
        } else {
            None
        };
        let history = SessionHistory {
            current_session: Some(current.clone()),
            ..SessionHistory::default()
        };
        self.save(&history)?;
        warn!(backup = ?backup, "session file reset");
        Ok(backup)
    }
}

fn parse_session(value: Value) -> std::result::Result<Session, String> {
    let session: Session = serde_json::from_value(value).map_err(|e| e.to_string())?;
    session.validate()?;
    Ok(session)
}

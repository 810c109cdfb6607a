//! Session types
//!
//! A session is one contiguous stretch of time attributed to a single mode.
//! Sessions are opened when a mode transition begins and closed when the
//! next one begins (or tracking is stopped). Once closed, the recorded
//! `durationMinutes` is authoritative and never recomputed.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The two-valued focus state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Distracting sites are blocked
    Work,
    /// Nothing is blocked
    #[default]
    Normal,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Work => "work",
            Mode::Normal => "normal",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One interval of time attributed to a mode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Unique identifier generated when the session opens
    pub session_id: String,
    pub mode: Mode,
    pub start_time: DateTime<Utc>,
    /// Absent while the session is open
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Rounded to two decimals when the session closes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<f64>,
    /// Local calendar date of `start_time` (YYYY-MM-DD)
    pub date: String,
    /// Local weekday of `start_time` (e.g. "Monday")
    pub day_of_week: String,
}

impl Session {
    /// Open a new session in `mode` starting at `at`
    pub fn start(mode: Mode, at: DateTime<Utc>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), mode, at)
    }

    /// Open a session with a known identifier
    pub fn with_id(session_id: String, mode: Mode, at: DateTime<Utc>) -> Self {
        let local = at.with_timezone(&Local);
        Self {
            session_id,
            mode,
            start_time: at,
            end_time: None,
            duration_minutes: None,
            date: local.format("%Y-%m-%d").to_string(),
            day_of_week: local.format("%A").to_string(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }

    /// Close the session at `at`. Closing before the start counts as zero.
    pub fn close(mut self, at: DateTime<Utc>) -> Self {
        let end = at.max(self.start_time);
        let millis = (end - self.start_time).num_milliseconds() as f64;
        self.end_time = Some(end);
        self.duration_minutes = Some(round2(millis / 60_000.0));
        self
    }

    /// Time spent so far (open) or in total (closed)
    pub fn elapsed(&self, now: DateTime<Utc>) -> chrono::Duration {
        let end = self.end_time.unwrap_or(now);
        (end - self.start_time).max(chrono::Duration::zero())
    }

    /// Minutes attributed to this session, using the stored value once closed
    pub fn minutes(&self, now: DateTime<Utc>) -> f64 {
        self.duration_minutes
            .unwrap_or_else(|| self.elapsed(now).num_milliseconds() as f64 / 60_000.0)
    }

    /// Check the shape of a persisted record
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.session_id.trim().is_empty() {
            return Err("empty sessionId".to_string());
        }
        match (self.end_time, self.duration_minutes) {
            (None, None) => Ok(()),
            (Some(end), Some(mins)) => {
                if end < self.start_time {
                    Err(format!("session {} ends before it starts", self.session_id))
                } else if !mins.is_finite() || mins < 0.0 {
                    Err(format!("session {} has invalid durationMinutes", self.session_id))
                } else {
                    Ok(())
                }
            }
            _ => Err(format!(
                "session {} has endTime and durationMinutes out of step",
                self.session_id
            )),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

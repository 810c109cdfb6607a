//! Time statistics per mode
//!
//! Aggregates sessions into totals for Work and Normal mode, plus Work
//! minutes per day.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

use crate::session::{Mode, Session};
use crate::store::SessionHistory;

/// Totals for one mode
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModeTotals {
    pub sessions: u32,
    pub minutes: f64,
}

impl ModeTotals {
    /// Average session length in minutes
    pub fn average_minutes(&self) -> f64 {
        if self.sessions == 0 {
            0.0
        } else {
            self.minutes / self.sessions as f64
        }
    }
}

/// Aggregated statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FocusStats {
    pub work: ModeTotals,
    pub normal: ModeTotals,
    /// Work minutes keyed by session date (YYYY-MM-DD)
    pub daily_work: BTreeMap<String, f64>,
}

impl FocusStats {
    /// Aggregate `sessions`; open sessions count up to `now`
    pub fn from_sessions(sessions: &[Session], now: DateTime<Utc>) -> Self {
        let mut stats = Self::default();

        for session in sessions {
            let minutes = session.minutes(now);
            let totals = match session.mode {
                Mode::Work => {
                    *stats.daily_work.entry(session.date.clone()).or_insert(0.0) += minutes;
                    &mut stats.work
                }
                Mode::Normal => &mut stats.normal,
            };
            totals.sessions += 1;
            totals.minutes += minutes;
        }

        stats
    }

    /// Statistics for sessions started within the last `days` days
    pub fn for_window(history: &SessionHistory, days: u32, now: DateTime<Utc>) -> Self {
        let cutoff = now - Duration::days(i64::from(days));
        let sessions: Vec<Session> = history
            .sessions
            .iter()
            .chain(history.current_session.iter())
            .filter(|s| s.start_time >= cutoff)
            .cloned()
            .collect();
        Self::from_sessions(&sessions, now)
    }

    pub fn total_minutes(&self) -> f64 {
        self.work.minutes + self.normal.minutes
    }

    /// Share of tracked time spent in Work mode (0-100)
    pub fn work_percent(&self) -> u32 {
        let total = self.total_minutes();
        if total <= 0.0 {
            0
        } else {
            ((self.work.minutes / total) * 100.0).round() as u32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    fn closed(mode: Mode, start_min: i64, len_min: i64) -> Session {
        let start = t0() + Duration::minutes(start_min);
        Session::start(mode, start).close(start + Duration::minutes(len_min))
    }

    #[test]
    fn test_empty_stats() {
        let stats = FocusStats::from_sessions(&[], t0());
        assert_eq!(stats.work.sessions, 0);
        assert_eq!(stats.total_minutes(), 0.0);
        assert_eq!(stats.work_percent(), 0);
        assert_eq!(stats.work.average_minutes(), 0.0);
    }

    #[test]
    fn test_stats_calculation() {
        let sessions = vec![
            closed(Mode::Work, 0, 25),
            closed(Mode::Normal, 25, 5),
            closed(Mode::Work, 30, 50),
            closed(Mode::Normal, 80, 20),
        ];

        let stats = FocusStats::from_sessions(&sessions, t0());
        assert_eq!(stats.work.sessions, 2);
        assert_eq!(stats.work.minutes, 75.0);
        assert_eq!(stats.work.average_minutes(), 37.5);
        assert_eq!(stats.normal.minutes, 25.0);
        assert_eq!(stats.work_percent(), 75);
        assert_eq!(stats.daily_work.values().sum::<f64>(), 75.0);
    }

    #[test]
    fn test_open_session_counts_to_now() {
        let open = Session::start(Mode::Work, t0());
        let stats = FocusStats::from_sessions(&[open], t0() + Duration::minutes(10));
        assert_eq!(stats.work.minutes, 10.0);
    }

    #[test]
    fn test_window_excludes_old_sessions() {
        let history = SessionHistory {
            sessions: vec![closed(Mode::Work, -60 * 24 * 10, 30), closed(Mode::Work, 0, 45)],
            current_session: Some(Session::start(Mode::Normal, t0() + Duration::minutes(45))),
            ..SessionHistory::default()
        };

        let stats = FocusStats::for_window(&history, 7, t0() + Duration::minutes(60));
        assert_eq!(stats.work.sessions, 1);
        assert_eq!(stats.work.minutes, 45.0);
        assert_eq!(stats.normal.minutes, 15.0);
    }
}

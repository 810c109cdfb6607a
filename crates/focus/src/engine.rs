//! Focus state machine
//!
//! Each CLI invocation builds a `FocusEngine`, calls `reconcile` to line the
//! persisted mode up with what the hosts file shows, then runs one
//! transition. Nothing is kept in memory between invocations: the inputs
//! are the persisted current-session record and the observed hosts state,
//! and the output is the new persisted record.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use tracing::{info, warn};

use focusmode_core::{Config, Paths};

use crate::blocklist::{normalize_domain, AddOutcome, BlocklistStore, RemoveOutcome};
use crate::error::{FocusError, Result};
use crate::hosts::{BatchReport, HostsAdapter, SystemTool, ToolRunner};
use crate::session::{Mode, Session};
use crate::stats::FocusStats;
use crate::store::SessionStore;

/// Local and observed mode disagreed; local state was corrected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateDrift {
    pub local: Mode,
    pub observed: Mode,
}

impl fmt::Display for StateDrift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "recorded mode was {} but the hosts file shows {}; switched to {}",
            self.local, self.observed, self.observed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    Switched,
    /// Already in the requested mode and not forced
    AlreadyActive,
}

/// What an `enable`/`disable` call did
#[derive(Debug, Clone)]
pub struct TransitionReport {
    pub kind: TransitionKind,
    pub mode: Mode,
    /// Session closed by this transition
    pub closed: Option<Session>,
    /// Session opened by this transition (or the one already running)
    pub current: Option<Session>,
    /// Hosts tool results; `None` when nothing was switched
    pub batch: Option<BatchReport>,
    /// Problems swallowed because the transition was forced
    pub warnings: Vec<String>,
}

/// What `stop` did
#[derive(Debug, Clone, Default)]
pub struct StopReport {
    pub closed: Option<Session>,
    pub batch: Option<BatchReport>,
}

/// Snapshot for `status`
#[derive(Debug, Clone, PartialEq)]
pub struct Status {
    pub mode: Mode,
    pub session_id: Option<String>,
    pub session_start: Option<DateTime<Utc>>,
    pub elapsed: Duration,
}

/// The focus mode orchestrator
pub struct FocusEngine<R: ToolRunner> {
    sessions: SessionStore,
    blocklist: BlocklistStore,
    hosts: HostsAdapter<R>,
}

impl FocusEngine<SystemTool> {
    /// Engine over the standard files and the configured hosts tool
    pub fn open(paths: &Paths, config: &Config) -> Result<Self> {
        let paths = match &config.data_dir {
            Some(dir) => Paths::with_data_dir(dir.clone()),
            None => Paths::with_data_dir(paths.data.clone()),
        };
        Ok(Self::new(
            SessionStore::new(&paths.sessions_file())?,
            BlocklistStore::new(&paths.blocklist_file())?,
            HostsAdapter::from_config(config),
        ))
    }
}

impl<R: ToolRunner> FocusEngine<R> {
    pub fn new(sessions: SessionStore, blocklist: BlocklistStore, hosts: HostsAdapter<R>) -> Self {
        Self {
            sessions,
            blocklist,
            hosts,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn blocklist(&self) -> &BlocklistStore {
        &self.blocklist
    }

    /// Correct the recorded mode if the hosts file says otherwise.
    ///
    /// An unreadable session file is left alone (with a warning); repairing
    /// it is up to a forced transition.
    pub fn reconcile(&self) -> Result<Option<StateDrift>> {
        self.reconcile_at(Utc::now())
    }

    pub fn reconcile_at(&self, now: DateTime<Utc>) -> Result<Option<StateDrift>> {
        let observed = match self.hosts.query_observed_mode().as_mode() {
            Some(mode) => mode,
            None => return Ok(None),
        };

        let current = match self.sessions.load() {
            Ok(history) => history.current_session,
            Err(e @ FocusError::Corrupt { .. }) => {
                warn!(error = %e, "session file unreadable, skipping reconciliation");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        let local = mode_of(current.as_ref());
        if local == observed {
            return Ok(None);
        }

        if let Some(session) = current {
            self.sessions.append_and_close(session, now)?;
        }
        let session = Session::start(observed, now);
        self.sessions
            .save_current(session.mode, session.start_time, &session.session_id)?;

        let drift = StateDrift { local, observed };
        warn!(local = %local, observed = %observed, "mode drift corrected from hosts file");
        Ok(Some(drift))
    }

    /// Switch to Work mode and block the configured sites
    pub fn enable(&self, force: bool) -> Result<TransitionReport> {
        self.enable_at(force, Utc::now())
    }

    pub fn enable_at(&self, force: bool, now: DateTime<Utc>) -> Result<TransitionReport> {
        self.transition(Mode::Work, force, now)
    }

    /// Switch to Normal mode and unblock the configured sites
    pub fn disable(&self, force: bool) -> Result<TransitionReport> {
        self.disable_at(force, Utc::now())
    }

    pub fn disable_at(&self, force: bool, now: DateTime<Utc>) -> Result<TransitionReport> {
        self.transition(Mode::Normal, force, now)
    }

    fn transition(&self, target: Mode, force: bool, now: DateTime<Utc>) -> Result<TransitionReport> {
        // A forced transition treats an unreadable file as "no session"
        let current = if force {
            self.sessions.restore_current()
        } else {
            self.sessions.load()?.current_session
        };

        if !force && mode_of(current.as_ref()) == target {
            return Ok(TransitionReport {
                kind: TransitionKind::AlreadyActive,
                mode: target,
                closed: None,
                current,
                batch: None,
                warnings: Vec::new(),
            });
        }

        let sites = self.blocklist.load()?.all_sites;
        let mut warnings = Vec::new();

        let closed = match current {
            None => None,
            Some(session) => match self.sessions.append_and_close(session, now) {
                Ok(closed) => Some(closed),
                Err(e) if force => {
                    warn!(error = %e, "could not close previous session, discarding it");
                    warnings.push(format!("previous session discarded: {}", e));
                    if let Err(e) = self.sessions.clear_current() {
                        warn!(error = %e, "could not clear session mirror");
                    }
                    None
                }
                Err(e) => return Err(e),
            },
        };

        let batch = match target {
            Mode::Work => self.hosts.ensure_blocked(&sites),
            Mode::Normal => self.hosts.ensure_unblocked(&sites),
        };
        if !batch.is_complete() {
            warn!(summary = %batch.summary(), failures = batch.failures.len(), "hosts update incomplete");
        }

        let opened = Session::start(target, now);
        if let Err(e) = self
            .sessions
            .save_current(opened.mode, opened.start_time, &opened.session_id)
        {
            if !force {
                return Err(e);
            }
            let backup = self.sessions.reset_with_current(&opened)?;
            let note = match backup {
                Some(path) => format!("session file was unreadable ({}); old copy saved to {}", e, path.display()),
                None => format!("session file was unreadable ({}); started a new one", e),
            };
            warnings.push(note);
        }

        info!(mode = %target, summary = %batch.summary(), force, "mode switched");
        Ok(TransitionReport {
            kind: TransitionKind::Switched,
            mode: target,
            closed,
            current: Some(opened),
            batch: Some(batch),
            warnings,
        })
    }

    /// End time tracking. Leaves Work mode first if it is active.
    pub fn stop(&self) -> Result<StopReport> {
        self.stop_at(Utc::now())
    }

    pub fn stop_at(&self, now: DateTime<Utc>) -> Result<StopReport> {
        let current = match self.sessions.load()?.current_session {
            Some(session) => session,
            None => return Ok(StopReport::default()),
        };

        let batch = if current.mode == Mode::Work {
            let sites = self.blocklist.load()?.all_sites;
            Some(self.hosts.ensure_unblocked(&sites))
        } else {
            None
        };

        let closed = self.sessions.append_and_close(current, now)?;
        info!(session_id = %closed.session_id, "tracking stopped");
        Ok(StopReport {
            closed: Some(closed),
            batch,
        })
    }

    pub fn status(&self) -> Status {
        self.status_at(Utc::now())
    }

    pub fn status_at(&self, now: DateTime<Utc>) -> Status {
        let current = self.sessions.restore_current();
        Status {
            mode: mode_of(current.as_ref()),
            session_id: current.as_ref().map(|s| s.session_id.clone()),
            session_start: current.as_ref().map(|s| s.start_time),
            elapsed: current
                .as_ref()
                .map(|s| s.elapsed(now))
                .unwrap_or_else(Duration::zero),
        }
    }

    /// Add a custom domain; blocks it right away when in Work mode
    pub fn add_domain(&self, name: &str) -> Result<(AddOutcome, Option<BatchReport>)> {
        if let Ok(domain) = normalize_domain(name) {
            if domain == self.hosts.sentinel() {
                return Ok((AddOutcome::Reserved(domain), None));
            }
        }

        let outcome = self.blocklist.add_custom(name)?;
        let batch = match &outcome {
            AddOutcome::Added(domain) if self.status().mode == Mode::Work => {
                Some(self.hosts.block_domains(&BTreeSet::from([domain.clone()])))
            }
            _ => None,
        };
        Ok((outcome, batch))
    }

    /// Remove a custom domain; unblocks it right away when in Work mode
    pub fn remove_domain(&self, name: &str) -> Result<(RemoveOutcome, Option<BatchReport>)> {
        let outcome = self.blocklist.remove_custom(name)?;
        let batch = match &outcome {
            RemoveOutcome::Removed(domain) if self.status().mode == Mode::Work => {
                Some(self.hosts.unblock_domains(&BTreeSet::from([domain.clone()])))
            }
            _ => None,
        };
        Ok((outcome, batch))
    }

    /// Blocked domains grouped by category
    pub fn list_domains(&self) -> Result<BTreeMap<String, BTreeSet<String>>> {
        Ok(self.blocklist.load()?.categories)
    }

    /// Erase session history; the caller must have confirmed already
    pub fn clear_history(&self) -> Result<PathBuf> {
        self.sessions.clear_all()
    }

    /// Time statistics for the last `days` days
    pub fn stats(&self, days: u32) -> Result<FocusStats> {
        let history = self.sessions.load()?;
        Ok(FocusStats::for_window(&history, days, Utc::now()))
    }
}

/// Mode implied by the current session; no session means Normal
fn mode_of(current: Option<&Session>) -> Mode {
    current.map(|s| s.mode).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocklist::BlocklistConfig;
    use crate::hosts::testing::FakeHosts;
    use crate::hosts::RetryPolicy;
    use chrono::TimeZone;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const SENTINEL: &str = "focusmode.sentinel.invalid";

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()
    }

    /// A fresh engine over `dir`, as a new process invocation would build it
    fn engine<'a>(dir: &Path, fake: &'a FakeHosts) -> FocusEngine<&'a FakeHosts> {
        FocusEngine::new(
            SessionStore::new(&dir.join("sessions.json")).unwrap(),
            BlocklistStore::new(&dir.join("blocklist.json")).unwrap(),
            HostsAdapter::new(fake, "127.0.0.1", SENTINEL, RetryPolicy::immediate(3)),
        )
    }

    #[test]
    fn test_fresh_install_is_normal() {
        let temp = TempDir::new().unwrap();
        let fake = FakeHosts::new();
        let engine = engine(temp.path(), &fake);

        assert_eq!(engine.reconcile_at(t0()).unwrap(), None);
        let status = engine.status_at(t0());
        assert_eq!(status.mode, Mode::Normal);
        assert!(status.session_start.is_none());
        assert_eq!(status.elapsed, Duration::zero());
    }

    #[test]
    fn test_enable_blocks_every_site() {
        let temp = TempDir::new().unwrap();
        let fake = FakeHosts::new();
        let engine = engine(temp.path(), &fake);

        let report = engine.enable_at(false, t0()).unwrap();
        assert_eq!(report.kind, TransitionKind::Switched);
        let batch = report.batch.unwrap();
        assert!(batch.is_complete());
        assert_eq!(batch.total, BlocklistConfig::default().all_sites.len());
        assert!(fake.is_on("youtube.com"));
        assert!(fake.is_on(SENTINEL));

        let status = engine.status_at(t0());
        assert_eq!(status.mode, Mode::Work);
        assert_eq!(status.elapsed, Duration::zero());
    }

    #[test]
    fn test_enable_twice_keeps_one_session() {
        let temp = TempDir::new().unwrap();
        let fake = FakeHosts::new();
        let engine = engine(temp.path(), &fake);

        let first = engine.enable_at(false, t0()).unwrap();
        let second = engine.enable_at(false, t0() + Duration::seconds(30)).unwrap();
        assert_eq!(second.kind, TransitionKind::AlreadyActive);
        assert!(second.batch.is_none());
        assert_eq!(
            second.current.map(|s| s.session_id),
            first.current.map(|s| s.session_id)
        );

        let history = engine.sessions().load().unwrap();
        assert!(history.sessions.is_empty());
        assert_eq!(history.current_session.unwrap().mode, Mode::Work);
    }

    #[test]
    fn test_work_then_normal_records_session() {
        let temp = TempDir::new().unwrap();
        let fake = FakeHosts::new();
        let engine = engine(temp.path(), &fake);

        engine.enable_at(false, t0()).unwrap();
        let report = engine.disable_at(false, t0() + Duration::seconds(90)).unwrap();

        let closed = report.closed.unwrap();
        assert_eq!(closed.mode, Mode::Work);
        assert_eq!(closed.duration_minutes, Some(1.5));
        assert!(!fake.is_on("youtube.com"));

        let history = engine.sessions().load().unwrap();
        assert_eq!(history.sessions.len(), 1);
        assert_eq!(history.sessions[0].mode, Mode::Work);
        assert_eq!(engine.status_at(t0() + Duration::seconds(90)).mode, Mode::Normal);
    }

    #[test]
    fn test_forced_enable_restarts_session() {
        let temp = TempDir::new().unwrap();
        let fake = FakeHosts::new();
        let engine = engine(temp.path(), &fake);

        engine.enable_at(false, t0()).unwrap();
        let report = engine.enable_at(true, t0() + Duration::minutes(5)).unwrap();
        assert_eq!(report.kind, TransitionKind::Switched);
        assert_eq!(report.closed.unwrap().duration_minutes, Some(5.0));

        let history = engine.sessions().load().unwrap();
        assert_eq!(history.sessions.len(), 1);
        assert!(history.current_session.unwrap().is_open());
    }

    #[test]
    fn test_corrupt_file_needs_force() {
        let temp = TempDir::new().unwrap();
        let fake = FakeHosts::new();
        let engine = engine(temp.path(), &fake);
        fs::write(engine.sessions().path(), "{\"sessions\": [{").unwrap();

        assert!(matches!(engine.enable_at(false, t0()), Err(FocusError::Corrupt { .. })));
        assert!(!fake.is_on(SENTINEL), "nothing is touched before the error");

        let report = engine.enable_at(true, t0()).unwrap();
        assert_eq!(report.kind, TransitionKind::Switched);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(engine.status_at(t0()).mode, Mode::Work);
    }

    #[test]
    fn test_forced_disable_escapes_corrupt_file_in_work() {
        let temp = TempDir::new().unwrap();
        let fake = FakeHosts::new();
        let engine = engine(temp.path(), &fake);
        engine.enable_at(false, t0()).unwrap();
        fs::write(engine.sessions().path(), "{\"sessions\": [{").unwrap();

        // The hosts file still shows Work, but the broken file is left for --force
        assert_eq!(engine.reconcile_at(t0()).unwrap(), None);
        assert_eq!(engine.status_at(t0()).mode, Mode::Normal);
        assert!(matches!(engine.disable_at(false, t0()), Err(FocusError::Corrupt { .. })));

        let later = t0() + Duration::minutes(3);
        let report = engine.disable_at(true, later).unwrap();
        assert_eq!(report.kind, TransitionKind::Switched);
        assert!(report.batch.unwrap().is_complete());
        assert_eq!(report.warnings.len(), 1);
        assert!(!fake.is_on("youtube.com"));
        assert!(!fake.is_on(SENTINEL));

        let history = engine.sessions().load().unwrap();
        assert_eq!(history.current_session.unwrap().mode, Mode::Normal);
        let snapshots = fs::read_dir(temp.path())
            .unwrap()
            .filter(|e| e.as_ref().unwrap().file_name().to_string_lossy().contains(".corrupt-"))
            .count();
        assert_eq!(snapshots, 1);
        assert_eq!(engine.reconcile_at(later).unwrap(), None);
    }

    #[test]
    fn test_partial_block_still_switches() {
        let temp = TempDir::new().unwrap();
        let fake = FakeHosts::new();
        fake.broken.borrow_mut().insert("youtube.com".to_string());
        let engine = engine(temp.path(), &fake);

        let report = engine.enable_at(false, t0()).unwrap();
        let batch = report.batch.unwrap();
        assert_eq!(batch.succeeded, batch.total - 1);
        assert_eq!(batch.failures[0].domain, "youtube.com");
        assert_eq!(engine.status_at(t0()).mode, Mode::Work);
    }

    #[test]
    fn test_missing_tool_still_records_intent() {
        let temp = TempDir::new().unwrap();
        let fake = FakeHosts::new();
        *fake.unavailable.borrow_mut() = true;
        let engine = engine(temp.path(), &fake);

        let report = engine.enable_at(false, t0()).unwrap();
        assert_eq!(report.batch.unwrap().succeeded, 0);
        assert_eq!(engine.status_at(t0()).mode, Mode::Work);
        // Unknown observed state never overrides local state
        assert_eq!(engine.reconcile_at(t0()).unwrap(), None);
        assert_eq!(engine.status_at(t0()).mode, Mode::Work);
    }

    #[test]
    fn test_second_invocation_corrects_drift() {
        let temp = TempDir::new().unwrap();
        let fake = FakeHosts::new();

        engine(temp.path(), &fake).enable_at(false, t0()).unwrap();

        // Someone switches the entries off by hand
        for enabled in fake.entries.borrow_mut().values_mut() {
            *enabled = false;
        }

        let later = t0() + Duration::minutes(30);
        let second = engine(temp.path(), &fake);
        let drift = second.reconcile_at(later).unwrap();
        assert_eq!(
            drift,
            Some(StateDrift {
                local: Mode::Work,
                observed: Mode::Normal,
            })
        );

        let status = second.status_at(later);
        assert_eq!(status.mode, Mode::Normal);
        assert_eq!(status.session_start, Some(later));

        let history = second.sessions().load().unwrap();
        assert_eq!(history.sessions.len(), 1);
        assert_eq!(history.sessions[0].duration_minutes, Some(30.0));

        assert_eq!(second.reconcile_at(later).unwrap(), None);
    }

    #[test]
    fn test_drift_towards_work() {
        let temp = TempDir::new().unwrap();
        let fake = FakeHosts::new();
        fake.entries.borrow_mut().insert(SENTINEL.to_string(), true);

        let engine = engine(temp.path(), &fake);
        let drift = engine.reconcile_at(t0()).unwrap().unwrap();
        assert_eq!(drift.observed, Mode::Work);
        assert_eq!(engine.status_at(t0()).mode, Mode::Work);
        assert!(drift.to_string().contains("hosts file shows work"));
    }

    #[test]
    fn test_stop_unblocks_and_closes() {
        let temp = TempDir::new().unwrap();
        let fake = FakeHosts::new();
        let engine = engine(temp.path(), &fake);

        engine.enable_at(false, t0()).unwrap();
        let report = engine.stop_at(t0() + Duration::minutes(20)).unwrap();
        assert_eq!(report.closed.unwrap().duration_minutes, Some(20.0));
        assert!(report.batch.unwrap().is_complete());
        assert!(!fake.is_on(SENTINEL));

        let history = engine.sessions().load().unwrap();
        assert!(history.current_session.is_none());
        assert_eq!(engine.reconcile_at(t0() + Duration::minutes(21)).unwrap(), None);

        assert!(engine.stop_at(t0() + Duration::minutes(22)).unwrap().closed.is_none());
    }

    #[test]
    fn test_domain_edits_apply_in_work_mode() {
        let temp = TempDir::new().unwrap();
        let fake = FakeHosts::new();
        let engine = engine(temp.path(), &fake);
        engine.enable_at(false, t0()).unwrap();

        let (outcome, batch) = engine.add_domain("lobste.rs").unwrap();
        assert_eq!(outcome, AddOutcome::Added("lobste.rs".to_string()));
        assert_eq!(batch.unwrap().succeeded, 1);
        assert!(fake.is_on("lobste.rs"));

        let (outcome, batch) = engine.remove_domain("lobste.rs").unwrap();
        assert_eq!(outcome, RemoveOutcome::Removed("lobste.rs".to_string()));
        assert!(batch.is_some());
        assert!(!fake.is_on("lobste.rs"));
        assert!(fake.is_on(SENTINEL));

        let grouped = engine.list_domains().unwrap();
        assert!(grouped["Custom"].is_empty());
    }

    #[test]
    fn test_marker_domain_cannot_be_added() {
        let temp = TempDir::new().unwrap();
        let fake = FakeHosts::new();
        let engine = engine(temp.path(), &fake);
        engine.enable_at(false, t0()).unwrap();

        let (outcome, batch) = engine.add_domain("https://Focusmode.Sentinel.Invalid/").unwrap();
        assert_eq!(outcome, AddOutcome::Reserved(SENTINEL.to_string()));
        assert!(batch.is_none());
        assert!(!engine.list_domains().unwrap()["Custom"].contains(SENTINEL));

        let (outcome, _) = engine.remove_domain(SENTINEL).unwrap();
        assert_eq!(outcome, RemoveOutcome::NotFound(SENTINEL.to_string()));
        assert!(fake.is_on(SENTINEL));
        assert_eq!(engine.reconcile_at(t0()).unwrap(), None);
    }

    #[test]
    fn test_domain_edits_in_normal_mode_skip_hosts() {
        let temp = TempDir::new().unwrap();
        let fake = FakeHosts::new();
        let engine = engine(temp.path(), &fake);

        let (_, batch) = engine.add_domain("lobste.rs").unwrap();
        assert!(batch.is_none());
        assert_eq!(fake.call_count("on lobste.rs"), 0);
    }

    #[test]
    fn test_clear_history_keeps_mode() {
        let temp = TempDir::new().unwrap();
        let fake = FakeHosts::new();
        let engine = engine(temp.path(), &fake);

        engine.enable_at(false, t0()).unwrap();
        engine.disable_at(false, t0() + Duration::minutes(10)).unwrap();
        engine.enable_at(false, t0() + Duration::minutes(15)).unwrap();

        let backup = engine.clear_history().unwrap();
        assert!(backup.exists());
        assert!(engine.sessions().load().unwrap().sessions.is_empty());
        assert_eq!(engine.status_at(t0() + Duration::minutes(16)).mode, Mode::Work);
    }
}

//! Hosts-file tool adapter
//!
//! All changes to the hosts file go through an external command-line tool
//! (`hostess` by default) invoked as `tool <verb> <domain> [<ip>]`. The
//! hosts file is often briefly locked by other readers, so each invocation
//! is retried with exponential backoff when the tool's output says the file
//! is busy. Any other failure is final for that domain only; batches always
//! run to the end and report how many domains succeeded.
//!
//! A sentinel entry is switched along with the blocklist. Its on/off state
//! is the externally observable mode that reconciliation trusts.

use std::collections::BTreeSet;
use std::process::Command;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use focusmode_core::Config;

use crate::error::{FocusError, Result};
use crate::session::Mode;

/// Output fragments meaning the hosts file is temporarily locked
const TRANSIENT_PATTERNS: &[&str] = &[
    "being used by another process",
    "unable to write to",
    "cannot access",
    "resource busy",
    "file busy",
    "resource temporarily unavailable",
];

/// Output fragments meaning the entry is not in the hosts file
const MISSING_PATTERNS: &[&str] = &["not found", "does not exist", "no such entry", "no such domain", "no entry"];

/// Raw result of one tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    fn text(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr).trim().to_string()
    }
}

/// How a tool response is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Success,
    /// Lock contention; worth retrying
    Transient,
    /// The tool does not know the entry
    Missing,
    /// Anything else; not retried
    Hard,
}

/// Classify a tool response by exit status and output text
pub fn classify(output: &ToolOutput) -> Classification {
    if output.success() {
        return Classification::Success;
    }
    let text = output.text().to_lowercase();
    if TRANSIENT_PATTERNS.iter().any(|p| text.contains(p)) {
        Classification::Transient
    } else if MISSING_PATTERNS.iter().any(|p| text.contains(p)) {
        Classification::Missing
    } else {
        Classification::Hard
    }
}

/// Runs the hosts tool with the given arguments
pub trait ToolRunner {
    /// Name shown in messages
    fn program(&self) -> &str;

    fn run(&self, args: &[&str]) -> std::io::Result<ToolOutput>;
}

impl<R: ToolRunner + ?Sized> ToolRunner for &R {
    fn program(&self) -> &str {
        (**self).program()
    }

    fn run(&self, args: &[&str]) -> std::io::Result<ToolOutput> {
        (**self).run(args)
    }
}

/// The real tool, spawned as a child process
pub struct SystemTool {
    program: String,
}

impl SystemTool {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }
}

impl ToolRunner for SystemTool {
    fn program(&self) -> &str {
        &self.program
    }

    fn run(&self, args: &[&str]) -> std::io::Result<ToolOutput> {
        let output = Command::new(&self.program).args(args).output()?;
        Ok(ToolOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Bounded exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total invocations allowed, including the first
    pub attempts: u32,
    /// Delay after the first failure; doubled after each further one
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            attempts: config.retry_attempts.max(1),
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }

    /// Retry without sleeping
    pub fn immediate(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay: Duration::ZERO,
        }
    }

    /// Delay before the retry that follows failed attempt `attempt` (1-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

/// What the hosts file says about the mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObservedMode {
    Work,
    Normal,
    /// The tool could not be queried or gave an inconsistent answer
    Unknown,
}

impl ObservedMode {
    pub fn as_mode(&self) -> Option<Mode> {
        match self {
            ObservedMode::Work => Some(Mode::Work),
            ObservedMode::Normal => Some(Mode::Normal),
            ObservedMode::Unknown => None,
        }
    }
}

/// Which way a batch went
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchAction {
    Block,
    Unblock,
}

impl BatchAction {
    pub fn past_tense(&self) -> &'static str {
        match self {
            BatchAction::Block => "blocked",
            BatchAction::Unblock => "unblocked",
        }
    }
}

/// A domain the tool refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainFailure {
    pub domain: String,
    pub reason: String,
}

/// Outcome of blocking or unblocking a set of domains
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub action: BatchAction,
    pub succeeded: usize,
    pub total: usize,
    pub failures: Vec<DomainFailure>,
    /// Whether the sentinel entry was switched too (`None` if untouched)
    pub marker_updated: Option<bool>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.succeeded == self.total && self.marker_updated != Some(false)
    }

    /// e.g. "blocked 12 of 14 domains"
    pub fn summary(&self) -> String {
        format!("{} {} of {} domains", self.action.past_tense(), self.succeeded, self.total)
    }
}

/// A successful (non-hard) tool response
enum Response {
    Done,
    Missing,
}

/// Adapter over the hosts-editing tool
pub struct HostsAdapter<R: ToolRunner> {
    runner: R,
    redirect_ip: String,
    sentinel: String,
    retry: RetryPolicy,
}

impl HostsAdapter<SystemTool> {
    /// Adapter for the tool named in the config
    pub fn from_config(config: &Config) -> Self {
        HostsAdapter::new(
            SystemTool::new(&config.hosts_tool),
            &config.redirect_ip,
            &config.sentinel_domain,
            RetryPolicy::from_config(config),
        )
    }
}

impl<R: ToolRunner> HostsAdapter<R> {
    pub fn new(runner: R, redirect_ip: &str, sentinel: &str, retry: RetryPolicy) -> Self {
        Self {
            runner,
            redirect_ip: redirect_ip.to_string(),
            sentinel: sentinel.to_string(),
            retry,
        }
    }

    /// Marker entry whose state is the observed mode
    pub fn sentinel(&self) -> &str {
        &self.sentinel
    }

    /// Run one command, retrying while the hosts file is busy
    fn invoke(&self, args: &[&str]) -> Result<Response> {
        self.invoke_capture(args).map(|(response, _)| response)
    }

    /// Like `invoke`, also returning the stdout of the final attempt
    fn invoke_capture(&self, args: &[&str]) -> Result<(Response, String)> {
        let command = format!("{} {}", self.runner.program(), args.join(" "));
        let mut attempt = 1;
        loop {
            debug!(%command, attempt, "running hosts tool");
            let output = self.runner.run(args).map_err(|source| FocusError::ToolUnavailable {
                tool: self.runner.program().to_string(),
                source,
            })?;

            match classify(&output) {
                Classification::Success => return Ok((Response::Done, output.stdout)),
                Classification::Missing => return Ok((Response::Missing, output.stdout)),
                Classification::Hard => {
                    return Err(FocusError::ToolFailed {
                        command,
                        code: output.code,
                        output: output.text(),
                    });
                }
                Classification::Transient if attempt < self.retry.attempts => {
                    let delay = self.retry.delay(attempt);
                    warn!(%command, attempt, delay_ms = delay.as_millis() as u64, "hosts file busy, retrying");
                    thread::sleep(delay);
                    attempt += 1;
                }
                Classification::Transient => {
                    return Err(FocusError::ToolTransient {
                        command,
                        output: output.text(),
                    });
                }
            }
        }
    }

    /// Enable the entry for `domain`, creating it if the tool lacks one
    fn switch_on(&self, domain: &str) -> Result<()> {
        match self.invoke(&["on", domain])? {
            Response::Done => Ok(()),
            Response::Missing => match self.invoke(&["add", domain, self.redirect_ip.as_str()])? {
                Response::Done => Ok(()),
                Response::Missing => Err(FocusError::ToolFailed {
                    command: format!("{} add {}", self.runner.program(), domain),
                    code: None,
                    output: "entry still missing after add".to_string(),
                }),
            },
        }
    }

    /// Disable the entry for `domain`; a missing entry is already unblocked
    fn switch_off(&self, domain: &str) -> Result<()> {
        self.invoke(&["off", domain]).map(|_| ())
    }

    fn run_batch(
        &self,
        action: BatchAction,
        domains: &BTreeSet<String>,
        with_marker: bool,
        switch: impl Fn(&str) -> Result<()>,
    ) -> BatchReport {
        let mut succeeded = 0;
        let mut failures = Vec::new();

        for domain in domains {
            match switch(domain.as_str()) {
                Ok(()) => succeeded += 1,
                Err(e) => {
                    warn!(%domain, error = %e, "hosts tool failed for domain");
                    failures.push(DomainFailure {
                        domain: domain.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let marker_updated = with_marker.then(|| match switch(self.sentinel.as_str()) {
            Ok(()) => true,
            Err(e) => {
                warn!(sentinel = %self.sentinel, error = %e, "failed to switch mode marker");
                false
            }
        });

        BatchReport {
            action,
            succeeded,
            total: domains.len(),
            failures,
            marker_updated,
        }
    }

    /// Make sure every domain is blocked and mark the hosts file as in Work mode
    pub fn ensure_blocked(&self, domains: &BTreeSet<String>) -> BatchReport {
        self.run_batch(BatchAction::Block, domains, true, |d| self.switch_on(d))
    }

    /// Make sure no domain is blocked and mark the hosts file as in Normal mode
    pub fn ensure_unblocked(&self, domains: &BTreeSet<String>) -> BatchReport {
        self.run_batch(BatchAction::Unblock, domains, true, |d| self.switch_off(d))
    }

    /// Block domains without touching the mode marker
    pub fn block_domains(&self, domains: &BTreeSet<String>) -> BatchReport {
        self.run_batch(BatchAction::Block, domains, false, |d| self.switch_on(d))
    }

    /// Unblock domains without touching the mode marker
    pub fn unblock_domains(&self, domains: &BTreeSet<String>) -> BatchReport {
        self.run_batch(BatchAction::Unblock, domains, false, |d| self.switch_off(d))
    }

    /// Read the mode from the sentinel entry's state
    pub fn query_observed_mode(&self) -> ObservedMode {
        match self.invoke(&["has", self.sentinel.as_str()]) {
            Ok(Response::Missing) => return ObservedMode::Normal,
            Ok(Response::Done) => {}
            Err(e) => {
                debug!(error = %e, "could not query mode marker");
                return ObservedMode::Unknown;
            }
        }

        let listing = match self.invoke_capture(&["list"]) {
            Ok((Response::Done, stdout)) => stdout,
            Ok((Response::Missing, _)) => {
                debug!("hosts tool reported nothing to list");
                return ObservedMode::Unknown;
            }
            Err(e) => {
                debug!(error = %e, "listing hosts entries failed");
                return ObservedMode::Unknown;
            }
        };

        match marker_state(&listing, &self.sentinel) {
            Some(true) => ObservedMode::Work,
            Some(false) => ObservedMode::Normal,
            None => ObservedMode::Unknown,
        }
    }
}

/// Find `sentinel` in `list` output and report whether it is on
fn marker_state(listing: &str, sentinel: &str) -> Option<bool> {
    listing
        .lines()
        .find(|line| line.split_whitespace().any(|token| token == sentinel))
        .and_then(|line| {
            let line = line.trim().to_lowercase();
            if line.contains("(on)") || line.ends_with(" on") {
                Some(true)
            } else if line.contains("(off)") || line.ends_with(" off") {
                Some(false)
            } else {
                None
            }
        })
}


#[cfg(test)]
mod tests {
    use super::testing::FakeHosts;
    use super::*;

    const SENTINEL: &str = "focusmode.sentinel.invalid";

    fn adapter(fake: &FakeHosts) -> HostsAdapter<&FakeHosts> {
        HostsAdapter::new(fake, "127.0.0.1", SENTINEL, RetryPolicy::immediate(3))
    }

    fn domains(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|d| d.to_string()).collect()
    }

    fn output(code: i32, stderr: &str) -> ToolOutput {
        ToolOutput {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify(&output(0, "")), Classification::Success);
        assert_eq!(
            classify(&output(1, "Unable to write to C:\\Windows\\System32\\drivers\\etc\\hosts")),
            Classification::Transient
        );
        assert_eq!(classify(&output(1, "example.com not found")), Classification::Missing);
        assert_eq!(classify(&output(1, "permission denied")), Classification::Hard);
        assert_eq!(classify(&ToolOutput { code: None, ..output(0, "") }), Classification::Hard);
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay(1), Duration::from_secs(1));
        assert_eq!(policy.delay(2), Duration::from_secs(2));
        assert_eq!(policy.delay(3), Duration::from_secs(4));
        assert_eq!(RetryPolicy::immediate(0).attempts, 1);
    }

    #[test]
    fn test_block_adds_missing_entries() {
        let fake = FakeHosts::new();
        fake.entries.borrow_mut().insert("reddit.com".to_string(), false);

        let report = adapter(&fake).ensure_blocked(&domains(&["reddit.com", "youtube.com"]));
        assert!(report.is_complete());
        assert_eq!(report.summary(), "blocked 2 of 2 domains");
        assert!(fake.is_on("reddit.com"));
        assert!(fake.is_on("youtube.com"));
        assert!(fake.is_on(SENTINEL));
        assert_eq!(fake.call_count("add reddit.com"), 0);
        assert_eq!(fake.call_count("add youtube.com 127.0.0.1"), 1);
    }

    #[test]
    fn test_block_is_idempotent() {
        let fake = FakeHosts::new();
        let hosts = adapter(&fake);
        let set = domains(&["reddit.com"]);
        hosts.ensure_blocked(&set);
        let report = hosts.ensure_blocked(&set);
        assert!(report.is_complete());
        assert_eq!(fake.call_count("add reddit.com"), 1);
    }

    #[test]
    fn test_unblock_missing_entry_counts() {
        let fake = FakeHosts::new();
        fake.entries.borrow_mut().insert("reddit.com".to_string(), true);

        let report = adapter(&fake).ensure_unblocked(&domains(&["reddit.com", "never-added.com"]));
        assert_eq!(report.succeeded, 2);
        assert!(!fake.is_on("reddit.com"));
    }

    #[test]
    fn test_transient_failure_is_retried() {
        let fake = FakeHosts::new();
        fake.set_busy("add reddit.com 127.0.0.1", 2);

        let report = adapter(&fake).ensure_blocked(&domains(&["reddit.com"]));
        assert_eq!(report.succeeded, 1);
        assert_eq!(fake.call_count("add reddit.com"), 3);
    }

    #[test]
    fn test_transient_failure_gives_up() {
        let fake = FakeHosts::new();
        fake.set_busy("on reddit.com", 5);

        let report = adapter(&fake).ensure_blocked(&domains(&["reddit.com"]));
        assert_eq!(report.succeeded, 0);
        assert_eq!(fake.call_count("on reddit.com"), 3);
        assert!(report.failures[0].reason.contains("busy"));
    }

    #[test]
    fn test_hard_failure_does_not_abort_batch() {
        let fake = FakeHosts::new();
        fake.broken.borrow_mut().insert("bad.example.com".to_string());

        let report = adapter(&fake).ensure_blocked(&domains(&["a.example.com", "bad.example.com", "z.example.com"]));
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.total, 3);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].domain, "bad.example.com");
        assert!(!report.is_complete());
        // Hard failures are not retried
        assert_eq!(fake.call_count("on bad.example.com"), 1);
        assert!(fake.is_on("z.example.com"));
    }

    #[test]
    fn test_missing_tool_fails_every_domain() {
        let fake = FakeHosts::new();
        *fake.unavailable.borrow_mut() = true;

        let hosts = adapter(&fake);
        let report = hosts.ensure_blocked(&domains(&["a.com", "b.com"]));
        assert_eq!(report.succeeded, 0);
        assert_eq!(report.failures.len(), 2);
        assert_eq!(report.marker_updated, Some(false));
        assert_eq!(hosts.query_observed_mode(), ObservedMode::Unknown);
    }

    #[test]
    fn test_observed_mode_follows_marker() {
        let fake = FakeHosts::new();
        let hosts = adapter(&fake);
        let set = domains(&["reddit.com"]);

        assert_eq!(hosts.query_observed_mode(), ObservedMode::Normal);
        hosts.ensure_blocked(&set);
        assert_eq!(hosts.query_observed_mode(), ObservedMode::Work);
        hosts.ensure_unblocked(&set);
        assert_eq!(hosts.query_observed_mode(), ObservedMode::Normal);
    }

    #[test]
    fn test_busy_listing_is_retried() {
        let fake = FakeHosts::new();
        let hosts = adapter(&fake);
        hosts.ensure_blocked(&domains(&["reddit.com"]));
        fake.set_busy("list", 1);

        assert_eq!(hosts.query_observed_mode(), ObservedMode::Work);
        assert_eq!(fake.call_count("list"), 2);
    }

    #[test]
    fn test_domain_only_batch_leaves_marker() {
        let fake = FakeHosts::new();
        let hosts = adapter(&fake);
        hosts.ensure_blocked(&domains(&["reddit.com"]));

        let report = hosts.unblock_domains(&domains(&["reddit.com"]));
        assert!(report.is_complete());
        assert_eq!(report.marker_updated, None);
        assert!(!fake.is_on("reddit.com"));
        assert_eq!(hosts.query_observed_mode(), ObservedMode::Work);
    }

    #[test]
    fn test_marker_state_parsing() {
        let listing = "reddit.com -> 127.0.0.1 (On)\nfocusmode.sentinel.invalid -> 127.0.0.1 (Off)\n";
        assert_eq!(marker_state(listing, SENTINEL), Some(false));
        assert_eq!(marker_state("focusmode.sentinel.invalid 127.0.0.1 on", SENTINEL), Some(true));
        assert_eq!(marker_state("reddit.com -> 127.0.0.1 (On)", SENTINEL), None);
        assert_eq!(marker_state("focusmode.sentinel.invalid ???", SENTINEL), None);
    }
}

//! focus - block distracting sites and track time per mode
//!
//! Focus mode toggles between Work (distracting domains blocked through an
//! external hosts-file tool) and Normal, and records how long is spent in
//! each. Every CLI invocation is a short, independent process:
//! - `engine`: the state machine (enable/disable/stop, reconciliation)
//! - `hosts`: the retrying adapter over the hosts-editing tool
//! - `blocklist`: categorized domain list, including legacy migration
//! - `store`: session history with the current-session mirror
//! - `stats`: per-mode time totals

pub mod atomic;
pub mod blocklist;
pub mod engine;
pub mod error;
pub mod hosts;
pub mod session;
pub mod stats;
pub mod store;

pub use blocklist::{BlocklistConfig, BlocklistStore};
pub use engine::{FocusEngine, StateDrift, Status, TransitionKind, TransitionReport};
pub use error::FocusError;
pub use hosts::{HostsAdapter, ObservedMode, RetryPolicy};
pub use session::{Mode, Session};
pub use stats::FocusStats;
pub use store::{SessionHistory, SessionStore};

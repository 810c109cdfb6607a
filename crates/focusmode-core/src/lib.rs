//! focusmode core - Shared functionality for focusmode tools
//!
//! Paths, configuration and human-readable formatting used by the `focus`
//! CLI and its library.

pub mod config;
pub mod format;
pub mod paths;

pub use config::Config;
pub use paths::Paths;

//! focus - block distracting sites and track time per mode
//!
//! Usage:
//!   focus enable [--force]      Enter work mode (block distracting sites)
//!   focus disable [--force]     Return to normal mode (unblock them)
//!   focus status                Show the current mode and session time
//!   focus stop                  Stop tracking (leaves work mode first)
//!   focus add DOMAIN            Add a custom domain to the blocklist
//!   focus remove DOMAIN         Remove a custom domain
//!   focus list                  Show blocked domains by category
//!   focus stats [DAYS]          Show time spent per mode
//!   focus clear [--yes]         Erase session history (a backup is kept)
//!   focus migrate               Convert a legacy blocklist file
//!   focus config [--init]       Show (or write out) the effective configuration

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use tracing_subscriber::EnvFilter;

use focus::blocklist::{AddOutcome, MigrationOutcome, RemoveOutcome, CUSTOM_CATEGORY};
use focus::engine::{FocusEngine, TransitionKind, TransitionReport};
use focus::hosts::{BatchReport, ToolRunner};
use focus::session::Mode;
use focusmode_core::{format, Config, Paths};

/// Focus - block distracting sites and track time per mode
#[derive(Parser)]
#[command(name = "focus")]
#[command(about = "Block distracting sites while working and track time per mode")]
#[command(version)]
#[command(after_help = r#"HOW IT WORKS:
    'focus enable' blocks every domain in the blocklist through the hosts
    tool (hostess by default) and starts a work session. 'focus disable'
    unblocks them and starts a normal session. Each run first checks the
    hosts file, so a change made from another terminal is picked up.

EXAMPLES:
    focus enable                # Start working, block distractions
    focus disable               # Back to normal
    focus enable --force        # Re-apply blocking / recover a bad state
    focus add news.example.com  # Block an extra site
    focus stats 30              # Time per mode over 30 days

FILES:
    ~/.config/focusmode/config.json      Tool, redirect IP, retry settings
    ~/.local/share/focusmode/            sessions.json, blocklist.json

ALIASES:
    focus on / off   # enable / disable
    focus st         # status
"#)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Enter work mode and block distracting sites
    #[command(alias = "on")]
    Enable {
        /// Re-apply even if already in work mode; ignore a broken session file
        #[arg(long, short)]
        force: bool,
    },

    /// Return to normal mode and unblock sites
    #[command(alias = "off")]
    Disable {
        /// Re-apply even if already in normal mode; ignore a broken session file
        #[arg(long, short)]
        force: bool,
    },

    /// Show the current mode and session time
    #[command(alias = "st")]
    Status,

    /// Stop tracking time (leaves work mode first)
    #[command(alias = "end")]
    Stop,

    /// Add a custom domain to the blocklist
    Add {
        /// Domain such as example.com
        domain: String,
    },

    /// Remove a custom domain from the blocklist
    #[command(alias = "rm")]
    Remove {
        /// Domain such as example.com
        domain: String,
    },

    /// List blocked domains by category
    #[command(alias = "ls")]
    List,

    /// Show time spent per mode
    Stats {
        /// Number of days to show (default: 7)
        #[arg(default_value = "7")]
        days: u32,
    },

    /// Erase session history (a backup is written first)
    Clear {
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// Convert a legacy two-list blocklist file to the categorized format
    Migrate,

    /// Show the effective configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        init: bool,
    },
}

impl Commands {
    /// Commands that act on the mode check the hosts file first
    fn reconciles(&self) -> bool {
        !matches!(
            self,
            Commands::Add { .. } | Commands::Remove { .. } | Commands::List | Commands::Migrate | Commands::Config { .. }
        )
    }
}

// ANSI color codes
const RED: &str = "\x1b[0;31m";
const GREEN: &str = "\x1b[0;32m";
const YELLOW: &str = "\x1b[0;33m";
const CYAN: &str = "\x1b[0;36m";
const MAGENTA: &str = "\x1b[0;35m";
const BOLD: &str = "\x1b[1m";
const NC: &str = "\x1b[0m";

/// Check if stdout is a TTY and colors should be used
fn use_colors() -> bool {
    std::io::IsTerminal::is_terminal(&std::io::stdout())
}

/// Conditionally apply color
fn color(code: &str, text: &str) -> String {
    if use_colors() {
        format!("{}{}{}", code, text, NC)
    } else {
        text.to_string()
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let paths = Paths::new();
    let config = Config::load(&paths.config_file())?;
    let engine = FocusEngine::open(&paths, &config).context("Failed to open focus data")?;

    let command = cli.command.unwrap_or(Commands::Status);
    if command.reconciles() {
        if let Some(drift) = engine.reconcile()? {
            println!("{} {}", color(YELLOW, "[drift]"), drift);
        }
    }

    match command {
        Commands::Enable { force } => cmd_enable(&engine, force),
        Commands::Disable { force } => cmd_disable(&engine, force),
        Commands::Status => cmd_status(&engine),
        Commands::Stop => cmd_stop(&engine),
        Commands::Add { domain } => cmd_add(&engine, &domain),
        Commands::Remove { domain } => cmd_remove(&engine, &domain),
        Commands::List => cmd_list(&engine),
        Commands::Stats { days } => cmd_stats(&engine, days),
        Commands::Clear { yes } => cmd_clear(&engine, yes),
        Commands::Migrate => cmd_migrate(&engine),
        Commands::Config { init } => cmd_config(&paths, &config, init),
    }
}

fn print_batch(batch: &BatchReport) {
    let tag = if batch.is_complete() {
        color(GREEN, "[ok]")
    } else {
        color(YELLOW, "[warn]")
    };
    println!("{} {}", tag, capitalize(&batch.summary()));
    for failure in &batch.failures {
        println!("  {} {}: {}", color(RED, "-"), failure.domain, failure.reason);
    }
    if batch.marker_updated == Some(false) {
        println!(
            "{} Could not update the mode marker; the next run may report drift",
            color(YELLOW, "[warn]")
        );
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn print_transition(report: &TransitionReport) {
    if report.kind == TransitionKind::AlreadyActive {
        let since = report
            .current
            .as_ref()
            .map(|s| format!(" (since {})", format::time(s.start_time.with_timezone(&Local))))
            .unwrap_or_default();
        println!(
            "{} Already in {} mode{}. Use --force to re-apply.",
            color(CYAN, "[info]"),
            report.mode,
            since
        );
        return;
    }

    for warning in &report.warnings {
        println!("{} {}", color(YELLOW, "[warn]"), warning);
    }
    if let Some(closed) = &report.closed {
        println!(
            "{} Closed {} session: {}",
            color(GREEN, "[ok]"),
            closed.mode,
            format::minutes(closed.duration_minutes.unwrap_or_default())
        );
    }
    if let Some(batch) = &report.batch {
        print_batch(batch);
    }
}

/// Enter work mode
fn cmd_enable<R: ToolRunner>(engine: &FocusEngine<R>, force: bool) -> Result<()> {
    let report = engine.enable(force)?;
    print_transition(&report);
    if report.kind == TransitionKind::Switched {
        println!();
        println!("{}", color(&format!("{}{}", BOLD, MAGENTA), "WORK MODE"));
        println!();
        println!("Run 'focus disable' when you are done");
    }
    Ok(())
}

/// Return to normal mode
fn cmd_disable<R: ToolRunner>(engine: &FocusEngine<R>, force: bool) -> Result<()> {
    let report = engine.disable(force)?;
    print_transition(&report);
    if report.kind == TransitionKind::Switched {
        println!();
        println!("{}", color(&format!("{}{}", BOLD, GREEN), "NORMAL MODE"));
    }
    Ok(())
}

/// Show the current mode
fn cmd_status<R: ToolRunner>(engine: &FocusEngine<R>) -> Result<()> {
    let status = engine.status();

    let title = match status.mode {
        Mode::Work => color(&format!("{}{}", BOLD, MAGENTA), "WORK MODE"),
        Mode::Normal => color(&format!("{}{}", BOLD, GREEN), "NORMAL MODE"),
    };
    println!("{}", title);
    println!();

    match status.session_start {
        Some(start) => {
            println!("  {}    {}", color(CYAN, "Since:"), format::time(start.with_timezone(&Local)));
            println!("  {}  {}", color(CYAN, "Elapsed:"), format::elapsed(status.elapsed));
        }
        None => {
            println!("Not tracking time. Start with: focus enable");
        }
    }

    Ok(())
}

/// Stop tracking
fn cmd_stop<R: ToolRunner>(engine: &FocusEngine<R>) -> Result<()> {
    let report = engine.stop()?;

    if let Some(batch) = &report.batch {
        print_batch(batch);
    }
    match report.closed {
        Some(closed) => println!(
            "{} Stopped tracking {} session after {}",
            color(GREEN, "[ok]"),
            closed.mode,
            format::minutes(closed.duration_minutes.unwrap_or_default())
        ),
        None => println!("{} No active session", color(CYAN, "[info]")),
    }
    Ok(())
}

/// Add a custom domain
fn cmd_add<R: ToolRunner>(engine: &FocusEngine<R>, domain: &str) -> Result<()> {
    let (outcome, batch) = engine.add_domain(domain)?;

    match outcome {
        AddOutcome::Added(domain) => println!("{} Added {}", color(GREEN, "[ok]"), domain),
        AddOutcome::AlreadyPresent(domain) => {
            println!("{} {} is already on the blocklist", color(CYAN, "[info]"), domain)
        }
        AddOutcome::InvalidFormat(input) => {
            bail!("'{}' is not a valid domain (expected something like example.com)", input)
        }
        AddOutcome::Reserved(domain) => {
            bail!("{} is the focus mode marker entry and cannot be blocked", domain)
        }
    }
    if let Some(batch) = &batch {
        print_batch(batch);
    }
    Ok(())
}

/// Remove a custom domain
fn cmd_remove<R: ToolRunner>(engine: &FocusEngine<R>, domain: &str) -> Result<()> {
    let (outcome, batch) = engine.remove_domain(domain)?;

    match outcome {
        RemoveOutcome::Removed(domain) => println!("{} Removed {}", color(GREEN, "[ok]"), domain),
        RemoveOutcome::NotCustom { domain, category } => {
            bail!("{} is part of the built-in '{}' list and cannot be removed", domain, category)
        }
        RemoveOutcome::NotFound(domain) => {
            println!("{} {} is not on the blocklist", color(CYAN, "[info]"), domain)
        }
    }
    if let Some(batch) = &batch {
        print_batch(batch);
    }
    Ok(())
}

/// List domains by category
fn cmd_list<R: ToolRunner>(engine: &FocusEngine<R>) -> Result<()> {
    let categories = engine.list_domains()?;
    let total: usize = categories.values().map(|d| d.len()).sum();

    println!("{}Blocklist ({} domains){}", BOLD, total, NC);
    for (name, domains) in &categories {
        println!();
        let label = if name == CUSTOM_CATEGORY {
            format!("{} ({}, editable)", name, domains.len())
        } else {
            format!("{} ({})", name, domains.len())
        };
        println!("  {}", color(CYAN, &label));
        if domains.is_empty() {
            println!("    (none)");
        }
        for domain in domains {
            println!("    {}", domain);
        }
    }
    Ok(())
}

/// Show time per mode
fn cmd_stats<R: ToolRunner>(engine: &FocusEngine<R>, days: u32) -> Result<()> {
    let stats = engine.stats(days)?;

    println!("{}Focus Statistics (Last {} days){}", BOLD, days, NC);
    println!();
    println!(
        "  {}     {} in {} sessions ({}%)",
        color(CYAN, "Work:"),
        format::minutes(stats.work.minutes),
        stats.work.sessions,
        stats.work_percent()
    );
    println!(
        "  {}   {} in {} sessions",
        color(CYAN, "Normal:"),
        format::minutes(stats.normal.minutes),
        stats.normal.sessions
    );

    if stats.work.sessions > 0 {
        println!();
        println!(
            "  {}  {}",
            color(CYAN, "Average work session:"),
            format::minutes(stats.work.average_minutes())
        );
        println!();
        for (date, minutes) in &stats.daily_work {
            println!("    {}  {}", date, format::minutes(*minutes));
        }
    }
    Ok(())
}

fn is_confirmed(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// Erase the session history after confirmation
fn cmd_clear<R: ToolRunner>(engine: &FocusEngine<R>, yes: bool) -> Result<()> {
    if !yes {
        print!("This erases all recorded sessions. Continue? [y/N] ");
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin().lock().read_line(&mut answer)?;
        if !is_confirmed(&answer) {
            println!("{} Nothing cleared", color(CYAN, "[info]"));
            return Ok(());
        }
    }

    let backup = engine.clear_history()?;
    println!("{} Session history cleared", color(GREEN, "[ok]"));
    println!("Backup: {}", backup.display());
    Ok(())
}

/// Migrate a legacy blocklist
fn cmd_migrate<R: ToolRunner>(engine: &FocusEngine<R>) -> Result<()> {
    match engine.blocklist().migrate()? {
        MigrationOutcome::NotNeeded => {
            println!("{} Blocklist is already up to date", color(CYAN, "[info]"))
        }
        MigrationOutcome::Migrated {
            backup,
            default_domains,
            custom_domains,
            duplicates_dropped,
        } => {
            println!("{} Blocklist migrated", color(GREEN, "[ok]"));
            println!("  {} {}", color(CYAN, "Default domains:"), default_domains);
            println!("  {}  {}", color(CYAN, "Custom domains:"), custom_domains);
            if duplicates_dropped > 0 {
                println!("  {}      {}", color(CYAN, "Duplicates:"), duplicates_dropped);
            }
            println!("Original saved to {}", backup.display());
        }
        MigrationOutcome::Failed { reason, backup } => {
            bail!("Migration failed: {} (original kept, copy at {})", reason, backup.display())
        }
    }
    Ok(())
}

/// Print the effective configuration, optionally writing it out
fn cmd_config(paths: &Paths, config: &Config, init: bool) -> Result<()> {
    if init {
        config.save(&paths.config_file())?;
        println!("{} Wrote {}", color(GREEN, "[ok]"), paths.config_file().display());
        println!();
    }
    println!("{} {}", color(CYAN, "Config file:"), paths.config_file().display());
    println!(
        "{}   {}",
        color(CYAN, "Data dir:"),
        config.data_dir.as_ref().unwrap_or(&paths.data).display()
    );
    println!();
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

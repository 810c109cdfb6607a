//! Blocklist configuration
//!
//! The unified blocklist keeps every blocked domain in `allSites` and tags
//! each one with exactly one category. Only the `Custom` category can be
//! edited; the others are the built-in default sets.
//!
//! Older installs stored two flat lists (`default` and `custom`). Loading
//! such a file migrates it in place after snapshotting the original.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::atomic;
use crate::error::{FocusError, Result};

/// Current on-disk schema of the blocklist file
pub const BLOCKLIST_SCHEMA_VERSION: u32 = 2;

/// The only user-editable category
pub const CUSTOM_CATEGORY: &str = "Custom";

/// Category for legacy default domains the lookup table does not know
pub const OTHER_CATEGORY: &str = "Other";

/// Built-in categories and their domains
const DEFAULT_CATEGORIES: &[(&str, &[&str])] = &[
    (
        "Social Media",
        &[
            "facebook.com",
            "www.facebook.com",
            "instagram.com",
            "www.instagram.com",
            "twitter.com",
            "x.com",
            "reddit.com",
            "www.reddit.com",
            "tiktok.com",
            "www.tiktok.com",
            "linkedin.com",
            "www.linkedin.com",
        ],
    ),
    (
        "Video & Streaming",
        &[
            "youtube.com",
            "www.youtube.com",
            "netflix.com",
            "www.netflix.com",
            "twitch.tv",
            "www.twitch.tv",
            "hulu.com",
        ],
    ),
    (
        "News",
        &[
            "news.ycombinator.com",
            "cnn.com",
            "www.cnn.com",
            "bbc.com",
            "www.bbc.com",
            "nytimes.com",
            "www.nytimes.com",
        ],
    ),
    (
        "Shopping",
        &["amazon.com", "www.amazon.com", "ebay.com", "www.ebay.com"],
    ),
    (
        "Gaming",
        &["store.steampowered.com", "steamcommunity.com", "chess.com", "www.chess.com"],
    ),
];

/// Category a built-in domain belongs to, if it is one
pub fn default_category(domain: &str) -> Option<&'static str> {
    DEFAULT_CATEGORIES
        .iter()
        .find(|(_, domains)| domains.contains(&domain))
        .map(|(name, _)| *name)
}

fn domain_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        regex::Regex::new(r"^(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?$")
            .expect("domain regex is valid")
    })
}

/// Normalize user input to a bare lowercase host name.
///
/// Accepts pasted URLs (`https://Example.com/path`) and trailing dots, and
/// requires at least one `.` separator between valid DNS labels.
pub fn normalize_domain(input: &str) -> Result<String> {
    let mut domain = input.trim().to_lowercase();
    for scheme in ["https://", "http://"] {
        if let Some(rest) = domain.strip_prefix(scheme) {
            domain = rest.to_string();
        }
    }
    if let Some(cut) = domain.find(['/', '?', '#']) {
        domain.truncate(cut);
    }
    let domain = domain.trim_end_matches('.').to_string();

    if domain.len() > 253 || !domain_regex().is_match(&domain) {
        return Err(FocusError::InvalidDomain(input.trim().to_string()));
    }
    Ok(domain)
}

/// Result of adding a custom domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added(String),
    AlreadyPresent(String),
    InvalidFormat(String),
    /// The domain is the hosts-file mode marker and cannot be blocked
    Reserved(String),
}

/// Result of removing a custom domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed(String),
    /// The domain belongs to a built-in category
    NotCustom { domain: String, category: String },
    NotFound(String),
}

/// Result of a legacy migration attempt
#[derive(Debug, Clone, PartialEq)]
pub enum MigrationOutcome {
    /// The file was already in the unified format (or absent)
    NotNeeded,
    Migrated {
        backup: PathBuf,
        default_domains: usize,
        custom_domains: usize,
        /// Custom entries dropped because a default already covers them
        duplicates_dropped: usize,
    },
    /// Nothing was changed; the original content is in place
    Failed { reason: String, backup: PathBuf },
}

/// Unified blocklist
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlocklistConfig {
    pub all_sites: BTreeSet<String>,
    pub categories: BTreeMap<String, BTreeSet<String>>,
    pub schema_version: u32,
    pub last_updated: DateTime<Utc>,
}

impl Default for BlocklistConfig {
    fn default() -> Self {
        let mut categories: BTreeMap<String, BTreeSet<String>> = DEFAULT_CATEGORIES
            .iter()
            .map(|(name, domains)| {
                (name.to_string(), domains.iter().map(|d| d.to_string()).collect())
            })
            .collect();
        categories.insert(CUSTOM_CATEGORY.to_string(), BTreeSet::new());
        Self::from_categories(categories)
    }
}

impl BlocklistConfig {
    fn from_categories(categories: BTreeMap<String, BTreeSet<String>>) -> Self {
        let all_sites = categories.values().flatten().cloned().collect();
        Self {
            all_sites,
            categories,
            schema_version: BLOCKLIST_SCHEMA_VERSION,
            last_updated: Utc::now(),
        }
    }

    /// Build the unified structure from the two legacy lists
    fn from_legacy(legacy: &LegacyBlocklist) -> (Self, usize) {
        let mut categories: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        categories.insert(CUSTOM_CATEGORY.to_string(), BTreeSet::new());

        for raw in &legacy.default {
            let domain = match normalize_domain(raw) {
                Ok(domain) => domain,
                Err(_) => {
                    warn!(domain = %raw, "dropping invalid legacy default domain");
                    continue;
                }
            };
            let category = default_category(&domain).unwrap_or(OTHER_CATEGORY);
            categories.entry(category.to_string()).or_default().insert(domain);
        }

        let defaults: BTreeSet<String> = categories.values().flatten().cloned().collect();
        let mut duplicates = 0;
        for raw in &legacy.custom {
            let domain = match normalize_domain(raw) {
                Ok(domain) => domain,
                Err(_) => {
                    warn!(domain = %raw, "dropping invalid legacy custom domain");
                    continue;
                }
            };
            if defaults.contains(&domain) {
                duplicates += 1;
                continue;
            }
            if let Some(custom) = categories.get_mut(CUSTOM_CATEGORY) {
                custom.insert(domain);
            }
        }

        (Self::from_categories(categories), duplicates)
    }

    /// Domains in the user-editable category
    pub fn custom(&self) -> impl Iterator<Item = &String> {
        self.categories.get(CUSTOM_CATEGORY).into_iter().flatten()
    }

    /// Name of the category holding `domain`
    pub fn category_of(&self, domain: &str) -> Option<&str> {
        self.categories
            .iter()
            .find(|(_, domains)| domains.contains(domain))
            .map(|(name, _)| name.as_str())
    }

    /// Check the category/allSites invariants, repairing what can be repaired.
    /// Returns true if anything had to change.
    fn normalize(&mut self, path: &Path) -> Result<bool> {
        let mut changed = false;
        let mut seen: BTreeSet<String> = BTreeSet::new();

        for (name, domains) in self.categories.iter_mut() {
            let mut cleaned = BTreeSet::new();
            for raw in domains.iter() {
                let domain = normalize_domain(raw).map_err(|_| {
                    FocusError::corrupt(path, format!("invalid domain '{}' in category '{}'", raw, name))
                })?;
                if !seen.insert(domain.clone()) {
                    warn!(%domain, category = %name, "domain listed in more than one category");
                    changed = true;
                    continue;
                }
                cleaned.insert(domain);
            }
            if cleaned != *domains {
                *domains = cleaned;
                changed = true;
            }
        }

        if !self.categories.contains_key(CUSTOM_CATEGORY) {
            self.categories.insert(CUSTOM_CATEGORY.to_string(), BTreeSet::new());
            changed = true;
        }

        if self.all_sites != seen {
            warn!(
                listed = self.all_sites.len(),
                categorized = seen.len(),
                "allSites out of sync with categories, rebuilding"
            );
            self.all_sites = seen;
            changed = true;
        }
        Ok(changed)
    }
}

/// The pre-category format
#[derive(Debug, Deserialize)]
struct LegacyBlocklist {
    #[serde(default)]
    default: Vec<String>,
    #[serde(default)]
    custom: Vec<String>,
}

enum OnDisk {
    Missing,
    Current(BlocklistConfig),
    Legacy(LegacyBlocklist),
}

/// Blocklist store
pub struct BlocklistStore {
    path: PathBuf,
}

impl BlocklistStore {
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

    fn read(&self) -> Result<OnDisk> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(OnDisk::Missing),
            Err(e) => return Err(FocusError::io("read", &self.path, e)),
        };
        if content.trim().is_empty() {
            return Ok(OnDisk::Missing);
        }

        let value: Value =
            serde_json::from_str(&content).map_err(|e| FocusError::corrupt(&self.path, e))?;
        let object = value
            .as_object()
            .ok_or_else(|| FocusError::corrupt(&self.path, "expected a JSON object"))?;

        if let Some(version) = object.get("schemaVersion") {
            let version = version
                .as_u64()
                .ok_or_else(|| FocusError::corrupt(&self.path, "schemaVersion is not a number"))?;
            if version != u64::from(BLOCKLIST_SCHEMA_VERSION) {
                return Err(FocusError::corrupt(
                    &self.path,
                    format!("unsupported schemaVersion {}", version),
                ));
            }
            let config = serde_json::from_value(value).map_err(|e| FocusError::corrupt(&self.path, e))?;
            return Ok(OnDisk::Current(config));
        }

        if object.contains_key("default") || object.contains_key("custom") {
            let legacy = serde_json::from_value(value).map_err(|e| FocusError::corrupt(&self.path, e))?;
            return Ok(OnDisk::Legacy(legacy));
        }

        Err(FocusError::corrupt(&self.path, "unrecognized blocklist format"))
    }

    /// Load the blocklist, writing defaults on first run and migrating a
    /// legacy file in place.
    pub fn load(&self) -> Result<BlocklistConfig> {
        match self.read()? {
            OnDisk::Missing => {
                let config = BlocklistConfig::default();
                self.save(&config)?;
                info!(path = %self.path.display(), "wrote default blocklist");
                Ok(config)
            }
            OnDisk::Current(mut config) => {
                if config.normalize(&self.path)? {
                    config.last_updated = Utc::now();
                    self.save(&config)?;
                }
                Ok(config)
            }
            OnDisk::Legacy(_) => match self.migrate()? {
                MigrationOutcome::Failed { reason, backup } => Err(FocusError::Migration { reason, backup }),
                _ => match self.read()? {
                    OnDisk::Current(config) => Ok(config),
                    _ => Err(FocusError::corrupt(&self.path, "migration did not produce a unified blocklist")),
                },
            },
        }
    }

    /// Write the blocklist as given; callers set `lastUpdated`
    pub fn save(&self, config: &BlocklistConfig) -> Result<()> {
        let json = serde_json::to_string_pretty(config).map_err(|e| FocusError::corrupt(&self.path, e))?;
        atomic::replace_with_backup(&self.path, json.as_bytes())
    }

    /// Add a domain to the Custom category
    pub fn add_custom(&self, input: &str) -> Result<AddOutcome> {
        let domain = match normalize_domain(input) {
            Ok(domain) => domain,
            Err(_) => return Ok(AddOutcome::InvalidFormat(input.trim().to_string())),
        };

        let mut config = self.load()?;
        if config.all_sites.contains(&domain) {
            return Ok(AddOutcome::AlreadyPresent(domain));
        }

        config.all_sites.insert(domain.clone());
        config
            .categories
            .entry(CUSTOM_CATEGORY.to_string())
            .or_default()
            .insert(domain.clone());
        config.last_updated = Utc::now();
        self.save(&config)?;

        info!(%domain, "custom domain added");
        Ok(AddOutcome::Added(domain))
    }

    /// Remove a domain from the Custom category. Built-in domains are refused.
    pub fn remove_custom(&self, input: &str) -> Result<RemoveOutcome> {
        let domain = match normalize_domain(input) {
            Ok(domain) => domain,
            Err(_) => return Ok(RemoveOutcome::NotFound(input.trim().to_string())),
        };

        let mut config = self.load()?;
        match config.category_of(&domain) {
            None => return Ok(RemoveOutcome::NotFound(domain)),
            Some(category) if category != CUSTOM_CATEGORY => {
                return Ok(RemoveOutcome::NotCustom {
                    category: category.to_string(),
                    domain,
                });
            }
            Some(_) => {}
        }

        if let Some(custom) = config.categories.get_mut(CUSTOM_CATEGORY) {
            custom.remove(&domain);
        }
        config.all_sites.remove(&domain);
        config.last_updated = Utc::now();
        self.save(&config)?;

        info!(%domain, "custom domain removed");
        Ok(RemoveOutcome::Removed(domain))
    }

    /// Convert a legacy two-list file to the unified format.
    ///
    /// The original is snapshotted first; on any failure it is copied back
    /// and `Failed` is returned.
    pub fn migrate(&self) -> Result<MigrationOutcome> {
        let legacy = match self.read() {
            Ok(OnDisk::Legacy(legacy)) => legacy,
            Ok(_) => return Ok(MigrationOutcome::NotNeeded),
            Err(e) => return Err(e),
        };

        let backup = atomic::snapshot(&self.path, "legacy-backup")?;
        let (config, duplicates_dropped) = BlocklistConfig::from_legacy(&legacy);
        let custom_domains = config.custom().count();
        let default_domains = config.all_sites.len() - custom_domains;

        let written = serde_json::to_string_pretty(&config)
            .map_err(|e| FocusError::corrupt(&self.path, e))
            .and_then(|json| atomic::write_atomic(&self.path, json.as_bytes()));

        if let Err(e) = written {
            warn!(error = %e, backup = %backup.display(), "blocklist migration failed, restoring original");
            fs::copy(&backup, &self.path).map_err(|e| FocusError::io("restore", &self.path, e))?;
            return Ok(MigrationOutcome::Failed {
                reason: e.to_string(),
                backup,
            });
        }

        info!(
            default_domains,
            custom_domains,
            duplicates_dropped,
            backup = %backup.display(),
            "migrated legacy blocklist"
        );
        Ok(MigrationOutcome::Migrated {
            backup,
            default_domains,
            custom_domains,
            duplicates_dropped,
        })
    }
}

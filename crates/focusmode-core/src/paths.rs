//! Standard paths used by focusmode tools

use std::path::PathBuf;

/// Standard focusmode paths
pub struct Paths {
    /// Data directory (~/.local/share/focusmode)
    pub data: PathBuf,
    /// Config directory (~/.config/focusmode)
    pub config: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    pub fn new() -> Self {
        let data = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("focusmode");

        let config = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("focusmode");

        Self { data, config }
    }

    /// Paths rooted at an explicit data directory (config stays standard)
    pub fn with_data_dir(data: PathBuf) -> Self {
        Self {
            data,
            ..Self::new()
        }
    }

    /// Main configuration file
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.json")
    }

    /// Session history file (closed sessions + current session mirror)
    pub fn sessions_file(&self) -> PathBuf {
        self.data.join("sessions.json")
    }

    /// Blocklist configuration file
    pub fn blocklist_file(&self) -> PathBuf {
        self.data.join("blocklist.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_files_live_under_data_dir() {
        let paths = Paths::with_data_dir(PathBuf::from("/tmp/focus-data"));
        assert_eq!(paths.sessions_file(), PathBuf::from("/tmp/focus-data/sessions.json"));
        assert_eq!(paths.blocklist_file(), PathBuf::from("/tmp/focus-data/blocklist.json"));
        assert!(paths.config_file().ends_with("focusmode/config.json"));
    }
}

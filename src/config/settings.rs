//! Configuration settings and validation.

use crate::{Error, Result};
use std::path::{Path, PathBuf};

/// Upper bound for the change-event channel.
const MAX_EVENT_CAPACITY: usize = 65_536;

/// Main configuration for the directory-file provider.
#[derive(Debug, Clone)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON.
    pub log_json: bool,

    /// Workspace folders. Header paths and watch globs are relative to
    /// the deepest folder containing the viewed directory.
    pub workspace_roots: Vec<PathBuf>,

    /// Capacity of the synthetic change-event broadcast channel.
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_json: false,
            workspace_roots: Vec::new(),
            event_capacity: 256,
        }
    }
}

impl Config {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.event_capacity == 0 {
            return Err(Error::config("event_capacity cannot be 0"));
        }

        if self.event_capacity > MAX_EVENT_CAPACITY {
            return Err(Error::config(format!(
                "event_capacity cannot exceed {MAX_EVENT_CAPACITY}"
            )));
        }

        if let Some(root) = self.workspace_roots.iter().find(|r| !r.is_absolute()) {
            return Err(Error::config(format!(
                "workspace root '{}' must be an absolute path",
                root.display()
            )));
        }

        Ok(())
    }

    /// Find the deepest workspace root containing `path`.
    #[must_use]
    pub fn workspace_root_for(&self, path: &Path) -> Option<&Path> {
        self.workspace_roots
            .iter()
            .filter(|root| path.starts_with(root))
            .max_by_key(|root| root.components().count())
            .map(PathBuf::as_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.event_capacity, 256);
        assert!(config.workspace_roots.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_new() {
        let config = Config::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let config = Config {
            log_level: "invalid".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log level"));
    }

    #[test]
    fn test_validate_event_capacity_zero() {
        let config = Config {
            event_capacity: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("event_capacity"));
    }

    #[test]
    fn test_validate_event_capacity_too_high() {
        let config = Config {
            event_capacity: 100_000,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("65536"));
    }

    #[test]
    fn test_validate_relative_workspace_root() {
        let config = Config {
            workspace_roots: vec![PathBuf::from("relative/dir")],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("absolute"));
    }

    #[test]
    fn test_log_level_case_insensitive() {
        for level in ["TRACE", "Debug", "INFO", "Warn", "ERROR"] {
            let config = Config {
                log_level: level.to_string(),
                ..Default::default()
            };
            assert!(
                config.validate().is_ok(),
                "Level '{level}' should be valid (case insensitive)"
            );
        }
    }

    #[test]
    fn test_workspace_root_for_picks_deepest() {
        let config = Config {
            workspace_roots: vec![PathBuf::from("/home"), PathBuf::from("/home/user/proj")],
            ..Default::default()
        };

        assert_eq!(
            config.workspace_root_for(Path::new("/home/user/proj/src")),
            Some(Path::new("/home/user/proj"))
        );
        assert_eq!(
            config.workspace_root_for(Path::new("/home/other")),
            Some(Path::new("/home"))
        );
        assert_eq!(config.workspace_root_for(Path::new("/var/data")), None);
    }
}

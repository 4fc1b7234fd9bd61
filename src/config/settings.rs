use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::util::paths::{audit_dir, config_path};

/// Example configuration file contents (bundled with the binary)
pub const EXAMPLE_CONFIG: &str = include_str!("config.toml.example");

/// Environment toggle that enables audit recording for the process
pub const ENV_AUDIT: &str = "CALLTAPE_AUDIT";
/// Environment override for the audit session directory
pub const ENV_AUDIT_DIR: &str = "CALLTAPE_AUDIT_DIR";

/// Audit recorder configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditConfig {
    /// Whether calls are recorded at all. Read once when the recorder starts.
    pub enabled: bool,
    /// Directory that receives one session file per process
    pub log_dir: PathBuf,
    /// Scrub inline secrets (API keys, bearer tokens) out of string values
    pub scrub_inline_secrets: bool,
    /// Drop pending calls older than this. None keeps them until completion.
    pub pending_ttl: Option<Duration>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            log_dir: audit_dir(),
            scrub_inline_secrets: true,
            pending_ttl: None,
        }
    }
}

/// TOML representation of the `[audit]` table
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlAuditConfig {
    pub enabled: Option<bool>,
    pub log_dir: Option<PathBuf>,
    pub scrub_inline_secrets: Option<bool>,
    pub pending_ttl_secs: Option<u64>,
}

/// TOML representation of the whole config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    pub audit: Option<TomlAuditConfig>,
}

impl AuditConfig {
    /// Enabled config writing into `dir`. Handy for embedding and tests.
    pub fn enabled_in(dir: impl Into<PathBuf>) -> Self {
        Self {
            enabled: true,
            log_dir: dir.into(),
            ..Self::default()
        }
    }

    /// Load configuration from ~/.calltape/config.toml, then apply
    /// environment overrides.
    ///
    /// Never creates the config file or any directory: a disabled recorder
    /// must leave no trace on disk.
    pub fn load() -> Self {
        let mut config = Self::from_file(&config_path());
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Defaults merged with the `[audit]` table of the file at `path`, if any.
    pub fn from_file(path: &Path) -> Self {
        let mut config = Self::default();

        if !path.exists() {
            return config;
        }

        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read config file");
                return config;
            }
        };

        match toml::from_str::<TomlConfig>(&contents) {
            Ok(toml_config) => {
                if let Some(audit) = toml_config.audit {
                    config.merge(audit);
                }
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring malformed config file");
            }
        }

        config
    }

    fn merge(&mut self, audit: TomlAuditConfig) {
        if let Some(enabled) = audit.enabled {
            self.enabled = enabled;
        }
        if let Some(log_dir) = audit.log_dir {
            self.log_dir = log_dir;
        }
        if let Some(scrub) = audit.scrub_inline_secrets {
            self.scrub_inline_secrets = scrub;
        }
        if let Some(secs) = audit.pending_ttl_secs {
            self.pending_ttl = (secs > 0).then(|| Duration::from_secs(secs));
        }
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup(ENV_AUDIT) {
            self.enabled = parse_toggle(&raw);
        }
        if let Some(dir) = lookup(ENV_AUDIT_DIR).filter(|d| !d.trim().is_empty()) {
            self.log_dir = PathBuf::from(dir);
        }
    }
}

fn parse_toggle(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

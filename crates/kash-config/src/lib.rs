// SPDX-License-Identifier: MIT OR Apache-2.0
//! Environment-driven settings for the kash content pipeline engine.
//!
//! This crate resolves the `KASH_*` environment variables into a validated
//! [`KashSettings`] record, with advisory [`SettingsWarning`]s for soft
//! issues.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

// ---------------------------------------------------------------------------
// Errors and warnings
// ---------------------------------------------------------------------------

/// Errors from settings resolution or validation.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// The configured log level is not recognized.
    #[error("invalid log level: {level}")]
    InvalidLogLevel {
        /// Level string that was rejected.
        level: String,
    },

    /// A directory setting is empty or otherwise unusable.
    #[error("invalid directory for {name}: {value}")]
    InvalidDirectory {
        /// Which setting.
        name: String,
        /// The offending value.
        value: String,
    },
}

/// Advisory issues that do not prevent operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsWarning {
    /// No home directory could be determined; relative defaults are in use.
    NoHomeDir,
    /// The MCP workspace is unset; the MCP surface falls back to the
    /// current workspace.
    NoMcpWorkspace,
}

impl std::fmt::Display for SettingsWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsWarning::NoHomeDir => {
                write!(f, "no home directory found; using relative defaults")
            }
            SettingsWarning::NoMcpWorkspace => {
                write!(f, "KASH_MCP_WS unset; MCP serves the current workspace")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Log level
// ---------------------------------------------------------------------------

/// Recognized log levels.
pub const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

/// Validate a log level string.
///
/// # Errors
///
/// Returns [`SettingsError::InvalidLogLevel`] for unrecognized values.
pub fn check_log_level(level: &str) -> Result<(), SettingsError> {
    if VALID_LOG_LEVELS.contains(&level) {
        Ok(())
    } else {
        Err(SettingsError::InvalidLogLevel {
            level: level.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Environment variable names recognized by kash.
pub mod env_vars {
    /// Default workspace root directory.
    pub const WS_ROOT: &str = "KASH_WS_ROOT";
    /// Global workspace directory.
    pub const GLOBAL_WS: &str = "KASH_GLOBAL_WS";
    /// System-wide log directory.
    pub const SYSTEM_LOGS_DIR: &str = "KASH_SYSTEM_LOGS_DIR";
    /// System-wide cache directory.
    pub const SYSTEM_CACHE_DIR: &str = "KASH_SYSTEM_CACHE_DIR";
    /// Workspace served by the MCP tool server.
    pub const MCP_WS: &str = "KASH_MCP_WS";
    /// Log level (error, warn, info, debug, trace).
    pub const LOG_LEVEL: &str = "KASH_LOG_LEVEL";
    /// User agent for outgoing web requests.
    pub const USER_AGENT: &str = "KASH_USER_AGENT";
}

/// Name of the global workspace directory under the workspace root.
pub const GLOBAL_WS_NAME: &str = "global";

/// Default user agent for outgoing requests.
pub const DEFAULT_USER_AGENT: &str = concat!("kash/", env!("CARGO_PKG_VERSION"));

/// Resolved process-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct KashSettings {
    /// Root directory under which named workspaces live.
    pub ws_root_dir: PathBuf,

    /// The global (fallback) workspace directory.
    pub global_ws_dir: PathBuf,

    /// Directory for system-level logs.
    pub system_logs_dir: PathBuf,

    /// Directory for system-level caches (content and media).
    pub system_cache_dir: PathBuf,

    /// Workspace directory served by the MCP tool server, if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcp_ws_dir: Option<PathBuf>,

    /// Log level (one of [`VALID_LOG_LEVELS`]).
    pub log_level: String,

    /// User agent string for outgoing web requests.
    pub user_agent: String,
}

impl Default for KashSettings {
    fn default() -> Self {
        Self::from_vars(&BTreeMap::new(), home_dir())
    }
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

impl KashSettings {
    /// Resolve settings from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        let vars: BTreeMap<String, String> = [
            env_vars::WS_ROOT,
            env_vars::GLOBAL_WS,
            env_vars::SYSTEM_LOGS_DIR,
            env_vars::SYSTEM_CACHE_DIR,
            env_vars::MCP_WS,
            env_vars::LOG_LEVEL,
            env_vars::USER_AGENT,
        ]
        .iter()
        .filter_map(|name| std::env::var(name).ok().map(|v| (name.to_string(), v)))
        .collect();
        Self::from_vars(&vars, home_dir())
    }

    /// Resolve settings from an explicit variable map (used by tests and
    /// embedders).
    #[must_use]
    pub fn from_vars(vars: &BTreeMap<String, String>, home: Option<PathBuf>) -> Self {
        let base = home.unwrap_or_else(|| PathBuf::from("."));
        let kash_dir = base.join(".kash_system");

        let ws_root_dir = vars
            .get(env_vars::WS_ROOT)
            .map(PathBuf::from)
            .unwrap_or_else(|| base.join("kash"));
        let global_ws_dir = vars
            .get(env_vars::GLOBAL_WS)
            .map(PathBuf::from)
            .unwrap_or_else(|| ws_root_dir.join(GLOBAL_WS_NAME));
        let system_logs_dir = vars
            .get(env_vars::SYSTEM_LOGS_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| kash_dir.join("logs"));
        let system_cache_dir = vars
            .get(env_vars::SYSTEM_CACHE_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| kash_dir.join("cache"));
        let mcp_ws_dir = vars.get(env_vars::MCP_WS).map(PathBuf::from);
        let log_level = vars
            .get(env_vars::LOG_LEVEL)
            .cloned()
            .unwrap_or_else(|| "info".to_string());
        let user_agent = vars
            .get(env_vars::USER_AGENT)
            .cloned()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

        Self {
            ws_root_dir,
            global_ws_dir,
            system_logs_dir,
            system_cache_dir,
            mcp_ws_dir,
            log_level,
            user_agent,
        }
    }

    /// Validate the settings, returning advisory warnings.
    ///
    /// # Errors
    ///
    /// Returns a [`SettingsError`] for hard problems (bad log level, empty
    /// directories).
    pub fn validate(&self) -> Result<Vec<SettingsWarning>, SettingsError> {
        check_log_level(&self.log_level)?;

        for (name, dir) in [
            ("ws_root_dir", &self.ws_root_dir),
            ("global_ws_dir", &self.global_ws_dir),
            ("system_logs_dir", &self.system_logs_dir),
            ("system_cache_dir", &self.system_cache_dir),
        ] {
            if dir.as_os_str().is_empty() {
                return Err(SettingsError::InvalidDirectory {
                    name: name.to_string(),
                    value: dir.display().to_string(),
                });
            }
        }

        let mut warnings = Vec::new();
        if home_dir().is_none() {
            warnings.push(SettingsWarning::NoHomeDir);
        }
        if self.mcp_ws_dir.is_none() {
            warnings.push(SettingsWarning::NoMcpWorkspace);
        }
        Ok(warnings)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_are_home_relative() {
        let settings = KashSettings::from_vars(&BTreeMap::new(), Some(PathBuf::from("/home/u")));
        assert_eq!(settings.ws_root_dir, PathBuf::from("/home/u/kash"));
        assert_eq!(settings.global_ws_dir, PathBuf::from("/home/u/kash/global"));
        assert_eq!(
            settings.system_cache_dir,
            PathBuf::from("/home/u/.kash_system/cache")
        );
        assert_eq!(settings.log_level, "info");
        assert!(settings.user_agent.starts_with("kash/"));
        assert!(settings.mcp_ws_dir.is_none());
    }

    #[test]
    fn env_vars_override_defaults() {
        let settings = KashSettings::from_vars(
            &vars(&[
                (env_vars::WS_ROOT, "/ws"),
                (env_vars::LOG_LEVEL, "debug"),
                (env_vars::MCP_WS, "/ws/served"),
                (env_vars::USER_AGENT, "custom/1.0"),
            ]),
            Some(PathBuf::from("/home/u")),
        );
        assert_eq!(settings.ws_root_dir, PathBuf::from("/ws"));
        // Global workspace follows the overridden root.
        assert_eq!(settings.global_ws_dir, PathBuf::from("/ws/global"));
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.mcp_ws_dir, Some(PathBuf::from("/ws/served")));
        assert_eq!(settings.user_agent, "custom/1.0");
    }

    #[test]
    fn missing_home_falls_back_to_relative() {
        let settings = KashSettings::from_vars(&BTreeMap::new(), None);
        assert_eq!(settings.ws_root_dir, PathBuf::from("./kash"));
    }

    #[test]
    fn validate_rejects_bad_log_level() {
        let mut settings = KashSettings::from_vars(&BTreeMap::new(), Some(PathBuf::from("/h")));
        settings.log_level = "verbose".into();
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, SettingsError::InvalidLogLevel { .. }));
    }

    #[test]
    fn validate_accepts_all_known_levels() {
        for level in VALID_LOG_LEVELS {
            check_log_level(level).unwrap();
        }
    }

    #[test]
    fn validate_warns_on_missing_mcp_ws() {
        let settings = KashSettings::from_vars(&BTreeMap::new(), Some(PathBuf::from("/h")));
        let warnings = settings.validate().unwrap();
        assert!(warnings.contains(&SettingsWarning::NoMcpWorkspace));
    }

    #[test]
    fn settings_serde_roundtrip() {
        let settings = KashSettings::from_vars(
            &vars(&[(env_vars::MCP_WS, "/m")]),
            Some(PathBuf::from("/h")),
        );
        let json = serde_json::to_string(&settings).unwrap();
        let back: KashSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(back, settings);
    }
}

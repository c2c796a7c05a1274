//! Runtime configuration
//!
//! Everything is driven by environment variables (see README of the hook
//! adapters); the server binary surfaces the same knobs as clap flags.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ContinuityError, Result};

/// Where per-project state lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// Everything under the central root
    #[default]
    Central,
    /// Per-project state under `./.memory/` in the working directory;
    /// global state always stays central
    Local,
}

impl std::str::FromStr for StorageMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "central" => Ok(StorageMode::Central),
            "local" => Ok(StorageMode::Local),
            _ => Err(format!("Unknown storage mode: {}", s)),
        }
    }
}

/// Resolved configuration for the server process
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub storage_mode: StorageMode,
    /// Central storage root (global project always lives here)
    pub central_path: PathBuf,
    /// Working directory used for local-mode project state
    pub cwd: PathBuf,
    pub manager_enabled: bool,
    pub personal_enabled: bool,
    /// Soft deadline for /memory/context and /memory/process
    pub request_timeout_secs: u64,
    /// Hard timeout for outbound curator / manager calls
    pub agent_timeout_secs: u64,
    /// Grace period for in-flight curation at shutdown
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8765,
            storage_mode: StorageMode::Central,
            central_path: default_central_path(),
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            manager_enabled: true,
            personal_enabled: true,
            request_timeout_secs: 10,
            agent_timeout_secs: 120,
            shutdown_grace_secs: 30,
        }
    }
}

impl ServerConfig {
    /// Build a config from process environment
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("MEMORY_HOST") {
            config.host = host;
        }
        if let Ok(port) = std::env::var("MEMORY_PORT") {
            config.port = port
                .parse()
                .map_err(|_| ContinuityError::Config(format!("Invalid MEMORY_PORT: {}", port)))?;
        }
        if let Ok(mode) = std::env::var("MEMORY_STORAGE_MODE") {
            config.storage_mode = mode.parse().map_err(ContinuityError::Config)?;
        }
        if let Ok(path) = std::env::var("MEMORY_CENTRAL_PATH") {
            if !path.is_empty() {
                config.central_path = PathBuf::from(path);
            }
        }
        if let Ok(v) = std::env::var("MEMORY_MANAGER_ENABLED") {
            config.manager_enabled = v != "0";
        }
        if let Ok(v) = std::env::var("MEMORY_PERSONAL_ENABLED") {
            config.personal_enabled = v != "0";
        }

        Ok(config)
    }

    /// Root directory for one project's collections.
    ///
    /// Global state is pinned to the central root in every mode.
    pub fn project_root(&self, project_id: &str) -> PathBuf {
        if project_id == crate::types::GLOBAL_PROJECT_ID {
            return self.central_path.join(project_id);
        }
        match self.storage_mode {
            StorageMode::Central => self.central_path.join(project_id),
            StorageMode::Local => self.cwd.join(".memory").join(project_id),
        }
    }
}

/// `$XDG_DATA_HOME/memory` or `~/.local/share/memory`
pub fn default_central_path() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        if !xdg.is_empty() {
            return PathBuf::from(xdg).join("memory");
        }
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".local").join("share").join("memory")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GLOBAL_PROJECT_ID;

    #[test]
    fn test_storage_mode_parse() {
        assert_eq!("central".parse::<StorageMode>().unwrap(), StorageMode::Central);
        assert_eq!("LOCAL".parse::<StorageMode>().unwrap(), StorageMode::Local);
        assert!("remote".parse::<StorageMode>().is_err());
    }

    #[test]
    fn test_local_mode_pins_global_central() {
        let config = ServerConfig {
            storage_mode: StorageMode::Local,
            central_path: PathBuf::from("/central"),
            cwd: PathBuf::from("/work"),
            ..Default::default()
        };
        assert_eq!(
            config.project_root(GLOBAL_PROJECT_ID),
            PathBuf::from("/central/global")
        );
        assert_eq!(
            config.project_root("acme"),
            PathBuf::from("/work/.memory/acme")
        );
    }

    #[test]
    fn test_central_mode_layout() {
        let config = ServerConfig {
            central_path: PathBuf::from("/central"),
            ..Default::default()
        };
        assert_eq!(config.project_root("acme"), PathBuf::from("/central/acme"));
    }
}

//! TOML settings: connection, pool and dialect.
//!
//! ```toml
//! [connection]
//! host = "localhost"
//! database = "app"
//! username = "app"
//! ssl_mode = "require"
//!
//! [pool]
//! max_size = 8
//!
//! [dialect]
//! paramstyle = "numeric_dollar"
//! render_bind_casts = true
//! ```
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::db::ConnectionConfig;
use crate::dialect::DialectConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub connection: ConnectionConfig,
    pub pool: PoolSettings,
    pub dialect: DialectConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PoolSettings {
    pub max_size: usize,
    /// Seconds to wait for a free connection. Unset waits forever.
    pub wait_timeout_secs: Option<u64>,
    pub create_timeout_secs: Option<u64>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_size: 16,
            wait_timeout_secs: Some(30),
            create_timeout_secs: Some(10),
        }
    }
}

impl PoolSettings {
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_secs.map(Duration::from_secs)
    }

    pub fn create_timeout(&self) -> Option<Duration> {
        self.create_timeout_secs.map(Duration::from_secs)
    }
}

impl Settings {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut settings: Settings = toml::from_str(content).context("Invalid settings")?;
        settings.apply_env();
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to load settings from {}", path.display()))
    }

    /// Load the default settings file, or defaults when it does not exist.
    pub fn load_default() -> Result<Self> {
        let path = Self::default_path();
        if !path.exists() {
            let mut settings = Settings::default();
            settings.apply_env();
            return Ok(settings);
        }
        Self::load(&path)
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pgbind")
            .join("pgbind.toml")
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    // Passwords are never written back out, so fall back to libpq's variable.
    fn apply_env(&mut self) {
        if self.connection.password.is_empty() {
            if let Ok(password) = std::env::var("PGPASSWORD") {
                self.connection.password = password;
            }
        }
    }
}

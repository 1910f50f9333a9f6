// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for runplane-environment.

use std::path::PathBuf;
use std::time::Duration;

/// Environment configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// SQLite URL for runs and runnable stores. `None` keeps both in memory.
    pub database_url: Option<String>,
    /// Data directory for process logs.
    pub data_dir: PathBuf,
    /// How often the monitor reconciles running runnables.
    pub monitor_interval: Duration,
    /// Fail runnables that report no terminal phase for this long.
    pub monitor_stale_after: Option<Duration>,
    /// Timeout applied to every substrate call.
    pub substrate_timeout: Duration,
    /// Container CLI (`docker`, `podman`) used by the process framework.
    pub container_cli: Option<String>,
    /// JSON manifest submitted at start.
    pub manifest: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            data_dir: PathBuf::from(".data"),
            monitor_interval: Duration::from_secs(10),
            monitor_stale_after: None,
            substrate_timeout: Duration::from_secs(30),
            container_cli: None,
            manifest: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to
    /// its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let data_dir = non_empty("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let monitor_interval = match non_empty("RUNPLANE_MONITOR_INTERVAL_SECS") {
            Some(value) => parse_secs("RUNPLANE_MONITOR_INTERVAL_SECS", &value)?,
            None => defaults.monitor_interval,
        };

        let monitor_stale_after = non_empty("RUNPLANE_MONITOR_STALE_SECS")
            .map(|value| parse_secs("RUNPLANE_MONITOR_STALE_SECS", &value))
            .transpose()?;

        let substrate_timeout = match non_empty("RUNPLANE_SUBSTRATE_TIMEOUT_SECS") {
            Some(value) => parse_secs("RUNPLANE_SUBSTRATE_TIMEOUT_SECS", &value)?,
            None => defaults.substrate_timeout,
        };

        Ok(Self {
            database_url: non_empty("RUNPLANE_DATABASE_URL"),
            data_dir,
            monitor_interval,
            monitor_stale_after,
            substrate_timeout,
            container_cli: non_empty("RUNPLANE_CONTAINER_CLI"),
            manifest: non_empty("RUNPLANE_MANIFEST").map(PathBuf::from),
        })
    }
}

fn parse_secs(name: &'static str, value: &str) -> Result<Duration, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidDuration {
            name,
            value: value.to_string(),
        }),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A duration variable is not a positive number of seconds.
    #[error("Invalid value for {name}: '{value}' is not a positive number of seconds")]
    InvalidDuration {
        /// Variable name.
        name: &'static str,
        /// Rejected value.
        value: String,
    },
}

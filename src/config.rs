// SPDX-FileCopyrightText: 2026 Zgit Contributors
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Zgit works out of the box with no configuration at all. An optional
//! settings file at `$XDG_CONFIG_HOME/zgit/config.toml` tweaks the few knobs
//! that exist: the tag prefix used for clone snapshots, the path to the `zfs`
//! binary, and whether IDE project metadata gets rewritten after a clone.

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::PathBuf,
    str::FromStr,
};

/// Settings layout for the configuration file.
///
/// Every field has a default, so a partial (or absent) configuration file is
/// always valid.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Prefix for the timestamp tag of clone snapshots.
    pub snapshot_prefix: String,

    /// Path to the `zfs` binary.
    pub zfs_path: PathBuf,

    /// Rewrite the NetBeans project name after a local clone.
    pub rewrite_ide_metadata: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            snapshot_prefix: "zgit".into(),
            zfs_path: "zfs".into(),
            rewrite_ide_metadata: true,
        }
    }
}

impl Settings {
    /// Load settings from the default configuration file location.
    ///
    /// A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::NoConfigDir`] if the configuration base
    ///   directory cannot be determined.
    /// - Return [`ConfigError::Read`] if the file exists but cannot be read.
    /// - Return [`ConfigError::Deserialize`] if the file does not parse.
    pub fn load() -> Result<Self> {
        let path = dirs::config_dir()
            .ok_or(ConfigError::NoConfigDir)?
            .join("zgit")
            .join("config.toml");

        if !path.exists() {
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(&path)
            .map_err(|source| ConfigError::Read { path, source })?;
        data.parse()
    }
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut settings: Settings = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on the zfs binary path field.
        settings.zfs_path = PathBuf::from(
            shellexpand::full(settings.zfs_path.to_string_lossy().as_ref())
                .map_err(ConfigError::ShellExpansion)?
                .into_owned(),
        );

        Ok(settings)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Configuration base directory cannot be determined.
    #[error("cannot determine configuration directory")]
    NoConfigDir,

    /// Configuration file exists but cannot be read.
    #[error("failed to read configuration at {:?}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

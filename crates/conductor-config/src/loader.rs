// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::schema::Config;

/// Default config location: `$XDG_CONFIG_HOME/conductor/config.yaml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("conductor").join("config.yaml"))
}

/// Load the configuration.
///
/// `path` overrides the default location.  A missing file is not an error;
/// the built-in defaults are returned so `conductor` works out of the box.
/// Tilde in `shell.root_dir` and `shell.default_workdir` is expanded.
pub fn load(path: Option<&Path>) -> anyhow::Result<Config> {
    let resolved = match path {
        Some(p) => Some(p.to_path_buf()),
        None => default_config_path(),
    };

    let mut config = match resolved {
        Some(ref p) if p.exists() => {
            let raw = std::fs::read_to_string(p)
                .with_context(|| format!("failed to read config file {}", p.display()))?;
            serde_yaml::from_str(&raw)
                .with_context(|| format!("failed to parse config file {}", p.display()))?
        }
        Some(ref p) => {
            debug!(path = %p.display(), "config file not found, using defaults");
            Config::default()
        }
        None => Config::default(),
    };

    config.shell.root_dir = shellexpand::tilde(&config.shell.root_dir).into_owned();
    config.shell.default_workdir = shellexpand::tilde(&config.shell.default_workdir).into_owned();

    Ok(config)
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

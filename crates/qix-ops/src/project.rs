// Copyright (C) 2025 The qix-tools authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Project file: the reload allow-list.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{OpsError, Result};

/// Project file looked for in the working directory by default.
pub const DEFAULT_PROJECT_FILE: &str = "qix.toml";

/// Contents of the project file. Only the reload runner reads it; every
/// other command works straight off the engine.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub reload: ReloadSection,
}

/// The `[reload]` section: `apps` is a comma-separated list of app titles
/// to reload, in order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReloadSection {
    #[serde(default)]
    pub apps: String,
}

impl ProjectConfig {
    /// Parse the project file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            OpsError::Config(format!("cannot read project file {}: {}", path.display(), e))
        })?;
        toml::from_str(&raw)
            .map_err(|e| OpsError::Config(format!("malformed project file {}: {}", path.display(), e)))
    }

    /// The configured reload titles, trimmed, empties dropped, in file
    /// order.
    pub fn reload_apps(&self) -> Vec<String> {
        self.reload
            .apps
            .split(',')
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .map(str::to_string)
            .collect()
    }
}

// Copyright (C) 2025 The qix-tools authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for qix-ops.

use qix_session::SessionError;
use thiserror::Error;

/// Result type using OpsError.
pub type Result<T> = std::result::Result<T, OpsError>;

/// Errors from the operator layer: engine failures plus everything the
/// engine never sees (filesystem, git, project file).
#[derive(Debug, Error)]
pub enum OpsError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// Project file problems (missing, unreadable, malformed).
    #[error("configuration error: {0}")]
    Config(String),

    /// A configured reload title is not in the live catalogue. Fatal to
    /// the batch.
    #[error("app '{0}' is not in the engine catalogue")]
    UnknownApp(String),

    /// The engine replied to the reload but its progress never reported
    /// finished within the in-bound check.
    #[error("reload of '{0}' completed without reporting finished")]
    ReloadIncomplete(String),
}

// Copyright (C) 2025 The qix-tools authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! QIX Ops - operator tooling on top of `qix-session`.
//!
//! Three flows, each a straight line of sequential engine calls:
//!
//! - **archive**: walk the catalogue and extract every app's script,
//!   properties, connections, variables, master items and sheet tree
//!   into a per-app directory.
//! - **reload**: reload a configured allow-list of apps in order, with
//!   bounded waiting, progress polling and a single save retry.
//! - **snapshot**: commit and push the artifact tree.
//!
//! The `qix` binary in this crate fronts all of them.

pub mod archive;
pub mod artifact;
pub mod error;
pub mod project;
pub mod reload;
pub mod snapshot;

pub use archive::{ArchiveReport, archive_all};
pub use error::{OpsError, Result};
pub use project::{DEFAULT_PROJECT_FILE, ProjectConfig};
pub use reload::{ReloadOutcome, ReloadStatus, ReloadTiming, run_reloads};
pub use snapshot::{SnapshotOutcome, snapshot};

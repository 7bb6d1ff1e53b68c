// Copyright (C) 2025 The qix-tools authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Version-control snapshot of the artifact tree.
//!
//! The workdir is expected to already be a git repository with an
//! `origin` remote. After an archive run, anything changed (untracked
//! included) is staged, committed with a timestamped message and pushed
//! to the current branch on origin. A clean tree is a no-op.

use std::path::Path;

use chrono::Local;
use git2::{
    Cred, CredentialType, ErrorCode, IndexAddOption, PushOptions, RemoteCallbacks, Repository,
    StatusOptions,
};
use tracing::{debug, info, instrument};

use crate::error::Result;

/// What the snapshot step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// Nothing to commit.
    Clean,
    /// Committed and pushed; carries the commit id.
    Pushed { commit: String },
}

/// Stage, commit and push the workdir.
#[instrument]
pub fn snapshot(workdir: &Path) -> Result<SnapshotOutcome> {
    let repo = Repository::open(workdir)?;

    let mut status_options = StatusOptions::new();
    status_options
        .include_untracked(true)
        .recurse_untracked_dirs(true);
    let statuses = repo.statuses(Some(&mut status_options))?;
    if statuses.is_empty() {
        info!("working tree clean, nothing to snapshot");
        return Ok(SnapshotOutcome::Clean);
    }
    debug!(changes = statuses.len(), "staging working tree");

    let mut index = repo.index()?;
    index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
    index.write()?;
    let tree = repo.find_tree(index.write_tree()?)?;

    let signature = repo.signature()?;
    let message = format!("Snapshot from {}", Local::now().format("%d-%m-%Y %H:%M:%S"));
    // A fresh repository has no commit to parent on yet.
    let parent = match repo.head() {
        Ok(head) => Some(head.peel_to_commit()?),
        Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => None,
        Err(e) => return Err(e.into()),
    };
    let parents: Vec<&git2::Commit> = parent.iter().collect();
    let commit = repo.commit(Some("HEAD"), &signature, &signature, &message, &tree, &parents)?;
    info!(commit = %commit, message = %message, "snapshot committed");

    push_head(&repo)?;
    Ok(SnapshotOutcome::Pushed {
        commit: commit.to_string(),
    })
}

/// Push the branch HEAD points at to origin, authenticating through the
/// ssh agent or the configured git credential helper.
fn push_head(repo: &Repository) -> Result<()> {
    let head = repo.head()?;
    let branch = head.shorthand().unwrap_or("HEAD").to_string();
    let refspec = format!("refs/heads/{}:refs/heads/{}", branch, branch);

    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(|url, username_from_url, allowed| {
        if allowed.contains(CredentialType::SSH_KEY) {
            return Cred::ssh_key_from_agent(username_from_url.unwrap_or("git"));
        }
        if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) {
            let config = git2::Config::open_default()?;
            return Cred::credential_helper(&config, url, username_from_url);
        }
        Cred::default()
    });
    let mut options = PushOptions::new();
    options.remote_callbacks(callbacks);

    let mut remote = repo.find_remote("origin")?;
    remote.push(&[refspec.as_str()], Some(&mut options))?;
    info!(branch = %branch, "pushed to origin");
    Ok(())
}

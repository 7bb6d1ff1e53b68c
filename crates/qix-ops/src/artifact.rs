// Copyright (C) 2025 The qix-tools authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Filesystem layout for extracted artifacts.
//!
//! Everything lands under `<workdir>/<stream>/<app-title>/`. The stream
//! level groups published apps by their stream name; everything else goes
//! under a `Work` folder. App directories are wiped and recreated per run
//! so two extraction runs never mix.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;

use qix_session::{DocMeta, Target};

use crate::error::Result;

/// Stream folder for unpublished or local apps.
pub const DEFAULT_STREAM: &str = "Work";

/// Resolve (and create) the stream directory for a document.
///
/// Stream names only apply to published apps on a Remote target; a local
/// desktop engine has no streams at all. Calling this twice for the same
/// arguments returns the same path without complaint.
pub fn stream_dir(workdir: &Path, target: Target, meta: &DocMeta) -> Result<PathBuf> {
    let label = match (target, meta.published, meta.stream.as_ref()) {
        (Target::Remote, true, Some(stream)) if !stream.name.is_empty() => stream.name.as_str(),
        _ => DEFAULT_STREAM,
    };
    let dir = workdir.join(safe_component(label));
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Delete-and-recreate the app directory under a stream directory.
///
/// Stale artifacts from a previous run must never survive into the next,
/// so the whole subtree goes before anything is written.
pub fn fresh_app_dir(stream: &Path, title: &str) -> Result<PathBuf> {
    let dir = stream.join(safe_component(title));
    match fs::remove_dir_all(&dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Make an engine-supplied name safe as a single path component.
///
/// Path separators and the Windows-reserved set become underscores, and
/// trailing dots/spaces are stripped (Windows rejects those too). An
/// engine title consisting only of bad characters maps to `_` rather
/// than an empty component.
pub fn safe_component(raw: &str) -> String {
    let mut cleaned: String = raw
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    while cleaned.ends_with(['.', ' ']) {
        cleaned.pop();
    }
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

/// Artifact name for an object: its title when that is a non-empty scalar
/// string, its engine id otherwise.
pub fn title_or_id(title: Option<&Value>, id: &str) -> String {
    match title.and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => s.to_string(),
        _ => id.to_string(),
    }
}

/// Write a JSON artifact, pretty-printed with sorted keys.
pub fn write_json(dir: &Path, name: &str, value: &Value) -> Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, serde_json::to_string_pretty(value)?)?;
    Ok(path)
}

/// Write a text artifact byte-for-byte.
pub fn write_text(dir: &Path, name: &str, contents: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, contents)?;
    Ok(path)
}

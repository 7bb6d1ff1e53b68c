// Copyright (C) 2025 The qix-tools authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Archive walk: every app in the catalogue extracted to disk.
//!
//! One catalogue session lists the documents, then each app gets its own
//! connection (the engine binds a connection to the app named in the
//! endpoint path and will not open a second one over it). Per app the
//! walk produces, under `<workdir>/<stream>/<title>/`:
//!
//! ```text
//! <docname>.qvs                          load script, verbatim
//! app_properties.json
//! connections.json
//! variables.json
//! QSMasterDimensions/<title>.json        one per master dimension
//! QSMasterMeasures/<title>.json          one per master measure
//! <sheet-title>/sheet.json
//! <sheet-title>/<child-type>/<child-title-or-id>.json
//! ```
//!
//! The sheet walk is exactly two levels deep (sheet, then its children);
//! grandchildren are never followed.

use std::fs;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use qix_session::{DocListEntry, EngineConfig, ObjectHandle, Session, SessionError};

use crate::artifact;
use crate::error::{OpsError, Result};

/// What one archive run produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveReport {
    /// Apps fully extracted.
    pub apps_written: usize,
    /// Apps the engine refused to open.
    pub apps_skipped: usize,
}

enum MasterKind {
    Dimension,
    Measure,
}

/// Walk the whole catalogue, or just the app titled `only_app`.
#[instrument(skip(config))]
pub async fn archive_all(config: &EngineConfig, only_app: Option<&str>) -> Result<ArchiveReport> {
    let mut catalogue = Session::connect(config, None).await?;
    let docs = catalogue.doc_list().await?;
    catalogue.close().await;
    info!(docs = docs.len(), "archiving catalogue");

    let mut report = ArchiveReport::default();
    for doc in &docs {
        if let Some(only) = only_app
            && doc.title != only
        {
            continue;
        }
        if archive_app(config, doc).await? {
            report.apps_written += 1;
        } else {
            report.apps_skipped += 1;
        }
    }

    if let Some(only) = only_app
        && report.apps_written == 0
        && report.apps_skipped == 0
    {
        return Err(OpsError::UnknownApp(only.to_string()));
    }
    info!(
        written = report.apps_written,
        skipped = report.apps_skipped,
        "archive run complete"
    );
    Ok(report)
}

/// Extract one app. Returns false when the engine refused to open it;
/// nothing is written in that case, not even the app directory.
async fn archive_app(config: &EngineConfig, doc: &DocListEntry) -> Result<bool> {
    let mut session = Session::connect(config, Some(&doc.doc_id)).await?;
    let app = match session.open_doc(&doc.doc_id).await {
        Ok(handle) => handle,
        Err(SessionError::Engine(e)) => {
            warn!(doc_id = %doc.doc_id, title = %doc.title, error = %e, "cannot open app, skipping");
            session.close().await;
            return Ok(false);
        }
        Err(e) => return Err(e.into()),
    };

    let layout = session.app_layout(app).await?;
    let title = pick_app_title(&layout.title, doc);
    let stream = artifact::stream_dir(&config.workdir, config.target, &doc.meta)?;
    let app_dir = artifact::fresh_app_dir(&stream, &title)?;
    info!(title = %title, dir = %app_dir.display(), "extracting app");

    let script = session.script(app).await?;
    let script_name = format!("{}.qvs", artifact::safe_component(doc.doc_name_stem()));
    artifact::write_text(&app_dir, &script_name, &script)?;

    let properties = session.app_properties(app).await?;
    artifact::write_json(&app_dir, "app_properties.json", &properties)?;

    let connections = session.connections(app).await?;
    artifact::write_json(&app_dir, "connections.json", &connections)?;

    let lists = session.app_lists(app).await?;
    artifact::write_json(&app_dir, "variables.json", &Value::Array(lists.variables.items))?;

    write_master_items(
        &mut session,
        app,
        &app_dir,
        "QSMasterDimensions",
        &lists.dimensions.items,
        MasterKind::Dimension,
    )
    .await?;
    write_master_items(
        &mut session,
        app,
        &app_dir,
        "QSMasterMeasures",
        &lists.measures.items,
        MasterKind::Measure,
    )
    .await?;

    for sheet in &lists.sheets.items {
        write_sheet(&mut session, app, &app_dir, sheet).await?;
    }

    session.close().await;
    Ok(true)
}

/// App directory name: the engine's app layout title, then the catalogue
/// title, then the document name stem.
fn pick_app_title(layout_title: &str, doc: &DocListEntry) -> String {
    if !layout_title.trim().is_empty() {
        layout_title.to_string()
    } else if !doc.title.trim().is_empty() {
        doc.title.clone()
    } else {
        doc.doc_name_stem().to_string()
    }
}

/// Master dimensions and measures: the list only carries ids, so every
/// entry costs its own open + layout round trip.
async fn write_master_items(
    session: &mut Session,
    app: ObjectHandle,
    app_dir: &Path,
    folder: &str,
    items: &[Value],
    kind: MasterKind,
) -> Result<()> {
    let dir = app_dir.join(folder);
    fs::create_dir_all(&dir)?;
    for item in items {
        let Some(id) = item["qInfo"]["qId"].as_str() else {
            warn!(folder, "list entry without an id, skipping");
            continue;
        };
        let handle = match kind {
            MasterKind::Dimension => session.dimension(app, id).await?,
            MasterKind::Measure => session.measure(app, id).await?,
        };
        let layout = session.layout(handle).await?;
        let title = artifact::title_or_id(layout.get("qMeta").and_then(|m| m.get("title")), id);
        let name = format!("{}.json", artifact::safe_component(&title));
        artifact::write_json(&dir, &name, &layout)?;
        debug!(folder, name, "master item written");
    }
    Ok(())
}

/// One sheet: its layout, then one artifact per child, grouped by the
/// child's type tag.
async fn write_sheet(
    session: &mut Session,
    app: ObjectHandle,
    app_dir: &Path,
    entry: &Value,
) -> Result<()> {
    let Some(sheet_id) = entry["qInfo"]["qId"].as_str() else {
        warn!("sheet list entry without an id, skipping");
        return Ok(());
    };
    let handle = session.object(app, sheet_id).await?;
    let layout = session.layout(handle).await?;
    let title = artifact::title_or_id(layout.get("qMeta").and_then(|m| m.get("title")), sheet_id);
    let sheet_dir = app_dir.join(artifact::safe_component(&title));
    fs::create_dir_all(&sheet_dir)?;
    artifact::write_json(&sheet_dir, "sheet.json", &layout)?;
    debug!(sheet = %title, "sheet written");

    let children = layout["qChildList"]["qItems"]
        .as_array()
        .cloned()
        .unwrap_or_default();
    for child in &children {
        let (Some(child_id), Some(child_type)) = (
            child["qInfo"]["qId"].as_str(),
            child["qInfo"]["qType"].as_str(),
        ) else {
            warn!(sheet = %title, "child descriptor missing id or type, skipping");
            continue;
        };
        let child_handle = session.object(app, child_id).await?;
        let child_layout = session.layout(child_handle).await?;
        let name = artifact::title_or_id(child.get("qData").and_then(|d| d.get("title")), child_id);
        let type_dir = sheet_dir.join(artifact::safe_component(child_type));
        fs::create_dir_all(&type_dir)?;
        let file = format!("{}.json", artifact::safe_component(&name));
        artifact::write_json(&type_dir, &file, &child_layout)?;
        debug!(sheet = %title, child = %file, "child written");
    }
    Ok(())
}

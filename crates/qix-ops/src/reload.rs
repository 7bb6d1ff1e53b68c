// Copyright (C) 2025 The qix-tools authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Batch reload: the configured apps, in order, reloaded and saved.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{info, instrument, warn};

use qix_session::{DocListEntry, EngineConfig, Session};

use crate::error::{OpsError, Result};

const RELOAD_WAIT_BOUND: Duration = Duration::from_secs(60);
const RELOAD_POLL_INTERVAL: Duration = Duration::from_secs(60);
const SAVE_RETRY_DELAY: Duration = Duration::from_secs(60);

/// Timing knobs for the reload state machine. Production uses the
/// defaults; tests shrink them to milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct ReloadTiming {
    /// How long to await the reload reply before switching to polling.
    pub wait_bound: Duration,
    /// Interval between progress polls once the bound expired.
    pub poll_interval: Duration,
    /// Delay before the single save retry.
    pub save_retry_delay: Duration,
}

impl Default for ReloadTiming {
    fn default() -> Self {
        Self {
            wait_bound: RELOAD_WAIT_BOUND,
            poll_interval: RELOAD_POLL_INTERVAL,
            save_retry_delay: SAVE_RETRY_DELAY,
        }
    }
}

/// How one configured app came out of the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadStatus {
    /// Reloaded and saved.
    Reloaded,
    /// Reloaded, but the save failed even after the retry; the batch
    /// moved on.
    SaveFailed,
    /// Open check passed; nothing was mutated.
    DryRun,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadOutcome {
    pub title: String,
    pub doc_id: String,
    pub status: ReloadStatus,
}

/// Title → doc id over the live catalogue. On duplicated titles the
/// later document wins, with a warning naming the id in use.
fn title_index(docs: &[DocListEntry]) -> HashMap<String, String> {
    let mut index = HashMap::new();
    for doc in docs {
        if let Some(shadowed) = index.insert(doc.title.clone(), doc.doc_id.clone()) {
            warn!(
                title = %doc.title,
                using = %doc.doc_id,
                shadowed = %shadowed,
                "duplicate title in catalogue, later document wins"
            );
        }
    }
    index
}

/// Reload `titles` in order against the engine in `config`.
///
/// A title missing from the catalogue, a failed open, and a reload that
/// replies without reporting finished all abort the batch. A failed save
/// is recorded and the batch continues.
#[instrument(skip(config, timing))]
pub async fn run_reloads(
    config: &EngineConfig,
    titles: &[String],
    timing: &ReloadTiming,
    dryrun: bool,
) -> Result<Vec<ReloadOutcome>> {
    let mut catalogue = Session::connect(config, None).await?;
    let docs = catalogue.doc_list().await?;
    catalogue.close().await;
    let index = title_index(&docs);

    let mut outcomes = Vec::with_capacity(titles.len());
    for title in titles {
        let doc_id = index
            .get(title)
            .ok_or_else(|| OpsError::UnknownApp(title.clone()))?;
        info!(title = %title, doc_id = %doc_id, dryrun, "reloading app");

        let mut session = Session::connect(config, Some(doc_id)).await?;
        let app = session.open_doc(doc_id).await?;

        if dryrun {
            session.close().await;
            outcomes.push(ReloadOutcome {
                title: title.clone(),
                doc_id: doc_id.clone(),
                status: ReloadStatus::DryRun,
            });
            continue;
        }

        session.configure_reload().await?;
        let ticket = session.do_reload(app).await?;
        let finished = session
            .wait_reload_finished(ticket, timing.wait_bound, timing.poll_interval)
            .await?;
        if !finished {
            session.close().await;
            return Err(OpsError::ReloadIncomplete(title.clone()));
        }

        let status = match session.do_save(app, timing.save_retry_delay).await {
            Ok(()) => {
                info!(title = %title, "reloaded and saved");
                ReloadStatus::Reloaded
            }
            Err(e) => {
                warn!(title = %title, error = %e, "save failed after reload, continuing");
                ReloadStatus::SaveFailed
            }
        };
        session.close().await;
        outcomes.push(ReloadOutcome {
            title: title.clone(),
            doc_id: doc_id.clone(),
            status,
        });
    }
    Ok(outcomes)
}

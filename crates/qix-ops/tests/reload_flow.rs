// Copyright (C) 2025 The qix-tools authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Batch reload against the scripted engine.

mod common;

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use common::{CannedApp, CannedCatalogue, MockEngine, doc_entry};
use qix_ops::{OpsError, ReloadStatus, ReloadTiming, run_reloads};
use qix_session::{EngineConfig, SessionError, Target};

fn config_for(engine: &MockEngine, workdir: &Path) -> EngineConfig {
    EngineConfig {
        target: Target::Local,
        endpoint: format!("{}/", engine.endpoint),
        workdir: workdir.to_path_buf(),
        identity: None,
    }
}

fn quick_timing() -> ReloadTiming {
    ReloadTiming {
        wait_bound: Duration::from_millis(200),
        poll_interval: Duration::from_millis(10),
        save_retry_delay: Duration::from_millis(5),
    }
}

fn catalogue_of(docs: &[(&str, &str, CannedApp)]) -> CannedCatalogue {
    let mut apps = HashMap::new();
    let mut entries = Vec::new();
    for (id, title, app) in docs {
        entries.push(doc_entry(id, &format!("{}.qvf", title), title));
        apps.insert(id.to_string(), app.clone());
    }
    CannedCatalogue {
        docs: entries,
        apps,
    }
}

fn titles(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

#[tokio::test]
async fn reloads_run_in_configured_order() {
    let catalogue = catalogue_of(&[
        ("id-sales", "Sales", CannedApp::default()),
        ("id-ops", "Ops", CannedApp::default()),
    ]);
    let engine = MockEngine::spawn(catalogue.responder()).await;
    let workdir = tempfile::tempdir().unwrap();
    let config = config_for(&engine, workdir.path());

    let outcomes = run_reloads(&config, &titles(&["Ops", "Sales"]), &quick_timing(), false)
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 2);
    assert_eq!(outcomes[0].title, "Ops");
    assert_eq!(outcomes[0].doc_id, "id-ops");
    assert_eq!(outcomes[0].status, ReloadStatus::Reloaded);
    assert_eq!(outcomes[1].title, "Sales");
    assert_eq!(outcomes[1].status, ReloadStatus::Reloaded);
    // The configured order decides the open order, not the catalogue order.
    assert_eq!(engine.opened_docs(), vec!["id-ops", "id-sales"]);
    assert_eq!(engine.count_of("ConfigureReload"), 2);
    assert_eq!(engine.count_of("DoReload"), 2);
    assert_eq!(engine.count_of("DoSave"), 2);
}

#[tokio::test]
async fn duplicate_title_uses_last_catalogue_entry() {
    let catalogue = catalogue_of(&[
        ("id-a", "Sales", CannedApp::default()),
        ("id-b", "Sales", CannedApp::default()),
    ]);
    let engine = MockEngine::spawn(catalogue.responder()).await;
    let workdir = tempfile::tempdir().unwrap();
    let config = config_for(&engine, workdir.path());

    let outcomes = run_reloads(&config, &titles(&["Sales"]), &quick_timing(), false)
        .await
        .unwrap();

    assert_eq!(outcomes[0].doc_id, "id-b");
    assert_eq!(engine.opened_docs(), vec!["id-b"]);
}

#[tokio::test]
async fn dryrun_stops_after_open() {
    let catalogue = catalogue_of(&[("id-sales", "Sales", CannedApp::default())]);
    let engine = MockEngine::spawn(catalogue.responder()).await;
    let workdir = tempfile::tempdir().unwrap();
    let config = config_for(&engine, workdir.path());

    let outcomes = run_reloads(&config, &titles(&["Sales"]), &quick_timing(), true)
        .await
        .unwrap();

    assert_eq!(outcomes[0].status, ReloadStatus::DryRun);
    assert_eq!(engine.count_of("OpenDoc"), 1);
    assert_eq!(engine.count_of("ConfigureReload"), 0);
    assert_eq!(engine.count_of("DoReload"), 0);
    assert_eq!(engine.count_of("DoSave"), 0);
}

#[tokio::test]
async fn missing_title_aborts_batch() {
    let catalogue = catalogue_of(&[("id-sales", "Sales", CannedApp::default())]);
    let engine = MockEngine::spawn(catalogue.responder()).await;
    let workdir = tempfile::tempdir().unwrap();
    let config = config_for(&engine, workdir.path());

    let err = run_reloads(&config, &titles(&["Ghost"]), &quick_timing(), false)
        .await
        .unwrap_err();

    assert!(matches!(err, OpsError::UnknownApp(title) if title == "Ghost"));
    assert_eq!(engine.count_of("OpenDoc"), 0);
}

#[tokio::test]
async fn open_failure_aborts_batch() {
    let broken = CannedApp {
        open_error: Some("App corrupted".to_string()),
        ..Default::default()
    };
    let catalogue = catalogue_of(&[
        ("id-bad", "Bad", broken),
        ("id-good", "Good", CannedApp::default()),
    ]);
    let engine = MockEngine::spawn(catalogue.responder()).await;
    let workdir = tempfile::tempdir().unwrap();
    let config = config_for(&engine, workdir.path());

    let err = run_reloads(&config, &titles(&["Bad", "Good"]), &quick_timing(), false)
        .await
        .unwrap_err();

    assert!(matches!(err, OpsError::Session(SessionError::Engine(_))));
    // The batch never reached the second app.
    assert_eq!(engine.opened_docs(), vec!["id-bad"]);
    assert_eq!(engine.count_of("DoReload"), 0);
}

#[tokio::test]
async fn failed_save_is_recorded_and_batch_continues() {
    let stuck = CannedApp {
        save_error: Some("Reload in progress".to_string()),
        ..Default::default()
    };
    let catalogue = catalogue_of(&[
        ("id-stuck", "Stuck", stuck),
        ("id-good", "Good", CannedApp::default()),
    ]);
    let engine = MockEngine::spawn(catalogue.responder()).await;
    let workdir = tempfile::tempdir().unwrap();
    let config = config_for(&engine, workdir.path());

    let outcomes = run_reloads(&config, &titles(&["Stuck", "Good"]), &quick_timing(), false)
        .await
        .unwrap();

    assert_eq!(outcomes[0].status, ReloadStatus::SaveFailed);
    assert_eq!(outcomes[1].status, ReloadStatus::Reloaded);
    // Two attempts against the stuck app, one against the good one.
    assert_eq!(engine.count_of("DoSave"), 3);
}

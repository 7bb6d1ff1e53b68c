// Copyright (C) 2025 The qix-tools authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process engine stand-in for the operator flows.
//!
//! Serves a canned catalogue of apps over websocket connections, one at
//! a time, the way the real engine does: a connection is bound to the
//! app opened on it, handles are minted per opened object, and every
//! reply is driven off the recorded request. Unexpected methods come
//! back as engine errors rather than panics so a misbehaving flow fails
//! its assertions instead of hanging the test.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// One request as the engine saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub id: u64,
    pub handle: i64,
    pub params: Value,
}

pub fn result_reply(id: u64, result: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "result": result})
}

pub fn error_reply(id: u64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {"code": 1000, "message": message}
    })
}

pub struct MockEngine {
    pub endpoint: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockEngine {
    pub async fn spawn<F>(mut respond: F) -> Self
    where
        F: FnMut(&Recorded) -> Value + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("ws://{}", listener.local_addr().unwrap());
        let requests: Arc<Mutex<Vec<Recorded>>> = Arc::default();
        let log = requests.clone();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let Ok(mut ws) = accept_async(stream).await else {
                    continue;
                };

                // The engine greets every connection before any reply.
                let greeting = json!({
                    "jsonrpc": "2.0",
                    "method": "OnConnected",
                    "params": {"qSessionState": "SESSION_CREATED"}
                });
                if ws.send(Message::Text(greeting.to_string())).await.is_err() {
                    continue;
                }

                while let Some(Ok(message)) = ws.next().await {
                    let Message::Text(text) = message else {
                        continue;
                    };
                    let request: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
                    let recorded = Recorded {
                        method: request["method"].as_str().unwrap_or_default().to_string(),
                        id: request["id"].as_u64().unwrap_or_default(),
                        handle: request["handle"].as_i64().unwrap_or_default(),
                        params: request["params"].clone(),
                    };
                    log.lock().unwrap().push(recorded.clone());
                    let reply = respond(&recorded);
                    if ws.send(Message::Text(reply.to_string())).await.is_err() {
                        break;
                    }
                }
            }
        });

        Self { endpoint, requests }
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count_of(&self, method: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method)
            .count()
    }

    /// `qDocName` of every OpenDoc, in order.
    pub fn opened_docs(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter(|r| r.method == "OpenDoc")
            .map(|r| r.params["qDocName"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}

// ==========================================================================
// Canned catalogue
// ==========================================================================

/// A sheet and the layouts of its children.
#[derive(Debug, Clone, Default)]
pub struct CannedSheet {
    pub id: String,
    /// Full `qLayout` payload, including `qMeta.title` and `qChildList`.
    pub layout: Value,
    /// Child id → `qLayout` payload.
    pub children: Vec<(String, Value)>,
}

/// One app the scripted engine can open.
#[derive(Debug, Clone, Default)]
pub struct CannedApp {
    pub layout_title: String,
    pub script: String,
    pub properties: Value,
    pub connections: Value,
    pub variables: Vec<Value>,
    /// Master dimension id → `qLayout` payload.
    pub dimensions: Vec<(String, Value)>,
    /// Master measure id → `qLayout` payload.
    pub measures: Vec<(String, Value)>,
    pub sheets: Vec<CannedSheet>,
    /// When set, OpenDoc fails with this engine message.
    pub open_error: Option<String>,
    /// When set, every DoSave fails with this engine message.
    pub save_error: Option<String>,
}

/// The whole canned engine: doc list entries plus the apps behind them.
#[derive(Debug, Clone, Default)]
pub struct CannedCatalogue {
    pub docs: Vec<Value>,
    pub apps: HashMap<String, CannedApp>,
}

/// A doc list entry for an unpublished app.
pub fn doc_entry(id: &str, name: &str, title: &str) -> Value {
    json!({"qDocId": id, "qDocName": name, "qTitle": title, "qMeta": {}})
}

enum HandleTarget {
    App,
    AppLists,
    Opened(String),
}

impl CannedCatalogue {
    /// A responder closure serving this catalogue, for `MockEngine::spawn`.
    pub fn responder(self) -> impl FnMut(&Recorded) -> Value + Send + 'static {
        let state = self;
        let mut current_doc: Option<String> = None;
        let mut handles: HashMap<i64, HandleTarget> = HashMap::new();
        let mut next_handle: i64 = 0;

        move |req| match req.method.as_str() {
            "GetDocList" => result_reply(req.id, json!({"qDocList": state.docs.clone()})),
            "OpenDoc" => {
                let doc_id = req.params["qDocName"].as_str().unwrap_or_default().to_string();
                let Some(app) = state.apps.get(&doc_id) else {
                    return error_reply(req.id, "App not found");
                };
                if let Some(message) = &app.open_error {
                    return error_reply(req.id, message);
                }
                current_doc = Some(doc_id);
                next_handle += 1;
                handles.insert(next_handle, HandleTarget::App);
                result_reply(
                    req.id,
                    json!({"qReturn": {"qType": "Doc", "qHandle": next_handle}}),
                )
            }
            "GetAuthenticatedUser" => {
                result_reply(req.id, json!({"qReturn": "UserDirectory=MOCK; UserId=ops"}))
            }
            method => {
                let Some(app) = current_doc.as_ref().and_then(|id| state.apps.get(id)) else {
                    return error_reply(req.id, "No app open on this connection");
                };
                match method {
                    "GetAppLayout" => {
                        result_reply(req.id, json!({"qLayout": {"qTitle": app.layout_title}}))
                    }
                    "GetScript" => result_reply(req.id, json!({"qScript": app.script})),
                    "GetAppProperties" => {
                        result_reply(req.id, json!({"qProp": app.properties.clone()}))
                    }
                    "GetConnections" => {
                        result_reply(req.id, json!({"qConnections": app.connections.clone()}))
                    }
                    "CreateSessionObject" => {
                        next_handle += 1;
                        handles.insert(next_handle, HandleTarget::AppLists);
                        result_reply(
                            req.id,
                            json!({"qReturn": {"qType": "AppLists", "qHandle": next_handle}}),
                        )
                    }
                    "GetDimension" | "GetMeasure" | "GetObject" => {
                        let id = req.params["qId"].as_str().unwrap_or_default().to_string();
                        next_handle += 1;
                        handles.insert(next_handle, HandleTarget::Opened(id));
                        result_reply(req.id, json!({"qReturn": {"qHandle": next_handle}}))
                    }
                    "GetLayout" => match handles.get(&req.handle) {
                        Some(HandleTarget::AppLists) => result_reply(
                            req.id,
                            json!({"qLayout": {
                                "qAppObjectList": {"qItems": sheet_items(app)},
                                "qDimensionList": {"qItems": id_items(&app.dimensions)},
                                "qMeasureList": {"qItems": id_items(&app.measures)},
                                "qVariableList": {"qItems": app.variables.clone()},
                            }}),
                        ),
                        Some(HandleTarget::Opened(id)) => match layout_of(app, id) {
                            Some(layout) => result_reply(req.id, json!({"qLayout": layout})),
                            None => error_reply(req.id, "Object not found"),
                        },
                        _ => error_reply(req.id, "No layout for this handle"),
                    },
                    "GetChildInfos" => match handles.get(&req.handle) {
                        Some(HandleTarget::Opened(id)) => {
                            result_reply(req.id, json!({"qInfos": child_infos_of(app, id)}))
                        }
                        _ => error_reply(req.id, "No children for this handle"),
                    },
                    "ConfigureReload" => result_reply(req.id, json!({})),
                    "DoReload" => result_reply(req.id, json!({"qReturn": true})),
                    "GetProgress" => result_reply(
                        req.id,
                        json!({"qProgressData": {"qStarted": true, "qFinished": true}}),
                    ),
                    "DoSave" => match &app.save_error {
                        Some(message) => error_reply(req.id, message),
                        None => result_reply(req.id, json!({})),
                    },
                    other => error_reply(req.id, &format!("unexpected method {}", other)),
                }
            }
        }
    }
}

fn sheet_items(app: &CannedApp) -> Vec<Value> {
    app.sheets
        .iter()
        .map(|sheet| json!({"qInfo": {"qId": sheet.id, "qType": "sheet"}}))
        .collect()
}

fn id_items(entries: &[(String, Value)]) -> Vec<Value> {
    entries
        .iter()
        .map(|(id, _)| json!({"qInfo": {"qId": id}}))
        .collect()
}

fn layout_of(app: &CannedApp, id: &str) -> Option<Value> {
    for (item_id, layout) in app.dimensions.iter().chain(app.measures.iter()) {
        if item_id == id {
            return Some(layout.clone());
        }
    }
    for sheet in &app.sheets {
        if sheet.id == id {
            return Some(sheet.layout.clone());
        }
        for (child_id, layout) in &sheet.children {
            if child_id == id {
                return Some(layout.clone());
            }
        }
    }
    None
}

fn child_infos_of(app: &CannedApp, id: &str) -> Vec<Value> {
    app.sheets
        .iter()
        .filter(|sheet| sheet.id == id)
        .flat_map(|sheet| sheet.children.iter())
        .map(|(child_id, layout)| {
            json!({"qId": child_id, "qType": layout["qInfo"]["qType"].as_str().unwrap_or("object")})
        })
        .collect()
}

// Copyright (C) 2025 The qix-tools authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process engine stand-in for session tests.
//!
//! A websocket server that sends the on-connect notice first, then answers
//! each request through a scripted responder. Every request is recorded so
//! tests can assert on ids, handles and params after the fact.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::protocol::Message;

/// A request as the mock engine saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub id: u64,
    pub handle: i64,
    pub params: Value,
}

/// How the responder answers one request.
pub enum MockReply {
    /// Reply immediately.
    Now(Value),
    /// Reply out of band after a delay, like a long-running DoReload.
    After(Duration, Value),
}

pub fn result_reply(id: u64, result: Value) -> MockReply {
    MockReply::Now(json!({"jsonrpc": "2.0", "id": id, "result": result}))
}

pub fn error_reply(id: u64, message: &str) -> MockReply {
    MockReply::Now(json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {"code": 1000, "message": message}
    }))
}

pub fn delayed_result(delay: Duration, id: u64, result: Value) -> MockReply {
    MockReply::After(delay, json!({"jsonrpc": "2.0", "id": id, "result": result}))
}

pub struct MockEngine {
    pub endpoint: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl MockEngine {
    pub async fn spawn<F>(mut respond: F) -> Self
    where
        F: FnMut(&Recorded) -> MockReply + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("ws://{}", listener.local_addr().unwrap());
        let requests: Arc<Mutex<Vec<Recorded>>> = Arc::default();
        let log = requests.clone();

        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let ws = match tokio_tungstenite::accept_async(stream).await {
                    Ok(ws) => ws,
                    Err(_) => continue,
                };
                let (sink, mut source) = ws.split();
                let sink = Arc::new(tokio::sync::Mutex::new(sink));

                // The engine speaks first.
                let greeting = json!({
                    "jsonrpc": "2.0",
                    "method": "OnConnected",
                    "params": {"qSessionState": "SESSION_CREATED"}
                });
                if sink
                    .lock()
                    .await
                    .send(Message::Text(greeting.to_string()))
                    .await
                    .is_err()
                {
                    continue;
                }

                while let Some(Ok(message)) = source.next().await {
                    let Message::Text(text) = message else {
                        continue;
                    };
                    let value: Value = serde_json::from_str(&text).unwrap();
                    let recorded = Recorded {
                        method: value["method"].as_str().unwrap_or("").to_string(),
                        id: value["id"].as_u64().unwrap_or(0),
                        handle: value["handle"].as_i64().unwrap_or(0),
                        params: value["params"].clone(),
                    };
                    log.lock().unwrap().push(recorded.clone());

                    match respond(&recorded) {
                        MockReply::Now(reply) => {
                            if sink
                                .lock()
                                .await
                                .send(Message::Text(reply.to_string()))
                                .await
                                .is_err()
                            {
                                break;
                            }
                        }
                        MockReply::After(delay, reply) => {
                            let sink = sink.clone();
                            tokio::spawn(async move {
                                tokio::time::sleep(delay).await;
                                let _ = sink
                                    .lock()
                                    .await
                                    .send(Message::Text(reply.to_string()))
                                    .await;
                            });
                        }
                    }
                }
            }
        });

        Self { endpoint, requests }
    }

    /// Everything received so far, across all connections.
    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count_of(&self, method: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.method == method)
            .count()
    }

    pub fn first(&self, method: &str) -> Option<Recorded> {
        self.requests().into_iter().find(|r| r.method == method)
    }
}

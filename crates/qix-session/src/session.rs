// Copyright (C) 2025 The qix-tools authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The engine session: typed calls over one websocket.
//!
//! A session owns its socket and its request-id sequence. Ids start at 1
//! and increase by exactly 1 per request, never reused within the session.
//! The engine answers strictly one reply per request; replies are matched
//! by id, and anything else on the stream (the on-connect notice, change
//! notifications, replies to abandoned requests) is skipped.

use std::time::Duration;

use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use qix_protocol::{EngineSocket, GLOBAL_HANDLE, RpcRequest, RpcResponse};

use crate::config::EngineConfig;
use crate::error::{Result, SessionError};
use crate::types::{AppLayout, AppLists, DocListEntry, ObjectInfo, ReloadProgress};

/// Opaque reference to an object opened in this session.
///
/// Handles are only minted by session calls, and `Session::close` consumes
/// the session, so a handle cannot be used once the session that produced
/// it is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectHandle(i32);

impl ObjectHandle {
    pub(crate) fn new(value: i32) -> Self {
        Self(value)
    }

    /// The raw engine handle, for logging.
    pub fn value(&self) -> i32 {
        self.0
    }
}

/// Correlation token for a reload: the request id `DoReload` was sent
/// with, which is what `GetProgress` polls against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadTicket {
    id: u64,
}

impl ReloadTicket {
    pub fn request_id(&self) -> u64 {
        self.id
    }
}

/// One connection to one engine scope.
///
/// The engine binds each connection to the app named in the endpoint path,
/// so opening an app means opening a session for it; the global catalogue
/// calls work on any session.
pub struct Session {
    socket: EngineSocket,
    next_id: u64,
}

impl Session {
    /// Connect to the engine described by `config`, scoped to `app_id`
    /// when given.
    #[instrument(skip(config), fields(target = %config.target))]
    pub async fn connect(config: &EngineConfig, app_id: Option<&str>) -> Result<Self> {
        let endpoint = config.app_endpoint(app_id);
        let tls = config.identity.as_ref().map(|identity| identity.tls());
        let user = config.identity.as_ref().map(|identity| identity.user_header());

        let socket = EngineSocket::connect(&endpoint, tls.as_ref(), user.as_ref())
            .await
            .map_err(|source| SessionError::Connect {
                target: endpoint.clone(),
                source,
            })?;

        info!(endpoint, "engine session established");
        Ok(Self { socket, next_id: 1 })
    }

    /// Number of requests issued on this session so far.
    pub fn requests_sent(&self) -> u64 {
        self.next_id - 1
    }

    /// Close the session. Handles minted here are dead after this.
    pub async fn close(self) {
        self.socket.close().await;
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    async fn send(&mut self, handle: i32, method: &str, params: Value) -> Result<u64> {
        let id = self.next_id;
        self.next_id += 1;

        let request = RpcRequest::new(id, handle, method, params);
        debug!(id, handle, method, "sending request");
        self.socket.send(request.to_text()?).await?;
        Ok(id)
    }

    async fn recv_matching(&mut self, id: u64) -> Result<RpcResponse> {
        loop {
            let text = self.socket.recv().await?;
            let response = RpcResponse::from_text(&text)?;
            if response.is_reply_to(id) {
                return Ok(response);
            }
            if response.is_notification() {
                debug!(
                    method = response.method.as_deref().unwrap_or(""),
                    "skipping engine notification"
                );
            } else {
                // A reply to a request nobody is waiting for anymore,
                // e.g. a DoReload whose bounded wait expired.
                debug!(reply_id = ?response.id, "discarding stale reply");
            }
        }
    }

    async fn recv_result(&mut self, id: u64) -> Result<Value> {
        Ok(self.recv_matching(id).await?.into_result()?)
    }

    async fn call(&mut self, handle: i32, method: &str, params: Value) -> Result<Value> {
        let id = self.send(handle, method, params).await?;
        self.recv_result(id).await
    }

    fn handle_from(result: &Value, method: &str) -> Result<ObjectHandle> {
        match result["qReturn"]["qHandle"].as_i64() {
            Some(handle) => Ok(ObjectHandle::new(handle as i32)),
            None => Err(unexpected(method, "no handle in qReturn")),
        }
    }

    fn take_required(mut result: Value, field: &str, method: &str) -> Result<Value> {
        match result.get_mut(field).map(Value::take) {
            Some(value) if !value.is_null() => Ok(value),
            _ => Err(unexpected(method, &format!("no {} in reply", field))),
        }
    }

    // =========================================================================
    // Global scope
    // =========================================================================

    /// List the documents this engine serves.
    #[instrument(skip(self))]
    pub async fn doc_list(&mut self) -> Result<Vec<DocListEntry>> {
        let result = self.call(GLOBAL_HANDLE, "GetDocList", json!([])).await?;
        let docs = Self::take_required(result, "qDocList", "GetDocList")?;
        serde_json::from_value(docs).map_err(|e| unexpected("GetDocList", &e.to_string()))
    }

    /// Open a document without loading its data. The engine error branch
    /// is the per-app skippable "cannot open" case.
    #[instrument(skip(self))]
    pub async fn open_doc(&mut self, doc_name: &str) -> Result<ObjectHandle> {
        let result = self
            .call(
                GLOBAL_HANDLE,
                "OpenDoc",
                json!({"qDocName": doc_name, "qNoData": true}),
            )
            .await?;
        Self::handle_from(&result, "OpenDoc")
    }

    /// Identity the engine sees this connection as.
    pub async fn authenticated_user(&mut self) -> Result<String> {
        let result = self
            .call(GLOBAL_HANDLE, "GetAuthenticatedUser", json!({}))
            .await?;
        result
            .get("qReturn")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| unexpected("GetAuthenticatedUser", "no qReturn in reply"))
    }

    /// Escape hatch for methods without a typed wrapper; `None` addresses
    /// the engine-global scope.
    pub async fn call_raw(
        &mut self,
        handle: Option<ObjectHandle>,
        method: &str,
        params: Value,
    ) -> Result<Value> {
        let handle = handle.map_or(GLOBAL_HANDLE, |h| h.value());
        self.call(handle, method, params).await
    }

    // =========================================================================
    // Document scope
    // =========================================================================

    /// The app's load script, verbatim.
    pub async fn script(&mut self, app: ObjectHandle) -> Result<String> {
        let result = self.call(app.value(), "GetScript", json!({})).await?;
        result
            .get("qScript")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| unexpected("GetScript", "no qScript in reply"))
    }

    /// The app's rendered layout (title and friends).
    pub async fn app_layout(&mut self, app: ObjectHandle) -> Result<AppLayout> {
        let result = self.call(app.value(), "GetAppLayout", json!({})).await?;
        let layout = Self::take_required(result, "qLayout", "GetAppLayout")?;
        serde_json::from_value(layout).map_err(|e| unexpected("GetAppLayout", &e.to_string()))
    }

    /// The app's stored properties.
    pub async fn app_properties(&mut self, app: ObjectHandle) -> Result<Value> {
        let result = self.call(app.value(), "GetAppProperties", json!({})).await?;
        Self::take_required(result, "qProp", "GetAppProperties")
    }

    /// The app's data connections.
    pub async fn connections(&mut self, app: ObjectHandle) -> Result<Value> {
        let result = self.call(app.value(), "GetConnections", json!({})).await?;
        Self::take_required(result, "qConnections", "GetConnections")
    }

    /// Every object in the app as (id, type) pairs.
    pub async fn all_infos(&mut self, app: ObjectHandle) -> Result<Vec<ObjectInfo>> {
        let result = self.call(app.value(), "GetAllInfos", json!({})).await?;
        let infos = Self::take_required(result, "qInfos", "GetAllInfos")?;
        serde_json::from_value(infos).map_err(|e| unexpected("GetAllInfos", &e.to_string()))
    }

    /// Create the transient session object whose layout carries the app's
    /// sheet, dimension, measure and variable lists.
    #[instrument(skip(self))]
    pub async fn create_app_lists(&mut self, app: ObjectHandle) -> Result<ObjectHandle> {
        let definition = json!([{
            "qInfo": {"qType": "AppLists"},
            "qAppObjectListDef": {"qType": "sheet", "qData": {"id": "/qInfo/qId"}},
            "qDimensionListDef": {"qType": "dimension", "qData": {}},
            "qMeasureListDef": {"qType": "measure"},
            "qVariableListDef": {
                "qType": "variable",
                "qShowReserved": true,
                "qShowConfig": true,
                "qData": {"tags": "/tags"}
            },
        }]);
        let result = self
            .call(app.value(), "CreateSessionObject", definition)
            .await?;
        Self::handle_from(&result, "CreateSessionObject")
    }

    /// One round trip for all of the app's lists.
    pub async fn app_lists(&mut self, app: ObjectHandle) -> Result<AppLists> {
        let lists = self.create_app_lists(app).await?;
        let layout = self.layout(lists).await?;
        serde_json::from_value(layout).map_err(|e| unexpected("GetLayout", &e.to_string()))
    }

    /// Open a master dimension by id.
    pub async fn dimension(&mut self, app: ObjectHandle, id: &str) -> Result<ObjectHandle> {
        let result = self
            .call(app.value(), "GetDimension", json!({"qId": id}))
            .await?;
        Self::handle_from(&result, "GetDimension")
    }

    /// Open a master measure by id.
    pub async fn measure(&mut self, app: ObjectHandle, id: &str) -> Result<ObjectHandle> {
        let result = self
            .call(app.value(), "GetMeasure", json!({"qId": id}))
            .await?;
        Self::handle_from(&result, "GetMeasure")
    }

    /// Open a generic object (sheet, chart, ...) by id.
    pub async fn object(&mut self, app: ObjectHandle, id: &str) -> Result<ObjectHandle> {
        let result = self
            .call(app.value(), "GetObject", json!({"qId": id}))
            .await?;
        Self::handle_from(&result, "GetObject")
    }

    // =========================================================================
    // Object scope
    // =========================================================================

    /// The object's rendered layout.
    pub async fn layout(&mut self, object: ObjectHandle) -> Result<Value> {
        let result = self.call(object.value(), "GetLayout", json!([])).await?;
        Self::take_required(result, "qLayout", "GetLayout")
    }

    /// The object's stored definition.
    pub async fn properties(&mut self, object: ObjectHandle) -> Result<Value> {
        let result = self.call(object.value(), "GetProperties", json!([])).await?;
        Self::take_required(result, "qProp", "GetProperties")
    }

    /// The object's full property tree, children included.
    pub async fn full_property_tree(&mut self, object: ObjectHandle) -> Result<Value> {
        let result = self
            .call(object.value(), "GetFullPropertyTree", json!([]))
            .await?;
        Self::take_required(result, "qPropEntry", "GetFullPropertyTree")
    }

    /// Ids and types of the object's children.
    pub async fn child_infos(&mut self, object: ObjectHandle) -> Result<Vec<ObjectInfo>> {
        let result = self.call(object.value(), "GetChildInfos", json!({})).await?;
        let infos = Self::take_required(result, "qInfos", "GetChildInfos")?;
        serde_json::from_value(infos).map_err(|e| unexpected("GetChildInfos", &e.to_string()))
    }

    // =========================================================================
    // Reload & save
    // =========================================================================

    /// Configure reload behavior for this session: keep going on script
    /// errors, collect error data, never prompt.
    #[instrument(skip(self))]
    pub async fn configure_reload(&mut self) -> Result<()> {
        self.call(
            GLOBAL_HANDLE,
            "ConfigureReload",
            json!({
                "qCancelOnScriptError": false,
                "qUseErrorData": true,
                "qInteractOnError": false,
            }),
        )
        .await?;
        Ok(())
    }

    /// Start a reload. Returns at once with the ticket that correlates
    /// progress polling; await the engine's reply via `wait_reload` or let
    /// `wait_reload_finished` drive the whole thing.
    #[instrument(skip(self))]
    pub async fn do_reload(&mut self, app: ObjectHandle) -> Result<ReloadTicket> {
        let id = self
            .send(
                app.value(),
                "DoReload",
                json!({"qMode": 0, "qPartial": false, "qDebug": false}),
            )
            .await?;
        info!(request_id = id, "reload started");
        Ok(ReloadTicket { id })
    }

    /// Await the `DoReload` reply itself.
    pub async fn wait_reload(&mut self, ticket: ReloadTicket) -> Result<bool> {
        let result = self.recv_result(ticket.id).await?;
        Ok(result.get("qReturn").and_then(Value::as_bool).unwrap_or(false))
    }

    /// Progress of the reload started under `ticket`.
    pub async fn reload_progress(&mut self, ticket: ReloadTicket) -> Result<ReloadProgress> {
        let result = self
            .call(GLOBAL_HANDLE, "GetProgress", json!({"qRequestId": ticket.id}))
            .await?;
        Ok(ReloadProgress::from_result(&result))
    }

    /// Drive a started reload to its finished flag.
    ///
    /// The `DoReload` reply is awaited for at most `bound`. If it arrives
    /// in time, one progress check decides the outcome. Otherwise the
    /// reload is still running server-side, and progress is polled every
    /// `poll_interval` until the engine reports it finished; a payload
    /// missing the finished flag counts as still running. The late reply
    /// to `DoReload` gets discarded by id matching whenever it shows up.
    #[instrument(skip(self), fields(request_id = ticket.request_id()))]
    pub async fn wait_reload_finished(
        &mut self,
        ticket: ReloadTicket,
        bound: Duration,
        poll_interval: Duration,
    ) -> Result<bool> {
        match tokio::time::timeout(bound, self.wait_reload(ticket)).await {
            Ok(reply) => {
                let returned = reply?;
                debug!(returned, "reload replied within bound");
                let progress = self.reload_progress(ticket).await?;
                Ok(progress.finished)
            }
            Err(_) => {
                info!(bound_ms = bound.as_millis() as u64, "reload still running, polling");
                loop {
                    tokio::time::sleep(poll_interval).await;
                    let progress = self.reload_progress(ticket).await?;
                    if progress.finished {
                        return Ok(true);
                    }
                    debug!("reload not finished yet");
                }
            }
        }
    }

    /// Save the app. When the engine is still busy writing the reload it
    /// answers "Reload in progress"; exactly that answer gets exactly one
    /// retry after `retry_delay`, under a fresh request id. Anything else
    /// propagates at once.
    #[instrument(skip(self))]
    pub async fn do_save(&mut self, app: ObjectHandle, retry_delay: Duration) -> Result<()> {
        match self.call(app.value(), "DoSave", json!({})).await {
            Err(e) if e.is_reload_in_progress() => {
                warn!("save rejected, reload still in progress; retrying once");
                tokio::time::sleep(retry_delay).await;
                self.call(app.value(), "DoSave", json!({})).await.map(|_| ())
            }
            other => other.map(|_| ()),
        }
    }
}

fn unexpected(method: &str, detail: &str) -> SessionError {
    SessionError::UnexpectedReply {
        method: method.to_string(),
        detail: detail.to_string(),
    }
}

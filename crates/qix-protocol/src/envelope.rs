// Copyright (C) 2025 The qix-tools authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! JSON-RPC envelopes as the QIX engine speaks them.
//!
//! Every request carries `jsonrpc`, a numeric `id`, the target `handle`,
//! a `method` name and `params`. Replies echo the id and carry either a
//! `result` object or an `error` object, never both. Messages the engine
//! sends on its own (the on-connect notice, change notifications) have a
//! `method` but no id.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// JSON-RPC version tag sent on every request.
pub const PROTOCOL_VERSION: &str = "2.0";

/// Handle addressing the engine itself rather than an opened object.
pub const GLOBAL_HANDLE: i32 = -1;

/// Errors that can occur while encoding or decoding envelopes.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("engine error: {0}")]
    Engine(RpcError),

    #[error("reply carried neither result nor error")]
    EmptyReply,
}

/// A request envelope addressed to one handle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub handle: i32,
    pub method: String,
    pub params: Value,
}

impl RpcRequest {
    /// Create a request for the given handle.
    pub fn new(id: u64, handle: i32, method: &str, params: Value) -> Self {
        Self {
            jsonrpc: PROTOCOL_VERSION.to_string(),
            id,
            handle,
            method: method.to_string(),
            params,
        }
    }

    /// Create a request addressed to the engine-global scope.
    pub fn global(id: u64, method: &str, params: Value) -> Self {
        Self::new(id, GLOBAL_HANDLE, method, params)
    }

    /// Serialize to the text frame payload.
    pub fn to_text(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Error payload of a failed call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter: Option<Value>,
}

impl RpcError {
    /// The `parameter` field rendered as plain text, if present.
    pub fn parameter_text(&self) -> Option<String> {
        self.parameter.as_ref().map(|p| match p {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(parameter) = self.parameter_text() {
            write!(f, " ({})", parameter)?;
        }
        Ok(())
    }
}

/// Any message read off the socket: a reply or an engine-initiated
/// notification.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub id: Option<u64>,
    /// Set on engine-initiated messages (e.g. `OnConnected`).
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

impl RpcResponse {
    /// Parse a text frame payload.
    pub fn from_text(text: &str) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_str(text)?)
    }

    /// True for messages the engine sent on its own initiative.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// True when this message answers the request with the given id.
    pub fn is_reply_to(&self, id: u64) -> bool {
        self.id == Some(id)
    }

    /// Resolve the reply into its result, decoding the success/error
    /// branch exactly once.
    pub fn into_result(self) -> Result<Value, EnvelopeError> {
        if let Some(error) = self.error {
            return Err(EnvelopeError::Engine(error));
        }
        self.result.ok_or(EnvelopeError::EmptyReply)
    }
}

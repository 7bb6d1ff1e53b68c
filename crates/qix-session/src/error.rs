// Copyright (C) 2025 The qix-tools authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for qix-session.

use qix_protocol::{EnvelopeError, RpcError, SocketError};
use thiserror::Error;

/// Result type using SessionError.
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors that can occur when talking to the engine.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Configuration error (missing or invalid values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Connecting to the engine failed. Carries the endpoint that was
    /// being dialed.
    #[error("connection to {target} failed: {source}")]
    Connect {
        target: String,
        #[source]
        source: SocketError,
    },

    /// The established channel failed mid-session.
    #[error("socket error: {0}")]
    Socket(#[from] SocketError),

    /// A message could not be decoded as an envelope.
    #[error("malformed reply: {0}")]
    Envelope(String),

    /// The engine answered with an error payload.
    #[error("engine error: {0}")]
    Engine(RpcError),

    /// The reply decoded but its shape was not the expected one.
    #[error("unexpected reply to {method}: {detail}")]
    UnexpectedReply { method: String, detail: String },
}

impl SessionError {
    /// The one engine error DoSave is allowed to retry on.
    pub fn is_reload_in_progress(&self) -> bool {
        matches!(self, SessionError::Engine(e) if e.message == "Reload in progress")
    }
}

impl From<EnvelopeError> for SessionError {
    fn from(err: EnvelopeError) -> Self {
        match err {
            EnvelopeError::Engine(e) => SessionError::Engine(e),
            other => SessionError::Envelope(other.to_string()),
        }
    }
}

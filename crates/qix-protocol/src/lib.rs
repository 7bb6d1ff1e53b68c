// Copyright (C) 2025 The qix-tools authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! QIX Protocol - JSON-RPC over WebSocket wire layer
//!
//! This crate provides the wire protocol for talking to a QIX analytics
//! engine (Qlik Sense Desktop or a Sense server):
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      qix-protocol                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Envelopes: JSON-RPC 2.0 request / reply / notification     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Transport: WebSocket (plain or mutual TLS + user header)   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! The engine is strictly request/response on each connection: one request
//! goes out, one reply comes back, correlated by a numeric id. The engine
//! may interleave id-less notifications at any time; callers are expected
//! to skip those while waiting for a reply. Session semantics (request-id
//! sequencing, handles, typed methods) live in `qix-session` on top of
//! this crate.

pub mod envelope;
pub mod socket;

pub use envelope::{EnvelopeError, GLOBAL_HANDLE, RpcError, RpcRequest, RpcResponse};
pub use socket::{
    EngineSocket, SocketError, TlsIdentity, UserHeader, app_endpoint, build_client_tls,
};

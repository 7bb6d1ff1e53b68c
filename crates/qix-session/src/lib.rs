// Copyright (C) 2025 The qix-tools authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! QIX Session - handle-based adapter over the engine's JSON-RPC API
//!
//! The engine hands out opaque integer handles: open a document, get a
//! handle; open an object inside it, get another. Every call is addressed
//! to a handle (or to the engine-global scope), and every session carries
//! its own strictly increasing request-id sequence. This crate wraps that
//! contract in typed methods and owns the reload/save state machine.
//!
//! # Example
//!
//! ```no_run
//! use qix_session::{EngineConfig, Session, Target};
//!
//! # async fn example() -> qix_session::Result<()> {
//! let config = EngineConfig::from_env(Target::Local)?;
//!
//! let mut session = Session::connect(&config, None).await?;
//! for doc in session.doc_list().await? {
//!     println!("{} ({})", doc.title, doc.doc_id);
//! }
//! session.close().await;
//!
//! // Per-app calls run on a session scoped to that app
//! let mut session = Session::connect(&config, Some("doc-id")).await?;
//! let app = session.open_doc("doc-id").await?;
//! let script = session.script(app).await?;
//! println!("{} bytes of load script", script.len());
//! session.close().await;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod session;
mod types;

pub use config::{DEFAULT_LOCAL_URI, EngineConfig, RemoteIdentity, Target};
pub use error::{Result, SessionError};
pub use session::{ObjectHandle, ReloadTicket, Session};
pub use types::{
    AppLayout, AppLists, DocListEntry, DocMeta, ItemList, ObjectInfo, ReloadProgress, StreamInfo,
};

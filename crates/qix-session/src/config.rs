// Copyright (C) 2025 The qix-tools authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Engine connection configuration.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use qix_protocol::{TlsIdentity, UserHeader, app_endpoint};

use crate::error::{Result, SessionError};

/// Default endpoint of a Desktop engine.
pub const DEFAULT_LOCAL_URI: &str = "ws://localhost:4848/app/";

/// Which engine a command talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Desktop engine on this machine, plain websocket, no identity.
    Local,
    /// Sense server, mutual TLS plus an impersonation header.
    Remote,
}

impl FromStr for Target {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Target::Local),
            "remote" => Ok(Target::Remote),
            other => Err(SessionError::Config(format!(
                "unknown target mode: {} (expected Local or Remote)",
                other
            ))),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Local => write!(f, "Local"),
            Target::Remote => write!(f, "Remote"),
        }
    }
}

/// Identity material for a server engine.
#[derive(Debug, Clone)]
pub struct RemoteIdentity {
    /// Directory holding `client.pem`, `client_key.pem` and `root.pem`.
    pub cert_dir: PathBuf,
    /// User directory asserted in the `X-Qlik-User` header.
    pub user_directory: String,
    /// User id asserted in the `X-Qlik-User` header.
    pub user_id: String,
    /// Skip server certificate verification (development only).
    pub skip_tls_verification: bool,
}

impl RemoteIdentity {
    pub fn tls(&self) -> TlsIdentity {
        let mut identity = TlsIdentity::from_dir(&self.cert_dir);
        identity.dangerous_skip_verification = self.skip_tls_verification;
        identity
    }

    pub fn user_header(&self) -> UserHeader {
        UserHeader::new(&self.user_directory, &self.user_id)
    }
}

/// Everything needed to reach one engine and lay artifacts on disk.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub target: Target,
    /// Base URI ending in the app path prefix, e.g. `ws://host:4848/app/`.
    pub endpoint: String,
    /// Root directory archive artifacts are written under.
    pub workdir: PathBuf,
    /// Present for Remote targets only.
    pub identity: Option<RemoteIdentity>,
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `QIX_LOCAL_URI`: Desktop endpoint (default: `ws://localhost:4848/app/`)
    /// - `QIX_LOCAL_WORKDIR`: artifact root for Local (required)
    /// - `QIX_REMOTE_URI`: server endpoint (required for Remote)
    /// - `QIX_REMOTE_WORKDIR`: artifact root for Remote (required)
    /// - `QIX_CERT_DIR`: exported certificate directory (required for Remote)
    /// - `QIX_USER_DIRECTORY` / `QIX_USER_ID`: impersonated identity (required for Remote)
    /// - `QIX_SKIP_TLS_VERIFY`: skip server cert verification (default: "false")
    pub fn from_env(target: Target) -> Result<Self> {
        Self::from_lookup(target, |name| std::env::var(name).ok())
    }

    /// Same as `from_env` with the variable lookup injected.
    pub fn from_lookup(target: Target, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        match target {
            Target::Local => {
                let endpoint = lookup("QIX_LOCAL_URI")
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| DEFAULT_LOCAL_URI.to_string());
                let workdir = required(&lookup, "QIX_LOCAL_WORKDIR")?;

                Ok(Self {
                    target,
                    endpoint,
                    workdir: PathBuf::from(workdir),
                    identity: None,
                })
            }
            Target::Remote => {
                let endpoint = required(&lookup, "QIX_REMOTE_URI")?;
                let workdir = required(&lookup, "QIX_REMOTE_WORKDIR")?;
                let cert_dir = required(&lookup, "QIX_CERT_DIR")?;
                let user_directory = required(&lookup, "QIX_USER_DIRECTORY")?;
                let user_id = required(&lookup, "QIX_USER_ID")?;
                let skip_tls_verification = lookup("QIX_SKIP_TLS_VERIFY")
                    .map(|v| v.to_lowercase() == "true" || v == "1")
                    .unwrap_or(false);

                Ok(Self {
                    target,
                    endpoint,
                    workdir: PathBuf::from(workdir),
                    identity: Some(RemoteIdentity {
                        cert_dir: PathBuf::from(cert_dir),
                        user_directory,
                        user_id,
                        skip_tls_verification,
                    }),
                })
            }
        }
    }

    /// Endpoint for one app, its id percent-encoded into the path.
    pub fn app_endpoint(&self, app_id: Option<&str>) -> String {
        app_endpoint(&self.endpoint, app_id)
    }
}

fn required(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<String> {
    lookup(name)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SessionError::Config(format!("missing environment variable {}", name)))
}

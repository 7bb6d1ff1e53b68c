// Copyright (C) 2025 The qix-tools authors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Typed views over engine payloads.
//!
//! Only the fields the tooling consumes are modeled; everything else rides
//! along as raw JSON. List items in particular stay `Value` because the
//! walk has to tolerate malformed entries item by item instead of failing
//! the whole list.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One document in the engine's catalogue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocListEntry {
    #[serde(rename = "qDocId")]
    pub doc_id: String,
    #[serde(rename = "qDocName", default)]
    pub doc_name: String,
    #[serde(rename = "qTitle", default)]
    pub title: String,
    #[serde(rename = "qMeta", default)]
    pub meta: DocMeta,
}

impl DocListEntry {
    /// The document name with a trailing extension and any directory part
    /// stripped; Desktop doc names are full `.qvf` paths.
    pub fn doc_name_stem(&self) -> &str {
        let name = self
            .doc_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.doc_name);
        match name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => name,
        }
    }
}

/// Publication metadata of a document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DocMeta {
    #[serde(default)]
    pub published: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<StreamInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<Value>,
}

/// The stream a published document lives in.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StreamInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
}

/// Identity of one engine object (`qInfo` shape).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObjectInfo {
    #[serde(rename = "qId")]
    pub id: String,
    #[serde(rename = "qType", default)]
    pub obj_type: String,
}

/// The slice of an app layout the tooling reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppLayout {
    #[serde(rename = "qTitle", default)]
    pub title: String,
}

/// Layout of the transient `AppLists` session object: the app's sheets and
/// master items in one round trip.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppLists {
    #[serde(rename = "qAppObjectList", default)]
    pub sheets: ItemList,
    #[serde(rename = "qDimensionList", default)]
    pub dimensions: ItemList,
    #[serde(rename = "qMeasureList", default)]
    pub measures: ItemList,
    #[serde(rename = "qVariableList", default)]
    pub variables: ItemList,
}

/// One `qItems` array, entries left raw.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemList {
    #[serde(rename = "qItems", default)]
    pub items: Vec<Value>,
}

/// Progress of a running reload, read leniently: whatever the payload is
/// missing counts as false, so a malformed report keeps the poll loop
/// going instead of ending it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReloadProgress {
    pub started: bool,
    pub finished: bool,
}

impl ReloadProgress {
    /// Extract the progress data from a `GetProgress` result.
    pub fn from_result(result: &Value) -> Self {
        let data = &result["qProgressData"];
        Self {
            started: data["qStarted"].as_bool().unwrap_or(false),
            finished: data["qFinished"].as_bool().unwrap_or(false),
        }
    }
}

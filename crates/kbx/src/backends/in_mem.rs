//! # Previously, on Kbx...
//!
//! 🎬 The cluster was down. Again. Someone had to test the provisioner anyway.
//! Someone had to be brave. Someone had to write a store so simple it lives entirely
//! in RAM, gone the moment you blink.
//!
//! That someone was this module.
//!
//! `InMemoryStore` is a tiny Elasticsearch impersonator: documents keyed by
//! index/type/id, create-never-overwrites, partial updates that deep-merge, and a
//! query-string search that understands exactly one shape: `field:<json value>`.
//! State sits behind an `Arc<Mutex<...>>` so tests can clone the store, hand one copy
//! to the provisioner, and keep the other for assertions. Trust issues, resolved.
//!
//! 🧪 Knobs for misbehaving on purpose:
//! - `visibility_lag_searches`: fresh writes stay invisible to the next N searches,
//!   like the real refresh interval, but deterministic.
//! - `with_blind_field`: a field the search never finds. The eternal "0 hits".
//! - `with_stall`: every call sleeps first, for timeout tests.
//!
//! ⚠️ Selectable from config as a dry run. It will not touch your cluster. It will also
//! not remember anything after the process exits. 🦆

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::trace;

use crate::backends::DocumentStore;
use crate::flatten::flatten;

/// 🔧 Dry-run knobs.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct InMemoryStoreConfig {
    /// 🐢 Searches that a fresh write stays hidden from. 0 = instantly searchable.
    #[serde(default)]
    pub visibility_lag_searches: u32,
}

type DocumentKey = (String, String, String);

#[derive(Debug)]
struct StoredDocument {
    body: Map<String, Value>,
    searches_until_visible: u32,
}

#[derive(Debug, Default)]
struct InMemoryState {
    documents: HashMap<DocumentKey, StoredDocument>,
    create_calls: usize,
    update_calls: usize,
    search_calls: usize,
}

/// 📦 A cluster that fits in a `HashMap`. Clone-able; every clone shares the same state.
#[derive(Debug, Clone, Default)]
pub(crate) struct InMemoryStore {
    config: InMemoryStoreConfig,
    blind_fields: HashSet<String>,
    stall: Option<Duration>,
    state: Arc<Mutex<InMemoryState>>,
}

fn key(index: &str, doc_type: &str, id: &str) -> DocumentKey {
    (index.to_string(), doc_type.to_string(), id.to_string())
}

impl InMemoryStore {
    pub(crate) fn new(config: InMemoryStoreConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// 🙈 Searches on this (flattened) field always come back empty.
    #[cfg(test)]
    pub(crate) fn with_blind_field(mut self, field: &str) -> Self {
        self.blind_fields.insert(field.to_string());
        self
    }

    /// 🐌 Every call naps this long before answering.
    #[cfg(test)]
    pub(crate) fn with_stall(mut self, stall: Duration) -> Self {
        self.stall = Some(stall);
        self
    }

    /// 🌱 Plant a document directly, bypassing the call counters. Searchable immediately.
    #[cfg(test)]
    pub(crate) async fn seed(&self, index: &str, doc_type: &str, id: &str, body: Map<String, Value>) {
        self.state.lock().await.documents.insert(
            key(index, doc_type, id),
            StoredDocument {
                body,
                searches_until_visible: 0,
            },
        );
    }

    #[cfg(test)]
    pub(crate) async fn document(&self, index: &str, doc_type: &str, id: &str) -> Option<Map<String, Value>> {
        self.state
            .lock()
            .await
            .documents
            .get(&key(index, doc_type, id))
            .map(|stored| stored.body.clone())
    }

    #[cfg(test)]
    pub(crate) async fn create_calls(&self) -> usize {
        self.state.lock().await.create_calls
    }

    #[cfg(test)]
    pub(crate) async fn update_calls(&self) -> usize {
        self.state.lock().await.update_calls
    }

    #[cfg(test)]
    pub(crate) async fn search_calls(&self) -> usize {
        self.state.lock().await.search_calls
    }

    async fn nap(&self) {
        if let Some(stall) = self.stall {
            tokio::time::sleep(stall).await;
        }
    }
}

/// 🔍 `field:<json>` → (field, value). A bare word after the colon is taken as a string.
fn parse_field_query(query: &str) -> Result<(&str, Value)> {
    let (field, raw_value) = query
        .split_once(':')
        .with_context(|| format!("💀 '{}' is not a field:value query", query))?;
    let value = serde_json::from_str(raw_value)
        .unwrap_or_else(|_| Value::String(raw_value.to_string()));
    Ok((field, value))
}

/// 🧬 Deep-merge `patch` into `target`, the way `_update` merges a partial `doc`.
fn merge_into(target: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (field, value) in patch {
        match (target.get_mut(field), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => merge_into(existing, incoming),
            _ => {
                target.insert(field.clone(), value.clone());
            }
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn document_exists(&self, index: &str, doc_type: &str, id: &str) -> Result<bool> {
        self.nap().await;
        Ok(self
            .state
            .lock()
            .await
            .documents
            .contains_key(&key(index, doc_type, id)))
    }

    async fn create_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        body: &Map<String, Value>,
    ) -> Result<String> {
        self.nap().await;
        let mut state = self.state.lock().await;
        state.create_calls += 1;
        let document_key = key(index, doc_type, id);
        if state.documents.contains_key(&document_key) {
            anyhow::bail!(
                "💀 document_already_exists_exception: {}/{}/{}",
                index,
                doc_type,
                id
            );
        }
        state.documents.insert(
            document_key,
            StoredDocument {
                body: body.clone(),
                searches_until_visible: self.config.visibility_lag_searches,
            },
        );
        trace!("🧠 stored {}/{}/{} in RAM", index, doc_type, id);
        Ok(format!(
            r#"{{"_index":"{index}","_type":"{doc_type}","_id":"{id}","created":true}}"#
        ))
    }

    async fn count_hits(&self, index: &str, doc_type: &str, query: &str) -> Result<u64> {
        self.nap().await;
        let (field, wanted) = parse_field_query(query)?;
        let mut state = self.state.lock().await;
        state.search_calls += 1;
        // -- null is never indexed, so nothing ever matches it
        if self.blind_fields.contains(field) || wanted.is_null() {
            return Ok(0);
        }

        let mut hits = 0;
        for ((doc_index, doc_doc_type, _), stored) in state.documents.iter_mut() {
            if doc_index != index || doc_doc_type != doc_type {
                continue;
            }
            if stored.searches_until_visible > 0 {
                // -- 🐢 not refreshed yet, try again later
                stored.searches_until_visible -= 1;
                continue;
            }
            if flatten(&stored.body).get(field) == Some(&wanted) {
                hits += 1;
            }
        }
        Ok(hits)
    }

    async fn update_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        payload: &Value,
    ) -> Result<String> {
        self.nap().await;
        let patch = payload
            .get("doc")
            .and_then(Value::as_object)
            .with_context(|| format!("💀 update payload has no 'doc' object: {}", payload))?;

        let mut state = self.state.lock().await;
        state.update_calls += 1;
        let Some(stored) = state.documents.get_mut(&key(index, doc_type, id)) else {
            anyhow::bail!(
                "💀 document_missing_exception: {}/{}/{}",
                index,
                doc_type,
                id
            );
        };
        merge_into(&mut stored.body, patch);
        stored.searches_until_visible = self.config.visibility_lag_searches;
        Ok(format!(r#"{{"_index":"{index}","_type":"{doc_type}","_id":"{id}"}}"#))
    }
}

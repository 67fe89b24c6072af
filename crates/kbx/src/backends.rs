//! 🔌 Backends: where the real I/O happens.
//!
//! 🎭 This module is the casting agency. Need to talk to a real Elasticsearch cluster?
//! We've got a backend for that. Need a cluster-shaped thing that lives in RAM so the
//! tests finish before lunch? Got that too.
//!
//! The four operations below are the whole contract. Anything the provisioner knows about
//! Elasticsearch, it knows through these. 🦆

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};

pub mod common_config;
pub(crate) mod elasticsearch;
pub(crate) mod in_mem;

pub use elasticsearch::ElasticsearchStoreConfig;
pub use in_mem::InMemoryStoreConfig;

/// 🗄️ A place where Kibana documents live, addressed by index, type and id.
///
/// # Contract
/// - `document_exists`: `Ok(false)` means "definitely not there". Anything weird is an `Err`.
/// - `create_document`: creates, never overwrites. An existing id is an `Err`.
/// - `count_hits`: runs a query-string search against index/type and returns the hit count.
/// - `update_document`: applies a partial update payload (`{"doc": {...}}`).
///
/// Successful writes return the raw response body, for the logs.
#[async_trait]
pub(crate) trait DocumentStore: std::fmt::Debug + Send + Sync {
    async fn document_exists(&self, index: &str, doc_type: &str, id: &str) -> Result<bool>;

    async fn create_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        body: &Map<String, Value>,
    ) -> Result<String>;

    async fn count_hits(&self, index: &str, doc_type: &str, query: &str) -> Result<u64>;

    async fn update_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        payload: &Value,
    ) -> Result<String>;
}

/// 🔧 Which store to talk to. Externally tagged, so the TOML reads
/// `[store_config.Elasticsearch]` or `[store_config.InMemory]`.
///
/// 📡 Figment lowercases environment keys, so `KBX_STORE_CONFIG__ELASTICSEARCH__URL`
/// shows up as `elasticsearch`. The aliases let those through.
#[derive(Debug, Deserialize, Clone)]
pub enum StoreConfig {
    #[serde(alias = "elasticsearch")]
    Elasticsearch(ElasticsearchStoreConfig),
    #[serde(alias = "inmemory", alias = "in_memory")]
    InMemory(InMemoryStoreConfig),
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Elasticsearch(ElasticsearchStoreConfig::default())
    }
}

/// 🎭 The many faces of a store. Callers never need to know whether they're talking to
/// a cluster or a `HashMap` in a trench coat.
#[derive(Debug)]
pub(crate) enum StoreBackend {
    Elasticsearch(elasticsearch::ElasticsearchStore),
    InMemory(in_mem::InMemoryStore),
}

impl StoreBackend {
    pub(crate) fn from_config(config: &StoreConfig) -> Result<Self> {
        Ok(match config {
            StoreConfig::Elasticsearch(es) => {
                StoreBackend::Elasticsearch(elasticsearch::ElasticsearchStore::new(es.clone())?)
            }
            StoreConfig::InMemory(in_mem) => {
                StoreBackend::InMemory(in_mem::InMemoryStore::new(in_mem.clone()))
            }
        })
    }
}

#[async_trait]
impl DocumentStore for StoreBackend {
    async fn document_exists(&self, index: &str, doc_type: &str, id: &str) -> Result<bool> {
        match self {
            StoreBackend::Elasticsearch(es) => es.document_exists(index, doc_type, id).await,
            StoreBackend::InMemory(mem) => mem.document_exists(index, doc_type, id).await,
        }
    }

    async fn create_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        body: &Map<String, Value>,
    ) -> Result<String> {
        match self {
            StoreBackend::Elasticsearch(es) => es.create_document(index, doc_type, id, body).await,
            StoreBackend::InMemory(mem) => mem.create_document(index, doc_type, id, body).await,
        }
    }

    async fn count_hits(&self, index: &str, doc_type: &str, query: &str) -> Result<u64> {
        match self {
            StoreBackend::Elasticsearch(es) => es.count_hits(index, doc_type, query).await,
            StoreBackend::InMemory(mem) => mem.count_hits(index, doc_type, query).await,
        }
    }

    async fn update_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        payload: &Value,
    ) -> Result<String> {
        match self {
            StoreBackend::Elasticsearch(es) => es.update_document(index, doc_type, id, payload).await,
            StoreBackend::InMemory(mem) => mem.update_document(index, doc_type, id, payload).await,
        }
    }
}

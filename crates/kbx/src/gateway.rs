//! 🚪 The Gateway: every store call that can hang, fail, or lie passes through here.
//!
//! 🧠 Knowledge graph:
//! - [`ensure_document`]: existence check (query timeout), then create if absent
//!   (startup timeout). Idempotent: a second call sees the document and walks away.
//! - [`format_for_update`]: missing fields → `{"doc": {...}}`, the `_update` payload.
//! - [`apply_missing_fields`]: one partial update (query timeout). No retries. The next
//!   run of the whole tool is the retry.
//!
//! ⚠️ Nothing in here returns an error. Timeouts and store failures get logged and
//! turned into "didn't happen". The provisioner keeps going, the operator reads the logs.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use crate::backends::DocumentStore;
use crate::backends::common_config::TimeoutConfig;
use crate::content::KibanaDocument;
use crate::flatten::unflatten;
use crate::verification::MissingFields;

/// 📋 What `ensure_document` found and did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EnsureOutcome {
    pub existed: bool,
    pub created: bool,
}

/// 🩹 How the missing-fields patch went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UpdateOutcome {
    NotNeeded,
    Applied,
    Failed,
}

impl fmt::Display for UpdateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateOutcome::NotNeeded => write!(f, "not needed"),
            UpdateOutcome::Applied => write!(f, "applied"),
            UpdateOutcome::Failed => write!(f, "failed"),
        }
    }
}

/// ⏱️ Run `call` under a deadline. Elapsed deadline becomes an ordinary error.
async fn bounded<T>(limit: Duration, what: &str, call: impl Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => anyhow::bail!("⏱️ {} timed out after {:?}", what, limit),
    }
}

/// 🏗️ Create the document unless it's already there.
pub(crate) async fn ensure_document<S: DocumentStore + ?Sized>(
    store: &S,
    timeouts: &TimeoutConfig,
    document: &KibanaDocument,
) -> EnsureOutcome {
    let address = format!("{}/{}/{}", document.index, document.doc_type, document.id);

    let existed = match bounded(
        timeouts.query_timeout(),
        "existence check",
        store.document_exists(&document.index, &document.doc_type, &document.id),
    )
    .await
    {
        Ok(existed) => existed,
        Err(err) => {
            // -- 🤷 can't tell, so assume absent and let create sort it out
            warn!("⚠️ Couldn't tell whether {} exists, assuming it doesn't: {:#}", address, err);
            false
        }
    };

    if existed {
        info!("✅ Document {} already exists.", address);
        return EnsureOutcome {
            existed: true,
            created: false,
        };
    }

    info!("📦 Document {} does not exist. Creating it now...", address);
    let created = match bounded(
        timeouts.startup_timeout(),
        "document creation",
        store.create_document(&document.index, &document.doc_type, &document.id, &document.body),
    )
    .await
    {
        Ok(response) => {
            info!("✅ Create document returned: {}", response);
            true
        }
        Err(err) => {
            warn!("💀 Couldn't create {}: {:#}", address, err);
            false
        }
    };

    EnsureOutcome {
        existed: false,
        created,
    }
}

/// 🩹 Shape missing (flattened) fields into the partial-update payload, nesting restored.
pub(crate) fn format_for_update(missing: &MissingFields) -> Value {
    json!({ "doc": unflatten(missing) })
}

/// 🩹 Patch the missing fields into the document. One shot, no retries.
pub(crate) async fn apply_missing_fields<S: DocumentStore + ?Sized>(
    store: &S,
    timeouts: &TimeoutConfig,
    document: &KibanaDocument,
    missing: &MissingFields,
) -> UpdateOutcome {
    if missing.is_empty() {
        return UpdateOutcome::NotNeeded;
    }

    let payload = format_for_update(missing);
    match bounded(
        timeouts.query_timeout(),
        "document update",
        store.update_document(&document.index, &document.doc_type, &document.id, &payload),
    )
    .await
    {
        Ok(response) => {
            info!("✅ Missing {} fields patched: {}", document.label, response);
            UpdateOutcome::Applied
        }
        Err(err) => {
            error!("💀 Unable to add missing {} fields:", document.label);
            error!("{:#}", err);
            UpdateOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::KibanaConfig;
    use crate::backends::in_mem::InMemoryStore;
    use crate::content::VersionConfigContent;

    fn config_document() -> KibanaDocument {
        let kibana = KibanaConfig::default();
        KibanaDocument::version_config(&kibana, &VersionConfigContent::new(&kibana))
            .expect("💀 the config document should always build")
    }

    fn missing(value: Value) -> MissingFields {
        value.as_object().cloned().expect("💀 fixture must be an object")
    }

    #[tokio::test]
    async fn the_one_where_ensuring_twice_only_creates_once() {
        let store = InMemoryStore::default();
        let timeouts = TimeoutConfig::default();
        let document = config_document();

        let first = ensure_document(&store, &timeouts, &document).await;
        let second = ensure_document(&store, &timeouts, &document).await;

        assert_eq!(first, EnsureOutcome { existed: false, created: true });
        assert_eq!(second, EnsureOutcome { existed: true, created: false });
        assert_eq!(store.create_calls().await, 1);
        assert_eq!(
            store.document(&document.index, &document.doc_type, &document.id).await,
            Some(document.body.clone())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_a_hung_store_means_nothing_happened() {
        let store = InMemoryStore::default().with_stall(Duration::from_secs(3600));
        let timeouts = TimeoutConfig::default();

        let outcome = ensure_document(&store, &timeouts, &config_document()).await;

        assert_eq!(outcome, EnsureOutcome { existed: false, created: false });
        assert_eq!(store.create_calls().await, 0);
    }

    #[test]
    fn the_one_where_missing_fields_get_wrapped_for_update() {
        let payload = format_for_update(&missing(json!({
            "defaultIndex": "[network_]YYYY_MM_DD",
            "options.darkMode": false
        })));

        assert_eq!(
            payload,
            json!({"doc": {"defaultIndex": "[network_]YYYY_MM_DD", "options": {"darkMode": false}}})
        );
    }

    #[tokio::test]
    async fn the_one_where_nothing_missing_means_no_update_call() {
        let store = InMemoryStore::default();
        let outcome =
            apply_missing_fields(&store, &TimeoutConfig::default(), &config_document(), &MissingFields::new())
                .await;

        assert_eq!(outcome, UpdateOutcome::NotNeeded);
        assert_eq!(store.update_calls().await, 0);
    }

    #[tokio::test]
    async fn the_one_where_updating_a_ghost_document_fails_softly() {
        let store = InMemoryStore::default();
        let outcome = apply_missing_fields(
            &store,
            &TimeoutConfig::default(),
            &config_document(),
            &missing(json!({"defaultIndex": "x"})),
        )
        .await;

        assert_eq!(outcome, UpdateOutcome::Failed);
        assert_eq!(store.update_calls().await, 1);
    }
}

//! 🎬 *[camera pans across a freshly booted Kibana]*
//! 🎬 "In a world where default index patterns go missing..."
//! 🎬 "One provisioner dared to put them back."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Provisioner walks one document through its whole life:
//!
//! ```text
//! EnsureExists -> Verify -> (missing fields? -> Update : Done)
//! ```
//!
//! No branching back, no loops around the whole thing. A pass ends with the document
//! fully there, or with a log entry listing exactly what isn't. Either way it returns
//! normally: the next run is the retry.

use tracing::info;

use crate::backends::DocumentStore;
use crate::backends::common_config::TimeoutConfig;
use crate::content::KibanaDocument;
use crate::gateway::{apply_missing_fields, ensure_document};
use crate::report::DocumentOutcome;
use crate::verification::verify_document_content;

pub(crate) struct Provisioner<S> {
    store: S,
    timeouts: TimeoutConfig,
}

impl<S: DocumentStore> Provisioner<S> {
    pub(crate) fn new(store: S, timeouts: TimeoutConfig) -> Self {
        Self { store, timeouts }
    }

    /// 🚀 One document, start to finish. Never fails; the outcome says how it went.
    pub(crate) async fn provision(&self, document: &KibanaDocument) -> DocumentOutcome {
        info!(
            "================================== {} ==================================",
            document.label.to_uppercase()
        );

        let ensured = ensure_document(&self.store, &self.timeouts, document).await;

        let missing = verify_document_content(
            &self.store,
            &document.index,
            &document.doc_type,
            &document.body,
            &self.timeouts,
        )
        .await;

        if missing.is_empty() {
            info!("✅ No missing {} fields.", document.label);
        } else {
            info!("🩹 Updating {} with missing fields:", document.label);
            for (field, value) in &missing {
                info!("      {}:    {}", field, value);
            }
        }

        let update = apply_missing_fields(&self.store, &self.timeouts, document, &missing).await;

        DocumentOutcome {
            label: document.label.clone(),
            existed: ensured.existed,
            created: ensured.created,
            missing: missing.keys().cloned().collect(),
            update,
        }
    }
}

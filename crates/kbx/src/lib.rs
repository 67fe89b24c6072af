//! 🚀 kbx: Kibana bootstrap.
//!
//! Puts a default index pattern and a per-version config document into Kibana's
//! Elasticsearch index, then keeps asking Elasticsearch until every field shows up in
//! search. Whatever doesn't show up gets patched in. Whatever still fails gets logged.

pub mod app_config;
pub mod backends;
mod content;
mod flatten;
mod gateway;
mod provisioner;
mod report;
mod verification;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::app_config::AppConfig;
use crate::backends::StoreBackend;
use crate::content::{IndexPatternContent, KibanaDocument, VersionConfigContent, load_field_format_map};
use crate::provisioner::Provisioner;
use crate::report::ProvisionReport;

/// 🚀 One full provisioning run: index pattern first, then the version config.
///
/// 💀 Only fatal problems come back as `Err`: an unreadable or malformed mappings file,
/// or a store config that can't even build a client. Everything that goes wrong while
/// talking to the cluster is logged and summarized instead.
pub async fn run(app_config: AppConfig) -> Result<()> {
    let kibana = &app_config.kibana;

    let field_format_map = load_field_format_map(&kibana.mappings_path())
        .await
        .context("💀 Couldn't load the field format mappings, so there is no index pattern to provision")?;

    let index_pattern = IndexPatternContent::new(kibana, field_format_map);
    let version_config = VersionConfigContent::new(kibana);
    let documents = [
        KibanaDocument::index_pattern(kibana, &index_pattern)?,
        KibanaDocument::version_config(kibana, &version_config)?,
    ];

    let store = StoreBackend::from_config(&app_config.store_config)
        .context("💀 Couldn't set up the document store")?;
    let provisioner = Provisioner::new(store, app_config.timeouts.clone());

    let mut report = ProvisionReport::default();
    for document in &documents {
        report.push(provisioner.provision(document).await);
    }

    info!("📊 Provisioning summary:\n{}", report.render());
    if report.is_complete() {
        info!("✅ Every document is in place.");
    } else {
        for outcome in report.outcomes().iter().filter(|outcome| !outcome.is_complete()) {
            warn!(
                "⚠️ {} is still missing fields after this run: {}. The next run will try again.",
                outcome.label,
                outcome.missing.join(", ")
            );
        }
    }

    Ok(())
}

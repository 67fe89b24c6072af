//! 📦 Content: the two documents Kibana needs before it stops asking questions.
//!
//! 🎬 COLD OPEN. INT. KIBANA DISCOVER TAB, MONDAY, 9:01 AM
//!
//! "Please specify a default index pattern." The banner is yellow. It is always yellow.
//! Somewhere a user clicks "Settings", sighs, and types `[network_]YYYY_MM_DD` by hand.
//! Again. This module exists so that nobody has to do that ever again.
//!
//! 🧠 Knowledge graph:
//! - [`IndexPatternContent`]: title, interval, time field, and the field-format map
//!   loaded from Kibana's own `mappings.json`.
//! - [`VersionConfigContent`]: `defaultIndex`, pointing at the pattern above.
//! - [`KibanaDocument`]: either of the above, plus the index/type/id address where it
//!   lives. The body is a `serde_json::Map` because that is the wire boundary.
//!
//! Both content records are built by plain constructors from config. No shared template
//! gets mutated behind anyone's back. 🦆

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::app_config::KibanaConfig;

/// 📅 The index-pattern document body, exactly as Kibana 4 stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IndexPatternContent {
    pub title: String,
    pub interval_name: String,
    pub time_field_name: String,
    /// 🧵 A JSON object serialized to a string. Kibana wants it that way. Don't ask.
    pub field_format_map: String,
}

impl IndexPatternContent {
    /// 🏗️ Base template from config, with the loaded field-format map merged on top.
    pub(crate) fn new(kibana: &KibanaConfig, field_format_map: String) -> Self {
        Self {
            title: kibana.index_pattern.clone(),
            interval_name: kibana.interval_name.clone(),
            time_field_name: kibana.time_field_name.clone(),
            field_format_map,
        }
    }
}

/// ⚙️ The per-version Kibana config document. One field. One job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VersionConfigContent {
    pub default_index: String,
}

impl VersionConfigContent {
    pub(crate) fn new(kibana: &KibanaConfig) -> Self {
        Self {
            default_index: kibana.index_pattern.clone(),
        }
    }
}

/// 📬 A document plus its address. Everything the gateway and the verifier need.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct KibanaDocument {
    /// 🏷️ Human name for logs and the run report.
    pub label: String,
    pub index: String,
    pub doc_type: String,
    pub id: String,
    pub body: Map<String, Value>,
}

impl KibanaDocument {
    pub(crate) fn index_pattern(kibana: &KibanaConfig, content: &IndexPatternContent) -> Result<Self> {
        Ok(Self {
            label: "index-pattern".to_string(),
            index: kibana.index.clone(),
            doc_type: kibana.index_pattern_type.clone(),
            id: kibana.index_pattern.clone(),
            body: to_body(content)?,
        })
    }

    pub(crate) fn version_config(kibana: &KibanaConfig, content: &VersionConfigContent) -> Result<Self> {
        Ok(Self {
            label: format!("{} config", kibana.version),
            index: kibana.index.clone(),
            doc_type: kibana.config_type.clone(),
            id: kibana.version.clone(),
            body: to_body(content)?,
        })
    }
}

/// 📦 Typed record in, JSON object out. The serialization boundary, in one function.
fn to_body<T: Serialize>(content: &T) -> Result<Map<String, Value>> {
    match serde_json::to_value(content)
        .context("💀 Failed to turn a content record into JSON. The struct had one job.")?
    {
        Value::Object(body) => Ok(body),
        other => anyhow::bail!(
            "💀 Expected a content record to serialize into a JSON object, got '{}'",
            other
        ),
    }
}

/// 📁 Read Kibana's `mappings.json` and pull out `fieldFormatMap` as a compact JSON string.
///
/// - Unreadable file: error, with the path in the context.
/// - Malformed JSON: error, same deal.
/// - No `fieldFormatMap` key: not an error, you get `"{}"`.
///
/// ⚠️ The returned string still contains raw `"` characters. That's correct: when it gets
/// embedded as a string field in the index-pattern body, the JSON serializer escapes them
/// to `\"`. Hand-escaping here would double-escape on the wire.
pub(crate) async fn load_field_format_map(path: &Path) -> Result<String> {
    info!("📁 Loading field format mappings from '{}'", path.display());
    let raw = tokio::fs::read_to_string(path).await.with_context(|| {
        format!(
            "💀 Couldn't read the field format mappings file '{}'. Is Kibana installed where we think it is?",
            path.display()
        )
    })?;

    let mappings: Value = serde_json::from_str(&raw).with_context(|| {
        format!(
            "💀 The field format mappings file '{}' is not valid JSON. Someone hand-edited it, didn't they.",
            path.display()
        )
    })?;

    let field_format_map = mappings
        .get("fieldFormatMap")
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()));

    let serialized = serde_json::to_string(&field_format_map)
        .context("💀 Failed to re-serialize fieldFormatMap. JSON in, JSON out, and yet.")?;
    debug!("🧵 fieldFormatMap serialized to {} bytes", serialized.len());
    Ok(serialized)
}

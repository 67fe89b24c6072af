//! 🔧 App Configuration: the sacred TOML-to-struct pipeline.
//!
//! 📡 "Which Kibana? Which index? Which version?" The three questions every
//! provisioning run asks before it dares touch a cluster. This module answers them. 🦆
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of
//! self-harm that even the borrow checker wouldn't approve of.
//!
//! Every field has a default. An empty environment plus no file is a valid config:
//! localhost:9200, `.kibana`, the network index pattern. The out-of-the-box experience.

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::backends::StoreConfig;
use crate::backends::common_config::TimeoutConfig;

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    /// 📡 Where the documents live. Elasticsearch in production, RAM for dry runs.
    #[serde(default)]
    pub store_config: StoreConfig,
    /// ⏱️ How long we are willing to wait for anything.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// 🎯 What we are provisioning.
    #[serde(default)]
    pub kibana: KibanaConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 🎯 The Kibana side of things: which index, which document types, which pattern.
///
/// Kibana 4 keeps its saved objects in a single index (`.kibana`) with one mapping type
/// per object kind. The index-pattern document is keyed by its own pattern; the config
/// document is keyed by the Kibana version. Yes, the version string is a document id.
/// No, we did not choose this.
#[derive(Debug, Deserialize, Clone)]
pub struct KibanaConfig {
    #[serde(default = "default_kibana_index")]
    pub index: String,
    #[serde(default = "default_kibana_version")]
    pub version: String,
    #[serde(default = "default_index_pattern_type")]
    pub index_pattern_type: String,
    #[serde(default = "default_config_type")]
    pub config_type: String,
    /// 📅 The index pattern title, also used as the document id and as `defaultIndex`.
    #[serde(default = "default_index_pattern")]
    pub index_pattern: String,
    #[serde(default = "default_interval_name")]
    pub interval_name: String,
    #[serde(default = "default_time_field_name")]
    pub time_field_name: String,
    /// 📁 Where the field-format mappings live. None = the file Kibana ships for `version`.
    #[serde(default)]
    pub mappings_file: Option<PathBuf>,
}

fn default_kibana_index() -> String {
    ".kibana".to_string()
}

fn default_kibana_version() -> String {
    "4.1.1".to_string()
}

fn default_index_pattern_type() -> String {
    "index-pattern".to_string()
}

fn default_config_type() -> String {
    "config".to_string()
}

fn default_index_pattern() -> String {
    "[network_]YYYY_MM_DD".to_string()
}

fn default_interval_name() -> String {
    "days".to_string()
}

fn default_time_field_name() -> String {
    "TimeUpdated".to_string()
}

impl Default for KibanaConfig {
    fn default() -> Self {
        Self {
            index: default_kibana_index(),
            version: default_kibana_version(),
            index_pattern_type: default_index_pattern_type(),
            config_type: default_config_type(),
            index_pattern: default_index_pattern(),
            interval_name: default_interval_name(),
            time_field_name: default_time_field_name(),
            mappings_file: None,
        }
    }
}

impl KibanaConfig {
    /// 📁 Resolve the mappings file: explicit path wins, otherwise the one bundled
    /// inside the Kibana install for our version.
    pub fn mappings_path(&self) -> PathBuf {
        match &self.mappings_file {
            Some(path) => path.clone(),
            None => PathBuf::from(format!(
                "/usr/local/kibana-{}-linux-x64/resources/mappings.json",
                self.version
            )),
        }
    }
}

/// 📝 Logging knobs. The console always gets logs; a file gets them too if you ask nicely.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// 📁 Base path of the log file. Rotated files get a date suffix: `kbx.log.2026-10-19`.
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub rotation: LogRotation,
}

/// 🔄 How often the log file rolls over. `never` keeps writing to `file` itself.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Hourly,
    #[default]
    Daily,
    Never,
}

/// 🚀 Load the config: from a file, from env vars, or from the sheer power of defaults.
///
/// 🔧 Merges environment variables (`KBX_*`, nested with `__`, e.g.
/// `KBX_KIBANA__VERSION=4.1.1`) with an optional TOML file. TOML wins on conflicts.
///
/// 💀 Returns an error if config is unparseable, with a message that names the culprit.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    debug!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    // 🏗️ env vars are the base layer, like a good sourdough starter
    let config = Figment::new().merge(Env::prefixed("KBX_").split("__"));

    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (KBX_*). \
             Check the table names: [store_config.Elasticsearch], [timeouts], [kibana], [logging].",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (KBX_*). \
                 No file was provided, so this one's all on the environment. Classic."
            .to_string(),
    };

    config.extract().context(context_msg)
}

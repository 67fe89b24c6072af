//! ⏱️ **Common Store Config**: the shared clocks of every store conversation.
//!
//! 🧠 Knowledge graph:
//! - `query_timeout_secs`: existence checks, searches, updates, and the whole
//!   verification window. "Is it there yet?" has a deadline.
//! - `startup_timeout_secs`: document creation. Longer, because the cluster might still
//!   be booting and Kibana's index might not even exist yet.
//! - `poll_interval_millis`: the nap between verification sweeps. 200ms keeps us from
//!   hammering a cluster that is already doing its best.
//!
//! Lives next to the backends because every backend call is bounded by one of these. 🦆

use serde::Deserialize;
use std::time::Duration;

/// ⏱️ The three clocks. Serde defaults and `Default` agree this time, we learned our lesson.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct TimeoutConfig {
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
    #[serde(default = "default_startup_timeout_secs")]
    pub startup_timeout_secs: u64,
    #[serde(default = "default_poll_interval_millis")]
    pub poll_interval_millis: u64,
}

// -- ⏱️ 10 seconds: ten times the ~1s refresh delay between a write and its first search hit
fn default_query_timeout_secs() -> u64 {
    10
}

// -- 🐢 a minute for creation, Elasticsearch takes its time waking up
fn default_startup_timeout_secs() -> u64 {
    60
}

fn default_poll_interval_millis() -> u64 {
    200
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            query_timeout_secs: default_query_timeout_secs(),
            startup_timeout_secs: default_startup_timeout_secs(),
            poll_interval_millis: default_poll_interval_millis(),
        }
    }
}

impl TimeoutConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_millis)
    }
}

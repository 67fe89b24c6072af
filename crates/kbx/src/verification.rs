//! 🔍 Field Verification: "is it there yet?", asked politely, every 200ms.
//!
//! 🎬 A document gets indexed. Elasticsearch says 201. Everyone relaxes. Then someone
//! searches for it and gets zero hits, because the refresh interval is a second long and
//! nobody told them. This loop is for that someone.
//!
//! 🔄 The algorithm:
//! 1. Flatten the body into dotted keys (search can't address nested objects).
//! 2. Track every key as `{ original, verified: false }`.
//! 3. Until everything is verified or the query timeout runs out: query every still
//!    unverified key as `key:<json value>`, mark hits as verified, nap one poll interval.
//! 4. Whatever never verified comes back as [`MissingFields`], ready for the updater.
//!
//! ⚠️ The verified flag is a real `bool`, so `""`, `0`, `false` and `null` are values
//! like any other and never get confused with "already checked". 🦆

use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::backends::DocumentStore;
use crate::backends::common_config::TimeoutConfig;
use crate::flatten::flatten;

/// 🕳️ Flattened key → original value, for every field that never showed up in search.
pub(crate) type MissingFields = Map<String, Value>;

/// 🏷️ One field under surveillance.
#[derive(Debug, Clone, PartialEq)]
struct TrackedField {
    original: Value,
    verified: bool,
}

/// 🔍 `key:<json>`, e.g. `title:"[network_]YYYY_MM_DD"`. Strings keep their quotes and get
/// their inner quotes backslash-escaped, which is exactly a query-string phrase.
pub(crate) fn field_query(key: &str, value: &Value) -> String {
    format!("{key}:{value}")
}

fn all_verified(state: &[(String, TrackedField)]) -> bool {
    state.iter().all(|(_, field)| field.verified)
}

/// 🔍 Poll the store until every field of `body` is searchable, or time runs out.
pub(crate) async fn verify_document_content<S: DocumentStore + ?Sized>(
    store: &S,
    index: &str,
    doc_type: &str,
    body: &Map<String, Value>,
    timeouts: &TimeoutConfig,
) -> MissingFields {
    info!("🔍 Verifying content exists in Elasticsearch correctly. This could take several Elasticsearch requests.");

    let mut state: Vec<(String, TrackedField)> = flatten(body)
        .into_iter()
        .map(|(key, original)| {
            (
                key,
                TrackedField {
                    original,
                    verified: false,
                },
            )
        })
        .collect();

    let started = Instant::now();
    let window = timeouts.query_timeout();
    while !all_verified(&state) && started.elapsed() < window {
        for (key, field) in state.iter_mut().filter(|(_, field)| !field.verified) {
            // -- ⏱️ no new queries past the deadline, and none allowed to outlive it
            let remaining = window.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                break;
            }
            let query = field_query(key, &field.original);
            match tokio::time::timeout(remaining, store.count_hits(index, doc_type, &query)).await {
                Ok(Ok(hits)) if hits > 0 => {
                    info!("✅ {} hit(s) for {}.", hits, query);
                    field.verified = true;
                }
                Ok(Ok(_)) => debug!("🔍 No hits yet for {}", query),
                Ok(Err(err)) => debug!("⚠️ Search for {} failed, will retry: {:#}", query, err),
                Err(_) => debug!("⏱️ Search for {} ran out of time", query),
            }
        }
        if !all_verified(&state) {
            tokio::time::sleep(timeouts.poll_interval()).await;
        }
    }

    state
        .into_iter()
        .filter(|(_, field)| !field.verified)
        .map(|(key, field)| {
            debug!("🕳️ No hits for {}:{}. Adding to list of missing fields...", key, field.original);
            (key, field.original)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::in_mem::InMemoryStore;
    use serde_json::json;
    use std::time::Duration;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("💀 fixture must be an object")
    }

    fn body() -> Map<String, Value> {
        object(json!({
            "title": "[network_]YYYY_MM_DD",
            "intervalName": "days",
            "timeFieldName": "TimeUpdated",
            "fieldFormatMap": "{\"bytes\":{\"id\":\"bytes\"}}"
        }))
    }

    #[test]
    fn the_one_where_queries_look_like_query_strings() {
        assert_eq!(field_query("intervalName", &json!("days")), r#"intervalName:"days""#);
        assert_eq!(field_query("count", &json!(0)), "count:0");
        assert_eq!(
            field_query("fieldFormatMap", &json!("{\"a\":1}")),
            r#"fieldFormatMap:"{\"a\":1}""#
        );
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_everything_verifies_before_the_deadline() {
        let store = InMemoryStore::default();
        store.seed(".kibana", "index-pattern", "p", body()).await;
        let timeouts = TimeoutConfig::default();
        let started = Instant::now();

        let missing = verify_document_content(&store, ".kibana", "index-pattern", &body(), &timeouts).await;

        assert!(missing.is_empty(), "nothing should be missing, got {:?}", missing);
        assert!(started.elapsed() < timeouts.query_timeout());
        // -- one sweep, four fields, no second lap
        assert_eq!(store.search_calls().await, 4);
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_one_blind_field_rides_out_the_clock() {
        let store = InMemoryStore::default().with_blind_field("timeFieldName");
        store.seed(".kibana", "index-pattern", "p", body()).await;
        let timeouts = TimeoutConfig::default();
        let started = Instant::now();

        let missing = verify_document_content(&store, ".kibana", "index-pattern", &body(), &timeouts).await;

        assert!(started.elapsed() >= timeouts.query_timeout());
        assert_eq!(Value::Object(missing), json!({"timeFieldName": "TimeUpdated"}));
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_a_slow_refresh_is_waited_out() {
        let store = InMemoryStore::new(crate::backends::InMemoryStoreConfig {
            visibility_lag_searches: 5,
        });
        store
            .create_document(".kibana", "config", "4.1.1", &object(json!({"defaultIndex": "x"})))
            .await
            .expect("💀 creating into an empty store should work");
        let timeouts = TimeoutConfig::default();
        let started = Instant::now();

        let missing = verify_document_content(
            &store,
            ".kibana",
            "config",
            &object(json!({"defaultIndex": "x"})),
            &timeouts,
        )
        .await;

        assert!(missing.is_empty());
        // -- five invisible sweeps, five naps
        assert!(started.elapsed() >= Duration::from_millis(5 * 200));
        assert!(started.elapsed() < timeouts.query_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_falsy_values_are_still_values() {
        let store = InMemoryStore::default();
        let falsy = object(json!({"empty": "", "zero": 0, "off": false, "nested": {"no": false}}));
        store.seed("idx", "t", "1", falsy.clone()).await;

        let missing = verify_document_content(&store, "idx", "t", &falsy, &TimeoutConfig::default()).await;

        assert!(missing.is_empty(), "falsy values must verify like any other, got {:?}", missing);
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_nested_fields_are_reported_by_their_dotted_key() {
        let store = InMemoryStore::default().with_blind_field("options.theme");
        let nested = object(json!({"defaultIndex": "x", "options": {"theme": "dark"}}));
        store.seed("idx", "t", "1", nested.clone()).await;

        let missing = verify_document_content(&store, "idx", "t", &nested, &TimeoutConfig::default()).await;

        assert_eq!(Value::Object(missing), json!({"options.theme": "dark"}));
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_a_stalled_search_cannot_outlive_the_window() {
        let store = InMemoryStore::default().with_stall(Duration::from_secs(3600));
        let timeouts = TimeoutConfig::default();
        let started = Instant::now();

        let missing = verify_document_content(
            &store,
            "idx",
            "t",
            &object(json!({"defaultIndex": "x"})),
            &timeouts,
        )
        .await;

        assert_eq!(Value::Object(missing), json!({"defaultIndex": "x"}));
        assert!(started.elapsed() < timeouts.query_timeout() + timeouts.poll_interval() * 2);
    }
}

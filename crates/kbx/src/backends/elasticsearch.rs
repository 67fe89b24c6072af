//! # 📡 THE ELASTICSEARCH BACKEND
//!
//! 🎬 COLD OPEN. INT. SERVER ROOM, 3:47 AM
//!
//! The cluster is yellow. Kibana is up, but Discover shows nothing but a banner asking
//! for a default index pattern. Our hero opens a terminal. "I'll just PUT it," they
//! whispered. "It's one document," they said.
//!
//! 🚀 This module speaks the typed-index REST dialect that Kibana 4 expects:
//!
//! | operation | request                                              |
//! |-----------|------------------------------------------------------|
//! | exists    | `HEAD /{index}/{type}/{id}`                          |
//! | create    | `PUT /{index}/{type}/{id}/_create`                   |
//! | search    | `GET /{index}/{type}/_search?q={query}&size=0`       |
//! | update    | `POST /{index}/{type}/{id}/_update`                  |
//!
//! Path segments are percent-encoded by `Url`, because ids like `[network_]YYYY_MM_DD`
//! are a thing that exists in the world and we have to live with that.
//!
//! ⚠️ No retries in here. Timeouts and retry policy belong to the gateway. 🦆

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::backends::DocumentStore;

/// 📡 Where the cluster lives. Include scheme + port. Yes, all of it.
#[derive(Debug, Deserialize, Clone)]
pub struct ElasticsearchStoreConfig {
    #[serde(default = "default_url")]
    pub url: String,
}

fn default_url() -> String {
    "http://localhost:9200".to_string()
}

impl Default for ElasticsearchStoreConfig {
    fn default() -> Self {
        Self { url: default_url() }
    }
}

/// 📦 The store, backed by one reused `reqwest::Client`.
#[derive(Debug)]
pub(crate) struct ElasticsearchStore {
    client: reqwest::Client,
    base_url: Url,
}

// -- 🔍 `hits.total` is a number before 7.x and `{"value": n, "relation": ...}` after.
// -- We speak both. Bilingual. Very cultured.
#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: SearchHits,
}

#[derive(Debug, Deserialize)]
struct SearchHits {
    total: HitTotal,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum HitTotal {
    Count(u64),
    Detailed { value: u64 },
}

impl HitTotal {
    fn count(&self) -> u64 {
        match self {
            HitTotal::Count(count) => *count,
            HitTotal::Detailed { value } => *value,
        }
    }
}

impl ElasticsearchStore {
    /// 🚀 Build the client and parse the base URL. No ping here: the cluster may still be
    /// booting, and the gateway's startup timeout is what waits for it.
    pub(crate) fn new(config: ElasticsearchStoreConfig) -> Result<Self> {
        // 🔧 10 second connect timeout. Per-request deadlines come from the gateway.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("💀 The HTTP client refused to be born. The TLS stack wept. Probably a missing cert bundle or a cursed system OpenSSL.")?;

        let base_url = Url::parse(&config.url).with_context(|| {
            format!(
                "💀 '{}' is not a URL Elasticsearch could live at. Include the scheme, e.g. http://localhost:9200",
                config.url
            )
        })?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!(
                "💀 '{}' can't have paths appended to it. We need something like http://host:9200",
                config.url
            );
        }

        Ok(Self { client, base_url })
    }

    /// 🧭 Base URL + percent-encoded path segments. One slash of difference,
    /// infinite suffering of difference, so we let `Url` handle it.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("💀 '{}' cannot be used as a base URL", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// 📨 Non-2xx becomes an error carrying status and body. 2xx hands back the body.
    async fn read_success_body(response: reqwest::Response, what: &str) -> Result<String> {
        let status = response.status();
        if !status.is_success() {
            // -- best effort: the status alone already says it failed
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "💀 Elasticsearch answered {} with '{}'. The body of the response read: '{}'",
                what,
                status,
                body
            );
        }
        let body = response.text().await.with_context(|| {
            format!(
                "💀 Elasticsearch accepted {} with '{}' but the response body never arrived",
                what, status
            )
        })?;
        trace!("✅ {} landed with {}", what, status);
        Ok(body)
    }
}

#[async_trait]
impl DocumentStore for ElasticsearchStore {
    async fn document_exists(&self, index: &str, doc_type: &str, id: &str) -> Result<bool> {
        let url = self.endpoint(&[index, doc_type, id])?;
        debug!("📡 HEAD {}", url);
        let response = self
            .client
            .head(url)
            .send()
            .await
            .context("💀 The existence check never made it to Elasticsearch. Is the cluster up?")?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => anyhow::bail!(
                "💀 Asked whether {}/{}/{} exists and got '{}', which is neither yes nor no",
                index,
                doc_type,
                id,
                status
            ),
        }
    }

    async fn create_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        body: &Map<String, Value>,
    ) -> Result<String> {
        let url = self.endpoint(&[index, doc_type, id, "_create"])?;
        let payload = serde_json::to_string(body)
            .context("💀 Failed to serialize the document body. The JSON refused to become JSON.")?;
        debug!("📡 PUT {} ({} bytes)", url, payload.len());
        let response = self
            .client
            .put(url)
            .header("Content-Type", "application/json")
            .body(payload)
            .send()
            .await
            .context("💀 The create request never made it to Elasticsearch.")?;

        Self::read_success_body(response, "the create request").await
    }

    async fn count_hits(&self, index: &str, doc_type: &str, query: &str) -> Result<u64> {
        let mut url = self.endpoint(&[index, doc_type, "_search"])?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("size", "0");
        debug!("🔍 GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("💀 The search request never made it to Elasticsearch.")?;

        let body = Self::read_success_body(response, "the search request").await?;
        let parsed: SearchResponse = serde_json::from_str(&body).with_context(|| {
            format!("💀 The search response had no hits.total we could read: '{}'", body)
        })?;
        Ok(parsed.hits.total.count())
    }

    async fn update_document(
        &self,
        index: &str,
        doc_type: &str,
        id: &str,
        payload: &Value,
    ) -> Result<String> {
        let url = self.endpoint(&[index, doc_type, id, "_update"])?;
        let payload = serde_json::to_string(payload)
            .context("💀 Failed to serialize the update payload.")?;
        debug!("📡 POST {} ({} bytes)", url, payload.len());
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .body(payload)
            .send()
            .await
            .context("💀 The update request never made it to Elasticsearch.")?;

        Self::read_success_body(response, "the update request").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(server: &MockServer) -> ElasticsearchStore {
        ElasticsearchStore::new(ElasticsearchStoreConfig { url: server.uri() })
            .expect("💀 a wiremock URI should always be a valid base URL")
    }

    #[tokio::test]
    async fn the_one_where_head_200_means_yes_and_404_means_no() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/.kibana/config/4.1.1"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/.kibana/config/4.0.0"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = store_for(&server);
        assert!(store.document_exists(".kibana", "config", "4.1.1").await?);
        assert!(!store.document_exists(".kibana", "config", "4.0.0").await?);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_500_on_exists_is_not_a_no() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let result = store_for(&server)
            .document_exists(".kibana", "config", "4.1.1")
            .await;
        assert!(result.is_err(), "a server error must not be mistaken for 'absent'");
    }

    #[tokio::test]
    async fn the_one_where_create_puts_the_body_at_the_create_endpoint() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/.kibana/config/4.1.1/_create"))
            .and(body_json(json!({"defaultIndex": "[network_]YYYY_MM_DD"})))
            .respond_with(ResponseTemplate::new(201).set_body_string(r#"{"created":true}"#))
            .expect(1)
            .mount(&server)
            .await;

        let body = json!({"defaultIndex": "[network_]YYYY_MM_DD"})
            .as_object()
            .cloned()
            .expect("💀 json! object literal is an object");
        let response = store_for(&server)
            .create_document(".kibana", "config", "4.1.1", &body)
            .await?;

        assert_eq!(response, r#"{"created":true}"#);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_conflict_on_create_is_an_error_with_the_body_attached() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(409).set_body_string("document_already_exists"))
            .mount(&server)
            .await;

        let err = store_for(&server)
            .create_document(".kibana", "config", "4.1.1", &Map::new())
            .await
            .expect_err("💀 409 must not look like success");
        assert!(err.to_string().contains("409"));
        assert!(err.to_string().contains("document_already_exists"));
    }

    #[tokio::test]
    async fn the_one_where_search_reads_the_old_school_numeric_total() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.kibana/config/_search"))
            .and(query_param("q", r#"defaultIndex:"[network_]YYYY_MM_DD""#))
            .and(query_param("size", "0"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"hits":{"total":1,"hits":[]}}"#),
            )
            .mount(&server)
            .await;

        let hits = store_for(&server)
            .count_hits(".kibana", "config", r#"defaultIndex:"[network_]YYYY_MM_DD""#)
            .await?;
        assert_eq!(hits, 1);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_search_reads_the_modern_object_total() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/.kibana/index-pattern/_search"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"{"hits":{"total":{"value":3,"relation":"eq"},"hits":[]}}"#,
            ))
            .mount(&server)
            .await;

        let hits = store_for(&server)
            .count_hits(".kibana", "index-pattern", r#"title:"x""#)
            .await?;
        assert_eq!(hits, 3);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_search_response_without_hits_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"acknowledged":true}"#))
            .mount(&server)
            .await;

        let result = store_for(&server)
            .count_hits(".kibana", "config", "defaultIndex:\"x\"")
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn the_one_where_update_posts_the_partial_doc() -> Result<()> {
        let server = MockServer::start().await;
        let payload = json!({"doc": {"timeFieldName": "TimeUpdated"}});
        Mock::given(method("POST"))
            .and(path("/.kibana/index-pattern/logs/_update"))
            .and(body_json(payload.clone()))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"_version":2}"#))
            .expect(1)
            .mount(&server)
            .await;

        let response = store_for(&server)
            .update_document(".kibana", "index-pattern", "logs", &payload)
            .await?;
        assert_eq!(response, r#"{"_version":2}"#);
        Ok(())
    }

    #[test]
    fn the_one_where_a_trailing_slash_does_not_double_up() -> Result<()> {
        let store = ElasticsearchStore::new(ElasticsearchStoreConfig {
            url: "http://localhost:9200/".to_string(),
        })?;
        let url = store.endpoint(&[".kibana", "config", "4.1.1"])?;
        assert_eq!(url.as_str(), "http://localhost:9200/.kibana/config/4.1.1");
        Ok(())
    }

    #[test]
    fn the_one_where_a_url_without_a_scheme_is_rejected() {
        let result = ElasticsearchStore::new(ElasticsearchStoreConfig {
            url: "localhost".to_string(),
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn the_one_where_a_200_with_a_cut_off_body_is_an_error_not_an_empty_string() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        // 🔌 A hand-rolled server that promises 64 bytes and hangs up after 7.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("💀 no loopback port");
        let addr = listener.local_addr().expect("💀 no local addr");
        tokio::spawn(async move {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut request = Vec::new();
            let mut chunk = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut chunk).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => request.extend_from_slice(&chunk[..n]),
                }
            }
            let _ = socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 64\r\n\r\n{\"hits\"",
                )
                .await;
            let _ = socket.shutdown().await;
        });

        let store = ElasticsearchStore::new(ElasticsearchStoreConfig {
            url: format!("http://{addr}"),
        })
        .expect("💀 loopback URL should be valid");

        let err = store
            .count_hits(".kibana", "config", "defaultIndex:\"x\"")
            .await
            .expect_err("💀 a truncated body is not a successful search");
        assert!(
            format!("{err:#}").contains("response body never arrived"),
            "got {err:#}"
        );
    }
}

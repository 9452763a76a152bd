//! HTTP client for the external Index Service.

use super::{Chunk, FILENAME_KEY, IndexRef, IndexService};
use crate::config::IndexConfig;
use crate::document::LoadedDocument;
use crate::error::{RagError, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct InsertRequest<'a> {
    filename: &'a str,
    content_type: &'a str,
    content: String,
    metadata: HashMap<&'static str, String>,
}

#[derive(Debug, Deserialize)]
struct VersionResponse {
    version: Option<String>,
}

#[derive(Debug, Serialize)]
struct RetrieveRequest<'a> {
    version: &'a str,
    query: &'a str,
    top_k: usize,
}

#[derive(Debug, Deserialize)]
struct RetrieveResponse {
    #[serde(default)]
    nodes: Vec<RawNode>,
}

#[derive(Debug, Deserialize)]
struct RawNode {
    #[serde(default)]
    text: String,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    metadata: HashMap<String, serde_json::Value>,
}

/// Index Service reached over HTTP/JSON.
#[derive(Clone)]
pub struct HttpIndexService {
    client: Client,
    base_url: String,
}

impl HttpIndexService {
    pub fn new(config: &IndexConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(RagError::Index(format!("Index Service returned {}: {}", status, body)))
    }
}

#[async_trait]
impl IndexService for HttpIndexService {
    async fn insert(&self, document: &LoadedDocument) -> Result<()> {
        let doc = &document.document;
        let mut metadata = HashMap::new();
        metadata.insert(FILENAME_KEY, doc.path.to_string_lossy().into_owned());

        let request = InsertRequest {
            filename: &doc.filename,
            content_type: &doc.content_type,
            content: STANDARD.encode(&document.content),
            metadata,
        };

        let response = self
            .client
            .post(self.url("/documents"))
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::Index(format!("insert of '{}' failed: {}", doc.filename, e)))?;

        Self::check(response).await?;
        Ok(())
    }

    async fn persist(&self) -> Result<IndexRef> {
        let response = self
            .client
            .post(self.url("/persist"))
            .send()
            .await
            .map_err(|e| RagError::Index(format!("persist failed: {}", e)))?;

        let body: VersionResponse = Self::check(response).await?.json().await?;
        body.version
            .map(IndexRef::new)
            .ok_or_else(|| RagError::Index("persist returned no version".to_string()))
    }

    async fn latest(&self) -> Result<Option<IndexRef>> {
        let response = self.client.get(self.url("/latest")).send().await?;
        let body: VersionResponse = Self::check(response).await?.json().await?;
        Ok(body.version.map(IndexRef::new))
    }

    async fn retrieve(&self, index: &IndexRef, query: &str, top_k: usize) -> Result<Vec<Chunk>> {
        let request = RetrieveRequest {
            version: &index.version,
            query,
            top_k,
        };

        let response = self
            .client
            .post(self.url("/retrieve"))
            .json(&request)
            .send()
            .await?;

        let body: RetrieveResponse = Self::check(response).await?.json().await?;
        Ok(body
            .nodes
            .into_iter()
            .map(|node| Chunk::from_parts(node.text, node.score, node.metadata))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service(server: &MockServer) -> HttpIndexService {
        HttpIndexService::new(&IndexConfig {
            base_url: format!("{}/", server.uri()),
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_insert_sends_base64_and_filename() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/documents"))
            .and(body_partial_json(serde_json::json!({
                "filename": "faq.md",
                "content": "aGFsbG8=",
                "metadata": {"filename": "data/faq.md"}
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let doc = LoadedDocument {
            document: Document::from_path("data/faq.md"),
            content: b"hallo".to_vec(),
        };
        service(&server).insert(&doc).await.unwrap();
    }

    #[tokio::test]
    async fn test_insert_failure_is_index_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/documents"))
            .respond_with(ResponseTemplate::new(500).set_body_string("embedder down"))
            .mount(&server)
            .await;

        let doc = LoadedDocument {
            document: Document::from_path("data/faq.md"),
            content: Vec::new(),
        };
        let err = service(&server).insert(&doc).await.unwrap_err();
        assert_eq!(err.kind(), "index");
        assert!(err.to_string().contains("embedder down"));
    }

    #[tokio::test]
    async fn test_persist_and_latest() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/persist"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"version": "7"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/latest"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"version": null})),
            )
            .mount(&server)
            .await;

        let svc = service(&server);
        assert_eq!(svc.persist().await.unwrap(), IndexRef::new("7"));
        assert_eq!(svc.latest().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_retrieve_maps_nodes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/retrieve"))
            .and(body_partial_json(serde_json::json!({"version": "3", "top_k": 2})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "nodes": [
                    {"text": "Pro kostet 49 Euro", "score": 0.91, "metadata": {"filename": "/srv/data/preise.md", "page": 1}},
                    {"text": "ohne Quelle"}
                ]
            })))
            .mount(&server)
            .await;

        let chunks = service(&server)
            .retrieve(&IndexRef::new("3"), "Was kostet Pro?", 2)
            .await
            .unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].filename, "preise.md");
        assert_eq!(chunks[0].score, Some(0.91));
        assert_eq!(chunks[0].metadata.get("page"), Some(&serde_json::json!(1)));
        assert_eq!(chunks[1].filename, "");
        assert_eq!(chunks[1].score, None);
    }
}

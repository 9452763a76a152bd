//! Access to the Query Service under evaluation.

use crate::config::EvalConfig;
use crate::error::{RagError, Result};
use crate::query::{QueryResult, QueryService};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// What the orchestrator needs from a Query Service.
#[async_trait]
pub trait RagBackend: Send + Sync {
    /// Pre-flight reachability probe.
    async fn ping(&self) -> Result<()>;

    /// Answer plus ranked evidence for one question.
    async fn query_with_context(&self, question: &str) -> Result<QueryResult>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Query Service reached over its HTTP surface.
pub struct RagClient {
    client: Client,
    base_url: String,
    request_timeout: Duration,
    preflight_timeout: Duration,
}

impl RagClient {
    pub fn new(config: &EvalConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| RagError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            preflight_timeout: Duration::from_secs(config.preflight_timeout_secs),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl RagBackend for RagClient {
    async fn ping(&self) -> Result<()> {
        // Any HTTP response means the server is up.
        self.client
            .get(format!("{}/query", self.base_url))
            .query(&[("query", "ping")])
            .timeout(self.preflight_timeout)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| {
                RagError::ServiceUnavailable(format!(
                    "RAG server is not running at {} ({}). Start it with: rag-server serve",
                    self.base_url, e
                ))
            })
    }

    async fn query_with_context(&self, question: &str) -> Result<QueryResult> {
        let response = self
            .client
            .get(format!("{}/query_with_context", self.base_url))
            .query(&[("query", question)])
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.message)
                .unwrap_or(body);
            return Err(RagError::Http(format!("{}: {}", status, message)));
        }

        Ok(response.json().await?)
    }
}

/// In-process evaluation against a live [`QueryService`].
#[async_trait]
impl RagBackend for QueryService {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    async fn query_with_context(&self, question: &str) -> Result<QueryResult> {
        QueryService::query_with_context(self, question).await
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use crate::query::Evidence;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Canned answers keyed by question; unknown questions fail.
    #[derive(Default)]
    pub struct MockBackend {
        pub answers: HashMap<String, QueryResult>,
        pub reachable: bool,
        pub asked: Mutex<Vec<String>>,
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self {
                reachable: true,
                ..Default::default()
            }
        }

        pub fn answer(
            mut self,
            question: &str,
            answer: &str,
            sources: &[(&str, Option<f64>)],
        ) -> Self {
            let sources = sources
                .iter()
                .map(|(filename, score)| Evidence {
                    text: format!("Auszug aus {}", filename),
                    score: *score,
                    filename: filename.to_string(),
                    metadata: HashMap::new(),
                })
                .collect();
            self.answers.insert(
                question.to_string(),
                QueryResult {
                    query: question.to_string(),
                    answer: answer.to_string(),
                    sources,
                },
            );
            self
        }
    }

    #[async_trait]
    impl RagBackend for MockBackend {
        async fn ping(&self) -> Result<()> {
            if self.reachable {
                Ok(())
            } else {
                Err(RagError::ServiceUnavailable("connection refused".to_string()))
            }
        }

        async fn query_with_context(&self, question: &str) -> Result<QueryResult> {
            self.asked.lock().unwrap().push(question.to_string());
            self.answers
                .get(question)
                .cloned()
                .ok_or_else(|| RagError::Timeout(format!("no answer for '{}'", question)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base_url: String) -> RagClient {
        RagClient::new(&EvalConfig {
            base_url,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_ping_accepts_any_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/query"))
            .and(query_param("query", "ping"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        client(server.uri()).ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_ping_unreachable_is_service_unavailable() {
        let err = client("http://127.0.0.1:9".to_string()).ping().await.unwrap_err();
        assert_eq!(err.kind(), "service_unavailable");
        assert!(err.to_string().contains("rag-server serve"));
    }

    #[tokio::test]
    async fn test_query_with_context_parses_sources() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/query_with_context"))
            .and(query_param("query", "Was kostet Pro?"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "query": "Was kostet Pro?",
                "answer": "49 Euro",
                "sources": [
                    {"text": "Pro: 49 Euro", "score": 0.8123, "filename": "data/preise.md", "metadata": {}},
                    {"text": "ohne Score", "score": null, "filename": "faq.md"}
                ]
            })))
            .mount(&server)
            .await;

        let result = client(format!("{}/", server.uri()))
            .query_with_context("Was kostet Pro?")
            .await
            .unwrap();

        assert_eq!(result.answer, "49 Euro");
        assert_eq!(result.retrieved_filenames(), vec!["preise.md", "faq.md"]);
        assert_eq!(result.sources[1].score, None);
    }

    #[tokio::test]
    async fn test_query_failure_carries_server_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/query_with_context"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "message": "Failed to process query: boom"
            })))
            .mount(&server)
            .await;

        let err = client(server.uri())
            .query_with_context("x")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "http");
        assert!(err.to_string().contains("Failed to process query: boom"));
    }

    #[test]
    fn test_base_url_drops_trailing_slash() {
        let client = client("http://localhost:8000/".to_string());
        assert_eq!(client.base_url(), "http://localhost:8000");
    }

    #[tokio::test]
    async fn test_query_service_answers_in_process() {
        use crate::eval::{GoldenDataset, Orchestrator};
        use crate::index::IndexRef;
        use crate::index::mock::{MockIndexService, chunk};
        use crate::llm::mock::MockGenerator;
        use crate::query::{QueryEngine, QueryOptions};
        use std::sync::Arc;

        let service = Arc::new(QueryService::new(QueryEngine::new(
            Arc::new(MockIndexService::with_chunks(vec![chunk(
                "Pro: 49 Euro",
                "preise.md",
                Some(0.9),
            )])),
            Arc::new(MockGenerator::replying("Pro kostet 49 Euro im Monat.")),
            Some(IndexRef::new("v1")),
            QueryOptions::default(),
        )));

        service.ping().await.unwrap();
        let result = RagBackend::query_with_context(service.as_ref(), "Was kostet Pro?")
            .await
            .unwrap();
        assert_eq!(result.retrieved_filenames(), vec!["preise.md"]);

        let dataset = GoldenDataset::from_reader(
            "frage;warum;erwartete_antwort;erwartetes_dokument;erwartete_keywords\n\
             Was kostet Pro?;Preis;49 Euro;preise.md;49 Euro,Monat\n"
                .as_bytes(),
        )
        .unwrap();
        let run = Orchestrator::keywords(service).run(&dataset).await.unwrap();

        assert_eq!(run.metrics.retrieval_hits, 1);
        assert!(run.records[0].keywords.is_complete());
    }
}

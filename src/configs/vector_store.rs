//! Vector database access: the retrying initializer and the Pinecone REST client.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

use crate::{
    api::error::SystemError,
    constants::{VECTOR_STORE_MAX_RETRIES, VECTOR_STORE_RETRY_DELAY},
    utils::ensure_success,
};

const PINECONE_API_VERSION: &str = "2024-07";
const UPSERT_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: VECTOR_STORE_MAX_RETRIES, delay: VECTOR_STORE_RETRY_DELAY }
    }
}

/// One initialization attempt against the vector database.
#[async_trait::async_trait]
pub trait VectorStoreConnector: Send + Sync {
    type Client: Send;

    async fn init(&self, api_key: &str) -> Result<Self::Client, SystemError>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub id: String,
    pub score: f32,
    pub text: String,
}

#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    async fn upsert(&self, namespace: &str, records: Vec<VectorRecord>) -> Result<(), SystemError>;

    async fn query(
        &self,
        namespace: &str,
        vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, SystemError>;

    async fn delete_namespace(&self, namespace: &str) -> Result<(), SystemError>;
}

/// Builds a client through `connector`, retrying failed attempts.
///
/// A missing or blank `api_key` fails immediately, before any attempt is made.
/// Otherwise up to `policy.max_attempts` attempts are made with `policy.delay`
/// between them and the error of the last attempt is returned.
pub async fn connect_with_retry<C>(
    connector: &C,
    api_key: Option<&str>,
    policy: RetryPolicy,
) -> Result<C::Client, SystemError>
where
    C: VectorStoreConnector,
{
    let api_key = match api_key.map(str::trim) {
        Some(key) if !key.is_empty() => key,
        _ => {
            tracing::error!("Pinecone API key is missing in environment variables");
            return Err(SystemError::config(
                "Pinecone API key is missing in environment variables",
            ));
        }
    };

    let mut attempt = 0;
    loop {
        attempt += 1;
        tracing::info!("Attempting to initialize vector store client (attempt {})", attempt);

        match connector.init(api_key).await {
            Ok(client) => {
                tracing::info!("Vector store client initialized");
                return Ok(client);
            }
            Err(e) => {
                tracing::error!(
                    "Error initializing vector store client on attempt {}: {}",
                    attempt,
                    e
                );
                if attempt >= policy.max_attempts {
                    tracing::error!("Max retries reached, giving up on vector store client");
                    return Err(e);
                }
            }
        }

        tokio::time::sleep(policy.delay).await;
    }
}

#[derive(Clone)]
pub struct PineconeConnector {
    http: reqwest::Client,
    controller_url: String,
    index_name: String,
}

impl PineconeConnector {
    pub fn new(controller_url: impl Into<String>, index_name: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            controller_url: controller_url.into(),
            index_name: index_name.into(),
        }
    }
}

#[derive(Deserialize)]
struct IndexStatus {
    ready: bool,
}

#[derive(Deserialize)]
struct IndexDescription {
    host: String,
    status: IndexStatus,
}

#[async_trait::async_trait]
impl VectorStoreConnector for PineconeConnector {
    type Client = PineconeClient;

    /// Authenticates by describing the configured index, which also yields its data-plane host.
    async fn init(&self, api_key: &str) -> Result<PineconeClient, SystemError> {
        let url = format!("{}/indexes/{}", self.controller_url.trim_end_matches('/'), self.index_name);
        let resp = self
            .http
            .get(url)
            .header("Api-Key", api_key)
            .header("X-Pinecone-API-Version", PINECONE_API_VERSION)
            .send()
            .await?;
        let index: IndexDescription = ensure_success(resp).await?.json().await?;

        if !index.status.ready {
            return Err(SystemError::Upstream {
                status: 503,
                message: format!("index '{}' is not ready", self.index_name),
            });
        }

        Ok(PineconeClient::new(self.http.clone(), api_key, &index.host))
    }
}

#[derive(Clone)]
pub struct PineconeClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl PineconeClient {
    fn new(http: reqwest::Client, api_key: &str, host: &str) -> Self {
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", host.trim_end_matches('/'))
        };
        Self { http, api_key: api_key.to_string(), base_url }
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.http
            .post(format!("{}{}", self.base_url, path))
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", PINECONE_API_VERSION)
    }
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<MatchMetadata>,
}

#[derive(Deserialize)]
struct MatchMetadata {
    #[serde(default)]
    text: String,
}

#[async_trait::async_trait]
impl VectorStore for PineconeClient {
    async fn upsert(&self, namespace: &str, records: Vec<VectorRecord>) -> Result<(), SystemError> {
        for batch in records.chunks(UPSERT_BATCH_SIZE) {
            let vectors: Vec<_> = batch
                .iter()
                .map(|r| json!({ "id": r.id, "values": r.values, "metadata": { "text": r.text } }))
                .collect();
            let resp = self
                .post("/vectors/upsert")
                .json(&json!({ "vectors": vectors, "namespace": namespace }))
                .send()
                .await?;
            ensure_success(resp).await?;
        }
        tracing::debug!("Upserted {} vectors into namespace {}", records.len(), namespace);
        Ok(())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>, SystemError> {
        let resp = self
            .post("/query")
            .json(&json!({
                "namespace": namespace,
                "vector": vector,
                "topK": top_k,
                "includeMetadata": true,
            }))
            .send()
            .await?;
        let body: QueryResponse = ensure_success(resp).await?.json().await?;

        Ok(body
            .matches
            .into_iter()
            .map(|m| ScoredChunk {
                id: m.id,
                score: m.score,
                text: m.metadata.map(|meta| meta.text).unwrap_or_default(),
            })
            .collect())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<(), SystemError> {
        let resp = self
            .post("/vectors/delete")
            .json(&json!({ "deleteAll": true, "namespace": namespace }))
            .send()
            .await?;
        match ensure_success(resp).await {
            // Nothing was ever upserted for this namespace.
            Err(SystemError::Upstream { status: 404, .. }) => Ok(()),
            other => other.map(|_| ()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyConnector {
        calls: AtomicU32,
        failures: u32,
    }

    impl FlakyConnector {
        fn failing_first(failures: u32) -> Self {
            Self { calls: AtomicU32::new(0), failures }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl VectorStoreConnector for FlakyConnector {
        type Client = String;

        async fn init(&self, api_key: &str) -> Result<String, SystemError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err(SystemError::Upstream {
                    status: 503,
                    message: format!("attempt {call} rejected"),
                });
            }
            Ok(format!("client:{api_key}"))
        }
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_before_any_attempt() {
        let connector = FlakyConnector::failing_first(0);

        let err = connect_with_retry(&connector, None, RetryPolicy::default()).await.unwrap_err();
        assert!(matches!(err, SystemError::Config(_)));

        let err =
            connect_with_retry(&connector, Some("   "), RetryPolicy::default()).await.unwrap_err();
        assert!(matches!(err, SystemError::Config(_)));

        assert_eq!(connector.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_attempt_success_does_not_wait() {
        let connector = FlakyConnector::failing_first(0);
        let started = tokio::time::Instant::now();

        let client =
            connect_with_retry(&connector, Some("key"), RetryPolicy::default()).await.unwrap();

        assert_eq!(client, "client:key");
        assert_eq!(connector.calls(), 1);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_nth_attempt() {
        for n in 2..=3 {
            let connector = FlakyConnector::failing_first(n - 1);
            let started = tokio::time::Instant::now();

            let client =
                connect_with_retry(&connector, Some("key"), RetryPolicy::default()).await.unwrap();

            assert_eq!(client, "client:key");
            assert_eq!(connector.calls(), n);
            assert_eq!(started.elapsed(), VECTOR_STORE_RETRY_DELAY * (n - 1));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_return_last_error() {
        let connector = FlakyConnector::failing_first(u32::MAX);

        let err =
            connect_with_retry(&connector, Some("key"), RetryPolicy::default()).await.unwrap_err();

        assert_eq!(connector.calls(), 3);
        match err {
            SystemError::Upstream { message, .. } => assert_eq!(message, "attempt 3 rejected"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_client_host_gets_https_scheme() {
        let http = reqwest::Client::new();
        let client = PineconeClient::new(http.clone(), "key", "notebot-abc.svc.pinecone.io");
        assert_eq!(client.base_url, "https://notebot-abc.svc.pinecone.io");

        let client = PineconeClient::new(http, "key", "http://localhost:5080/");
        assert_eq!(client.base_url, "http://localhost:5080");
    }
}

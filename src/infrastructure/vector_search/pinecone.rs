//! Pinecone data-plane client

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::vector_search::{SearchMatch, VectorDocument, VectorSearchService};
use crate::domain::DomainError;
use crate::infrastructure::http_client::HttpClientTrait;

/// Vector search over a Pinecone index host
#[derive(Debug)]
pub struct PineconeVectorSearch<C: HttpClientTrait> {
    client: C,
    host: String,
    api_key: String,
}

impl<C: HttpClientTrait> PineconeVectorSearch<C> {
    /// `host` is the index host, with or without scheme
    pub fn new(client: C, host: impl Into<String>, api_key: impl Into<String>) -> Self {
        let host = host.into();
        let host = host.trim_end_matches('/');
        let host = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        };

        Self {
            client,
            host,
            api_key: api_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.host, path)
    }

    fn headers(&self) -> Vec<(&str, &str)> {
        vec![
            ("Api-Key", self.api_key.as_str()),
            ("Content-Type", "application/json"),
        ]
    }

    async fn post<T: Serialize + Sync>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<serde_json::Value, DomainError> {
        let body = serde_json::to_value(body).map_err(|e| {
            DomainError::internal(format!("Failed to serialize Pinecone request: {}", e))
        })?;

        self.client
            .post_json(&self.url(path), self.headers(), &body)
            .await
    }
}

#[async_trait]
impl<C: HttpClientTrait> VectorSearchService for PineconeVectorSearch<C> {
    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        namespace: Option<&str>,
    ) -> Result<Vec<SearchMatch>, DomainError> {
        let request = QueryRequest {
            vector,
            top_k,
            namespace,
            include_metadata: false,
            include_values: false,
        };

        let response = self.post("/query", &request).await?;
        let response: QueryResponse = serde_json::from_value(response).map_err(|e| {
            DomainError::upstream("pinecone", format!("Failed to parse query response: {}", e))
        })?;

        debug!(matches = response.matches.len(), "Pinecone query completed");

        Ok(response
            .matches
            .into_iter()
            .take(top_k)
            .map(|m| SearchMatch::new(m.id, m.score))
            .collect())
    }

    async fn upsert(
        &self,
        documents: &[VectorDocument],
        namespace: Option<&str>,
    ) -> Result<usize, DomainError> {
        if documents.is_empty() {
            return Ok(0);
        }

        let request = UpsertRequest {
            vectors: documents
                .iter()
                .map(|doc| PineconeVector {
                    id: &doc.id,
                    values: &doc.vector,
                    metadata: &doc.metadata,
                })
                .collect(),
            namespace,
        };

        let response = self.post("/vectors/upsert", &request).await?;
        let response: UpsertResponse = serde_json::from_value(response).map_err(|e| {
            DomainError::upstream("pinecone", format!("Failed to parse upsert response: {}", e))
        })?;

        Ok(response.upserted_count)
    }

    async fn delete(&self, ids: &[String], namespace: Option<&str>) -> Result<(), DomainError> {
        if ids.is_empty() {
            return Ok(());
        }

        let request = DeleteRequest { ids, namespace };
        self.post("/vectors/delete", &request).await?;

        Ok(())
    }

    fn service_name(&self) -> &'static str {
        "pinecone"
    }
}

// Pinecone API types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
    include_metadata: bool,
    include_values: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<PineconeMatch>,
}

#[derive(Debug, Deserialize)]
struct PineconeMatch {
    id: String,
    #[serde(default)]
    score: f32,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<PineconeVector<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct PineconeVector<'a> {
    id: &'a str,
    values: &'a [f32],
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    metadata: &'a serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    ids: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::http_client::mock::MockHttpClient;
    use crate::infrastructure::http_client::HttpClient;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service(server: &MockServer) -> PineconeVectorSearch<HttpClient> {
        PineconeVectorSearch::new(HttpClient::new("pinecone"), server.uri(), "pc-key")
    }

    #[tokio::test]
    async fn test_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/query"))
            .and(header("api-key", "pc-key"))
            .and(body_partial_json(serde_json::json!({
                "topK": 2,
                "namespace": "products",
                "includeMetadata": false
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "matches": [
                    {"id": "d1", "score": 0.97},
                    {"id": "d2", "score": 0.81}
                ],
                "namespace": "products"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let matches = service(&server)
            .search(&[0.1, 0.2], 2, Some("products"))
            .await
            .unwrap();

        assert_eq!(
            matches,
            vec![SearchMatch::new("d1", 0.97), SearchMatch::new("d2", 0.81)]
        );
    }

    #[tokio::test]
    async fn test_upsert() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/vectors/upsert"))
            .and(body_partial_json(serde_json::json!({
                "vectors": [{"id": "d1", "values": [1.0, 0.0]}]
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"upsertedCount": 1})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let count = service(&server)
            .upsert(&[VectorDocument::new("d1", vec![1.0, 0.0])], None)
            .await
            .unwrap();

        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_delete() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/vectors/delete"))
            .and(body_partial_json(serde_json::json!({"ids": ["d1", "d2"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        service(&server)
            .delete(&["d1".to_string(), "d2".to_string()], None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_server_error_is_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let result = service(&server).search(&[0.1], 1, None).await;
        assert!(matches!(result, Err(DomainError::UpstreamCompute { .. })));
    }

    #[tokio::test]
    async fn test_empty_mutations_skip_requests() {
        let client = MockHttpClient::new();
        let index = PineconeVectorSearch::new(client, "index.svc.pinecone.io", "key");

        assert_eq!(index.upsert(&[], None).await.unwrap(), 0);
        index.delete(&[], None).await.unwrap();
        assert!(index.client.requests().is_empty());
    }

    #[test]
    fn test_host_normalization() {
        let index = PineconeVectorSearch::new(MockHttpClient::new(), "idx.pinecone.io/", "key");
        assert_eq!(index.url("/query"), "https://idx.pinecone.io/query");

        let index = PineconeVectorSearch::new(MockHttpClient::new(), "http://localhost:5080", "key");
        assert_eq!(index.url("/query"), "http://localhost:5080/query");
    }
}

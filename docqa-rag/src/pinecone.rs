//! Pinecone vector database backend.
//!
//! Provides [`PineconeVectorDatabase`], which implements [`VectorDatabase`]
//! over the Pinecone REST API: index management on the control plane, and
//! upsert/query/delete on the per-index data-plane host reported by
//! `describe_index`.
//!
//! This module is only available when the `pinecone` feature is enabled.
//!
//! # Example
//!
//! ```rust,ignore
//! use docqa_rag::pinecone::PineconeVectorDatabase;
//!
//! let db = PineconeVectorDatabase::new(std::env::var("PINECONE_API_KEY")?)?;
//! let index = VectorIndex::new(Arc::new(db), "rag-doc");
//! index.ensure_index(384, Metric::Cosine).await?;
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error};

use crate::document::{IndexedRecord, Metric, RetrievalMatch};
use crate::error::{RagError, Result};
use crate::vectorstore::{IndexDescription, IndexSpec, VectorDatabase};

/// Pinecone control-plane endpoint.
pub const CONTROL_PLANE_URL: &str = "https://api.pinecone.io";

const API_VERSION: &str = "2024-07";

/// Pinecone caps upsert requests at 2 MB; 100 records of 384 floats stay well
/// under it.
const UPSERT_BATCH_SIZE: usize = 100;

/// Pinecone rejects delete-by-id requests naming more than 1000 ids.
const DELETE_BATCH_SIZE: usize = 1000;

/// A [`VectorDatabase`] backed by [Pinecone](https://www.pinecone.io/).
///
/// New indexes are created serverless in `aws`/`us-east-1` unless overridden.
pub struct PineconeVectorDatabase {
    client: reqwest::Client,
    api_key: String,
    control_plane_url: String,
    cloud: String,
    region: String,
    hosts: RwLock<HashMap<String, String>>,
}

impl PineconeVectorDatabase {
    /// Create a client authenticated with `api_key`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Configuration`] if the API key is blank.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(RagError::Configuration("Pinecone API key must not be empty".into()));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            control_plane_url: CONTROL_PLANE_URL.into(),
            cloud: "aws".into(),
            region: "us-east-1".into(),
            hosts: RwLock::new(HashMap::new()),
        })
    }

    /// Override the control-plane URL.
    pub fn with_control_plane_url(mut self, url: impl Into<String>) -> Self {
        self.control_plane_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the serverless cloud and region used for new indexes.
    pub fn with_serverless(mut self, cloud: impl Into<String>, region: impl Into<String>) -> Self {
        self.cloud = cloud.into();
        self.region = region.into();
        self
    }

    fn map_err(e: reqwest::Error) -> RagError {
        RagError::VectorStore { backend: "pinecone".to_string(), message: e.to_string() }
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.client
            .request(method, url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = request.send().await.map_err(Self::map_err)?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorBody>(&body)
                .ok()
                .and_then(|e| e.error.map(|d| d.message).or(e.message))
                .unwrap_or(body);
            error!(backend = "pinecone", %status, "API error");
            return Err(RagError::VectorStore {
                backend: "pinecone".to_string(),
                message: format!("API returned {status}: {detail}"),
            });
        }
        response.json().await.map_err(Self::map_err)
    }

    /// Data-plane base URL of `index`, looked up once and then remembered.
    async fn host(&self, index: &str) -> Result<String> {
        if let Some(host) = self.hosts.read().await.get(index) {
            return Ok(host.clone());
        }
        self.describe_index(index).await?;
        self.hosts.read().await.get(index).cloned().ok_or_else(|| RagError::VectorStore {
            backend: "pinecone".to_string(),
            message: format!("index '{index}' has no data-plane host yet"),
        })
    }
}

// ── REST request/response types ────────────────────────────────────

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<ErrorDetail>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

#[derive(Deserialize)]
struct IndexList {
    #[serde(default)]
    indexes: Vec<IndexModel>,
}

#[derive(Deserialize)]
struct IndexModel {
    name: String,
    dimension: usize,
    metric: Metric,
    #[serde(default)]
    host: Option<String>,
    status: IndexStatus,
}

#[derive(Deserialize)]
struct IndexStatus {
    ready: bool,
}

#[derive(Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: Metric,
    spec: ServerlessSpec<'a>,
}

#[derive(Serialize)]
struct ServerlessSpec<'a> {
    serverless: CloudRegion<'a>,
}

#[derive(Serialize)]
struct CloudRegion<'a> {
    cloud: &'a str,
    region: &'a str,
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [IndexedRecord],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<RetrievalMatch>,
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    ids: &'a [String],
}

fn delete_requests(ids: &[String]) -> impl Iterator<Item = DeleteRequest<'_>> {
    ids.chunks(DELETE_BATCH_SIZE).map(|ids| DeleteRequest { ids })
}

/// Pinecone answers writes with small JSON objects we do not inspect.
#[derive(Deserialize)]
struct Ignored {}

#[async_trait]
impl VectorDatabase for PineconeVectorDatabase {
    async fn list_indexes(&self) -> Result<Vec<String>> {
        let url = format!("{}/indexes", self.control_plane_url);
        let list: IndexList = self.send(self.request(reqwest::Method::GET, url)).await?;
        Ok(list.indexes.into_iter().map(|index| index.name).collect())
    }

    async fn create_index(&self, spec: &IndexSpec) -> Result<()> {
        let url = format!("{}/indexes", self.control_plane_url);
        let body = CreateIndexRequest {
            name: &spec.name,
            dimension: spec.dimension,
            metric: spec.metric,
            spec: ServerlessSpec {
                serverless: CloudRegion { cloud: &self.cloud, region: &self.region },
            },
        };
        let _: Ignored = self.send(self.request(reqwest::Method::POST, url).json(&body)).await?;
        debug!(index = %spec.name, dimension = spec.dimension, "created pinecone index");
        Ok(())
    }

    async fn describe_index(&self, name: &str) -> Result<IndexDescription> {
        let url = format!("{}/indexes/{name}", self.control_plane_url);
        let model: IndexModel = self.send(self.request(reqwest::Method::GET, url)).await?;
        if let Some(host) = model.host.as_deref().filter(|h| !h.is_empty()) {
            let base = if host.starts_with("http") {
                host.to_string()
            } else {
                format!("https://{host}")
            };
            self.hosts.write().await.insert(name.to_string(), base);
        }
        Ok(IndexDescription {
            name: model.name,
            dimension: model.dimension,
            metric: model.metric,
            ready: model.status.ready,
        })
    }

    async fn upsert(&self, index: &str, records: &[IndexedRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let host = self.host(index).await?;
        for batch in records.chunks(UPSERT_BATCH_SIZE) {
            let request = self
                .request(reqwest::Method::POST, format!("{host}/vectors/upsert"))
                .json(&UpsertRequest { vectors: batch });
            let _: Ignored = self.send(request).await?;
        }
        debug!(index, count = records.len(), "upserted records to pinecone");
        Ok(())
    }

    async fn query(
        &self,
        index: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<RetrievalMatch>> {
        let host = self.host(index).await?;
        let request = self.request(reqwest::Method::POST, format!("{host}/query")).json(
            &QueryRequest { vector, top_k, include_metadata: true, include_values: false },
        );
        let response: QueryResponse = self.send(request).await?;
        Ok(response.matches)
    }

    async fn delete(&self, index: &str, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let host = self.host(index).await?;
        for body in delete_requests(ids) {
            let request = self
                .request(reqwest::Method::POST, format!("{host}/vectors/delete"))
                .json(&body);
            let _: Ignored = self.send(request).await?;
        }
        debug!(index, count = ids.len(), "deleted records from pinecone");
        Ok(())
    }
}

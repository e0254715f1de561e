//! Vector store boundary
//!
//! The trait mirrors the consumed service contract: tenant-scoped
//! collections, batched upserts, top-K similarity queries. `HttpVectorStore`
//! speaks the Chroma REST contract; `InMemoryVectorStore` implements the
//! same trait with cosine similarity for tests and offline runs.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::json;

use crate::error::{AgentError, Result};
use crate::retrieval::chunker::ChunkMetadata;
use coderail_core::VectorStoreSettings;

/// Maximum items per upsert network call
pub const UPSERT_BATCH: usize = 50;

/// One batched upsert payload; all four columns are index-aligned
#[derive(Debug, Clone, Default)]
pub struct UpsertBatch {
    pub ids: Vec<String>,
    pub embeddings: Vec<Vec<f32>>,
    pub documents: Vec<String>,
    pub metadatas: Vec<ChunkMetadata>,
}

impl UpsertBatch {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Result of one similarity query, index-aligned across columns
#[derive(Debug, Clone, Default)]
pub struct QueryMatches {
    pub ids: Vec<String>,
    pub distances: Vec<f32>,
    pub documents: Vec<String>,
    pub metadatas: Vec<ChunkMetadata>,
}

/// The consumed vector-store contract
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection if it does not already exist
    async fn ensure_collection(&self, name: &str) -> Result<()>;

    /// Delete a collection; deleting a missing collection is a no-op
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Upsert one batch (caller keeps batches within `UPSERT_BATCH`)
    async fn upsert(&self, collection: &str, batch: UpsertBatch) -> Result<()>;

    /// Top-K similarity search
    async fn query(&self, collection: &str, embedding: &[f32], top_k: usize)
        -> Result<QueryMatches>;
}

/// Chroma-contract HTTP vector store
pub struct HttpVectorStore {
    client: reqwest::Client,
    base_url: String,
    /// name -> service-side collection id
    collection_ids: DashMap<String, String>,
}

impl HttpVectorStore {
    pub fn new(settings: VectorStoreSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| AgentError::VectorStore(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: settings.base_url,
            collection_ids: DashMap::new(),
        })
    }

    async fn collection_id(&self, name: &str) -> Result<String> {
        if let Some(id) = self.collection_ids.get(name) {
            return Ok(id.clone());
        }
        self.ensure_collection(name).await?;
        self.collection_ids
            .get(name)
            .map(|id| id.clone())
            .ok_or_else(|| AgentError::VectorStore(format!("collection {name} not resolved")))
    }

    fn metadata_json(metadata: &ChunkMetadata) -> serde_json::Value {
        json!({
            "file_path": metadata.file_path,
            "start_line": metadata.start_line,
            "end_line": metadata.end_line,
        })
    }

    fn metadata_from_json(value: &serde_json::Value) -> ChunkMetadata {
        ChunkMetadata {
            file_path: value["file_path"].as_str().unwrap_or_default().to_string(),
            start_line: value["start_line"].as_u64().unwrap_or(0) as usize,
            end_line: value["end_line"].as_u64().unwrap_or(0) as usize,
        }
    }
}

#[async_trait]
impl VectorStore for HttpVectorStore {
    async fn ensure_collection(&self, name: &str) -> Result<()> {
        let url = format!("{}/api/v1/collections", self.base_url);
        let body = json!({ "name": name, "get_or_create": true });
        let resp = self.client.post(&url).json(&body).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(AgentError::VectorStore(format!(
                "create collection {name}: HTTP {status}: {text}"
            )));
        }
        let json: serde_json::Value = resp.json().await?;
        if let Some(id) = json["id"].as_str() {
            self.collection_ids.insert(name.to_string(), id.to_string());
        }
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let url = format!("{}/api/v1/collections/{}", self.base_url, name);
        let resp = self.client.delete(&url).send().await?;
        self.collection_ids.remove(name);
        // Missing collection is a successful no-op: drop is idempotent
        if !resp.status().is_success() && resp.status() != reqwest::StatusCode::NOT_FOUND {
            let status = resp.status();
            return Err(AgentError::VectorStore(format!(
                "delete collection {name}: HTTP {status}"
            )));
        }
        Ok(())
    }

    async fn upsert(&self, collection: &str, batch: UpsertBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let id = self.collection_id(collection).await?;
        let url = format!("{}/api/v1/collections/{}/upsert", self.base_url, id);
        let body = json!({
            "ids": batch.ids,
            "embeddings": batch.embeddings,
            "documents": batch.documents,
            "metadatas": batch.metadatas.iter().map(Self::metadata_json).collect::<Vec<_>>(),
        });
        let resp = self.client.post(&url).json(&body).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            return Err(AgentError::VectorStore(format!("upsert: HTTP {status}")));
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<QueryMatches> {
        let id = self.collection_id(collection).await?;
        let url = format!("{}/api/v1/collections/{}/query", self.base_url, id);
        let body = json!({
            "query_embeddings": [embedding],
            "n_results": top_k,
            "include": ["documents", "distances", "metadatas"],
        });
        let resp = self.client.post(&url).json(&body).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            return Err(AgentError::VectorStore(format!("query: HTTP {status}")));
        }
        let json: serde_json::Value = resp.json().await?;

        // Chroma nests each column one level per query embedding
        let ids: Vec<String> = json["ids"][0]
            .as_array()
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        let distances: Vec<f32> = json["distances"][0]
            .as_array()
            .map(|a| a.iter().filter_map(|v| v.as_f64().map(|f| f as f32)).collect())
            .unwrap_or_default();
        let documents: Vec<String> = json["documents"][0]
            .as_array()
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        let metadatas: Vec<ChunkMetadata> = json["metadatas"][0]
            .as_array()
            .map(|a| a.iter().map(Self::metadata_from_json).collect())
            .unwrap_or_default();

        // Columns are index-aligned by contract; a 200 reply missing one is
        // malformed, not empty
        if distances.len() != ids.len()
            || documents.len() != ids.len()
            || metadatas.len() != ids.len()
        {
            return Err(AgentError::VectorStore(format!(
                "query reply columns misaligned: {} id(s), {} distance(s), \
                 {} document(s), {} metadata(s)",
                ids.len(),
                distances.len(),
                documents.len(),
                metadatas.len()
            )));
        }

        Ok(QueryMatches {
            ids,
            distances,
            documents,
            metadatas,
        })
    }
}

#[derive(Debug, Clone)]
struct StoredItem {
    id: String,
    embedding: Vec<f32>,
    document: String,
    metadata: ChunkMetadata,
}

/// In-memory vector store with cosine similarity
#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: DashMap<String, HashMap<String, StoredItem>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collection_len(&self, name: &str) -> usize {
        self.collections.get(name).map(|c| c.len()).unwrap_or(0)
    }

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn ensure_collection(&self, name: &str) -> Result<()> {
        self.collections.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.collections.remove(name);
        Ok(())
    }

    async fn upsert(&self, collection: &str, batch: UpsertBatch) -> Result<()> {
        let mut entry = self.collections.entry(collection.to_string()).or_default();
        for i in 0..batch.len() {
            let item = StoredItem {
                id: batch.ids[i].clone(),
                embedding: batch.embeddings[i].clone(),
                document: batch.documents[i].clone(),
                metadata: batch.metadatas[i].clone(),
            };
            entry.insert(item.id.clone(), item);
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
    ) -> Result<QueryMatches> {
        let Some(entry) = self.collections.get(collection) else {
            return Ok(QueryMatches::default());
        };

        let mut scored: Vec<(f32, StoredItem)> = entry
            .values()
            .map(|item| (Self::cosine(embedding, &item.embedding), item.clone()))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        let mut matches = QueryMatches::default();
        for (similarity, item) in scored {
            matches.ids.push(item.id);
            matches.distances.push(1.0 - similarity);
            matches.documents.push(item.document);
            matches.metadatas.push(item.metadata);
        }
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(path: &str) -> ChunkMetadata {
        ChunkMetadata {
            file_path: path.to_string(),
            start_line: 1,
            end_line: 20,
        }
    }

    #[tokio::test]
    async fn test_in_memory_upsert_and_query() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("t1").await.unwrap();
        store
            .upsert(
                "t1",
                UpsertBatch {
                    ids: vec!["a".into(), "b".into()],
                    embeddings: vec![vec![1.0, 0.0], vec![0.0, 1.0]],
                    documents: vec!["doc a".into(), "doc b".into()],
                    metadatas: vec![meta("a.rs"), meta("b.rs")],
                },
            )
            .await
            .unwrap();

        let matches = store.query("t1", &[0.9, 0.1], 1).await.unwrap();
        assert_eq!(matches.ids, vec!["a".to_string()]);
        assert!(matches.distances[0] < 0.2);
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id() {
        let store = InMemoryVectorStore::new();
        let batch = |doc: &str| UpsertBatch {
            ids: vec!["a".into()],
            embeddings: vec![vec![1.0]],
            documents: vec![doc.into()],
            metadatas: vec![meta("a.rs")],
        };
        store.upsert("t1", batch("old")).await.unwrap();
        store.upsert("t1", batch("new")).await.unwrap();

        assert_eq!(store.collection_len("t1"), 1);
        let matches = store.query("t1", &[1.0], 1).await.unwrap();
        assert_eq!(matches.documents, vec!["new".to_string()]);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = InMemoryVectorStore::new();
        store.ensure_collection("t1").await.unwrap();
        store.delete_collection("t1").await.unwrap();
        // Second delete of a missing collection is a no-op, not an error
        store.delete_collection("t1").await.unwrap();
    }

    #[tokio::test]
    async fn test_query_missing_collection_is_empty() {
        let store = InMemoryVectorStore::new();
        let matches = store.query("ghost", &[1.0], 5).await.unwrap();
        assert!(matches.ids.is_empty());
    }
}

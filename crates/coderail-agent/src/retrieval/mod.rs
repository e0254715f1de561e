//! Retrieval-augmented context assembly
//!
//! Indexing walks a source tree into 20-line chunks, embeds each chunk one
//! at a time, and upserts them into a tenant-scoped collection in batches
//! of 50. Queries embed the input once and return the top-K chunks with
//! their scores. Assembled context is truncated at a fixed character
//! ceiling with a visible marker; truncation is never silent.

pub mod chunker;
pub mod vector_store;

use std::path::Path;
use std::sync::Arc;

pub use chunker::{chunk_file, chunk_tree, ChunkMetadata, EmbeddingChunk, CHUNK_LINES};
pub use vector_store::{
    HttpVectorStore, InMemoryVectorStore, QueryMatches, UpsertBatch, VectorStore, UPSERT_BATCH,
};

use crate::error::{AgentError, Result};
use crate::inference::EmbeddingClient;
use coderail_core::TenantId;

/// Character ceiling for assembled context
pub const CONTEXT_CHAR_LIMIT: usize = 100_000;

/// Marker appended whenever context is cut at the ceiling
pub const TRUNCATION_MARKER: &str = "[context truncated]";

/// One ranked retrieval hit
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: EmbeddingChunk,
    pub score: f32,
}

/// Chunks, embeds and retrieves per-tenant source context
pub struct ContextRetriever {
    embedder: Arc<dyn EmbeddingClient>,
    store: Arc<dyn VectorStore>,
}

impl ContextRetriever {
    pub fn new(embedder: Arc<dyn EmbeddingClient>, store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, store }
    }

    /// Tenant-scoped collection name
    fn collection_name(tenant_id: &TenantId) -> String {
        format!("tenant-{}", tenant_id.as_str().replace(['/', ' '], "-"))
    }

    /// Index a source tree for a tenant. Returns the number of chunks
    /// upserted.
    pub async fn index(&self, tenant_id: &TenantId, root: &Path) -> Result<usize> {
        let chunks = chunk_tree(root)?;
        let collection = Self::collection_name(tenant_id);
        self.store.ensure_collection(&collection).await?;

        let mut batch = UpsertBatch::default();
        let mut upserted = 0usize;

        for chunk in chunks {
            // One embedding call per chunk; the service contract has no
            // batch endpoint
            let embedding = self.embedder.embed(&chunk.text).await?;
            batch.ids.push(chunk.id);
            batch.embeddings.push(embedding);
            batch.documents.push(chunk.text);
            batch.metadatas.push(chunk.metadata);

            if batch.len() >= UPSERT_BATCH {
                upserted += batch.len();
                self.store
                    .upsert(&collection, std::mem::take(&mut batch))
                    .await?;
            }
        }
        if !batch.is_empty() {
            upserted += batch.len();
            self.store.upsert(&collection, batch).await?;
        }

        tracing::info!("Indexed {} chunk(s) for tenant {}", upserted, tenant_id);
        Ok(upserted)
    }

    /// Top-K similarity query for a tenant
    pub async fn query(
        &self,
        tenant_id: &TenantId,
        text: &str,
        top_k: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let embedding = self.embedder.embed(text).await?;
        let collection = Self::collection_name(tenant_id);
        let matches = self.store.query(&collection, &embedding, top_k).await?;

        // A reply with columns of different lengths is a malformed service
        // response, surfaced as a typed error
        if matches.distances.len() != matches.ids.len()
            || matches.documents.len() != matches.ids.len()
            || matches.metadatas.len() != matches.ids.len()
        {
            return Err(AgentError::VectorStore(format!(
                "misaligned query reply from {collection}: {} id(s), {} distance(s), \
                 {} document(s), {} metadata(s)",
                matches.ids.len(),
                matches.distances.len(),
                matches.documents.len(),
                matches.metadatas.len()
            )));
        }

        let mut scored = Vec::with_capacity(matches.ids.len());
        for i in 0..matches.ids.len() {
            scored.push(ScoredChunk {
                chunk: EmbeddingChunk {
                    id: matches.ids[i].clone(),
                    text: matches.documents[i].clone(),
                    metadata: matches.metadatas[i].clone(),
                },
                score: 1.0 - matches.distances[i],
            });
        }
        Ok(scored)
    }

    /// Delete a tenant's collection; safe to call twice
    pub async fn drop_collection(&self, tenant_id: &TenantId) -> Result<()> {
        let collection = Self::collection_name(tenant_id);
        self.store.delete_collection(&collection).await?;
        tracing::info!("Dropped collection for tenant {}", tenant_id);
        Ok(())
    }
}

/// Assemble retrieved chunks into a prompt-ready context block, truncated
/// at the character ceiling with a visible marker.
pub fn assemble_context(chunks: &[ScoredChunk]) -> String {
    let mut context = String::new();
    let mut truncated = false;

    for scored in chunks {
        let header = format!(
            "// {}:{}-{}\n",
            scored.chunk.metadata.file_path,
            scored.chunk.metadata.start_line,
            scored.chunk.metadata.end_line
        );
        let addition_len = header.len() + scored.chunk.text.len() + 2;
        if context.len() + addition_len > CONTEXT_CHAR_LIMIT {
            truncated = true;
            let remaining = CONTEXT_CHAR_LIMIT.saturating_sub(context.len());
            if remaining > header.len() {
                context.push_str(&header);
                let body_budget = remaining - header.len();
                let mut cut = body_budget.min(scored.chunk.text.len());
                while !scored.chunk.text.is_char_boundary(cut) {
                    cut -= 1;
                }
                context.push_str(&scored.chunk.text[..cut]);
            }
            break;
        }
        context.push_str(&header);
        context.push_str(&scored.chunk.text);
        context.push_str("\n\n");
    }

    if truncated {
        context.push('\n');
        context.push_str(TRUNCATION_MARKER);
    }
    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Deterministic embedder: letter-frequency vector, so identical text
    /// maps to an identical embedding and the verbatim chunk wins a query.
    struct FrequencyEmbedder;

    #[async_trait]
    impl EmbeddingClient for FrequencyEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let mut vector = vec![0.0f32; 27];
            for c in text.chars() {
                let c = c.to_ascii_lowercase();
                if c.is_ascii_lowercase() {
                    vector[(c as u8 - b'a') as usize] += 1.0;
                } else {
                    vector[26] += 1.0;
                }
            }
            Ok(vector)
        }
    }

    fn retriever_with_store() -> (ContextRetriever, Arc<InMemoryVectorStore>) {
        let store = Arc::new(InMemoryVectorStore::new());
        let retriever = ContextRetriever::new(Arc::new(FrequencyEmbedder), store.clone());
        (retriever, store)
    }

    fn write_fixture_tree(dir: &Path) {
        std::fs::create_dir_all(dir.join("src")).unwrap();
        std::fs::write(
            dir.join("src/login.ts"),
            "export async function login(page, user) {\n  await page.goto('/login');\n  await page.fill('#user', user);\n}\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("src/cart.ts"),
            "export async function addToCart(page, sku) {\n  await page.click(`[data-sku=${sku}]`);\n  await page.click('#checkout');\n}\n",
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_index_then_query_returns_verbatim_chunk_first() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture_tree(dir.path());

        let (retriever, _) = retriever_with_store();
        let tenant = TenantId::new("acme");
        let count = retriever.index(&tenant, dir.path()).await.unwrap();
        assert_eq!(count, 2);

        // Query with text drawn verbatim from the login chunk
        let verbatim =
            "export async function login(page, user) {\n  await page.goto('/login');\n  await page.fill('#user', user);\n}";
        let hits = retriever.query(&tenant, verbatim, 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.metadata.file_path, "src/login.ts");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn test_drop_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture_tree(dir.path());

        let (retriever, store) = retriever_with_store();
        let tenant = TenantId::new("acme");
        retriever.index(&tenant, dir.path()).await.unwrap();
        assert_eq!(store.collection_len("tenant-acme"), 2);

        retriever.drop_collection(&tenant).await.unwrap();
        retriever.drop_collection(&tenant).await.unwrap();
        assert_eq!(store.collection_len("tenant-acme"), 0);
    }

    /// Store double that answers queries with ids but no other columns,
    /// the shape a malformed service reply produces
    struct MisalignedStore;

    #[async_trait]
    impl VectorStore for MisalignedStore {
        async fn ensure_collection(&self, _name: &str) -> Result<()> {
            Ok(())
        }

        async fn delete_collection(&self, _name: &str) -> Result<()> {
            Ok(())
        }

        async fn upsert(&self, _collection: &str, _batch: UpsertBatch) -> Result<()> {
            Ok(())
        }

        async fn query(
            &self,
            _collection: &str,
            _embedding: &[f32],
            _top_k: usize,
        ) -> Result<QueryMatches> {
            Ok(QueryMatches {
                ids: vec!["chunk-1".to_string()],
                distances: vec![0.1],
                documents: Vec::new(),
                metadatas: Vec::new(),
            })
        }
    }

    #[tokio::test]
    async fn test_misaligned_store_reply_is_typed_error() {
        let retriever = ContextRetriever::new(Arc::new(FrequencyEmbedder), Arc::new(MisalignedStore));
        let err = retriever
            .query(&TenantId::new("acme"), "login page", 5)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::AgentError::VectorStore(_)));
    }

    #[tokio::test]
    async fn test_tenant_isolation() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture_tree(dir.path());

        let (retriever, _) = retriever_with_store();
        retriever
            .index(&TenantId::new("acme"), dir.path())
            .await
            .unwrap();

        let hits = retriever
            .query(&TenantId::new("other"), "login page", 5)
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_assemble_context_truncation_marker() {
        let chunk = |text: String| ScoredChunk {
            chunk: EmbeddingChunk {
                id: "x".into(),
                text,
                metadata: ChunkMetadata {
                    file_path: "big.ts".into(),
                    start_line: 1,
                    end_line: 20,
                },
            },
            score: 1.0,
        };
        let big = "x".repeat(60_000);
        let context = assemble_context(&[chunk(big.clone()), chunk(big)]);

        assert!(context.len() <= CONTEXT_CHAR_LIMIT + TRUNCATION_MARKER.len() + 1);
        assert!(context.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_assemble_context_small_input_untouched() {
        let context = assemble_context(&[ScoredChunk {
            chunk: EmbeddingChunk {
                id: "a".into(),
                text: "fn main() {}".into(),
                metadata: ChunkMetadata {
                    file_path: "main.rs".into(),
                    start_line: 1,
                    end_line: 1,
                },
            },
            score: 0.9,
        }]);
        assert!(context.contains("// main.rs:1-1"));
        assert!(!context.contains(TRUNCATION_MARKER));
    }
}

use crate::error::ServiceError;
use crate::models::{EmbeddingRecord, ScoredRecord};
use async_trait::async_trait;

/// Capability interface for the vector index. Records are immutable
/// once written; `upsert` is idempotent by chunk identity (document +
/// chunk index). `query` returns records ranked by cosine similarity
/// descending, ties broken by the lower chunk index so results are
/// reproducible.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the backing collection when it does not exist yet.
    async fn ensure_ready(&self) -> Result<(), ServiceError>;

    /// Delete all records belonging to one document, so re-ingesting
    /// the same file never leaves stale chunks from its previous
    /// version behind.
    async fn clear_document(&self, document: &str) -> Result<(), ServiceError>;

    /// Delete every record belonging to any other document. A fresh
    /// ingestion supersedes the previous index contents in this
    /// single-document design; the pipeline clears other documents
    /// before writing new records so a query never returns chunks
    /// from a superseded document.
    async fn clear_other_documents(&self, document: &str) -> Result<(), ServiceError>;

    async fn upsert(&self, records: &[EmbeddingRecord]) -> Result<(), ServiceError>;

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredRecord>, ServiceError>;

    /// True when no document has been indexed yet. Checked by the
    /// query pipeline before embedding a question.
    async fn is_empty(&self) -> Result<bool, ServiceError>;
}

/// Deterministic tie-break shared by index implementations: similarity
/// descending, then lower chunk index first.
pub fn sort_ranked(results: &mut [ScoredRecord]) {
    results.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.record.chunk_index.cmp(&b.record.chunk_index))
    });
}

use crate::error::ServiceError;
use crate::models::{EmbeddingRecord, ScoredRecord};
use crate::traits::{sort_ranked, VectorIndex};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Brute-force in-memory index: cosine similarity over every stored
/// record. Backs tests and offline runs; the contract is identical to
/// the Qdrant adapter, including the deterministic tie-break.
#[derive(Clone, Default)]
pub struct InMemoryIndex {
    // document -> chunk_index -> record
    records: Arc<RwLock<HashMap<String, HashMap<usize, EmbeddingRecord>>>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 0.0;
        }
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn ensure_ready(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn clear_document(&self, document: &str) -> Result<(), ServiceError> {
        self.records.write().await.remove(document);
        Ok(())
    }

    async fn clear_other_documents(&self, document: &str) -> Result<(), ServiceError> {
        self.records.write().await.retain(|name, _| name == document);
        Ok(())
    }

    async fn upsert(&self, records: &[EmbeddingRecord]) -> Result<(), ServiceError> {
        let mut store = self.records.write().await;
        for record in records {
            store
                .entry(record.document.clone())
                .or_default()
                .insert(record.chunk_index, record.clone());
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredRecord>, ServiceError> {
        let store = self.records.read().await;
        let mut results: Vec<ScoredRecord> = store
            .values()
            .flat_map(|chunks| chunks.values())
            .map(|record| ScoredRecord {
                score: Self::cosine_similarity(vector, &record.vector),
                record: record.clone(),
            })
            .collect();

        sort_ranked(&mut results);
        results.truncate(top_k);
        Ok(results)
    }

    async fn is_empty(&self) -> Result<bool, ServiceError> {
        let store = self.records.read().await;
        Ok(store.values().all(HashMap::is_empty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(index: usize, vector: Vec<f32>) -> EmbeddingRecord {
        EmbeddingRecord {
            document: "doc.pdf".to_string(),
            chunk_index: index,
            text: format!("chunk {index}"),
            vector,
        }
    }

    #[tokio::test]
    async fn query_ranks_by_similarity_descending() {
        let index = InMemoryIndex::new();
        index
            .upsert(&[
                record(0, vec![0.0, 1.0]),
                record(1, vec![1.0, 0.0]),
                record(2, vec![0.7, 0.7]),
            ])
            .await
            .unwrap();

        let hits = index.query(&[1.0, 0.0], 3).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].record.chunk_index, 1);
        assert_eq!(hits[1].record.chunk_index, 2);
        assert_eq!(hits[2].record.chunk_index, 0);
        assert!(hits[0].score >= hits[1].score && hits[1].score >= hits[2].score);
    }

    #[tokio::test]
    async fn equal_similarity_breaks_ties_by_lower_chunk_index() {
        let index = InMemoryIndex::new();
        // Identical vectors guarantee identical scores.
        index
            .upsert(&[
                record(7, vec![1.0, 0.0]),
                record(2, vec![1.0, 0.0]),
                record(5, vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let hits = index.query(&[1.0, 0.0], 3).await.unwrap();
        let order: Vec<usize> = hits.iter().map(|hit| hit.record.chunk_index).collect();
        assert_eq!(order, vec![2, 5, 7]);
    }

    #[tokio::test]
    async fn upsert_is_idempotent_by_chunk_identity() {
        let index = InMemoryIndex::new();
        index.upsert(&[record(0, vec![1.0, 0.0])]).await.unwrap();
        index.upsert(&[record(0, vec![1.0, 0.0])]).await.unwrap();

        let hits = index.query(&[1.0, 0.0], 10).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn clear_document_removes_prior_contents() {
        let index = InMemoryIndex::new();
        index.upsert(&[record(0, vec![1.0, 0.0])]).await.unwrap();
        assert!(!index.is_empty().await.unwrap());

        index.clear_document("doc.pdf").await.unwrap();
        assert!(index.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn clear_other_documents_keeps_only_the_named_one() {
        let index = InMemoryIndex::new();
        let mut old = record(0, vec![1.0, 0.0]);
        old.document = "old.pdf".to_string();
        index.upsert(&[old, record(0, vec![0.0, 1.0])]).await.unwrap();

        index.clear_other_documents("doc.pdf").await.unwrap();

        let hits = index.query(&[1.0, 0.0], 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.document, "doc.pdf");
    }
}

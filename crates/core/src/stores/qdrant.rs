use crate::error::ServiceError;
use crate::models::{EmbeddingRecord, ScoredRecord};
use crate::traits::{sort_ranked, VectorIndex};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::info;

/// Qdrant over its REST API. Point identity is derived from document
/// name and chunk index, so re-upserting the same chunk is a no-op
/// rather than a duplicate.
pub struct QdrantStore {
    endpoint: String,
    collection: String,
    client: Client,
    vector_size: usize,
}

impl QdrantStore {
    pub fn new(
        endpoint: impl Into<String>,
        collection: impl Into<String>,
        vector_size: usize,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            collection: collection.into(),
            client: Client::new(),
            vector_size,
        }
    }

    fn collection_url(&self, suffix: &str) -> String {
        format!("{}/collections/{}{suffix}", self.endpoint, self.collection)
    }

    /// Stable point id for a chunk: UUID shaped from the sha256 of
    /// `document/index`, since Qdrant only accepts integers or UUIDs.
    fn point_id(record: &EmbeddingRecord) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(record.document.as_bytes());
        hasher.update(b"/");
        hasher.update(record.chunk_index.to_le_bytes());
        let digest = hasher.finalize();
        format!(
            "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            digest[0], digest[1], digest[2], digest[3],
            digest[4], digest[5], digest[6], digest[7],
            digest[8], digest[9], digest[10], digest[11],
            digest[12], digest[13], digest[14], digest[15],
        )
    }

    fn check(backend_status: reqwest::StatusCode) -> Result<(), ServiceError> {
        if backend_status.is_success() {
            Ok(())
        } else {
            Err(ServiceError::from_status("qdrant", backend_status))
        }
    }
}

#[async_trait]
impl VectorIndex for QdrantStore {
    async fn ensure_ready(&self) -> Result<(), ServiceError> {
        let existing = self
            .client
            .get(self.collection_url(""))
            .send()
            .await?;
        if existing.status().is_success() {
            return Ok(());
        }
        if existing.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(ServiceError::from_status("qdrant", existing.status()));
        }

        info!(collection = %self.collection, "creating qdrant collection");
        let response = self
            .client
            .put(self.collection_url(""))
            .json(&json!({
                "vectors": {
                    "size": self.vector_size,
                    "distance": "Cosine",
                }
            }))
            .send()
            .await?;
        Self::check(response.status())
    }

    async fn clear_document(&self, document: &str) -> Result<(), ServiceError> {
        let response = self
            .client
            .post(self.collection_url("/points/delete?wait=true"))
            .json(&json!({
                "filter": {
                    "must": [
                        { "key": "document", "match": { "value": document } }
                    ]
                }
            }))
            .send()
            .await?;
        Self::check(response.status())
    }

    async fn clear_other_documents(&self, document: &str) -> Result<(), ServiceError> {
        let response = self
            .client
            .post(self.collection_url("/points/delete?wait=true"))
            .json(&json!({
                "filter": {
                    "must_not": [
                        { "key": "document", "match": { "value": document } }
                    ]
                }
            }))
            .send()
            .await?;
        Self::check(response.status())
    }

    async fn upsert(&self, records: &[EmbeddingRecord]) -> Result<(), ServiceError> {
        if records.is_empty() {
            return Ok(());
        }

        let points = records
            .iter()
            .map(|record| {
                if record.vector.len() != self.vector_size {
                    return Err(ServiceError::Permanent(format!(
                        "embedding dimension {} != {}",
                        record.vector.len(),
                        self.vector_size
                    )));
                }

                Ok(json!({
                    "id": Self::point_id(record),
                    "vector": record.vector,
                    "payload": {
                        "document": record.document,
                        "chunk_index": record.chunk_index,
                        "text": record.text,
                    },
                }))
            })
            .collect::<Result<Vec<_>, ServiceError>>()?;

        let response = self
            .client
            .put(self.collection_url("/points?wait=true"))
            .json(&json!({ "points": points }))
            .send()
            .await?;
        Self::check(response.status())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredRecord>, ServiceError> {
        if vector.len() != self.vector_size {
            return Err(ServiceError::Permanent(format!(
                "query vector dim {} is not {}",
                vector.len(),
                self.vector_size
            )));
        }

        let response = self
            .client
            .post(self.collection_url("/points/search"))
            .json(&json!({
                "vector": vector,
                "limit": top_k,
                "with_payload": true,
                "with_vector": false,
            }))
            .send()
            .await?;
        Self::check(response.status())?;

        let parsed: Value = response.json().await?;
        let hits = parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut results = Vec::with_capacity(hits.len());
        for hit in hits {
            let document = hit
                .pointer("/payload/document")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let chunk_index = hit
                .pointer("/payload/chunk_index")
                .and_then(Value::as_u64)
                .unwrap_or_default() as usize;
            let text = hit
                .pointer("/payload/text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0) as f32;

            results.push(ScoredRecord {
                record: EmbeddingRecord {
                    document,
                    chunk_index,
                    text,
                    vector: Vec::new(),
                },
                score,
            });
        }

        // Qdrant already ranks by similarity; re-sorting applies the
        // chunk-index tie-break deterministically.
        sort_ranked(&mut results);
        Ok(results)
    }

    async fn is_empty(&self) -> Result<bool, ServiceError> {
        let response = self
            .client
            .post(self.collection_url("/points/count"))
            .json(&json!({ "exact": true }))
            .send()
            .await?;

        // A missing collection means nothing was ever indexed.
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(true);
        }
        Self::check(response.status())?;

        let parsed: Value = response.json().await?;
        let count = parsed
            .pointer("/result/count")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        Ok(count == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_ids_are_stable_and_distinct() {
        let record = |index| EmbeddingRecord {
            document: "report.pdf".to_string(),
            chunk_index: index,
            text: String::new(),
            vector: Vec::new(),
        };

        assert_eq!(QdrantStore::point_id(&record(0)), QdrantStore::point_id(&record(0)));
        assert_ne!(QdrantStore::point_id(&record(0)), QdrantStore::point_id(&record(1)));
        assert_eq!(QdrantStore::point_id(&record(3)).len(), 36);
    }
}

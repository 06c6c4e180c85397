use crate::error::ServiceError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

/// Capability interface: text in, fixed-length vectors out, batched.
/// Failures carry the shared transient/permanent signal so callers can
/// apply the retry policy.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError>;
}

/// OpenAI-compatible embeddings endpoint (`POST {base}/v1/embeddings`).
pub struct OpenAiEmbeddings {
    base_url: String,
    api_key: String,
    model: String,
    client: Client,
}

impl OpenAiEmbeddings {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddings {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "input": texts,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ServiceError::from_status("embeddings", response.status()));
        }

        let payload: Value = response.json().await?;
        let data = payload
            .pointer("/data")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                ServiceError::Permanent("embeddings response missing data array".to_string())
            })?;

        let mut vectors = Vec::with_capacity(data.len());
        for item in data {
            let embedding = item
                .pointer("/embedding")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    ServiceError::Permanent("embeddings item missing vector".to_string())
                })?;
            vectors.push(
                embedding
                    .iter()
                    .filter_map(Value::as_f64)
                    .map(|v| v as f32)
                    .collect(),
            );
        }

        if vectors.len() != texts.len() {
            return Err(ServiceError::Permanent(format!(
                "embedding count {} does not match input count {}",
                vectors.len(),
                texts.len()
            )));
        }

        Ok(vectors)
    }
}

/// Deterministic local embedder: hashed character trigrams, L2
/// normalized. No network, no model downloads; useful for tests and
/// offline smoke runs.
#[derive(Debug, Clone, Copy)]
pub struct HashedNgramEmbedder {
    pub dimensions: usize,
}

impl Default for HashedNgramEmbedder {
    fn default() -> Self {
        Self { dimensions: 128 }
    }
}

impl HashedNgramEmbedder {
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl EmbeddingClient for HashedNgramEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashed_embedder_is_deterministic() {
        let embedder = HashedNgramEmbedder::default();
        let first = embedder.embed_one("Hydraulic pressure and flow");
        let second = embedder.embed_one("Hydraulic pressure and flow");
        assert_eq!(first, second);
    }

    #[test]
    fn hashed_embedder_outputs_expected_length() {
        let embedder = HashedNgramEmbedder { dimensions: 32 };
        assert_eq!(embedder.embed_one("abc").len(), 32);
    }

    #[tokio::test]
    async fn batch_embeds_one_vector_per_text() {
        let embedder = HashedNgramEmbedder::default();
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let vectors = embedder.embed(&texts).await.unwrap();
        assert_eq!(vectors.len(), 2);
        assert_ne!(vectors[0], vectors[1]);
    }
}

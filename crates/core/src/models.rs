use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};

/// One ingested PDF. Lives only for the duration of its ingestion job;
/// a later ingestion replaces the active index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub page_count: usize,
}

/// How the text of a page was obtained.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExtractionMethod {
    Native,
    Ocr,
}

/// A contiguous fragment of the cleaned document text. `start`/`end`
/// are character offsets into the cleaned full text; consecutive
/// chunks overlap by the configured number of characters except
/// possibly the last one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub document_id: String,
    pub index: usize,
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// A chunk paired with its embedding, as written to the vector index.
/// Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub document: String,
    pub chunk_index: usize,
    pub text: String,
    pub vector: Vec<f32>,
}

/// Query result: a stored record and its cosine similarity to the
/// query vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredRecord {
    pub record: EmbeddingRecord,
    pub score: f32,
}

/// The answer produced by the query pipeline, together with the chunk
/// texts that were placed in the prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub question: String,
    pub answer: String,
    pub context_used: Vec<String>,
}

/// Policy constants for the ingestion pipeline. These are heuristic
/// thresholds, not derived values; the defaults below are the
/// documented behavior and every one of them can be overridden.
#[derive(Debug, Clone)]
pub struct IngestionOptions {
    /// Native page text shorter than this is treated as a scanned page
    /// and routed through OCR.
    pub ocr_trigger_chars: usize,
    /// Native page text whose alphanumeric-or-space ratio falls below
    /// this is treated as garbled and routed through OCR.
    pub min_alnum_ratio: f64,
    /// Lines inspected at the top and at the bottom of each page when
    /// looking for repeating headers/footers.
    pub boilerplate_band_lines: usize,
    /// A banded line must appear on at least this fraction of pages to
    /// be classified as boilerplate.
    pub boilerplate_min_fraction: f64,
    /// Cleaned lines shorter than this are dropped unless they match a
    /// preserved pattern (footnote marker, numeric value, caption...).
    pub min_block_chars: usize,
    pub chunking: ChunkingConfig,
    /// Chunks per request to the embedding service.
    pub embed_batch_size: usize,
    pub retry: RetryPolicy,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            ocr_trigger_chars: 100,
            min_alnum_ratio: 0.5,
            boilerplate_band_lines: 3,
            boilerplate_min_fraction: 0.5,
            min_block_chars: 20,
            chunking: ChunkingConfig::default(),
            embed_batch_size: 32,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    /// Hard upper bound on chunk length in characters.
    pub max_chars: usize,
    /// Characters shared between consecutive chunks.
    pub overlap_chars: usize,
    /// Chunks shorter than this are rejected when a soft boundary cut
    /// would produce them; the final chunk may still be shorter.
    pub min_chars: usize,
    /// How far before the hard limit to look for a sentence or
    /// paragraph break to cut at.
    pub boundary_lookback: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 800,
            overlap_chars: 100,
            min_chars: 200,
            boundary_lookback: 120,
        }
    }
}

/// Policy constants for the query pipeline.
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// Number of chunks retrieved from the vector index.
    pub top_k: usize,
    /// Upper bound on the context block assembled into the prompt.
    pub max_context_chars: usize,
    pub retry: RetryPolicy,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            max_context_chars: 6_000,
            retry: RetryPolicy::default(),
        }
    }
}

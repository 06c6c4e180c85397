pub mod boilerplate;
pub mod chunking;
pub mod cleaning;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod jobs;
pub mod layout;
pub mod llm;
pub mod models;
pub mod ocr;
pub mod query;
pub mod retry;
pub mod stores;
pub mod traits;

pub use boilerplate::BoilerplateFilter;
pub use chunking::{reassemble, Chunker};
pub use cleaning::TextCleaner;
pub use embeddings::{EmbeddingClient, HashedNgramEmbedder, OpenAiEmbeddings};
pub use error::{IngestError, QueryError, ServiceError};
pub use extractor::{LopdfExtractor, PageExtraction, PdfExtractor, TextSpan};
pub use ingest::IngestionPipeline;
pub use jobs::{Job, JobKind, JobResult, JobStatus, JobStore};
pub use layout::LayoutAnalyzer;
pub use llm::{build_prompt, Answerer, OpenAiChat};
pub use models::{
    Chunk, ChunkingConfig, Document, EmbeddingRecord, ExtractionMethod, IngestionOptions,
    QueryOptions, QueryResponse, ScoredRecord,
};
pub use ocr::{DisabledOcr, HttpOcrClient, OcrEngine};
pub use query::QueryPipeline;
pub use retry::RetryPolicy;
pub use stores::{InMemoryIndex, QdrantStore};
pub use traits::VectorIndex;

use crate::embeddings::EmbeddingClient;
use crate::error::QueryError;
use crate::llm::Answerer;
use crate::models::{QueryOptions, QueryResponse, ScoredRecord};
use crate::traits::VectorIndex;
use std::sync::Arc;
use tracing::{debug, info};

/// Answers a question from the indexed document: embed the question,
/// retrieve the top-k most similar chunks, assemble a bounded context
/// block, and hand both to the answer model. Query-time operations are
/// independent per request and may run concurrently with an active
/// ingestion.
#[derive(Clone)]
pub struct QueryPipeline {
    embedder: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    answerer: Arc<dyn Answerer>,
    options: QueryOptions,
}

impl QueryPipeline {
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
        answerer: Arc<dyn Answerer>,
        options: QueryOptions,
    ) -> Self {
        Self {
            embedder,
            index,
            answerer,
            options,
        }
    }

    pub async fn ask(&self, question: &str) -> Result<QueryResponse, QueryError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QueryError::EmptyQuestion);
        }

        // The emptiness check comes first so an unindexed state never
        // costs an embedding call and never produces a fabricated
        // answer from empty context.
        let retry = self.options.retry;
        let empty = retry
            .run("index", || async { self.index.is_empty().await })
            .await?;
        if empty {
            return Err(QueryError::NotReady(
                "upload and index a document before asking questions".to_string(),
            ));
        }

        let owned = vec![question.to_string()];
        let mut vectors = retry
            .run("embeddings", || async { self.embedder.embed(&owned).await })
            .await?;
        let question_vector = vectors.pop().unwrap_or_default();

        let hits = retry
            .run("index", || async {
                self.index.query(&question_vector, self.options.top_k).await
            })
            .await?;
        debug!(hits = hits.len(), "retrieved candidate chunks");

        let context_used = bounded_context(&hits, self.options.max_context_chars);
        let context_block = context_used.join("\n\n");

        let answer = retry
            .run("chat", || async {
                self.answerer.complete(question, &context_block).await
            })
            .await?;

        info!(
            context_chunks = context_used.len(),
            answer_chars = answer.len(),
            "question answered"
        );
        Ok(QueryResponse {
            question: question.to_string(),
            answer,
            context_used,
        })
    }
}

/// Take ranked chunk texts in order until the context budget is spent.
/// The top hit is always included, truncated if it alone exceeds the
/// budget, so the prompt never silently loses the best evidence.
fn bounded_context(hits: &[ScoredRecord], max_chars: usize) -> Vec<String> {
    let mut used = Vec::new();
    let mut total = 0usize;

    for hit in hits {
        let text = hit.record.text.trim();
        if text.is_empty() {
            continue;
        }
        let len = text.chars().count();
        if total + len > max_chars {
            if used.is_empty() {
                used.push(text.chars().take(max_chars).collect());
            }
            break;
        }
        total += len;
        used.push(text.to_string());
    }

    used
}

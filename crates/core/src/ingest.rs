use crate::boilerplate::BoilerplateFilter;
use crate::chunking::Chunker;
use crate::cleaning::TextCleaner;
use crate::embeddings::EmbeddingClient;
use crate::error::IngestError;
use crate::extractor::{PageExtraction, PdfExtractor};
use crate::jobs::{JobKind, JobResult, JobStore};
use crate::layout::LayoutAnalyzer;
use crate::models::{Chunk, Document, EmbeddingRecord, IngestionOptions};
use crate::traits::VectorIndex;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

// Per-stage progress weights; cumulative values reported to the job so
// progress reflects real work done rather than stage count.
const AFTER_EXTRACT: u8 = 35;
const AFTER_LAYOUT: u8 = 45;
const AFTER_BOILERPLATE: u8 = 50;
const AFTER_CLEAN: u8 = 55;
const AFTER_CHUNK: u8 = 60;
const AFTER_EMBED: u8 = 90;

/// Orchestrates one document through
/// extract → layout → boilerplate → clean → chunk → embed → index,
/// advancing a [`JobStore`] entry as it goes. Cloneable: every
/// collaborator sits behind an `Arc`.
#[derive(Clone)]
pub struct IngestionPipeline {
    extractor: Arc<dyn PdfExtractor>,
    embedder: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    jobs: JobStore,
    layout: LayoutAnalyzer,
    options: IngestionOptions,
}

impl IngestionPipeline {
    pub fn new(
        extractor: Arc<dyn PdfExtractor>,
        embedder: Arc<dyn EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
        jobs: JobStore,
        options: IngestionOptions,
    ) -> Self {
        Self {
            extractor,
            embedder,
            index,
            jobs,
            layout: LayoutAnalyzer::default(),
            options,
        }
    }

    pub fn job_store(&self) -> &JobStore {
        &self.jobs
    }

    /// Accept an upload: create a job and run ingestion on a background
    /// task, returning the job id immediately. A second upload while an
    /// ingestion job is still active is rejected; callers decide
    /// whether to retry once the active job reaches a terminal state.
    pub fn start(&self, pdf: Vec<u8>, filename: String) -> Result<Uuid, IngestError> {
        let job_id = self
            .jobs
            .create_if_idle(JobKind::Ingestion)
            .map_err(IngestError::IngestionInProgress)?;
        let pipeline = self.clone();
        tokio::spawn(async move {
            if let Err(error) = pipeline.run(job_id, &pdf, &filename).await {
                warn!(%job_id, %error, "ingestion failed");
                pipeline.jobs.fail(job_id, error.to_string());
            }
        });

        Ok(job_id)
    }

    /// The state machine body: queued → processing → completed, with
    /// any error mapped to failed by the caller in [`Self::start`].
    async fn run(&self, job_id: Uuid, pdf: &[u8], filename: &str) -> Result<(), IngestError> {
        self.jobs.advance(job_id, 1, "extracting text");
        let pages = self.extractor.extract(pdf).await?;

        let usable = pages.iter().filter(|page| page.usable()).count();
        for page in pages.iter().filter(|page| page.error.is_some()) {
            warn!(
                page = page.number,
                error = page.error.as_deref().unwrap_or_default(),
                "page yielded no text"
            );
        }
        if usable == 0 {
            return Err(IngestError::NoExtractableText);
        }

        let document = Document {
            id: document_id(filename, pdf),
            filename: filename.to_string(),
            page_count: pages.len(),
        };
        info!(
            document = %document.filename,
            pages = document.page_count,
            usable_pages = usable,
            "extraction finished"
        );
        self.jobs.advance(job_id, AFTER_EXTRACT, "analyzing page layout");

        // Reading order must be settled before boilerplate detection:
        // reordering changes which lines sit at the top and bottom of
        // a page.
        let page_texts: Vec<String> = pages
            .iter()
            .filter(|page| page.usable())
            .map(|page| self.linearize(page))
            .collect();
        self.jobs.advance(job_id, AFTER_LAYOUT, "removing repeated headers and footers");

        let boilerplate = BoilerplateFilter {
            band_lines: self.options.boilerplate_band_lines,
            min_fraction: self.options.boilerplate_min_fraction,
        };
        let filtered = boilerplate.filter(&page_texts);
        self.jobs.advance(job_id, AFTER_BOILERPLATE, "cleaning extracted text");

        let cleaner = TextCleaner::new(self.options.min_block_chars)?;
        let cleaned: Vec<String> = filtered
            .iter()
            .map(|page| cleaner.clean(page))
            .filter(|page| !page.is_empty())
            .collect();
        let full_text = cleaned.join("\n\n");
        self.jobs.advance(job_id, AFTER_CLEAN, "chunking text");

        let chunker = Chunker::new(self.options.chunking)?;
        let chunks = chunker.chunk(&document.id, &full_text);
        if chunks.is_empty() {
            return Err(IngestError::NoExtractableText);
        }
        info!(chunks = chunks.len(), "chunking finished");
        self.jobs.advance(job_id, AFTER_CHUNK, "generating embeddings");

        let records = self.embed_chunks(job_id, &document, &chunks).await?;
        self.jobs.advance(job_id, AFTER_EMBED, "storing vectors in the index");

        let retry = self.options.retry;
        retry
            .run("index", || async { self.index.ensure_ready().await })
            .await?;
        // A new ingestion supersedes whatever was indexed before:
        // drop every other document, then any prior version of this
        // one, so a query never sees stale or mixed chunks.
        retry
            .run("index", || async {
                self.index.clear_other_documents(&document.filename).await
            })
            .await?;
        retry
            .run("index", || async {
                self.index.clear_document(&document.filename).await
            })
            .await?;
        retry
            .run("index", || async { self.index.upsert(&records).await })
            .await?;

        self.jobs.complete(
            job_id,
            JobResult {
                filename: document.filename.clone(),
                chunks_count: chunks.len(),
            },
        );
        info!(document = %document.filename, chunks = chunks.len(), "ingestion completed");
        Ok(())
    }

    fn linearize(&self, page: &PageExtraction) -> String {
        if page.spans.is_empty() {
            page.text.clone()
        } else {
            self.layout.linearize(&page.spans)
        }
    }

    /// Embed chunks in bounded batches, retrying each batch under the
    /// shared policy, and interpolate job progress across batches.
    async fn embed_chunks(
        &self,
        job_id: Uuid,
        document: &Document,
        chunks: &[Chunk],
    ) -> Result<Vec<EmbeddingRecord>, IngestError> {
        let batch_size = self.options.embed_batch_size.max(1);
        let batches: Vec<&[Chunk]> = chunks.chunks(batch_size).collect();
        let total = batches.len();

        let mut records = Vec::with_capacity(chunks.len());
        for (batch_no, batch) in batches.into_iter().enumerate() {
            let texts: Vec<String> = batch.iter().map(|chunk| chunk.text.clone()).collect();
            let vectors = self
                .options
                .retry
                .run("embeddings", || async { self.embedder.embed(&texts).await })
                .await?;

            for (chunk, vector) in batch.iter().zip(vectors) {
                records.push(EmbeddingRecord {
                    document: document.filename.clone(),
                    chunk_index: chunk.index,
                    text: chunk.text.clone(),
                    vector,
                });
            }

            let span = (AFTER_EMBED - AFTER_CHUNK) as usize;
            let progress = AFTER_CHUNK as usize + span * (batch_no + 1) / total;
            self.jobs.advance(
                job_id,
                progress as u8,
                format!("generating embeddings ({}/{total} batches)", batch_no + 1),
            );
        }

        Ok(records)
    }
}

fn document_id(filename: &str, pdf: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(filename.as_bytes());
    hasher.update(pdf);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::jobs::JobStatus;
    use crate::models::ExtractionMethod;
    use crate::stores::InMemoryIndex;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeExtractor {
        pages: Vec<PageExtraction>,
    }

    #[async_trait]
    impl PdfExtractor for FakeExtractor {
        async fn extract(&self, _pdf: &[u8]) -> Result<Vec<PageExtraction>, IngestError> {
            Ok(self.pages.clone())
        }
    }

    struct FlakyEmbedder {
        failures_before_success: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingClient for FlakyEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                return Err(ServiceError::Transient("embedding service down".to_string()));
            }
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn text_page(number: u32, text: &str) -> PageExtraction {
        PageExtraction {
            number,
            method: ExtractionMethod::Native,
            spans: Vec::new(),
            text: text.to_string(),
            error: None,
        }
    }

    fn options() -> IngestionOptions {
        IngestionOptions {
            min_block_chars: 5,
            retry: crate::retry::RetryPolicy::immediate(3),
            ..IngestionOptions::default()
        }
    }

    fn pipeline(pages: Vec<PageExtraction>, failures: usize) -> (IngestionPipeline, Arc<InMemoryIndex>) {
        let index = Arc::new(InMemoryIndex::new());
        let pipeline = IngestionPipeline::new(
            Arc::new(FakeExtractor { pages }),
            Arc::new(FlakyEmbedder {
                failures_before_success: failures,
                calls: AtomicUsize::new(0),
            }),
            index.clone(),
            JobStore::new(),
            options(),
        );
        (pipeline, index)
    }

    async fn wait_terminal(pipeline: &IngestionPipeline, job_id: Uuid) -> crate::jobs::Job {
        for _ in 0..200 {
            let job = pipeline.jobs.snapshot(job_id).expect("job exists");
            if job.status.is_terminal() {
                return job;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("job never reached a terminal state");
    }

    #[tokio::test]
    async fn successful_ingestion_completes_with_chunk_count() {
        let body = "This is a full paragraph of document text that easily clears every \
                    length threshold in the cleaning stage and gives the chunker work to do. ";
        let (pipeline, index) = pipeline(
            vec![
                text_page(1, &format!("Opening section of the report. {}", body.repeat(4))),
                text_page(2, &format!("Closing section of the report. {}", body.repeat(4))),
            ],
            0,
        );

        let job_id = pipeline.start(b"%PDF".to_vec(), "report.pdf".to_string()).unwrap();
        let job = wait_terminal(&pipeline, job_id).await;

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        let result = job.result.expect("completed jobs carry a result");
        assert_eq!(result.filename, "report.pdf");
        assert!(result.chunks_count >= 1);
        assert!(!index.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn all_pages_unusable_fails_the_job() {
        let mut page = text_page(1, "");
        page.error = Some("ocr failed".to_string());
        let (pipeline, index) = pipeline(vec![page], 0);

        let job_id = pipeline.start(b"%PDF".to_vec(), "scan.pdf".to_string()).unwrap();
        let job = wait_terminal(&pipeline, job_id).await;

        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("no extractable text"));
        assert!(index.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn transient_embedding_failures_within_budget_still_complete() {
        let body = "Plenty of ordinary text for a document page, repeated to give the \
                    embedding stage at least one batch of chunks to work on. ";
        let (pipeline, _) = pipeline(vec![text_page(1, &body.repeat(4))], 2);

        let job_id = pipeline.start(b"%PDF".to_vec(), "flaky.pdf".to_string()).unwrap();
        let job = wait_terminal(&pipeline, job_id).await;

        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn exhausted_retry_budget_fails_the_job() {
        let body = "Plenty of ordinary text for a document page, repeated to give the \
                    embedding stage at least one batch of chunks to work on. ";
        let (pipeline, _) = pipeline(vec![text_page(1, &body.repeat(4))], 10);

        let job_id = pipeline.start(b"%PDF".to_vec(), "down.pdf".to_string()).unwrap();
        let job = wait_terminal(&pipeline, job_id).await;

        assert_eq!(job.status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn second_upload_while_active_is_rejected() {
        let body = "Enough text to make the pipeline do real work on this page. ";
        let (pipeline, _) = pipeline(vec![text_page(1, &body.repeat(4))], 0);

        let first = pipeline.start(b"%PDF".to_vec(), "one.pdf".to_string()).unwrap();
        let second = pipeline.start(b"%PDF".to_vec(), "two.pdf".to_string());

        match second {
            Err(IngestError::IngestionInProgress(active)) => assert_eq!(active, first),
            other => panic!("expected rejection, got {other:?}"),
        }

        wait_terminal(&pipeline, first).await;
    }
}

use chrono::Utc;
use clap::{Parser, Subcommand};
use pdf_rag_core::{
    DisabledOcr, HttpOcrClient, IngestionOptions, IngestionPipeline, JobStatus, JobStore,
    LopdfExtractor, OcrEngine, OpenAiChat, OpenAiEmbeddings, QdrantStore, QueryOptions,
    QueryPipeline,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "pdf-rag", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Qdrant collection
    #[arg(long, env = "QDRANT_COLLECTION", default_value = "pdf_chunks")]
    qdrant_collection: String,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com")]
    openai_base_url: String,

    /// API key for the embedding and chat backends
    #[arg(long, env = "OPENAI_API_KEY")]
    openai_api_key: String,

    /// Embedding model name
    #[arg(long, env = "EMBEDDING_MODEL", default_value = "text-embedding-3-small")]
    embedding_model: String,

    /// Embedding vector size, must match the model
    #[arg(long, env = "EMBEDDING_DIMENSIONS", default_value = "1536")]
    embedding_dimensions: usize,

    /// Chat model used to answer questions
    #[arg(long, env = "CHAT_MODEL", default_value = "gpt-4o-mini")]
    chat_model: String,

    /// OCR service base URL; scanned pages fail without one
    #[arg(long, env = "OCR_URL")]
    ocr_url: Option<String>,

    /// API key for the OCR service
    #[arg(long, env = "OCR_API_KEY")]
    ocr_api_key: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest one PDF: extract, clean, chunk, embed, and index it.
    Ingest {
        /// Path to the PDF file.
        #[arg(long)]
        file: String,

        /// Maximum chunk size in characters.
        #[arg(long, default_value = "800")]
        chunk_size: usize,

        /// Overlap between consecutive chunks in characters.
        #[arg(long, default_value = "100")]
        chunk_overlap: usize,
    },
    /// Ask a question against the indexed document.
    Ask {
        /// The question text.
        #[arg(long)]
        question: String,

        /// Number of chunks to retrieve as context.
        #[arg(long, default_value = "5")]
        top_k: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let ocr: Arc<dyn OcrEngine> = match &cli.ocr_url {
        Some(url) => Arc::new(HttpOcrClient::new(url, cli.ocr_api_key.clone())),
        None => Arc::new(DisabledOcr),
    };
    let embedder = Arc::new(OpenAiEmbeddings::new(
        &cli.openai_base_url,
        &cli.openai_api_key,
        &cli.embedding_model,
    ));
    let index = Arc::new(QdrantStore::new(
        &cli.qdrant_url,
        &cli.qdrant_collection,
        cli.embedding_dimensions,
    ));

    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "pdf-rag boot"
    );

    match cli.command {
        Command::Ingest {
            file,
            chunk_size,
            chunk_overlap,
        } => {
            let pdf = std::fs::read(&file)?;
            let filename = std::path::Path::new(&file)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.clone());

            let mut options = IngestionOptions::default();
            options.chunking.max_chars = chunk_size;
            options.chunking.overlap_chars = chunk_overlap;

            let extractor = Arc::new(LopdfExtractor::new(
                ocr,
                options.ocr_trigger_chars,
                options.min_alnum_ratio,
            ));
            let pipeline =
                IngestionPipeline::new(extractor, embedder, index, JobStore::new(), options);

            let job_id = pipeline
                .start(pdf, filename)
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            println!("job {job_id} accepted");

            loop {
                tokio::time::sleep(Duration::from_millis(250)).await;
                let job = pipeline
                    .job_store()
                    .snapshot(job_id)
                    .ok_or_else(|| anyhow::anyhow!("job {job_id} disappeared"))?;
                println!("[{}%] {} {}", job.progress, job.status, job.message);
                if job.status.is_terminal() {
                    match job.status {
                        JobStatus::Completed => {
                            if let Some(result) = job.result {
                                println!(
                                    "{} indexed as {} chunks at {}",
                                    result.filename,
                                    result.chunks_count,
                                    Utc::now().to_rfc3339()
                                );
                            }
                        }
                        _ => {
                            anyhow::bail!(
                                "ingestion failed: {}",
                                job.error.unwrap_or_else(|| "unknown error".to_string())
                            );
                        }
                    }
                    break;
                }
            }
        }
        Command::Ask { question, top_k } => {
            let answerer = Arc::new(OpenAiChat::new(
                &cli.openai_base_url,
                &cli.openai_api_key,
                &cli.chat_model,
            ));
            let options = QueryOptions {
                top_k,
                ..QueryOptions::default()
            };
            let pipeline = QueryPipeline::new(embedder, index, answerer, options);

            let response = pipeline
                .ask(&question)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            println!("question: {}", response.question);
            println!("answer:\n{}", response.answer);
            println!("context chunks used: {}", response.context_used.len());
        }
    }

    Ok(())
}

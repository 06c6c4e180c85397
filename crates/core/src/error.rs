use thiserror::Error;

/// Two-class failure signal shared by every external-service adapter
/// (embedding, answering, OCR, vector index). Transient errors are
/// eligible for retry under a [`crate::retry::RetryPolicy`]; permanent
/// errors are surfaced immediately.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("transient service error: {0}")]
    Transient(String),

    #[error("permanent service error: {0}")]
    Permanent(String),
}

impl ServiceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ServiceError::Transient(_))
    }

    /// Classify an HTTP status the way the adapters do: timeouts, rate
    /// limits, and server-side failures are transient, everything else
    /// is a caller problem.
    pub fn from_status(backend: &str, status: reqwest::StatusCode) -> Self {
        let details = format!("{backend} returned {status}");
        if status.as_u16() == 408 || status.as_u16() == 429 || status.is_server_error() {
            ServiceError::Transient(details)
        } else {
            ServiceError::Permanent(details)
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(error: reqwest::Error) -> Self {
        // Transport-level failures (connect, timeout, body read) are
        // assumed recoverable; a well-formed rejection comes back as a
        // status code instead.
        ServiceError::Transient(error.to_string())
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("no extractable text: every page failed native extraction and OCR")]
    NoExtractableText,

    #[error("an ingestion job is already in progress: {0}")]
    IngestionInProgress(uuid::Uuid),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("question is empty")]
    EmptyQuestion,

    #[error("no indexed content: {0}")]
    NotReady(String),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;

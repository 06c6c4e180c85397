use crate::error::ServiceError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde_json::{json, Value};

/// Capability interface for the OCR engine. A failure on either call
/// means "no usable text for this page" and never fails the document.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Rasterize one page of the PDF to an image.
    async fn render_page(&self, pdf: &[u8], page: u32) -> Result<Vec<u8>, ServiceError>;

    /// Recognize text in a rendered page image.
    async fn recognize(&self, image: &[u8]) -> Result<String, ServiceError>;
}

/// Remote OCR engine reached over HTTP. The service exposes a render
/// endpoint (pdf + page number in, image out) and a recognize endpoint
/// (image in, text out), both JSON with base64 payloads.
pub struct HttpOcrClient {
    endpoint: String,
    api_key: Option<String>,
    client: Client,
}

impl HttpOcrClient {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
            client: Client::new(),
        }
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, ServiceError> {
        let mut request = self
            .client
            .post(format!("{}/{path}", self.endpoint))
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ServiceError::from_status("ocr", response.status()));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl OcrEngine for HttpOcrClient {
    async fn render_page(&self, pdf: &[u8], page: u32) -> Result<Vec<u8>, ServiceError> {
        let payload = self
            .post(
                "render",
                json!({
                    "pdf_base64": STANDARD.encode(pdf),
                    "page": page,
                }),
            )
            .await?;

        let image = payload
            .pointer("/image_base64")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ServiceError::Permanent("ocr render response missing image_base64".to_string())
            })?;

        STANDARD
            .decode(image)
            .map_err(|error| ServiceError::Permanent(format!("bad image payload: {error}")))
    }

    async fn recognize(&self, image: &[u8]) -> Result<String, ServiceError> {
        let payload = self
            .post(
                "recognize",
                json!({ "image_base64": STANDARD.encode(image) }),
            )
            .await?;

        payload
            .pointer("/text")
            .and_then(Value::as_str)
            .map(|text| text.trim().to_string())
            .ok_or_else(|| {
                ServiceError::Permanent("ocr recognize response missing text".to_string())
            })
    }
}

/// Stand-in used when no OCR endpoint is configured. Scanned pages
/// then surface a per-page error instead of failing the document.
#[derive(Default)]
pub struct DisabledOcr;

#[async_trait]
impl OcrEngine for DisabledOcr {
    async fn render_page(&self, _pdf: &[u8], _page: u32) -> Result<Vec<u8>, ServiceError> {
        Err(ServiceError::Permanent("ocr engine not configured".to_string()))
    }

    async fn recognize(&self, _image: &[u8]) -> Result<String, ServiceError> {
        Err(ServiceError::Permanent("ocr engine not configured".to_string()))
    }
}

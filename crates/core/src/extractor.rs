use crate::error::IngestError;
use crate::models::ExtractionMethod;
use crate::ocr::OcrEngine;
use async_trait::async_trait;
use lopdf::content::Content;
use lopdf::{Document, Object};
use std::sync::Arc;
use tracing::{debug, warn};

/// A positioned show-text run on a page. Coordinates are the text
/// cursor position in PDF user space (y grows upward).
#[derive(Debug, Clone, PartialEq)]
pub struct TextSpan {
    pub text: String,
    pub x: f32,
    pub y: f32,
}

/// Extraction outcome for one page. Pages are processed independently;
/// a failed page carries its error here instead of aborting the
/// document.
#[derive(Debug, Clone)]
pub struct PageExtraction {
    pub number: u32,
    pub method: ExtractionMethod,
    /// Positioned spans from native extraction. Empty for OCR pages.
    pub spans: Vec<TextSpan>,
    /// Linear page text in naive top-down order. The layout analyzer
    /// recomputes reading order from `spans` where they exist.
    pub text: String,
    pub error: Option<String>,
}

impl PageExtraction {
    pub fn usable(&self) -> bool {
        self.error.is_none() && !self.text.trim().is_empty()
    }
}

#[async_trait]
pub trait PdfExtractor: Send + Sync {
    /// Turn PDF bytes into one result per page, in page order. Fails
    /// only when the document itself cannot be opened; individual page
    /// failures are recorded per page.
    async fn extract(&self, pdf: &[u8]) -> Result<Vec<PageExtraction>, IngestError>;
}

/// Native extraction via `lopdf` with a per-page OCR fallback for
/// scanned or garbled pages.
pub struct LopdfExtractor {
    ocr: Arc<dyn OcrEngine>,
    /// Page text shorter than this triggers OCR.
    ocr_trigger_chars: usize,
    /// Page text with a lower alphanumeric-or-space ratio triggers OCR.
    min_alnum_ratio: f64,
}

impl LopdfExtractor {
    pub fn new(ocr: Arc<dyn OcrEngine>, ocr_trigger_chars: usize, min_alnum_ratio: f64) -> Self {
        Self {
            ocr,
            ocr_trigger_chars,
            min_alnum_ratio,
        }
    }

    async fn ocr_page(&self, pdf: &[u8], number: u32) -> Result<String, String> {
        let image = self
            .ocr
            .render_page(pdf, number)
            .await
            .map_err(|error| format!("page render failed: {error}"))?;
        let text = self
            .ocr
            .recognize(&image)
            .await
            .map_err(|error| format!("ocr failed: {error}"))?;

        if text.trim().is_empty() {
            Err("ocr produced no text".to_string())
        } else {
            Ok(text)
        }
    }
}

#[async_trait]
impl PdfExtractor for LopdfExtractor {
    async fn extract(&self, pdf: &[u8]) -> Result<Vec<PageExtraction>, IngestError> {
        let document =
            Document::load_mem(pdf).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (number, page_id) in document.get_pages() {
            let native = document
                .get_page_content(page_id)
                .map_err(|error| error.to_string())
                .and_then(|data| {
                    Content::decode(&data).map_err(|error| error.to_string())
                })
                .map(|content| spans_from_content(&content));

            let (spans, native_text) = match native {
                Ok(spans) => {
                    let text = naive_linear_text(&spans);
                    (spans, text)
                }
                Err(error) => {
                    warn!(page = number, %error, "native extraction failed, trying OCR");
                    (Vec::new(), String::new())
                }
            };

            if !needs_ocr(&native_text, self.ocr_trigger_chars, self.min_alnum_ratio) {
                pages.push(PageExtraction {
                    number,
                    method: ExtractionMethod::Native,
                    spans,
                    text: native_text,
                    error: None,
                });
                continue;
            }

            debug!(
                page = number,
                chars = native_text.trim().chars().count(),
                "routing page through OCR"
            );
            match self.ocr_page(pdf, number).await {
                Ok(text) => pages.push(PageExtraction {
                    number,
                    method: ExtractionMethod::Ocr,
                    spans: Vec::new(),
                    text,
                    error: None,
                }),
                Err(error) => pages.push(PageExtraction {
                    number,
                    method: ExtractionMethod::Ocr,
                    spans: Vec::new(),
                    text: String::new(),
                    error: Some(error),
                }),
            }
        }

        if pages.is_empty() {
            return Err(IngestError::PdfParse("pdf has no pages".to_string()));
        }

        Ok(pages)
    }
}

/// Decide whether a page's native text is good enough to keep. Short
/// text signals a scanned page; a low alphanumeric ratio signals
/// garbled extraction (broken encodings, vector-art soup).
pub fn needs_ocr(text: &str, trigger_chars: usize, min_alnum_ratio: f64) -> bool {
    let trimmed = text.trim();
    let total = trimmed.chars().count();
    if total < trigger_chars {
        return true;
    }

    let alnum = trimmed
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .count();
    (alnum as f64) / (total as f64) < min_alnum_ratio
}

/// Walk the page content stream and collect show-text runs with the
/// text cursor position at which they are painted. Only the text
/// positioning subset of the operator set matters here: `Tm` resets
/// the cursor, `Td`/`TD` translate the line start, `T*` and the
/// quote operators advance by the leading.
pub fn spans_from_content(content: &Content) -> Vec<TextSpan> {
    let mut spans = Vec::new();
    let mut line_x = 0f32;
    let mut line_y = 0f32;
    let mut leading = 0f32;

    for op in &content.operations {
        match op.operator.as_ref() {
            "BT" => {
                line_x = 0.0;
                line_y = 0.0;
            }
            "Tm" if op.operands.len() == 6 => {
                if let (Some(e), Some(f)) = (as_f32(&op.operands[4]), as_f32(&op.operands[5])) {
                    line_x = e;
                    line_y = f;
                }
            }
            "Td" | "TD" if op.operands.len() == 2 => {
                if let (Some(tx), Some(ty)) = (as_f32(&op.operands[0]), as_f32(&op.operands[1])) {
                    line_x += tx;
                    line_y += ty;
                    if op.operator == "TD" {
                        leading = -ty;
                    }
                }
            }
            "TL" if !op.operands.is_empty() => {
                if let Some(l) = as_f32(&op.operands[0]) {
                    leading = l;
                }
            }
            "T*" => {
                line_y -= leading;
            }
            "Tj" if !op.operands.is_empty() => {
                push_span(&mut spans, &op.operands[0], line_x, line_y);
            }
            "'" if !op.operands.is_empty() => {
                line_y -= leading;
                push_span(&mut spans, &op.operands[0], line_x, line_y);
            }
            "\"" if op.operands.len() == 3 => {
                line_y -= leading;
                push_span(&mut spans, &op.operands[2], line_x, line_y);
            }
            "TJ" if !op.operands.is_empty() => {
                if let Object::Array(elements) = &op.operands[0] {
                    let mut text = String::new();
                    for element in elements {
                        if let Object::String(bytes, _) = element {
                            text.push_str(&decode_pdf_string(bytes));
                        }
                    }
                    if !text.trim().is_empty() {
                        spans.push(TextSpan {
                            text,
                            x: line_x,
                            y: line_y,
                        });
                    }
                }
            }
            _ => {}
        }
    }

    spans
}

fn push_span(spans: &mut Vec<TextSpan>, operand: &Object, x: f32, y: f32) {
    if let Object::String(bytes, _) = operand {
        let text = decode_pdf_string(bytes);
        if !text.trim().is_empty() {
            spans.push(TextSpan { text, x, y });
        }
    }
}

fn as_f32(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

/// Best-effort decode of a PDF string object: UTF-16BE when the BOM is
/// present, Latin-1 otherwise. Composite-font encodings are out of
/// scope; pages that come out garbled fail the quality gate and fall
/// back to OCR.
pub fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        bytes.iter().map(|&b| b as char).collect()
    }
}

/// Top-down, left-to-right join of spans, one line per distinct y
/// position. Used for the OCR quality gate; proper multi-column
/// reading order comes from the layout analyzer.
pub fn naive_linear_text(spans: &[TextSpan]) -> String {
    let mut ordered: Vec<&TextSpan> = spans.iter().collect();
    ordered.sort_by(|a, b| {
        b.y.total_cmp(&a.y)
            .then_with(|| a.x.total_cmp(&b.x))
    });

    let mut lines: Vec<String> = Vec::new();
    let mut last_y: Option<f32> = None;
    for span in ordered {
        let same_line = last_y.is_some_and(|y| (y - span.y).abs() <= 3.0);
        if same_line {
            if let Some(line) = lines.last_mut() {
                if !line.is_empty() {
                    line.push(' ');
                }
                line.push_str(span.text.trim());
            }
        } else {
            lines.push(span.text.trim().to_string());
            last_y = Some(span.y);
        }
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::ocr::OcrEngine;
    use lopdf::content::Operation;
    use lopdf::{dictionary, Stream};

    fn show(text: &str) -> Operation {
        Operation::new("Tj", vec![Object::string_literal(text)])
    }

    fn moveto(x: f32, y: f32) -> Operation {
        Operation::new("Tm", vec![
            1.into(),
            0.into(),
            0.into(),
            1.into(),
            Object::Real(x),
            Object::Real(y),
        ])
    }

    #[test]
    fn quality_gate_triggers_exactly_at_threshold() {
        let long = "a".repeat(100);
        let short = "a".repeat(99);
        assert!(!needs_ocr(&long, 100, 0.5));
        assert!(needs_ocr(&short, 100, 0.5));
    }

    #[test]
    fn quality_gate_counts_characters_not_bytes() {
        // 40 chars but 120 bytes; the length trigger must still fire.
        let short_cjk = "漢字文書".repeat(10);
        assert!(needs_ocr(&short_cjk, 100, 0.5));

        // 100 chars of accented text clears the threshold.
        let long_accented = "é".repeat(100);
        assert!(!needs_ocr(&long_accented, 100, 0.5));
    }

    #[test]
    fn quality_gate_rejects_garbled_text() {
        let garbled = "@#$%^&*(){}[]<>~`@#$%^&*(){}[]<>~`@#$%".repeat(4);
        assert!(needs_ocr(&garbled, 100, 0.5));
        let clean = "plain readable sentence with words in it ".repeat(4);
        assert!(!needs_ocr(&clean, 100, 0.5));
    }

    #[test]
    fn pdf_strings_decode_latin1_and_utf16() {
        assert_eq!(decode_pdf_string(b"Hello"), "Hello");
        // UTF-16BE with BOM: "Hi"
        assert_eq!(decode_pdf_string(&[0xFE, 0xFF, 0x00, 0x48, 0x00, 0x69]), "Hi");
    }

    #[test]
    fn content_walk_tracks_cursor_positions() {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                moveto(72.0, 700.0),
                show("First line"),
                Operation::new("Td", vec![0.into(), Object::Real(-14.0)]),
                show("Second line"),
                Operation::new("ET", vec![]),
            ],
        };

        let spans = spans_from_content(&content);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].text, "First line");
        assert_eq!(spans[0].y, 700.0);
        assert_eq!(spans[1].text, "Second line");
        assert_eq!(spans[1].y, 686.0);
    }

    #[test]
    fn naive_text_reads_top_to_bottom() {
        let spans = vec![
            TextSpan { text: "bottom".to_string(), x: 72.0, y: 100.0 },
            TextSpan { text: "top".to_string(), x: 72.0, y: 700.0 },
        ];
        assert_eq!(naive_linear_text(&spans), "top\nbottom");
    }

    struct FakeOcr {
        text: String,
    }

    #[async_trait]
    impl OcrEngine for FakeOcr {
        async fn render_page(&self, _pdf: &[u8], _page: u32) -> Result<Vec<u8>, ServiceError> {
            Ok(vec![0u8; 4])
        }

        async fn recognize(&self, _image: &[u8]) -> Result<String, ServiceError> {
            Ok(self.text.clone())
        }
    }

    fn single_page_pdf(operations: Vec<Operation>) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let content = Content { operations };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("content encodes"),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("pdf serializes");
        bytes
    }

    #[tokio::test]
    async fn text_page_stays_on_native_path() {
        let pdf = single_page_pdf(vec![
            Operation::new("BT", vec![]),
            moveto(72.0, 700.0),
            show("A perfectly ordinary sentence of page text."),
            Operation::new("ET", vec![]),
        ]);

        let extractor = LopdfExtractor::new(
            Arc::new(FakeOcr { text: "should not be used".to_string() }),
            10,
            0.5,
        );
        let pages = extractor.extract(&pdf).await.expect("extraction runs");

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].method, ExtractionMethod::Native);
        assert!(pages[0].text.contains("ordinary sentence"));
    }

    #[tokio::test]
    async fn empty_page_routes_through_ocr() {
        let pdf = single_page_pdf(vec![]);

        let extractor = LopdfExtractor::new(
            Arc::new(FakeOcr { text: "recovered by ocr".to_string() }),
            10,
            0.5,
        );
        let pages = extractor.extract(&pdf).await.expect("extraction runs");

        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].method, ExtractionMethod::Ocr);
        assert_eq!(pages[0].text, "recovered by ocr");
        assert!(pages[0].usable());
    }
}

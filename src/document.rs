// src/document.rs

use crate::error::ValidationError;
use lopdf::Document;
use std::path::Path;
use tracing::{info, warn};

/// Minimum number of non-whitespace characters we expect from a
/// "real" text PDF. Below this threshold we treat it as scanned.
const MIN_TEXT_CHARS: usize = 30;

/// Produces the raw text of one document. OCR/document-analysis services
/// plug in here; the validation core only ever sees the returned text.
pub trait DocumentTextProvider: Send + Sync {
    fn extract(&self, file_name: &str, bytes: &[u8]) -> Result<String, ValidationError>;
}

/// Result of attempting to extract text from a PDF.
#[derive(Debug)]
pub enum PdfContent {
    /// The PDF contains extractable text.
    Text(String),
    /// The PDF appears to be scanned / image-only, needs OCR.
    ScannedImage,
    /// Something went wrong during extraction.
    Error(String),
}

/// Takes raw PDF bytes and returns `PdfContent`.
pub fn extract_text_from_pdf(pdf_bytes: &[u8]) -> PdfContent {
    // --- Phase 1: structural check with lopdf ---
    let doc = match Document::load_mem(pdf_bytes) {
        Ok(d) => d,
        Err(e) => return PdfContent::Error(format!("Failed to parse PDF: {e}")),
    };

    if looks_like_scanned(&doc) {
        info!("PDF structural check: likely scanned / image-only");
        return PdfContent::ScannedImage;
    }

    // --- Phase 2: attempt full text extraction ---
    match pdf_extract::extract_text_from_mem(pdf_bytes) {
        Ok(text) => {
            let meaningful = text.chars().filter(|c| !c.is_whitespace()).count();
            if meaningful < MIN_TEXT_CHARS {
                info!(chars = meaningful, "Extracted text too short, treating as scanned");
                PdfContent::ScannedImage
            } else {
                info!(chars = meaningful, "Text extracted successfully");
                PdfContent::Text(text)
            }
        }
        Err(e) => {
            warn!(error = %e, "pdf-extract failed, may be scanned or corrupted");
            PdfContent::ScannedImage
        }
    }
}

/// Inspect each page's `Resources` dictionary. A page with XObject images
/// but no Font resources is almost certainly a scanned page.
fn looks_like_scanned(doc: &Document) -> bool {
    let pages = doc.get_pages();
    if pages.is_empty() {
        return false; // Can't tell, let text extraction try
    }

    let mut image_only_pages = 0;

    for object_id in pages.values() {
        let Ok(page_obj) = doc.get_object(*object_id) else {
            continue;
        };
        let Ok(page_dict) = page_obj.as_dict() else {
            continue;
        };

        let resources = page_dict
            .get(b"Resources")
            .ok()
            .and_then(|r| doc.dereference(r).ok())
            .and_then(|(_, resolved)| resolved.as_dict().ok());

        let non_empty = |key: &[u8]| {
            resources
                .and_then(|res| res.get(key).ok())
                .and_then(|o| doc.dereference(o).ok())
                .and_then(|(_, resolved)| resolved.as_dict().ok())
                .is_some_and(|d| !d.is_empty())
        };

        if non_empty(b"XObject") && !non_empty(b"Font") {
            image_only_pages += 1;
        }
    }

    let total = pages.len();
    let ratio = image_only_pages as f64 / total as f64;
    info!(
        total_pages = total,
        image_only = image_only_pages,
        ratio = format!("{ratio:.2}"),
        "Scanned-page analysis"
    );

    // If >= 80% of pages are image-only, treat the whole PDF as scanned
    ratio >= 0.8
}

/// Reads documents from local bytes: PDFs through their text layer,
/// plain-text files as-is. Images need an OCR provider.
#[derive(Debug, Default)]
pub struct LocalTextProvider;

impl DocumentTextProvider for LocalTextProvider {
    fn extract(&self, file_name: &str, bytes: &[u8]) -> Result<String, ValidationError> {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "pdf" => match extract_text_from_pdf(bytes) {
                PdfContent::Text(text) => Ok(text),
                PdfContent::ScannedImage => Err(ValidationError::DocumentUnavailable(format!(
                    "{file_name} is scanned/image-only and needs OCR"
                ))),
                PdfContent::Error(e) => Err(ValidationError::DocumentUnavailable(e)),
            },
            "txt" | "text" => String::from_utf8(bytes.to_vec()).map_err(|e| {
                ValidationError::DocumentUnavailable(format!("{file_name} is not UTF-8: {e}"))
            }),
            "png" | "jpg" | "jpeg" | "tif" | "tiff" => Err(ValidationError::DocumentUnavailable(
                format!("{file_name}: OCR provider not configured"),
            )),
            other => Err(ValidationError::DocumentUnavailable(format!(
                "Unsupported document type '{other}' for {file_name}"
            ))),
        }
    }
}

/// First `max_chars` characters of `text`, never splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

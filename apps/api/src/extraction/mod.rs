//! Extractor: turns an uploaded PDF into plain text, page by page.
//!
//! Parsing is CPU-bound and runs inside `tokio::task::spawn_blocking`.
//! `lopdf` is the primary backend because it exposes page boundaries;
//! `pdf-extract` is a fallback for documents where lopdf finds no text.

use bytes::Bytes;
use lopdf::Document;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Upload ceiling: 5 MB.
pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

const PDF_MAGIC: &[u8] = b"%PDF-";

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("File size exceeds the limit of 5MB. Please upload a smaller file.")]
    TooLarge { size: usize },

    #[error("The uploaded file is empty")]
    Empty,

    #[error("The uploaded file is not a PDF document")]
    NotPdf,

    #[error("The PDF is encrypted and cannot be read")]
    Encrypted,

    #[error("Failed to parse PDF: {0}")]
    Parse(String),

    #[error("No extractable text found (scanned or image-only PDF?)")]
    NoText,
}

/// A file received from the upload form. Scoped to a single request.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Bytes,
    /// Size reported by the client; may differ from `bytes.len()`.
    pub declared_size: usize,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        Self {
            file_name: file_name.into(),
            declared_size: bytes.len(),
            bytes,
        }
    }

    /// Records the size the client announced. Without one, the received length stands.
    pub fn with_declared_size(mut self, declared_size: Option<usize>) -> Self {
        if let Some(size) = declared_size {
            self.declared_size = size;
        }
        self
    }
}

/// Rejects uploads over the ceiling. Runs before any parsing.
pub fn check_size(upload: &Upload) -> Result<(), ExtractionError> {
    let size = upload.declared_size.max(upload.bytes.len());
    if size > MAX_UPLOAD_BYTES {
        return Err(ExtractionError::TooLarge { size });
    }
    Ok(())
}

/// Validates and extracts the text of `upload` off the async runtime.
pub async fn extract(upload: &Upload) -> Result<String, ExtractionError> {
    check_size(upload)?;

    let bytes = upload.bytes.clone();
    let text = tokio::task::spawn_blocking(move || extract_text(&bytes))
        .await
        .map_err(|e| ExtractionError::Parse(format!("PDF parser crashed: {e}")))??;

    info!(
        "Extracted {} chars from '{}' ({} bytes)",
        text.len(),
        upload.file_name,
        upload.bytes.len()
    );
    Ok(text)
}

/// Concatenates per-page text in page order.
pub fn extract_text(bytes: &[u8]) -> Result<String, ExtractionError> {
    extract_text_using(bytes, extract_with_pdf_extract)
}

/// Same as [`extract_text`], with the backend tried when lopdf yields nothing.
fn extract_text_using<F>(bytes: &[u8], fallback: F) -> Result<String, ExtractionError>
where
    F: FnOnce(&[u8]) -> Result<String, ExtractionError>,
{
    if bytes.is_empty() {
        return Err(ExtractionError::Empty);
    }
    if !bytes.starts_with(PDF_MAGIC) {
        return Err(ExtractionError::NotPdf);
    }

    let text = match extract_with_lopdf(bytes) {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => {
            debug!("lopdf found no text; trying pdf-extract");
            fallback(bytes)?
        }
        Err(ExtractionError::Parse(e)) => {
            warn!("lopdf failed ({e}); trying pdf-extract");
            fallback(bytes)?
        }
        Err(e) => return Err(e),
    };

    if text.trim().is_empty() {
        return Err(ExtractionError::NoText);
    }
    Ok(text)
}

fn extract_with_lopdf(bytes: &[u8]) -> Result<String, ExtractionError> {
    let doc = Document::load_mem(bytes).map_err(|e| ExtractionError::Parse(e.to_string()))?;
    if doc.is_encrypted() {
        return Err(ExtractionError::Encrypted);
    }

    let mut text = String::new();
    // BTreeMap keyed by page number: iteration is document order.
    for page_num in doc.get_pages().into_keys() {
        let page_text = doc
            .extract_text(&[page_num])
            .map_err(|e| ExtractionError::Parse(format!("page {page_num}: {e}")))?;
        text.push_str(&page_text);
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
    }
    Ok(text)
}

/// pdf-extract can panic on malformed input; the panic is turned into a parse error.
fn extract_with_pdf_extract(bytes: &[u8]) -> Result<String, ExtractionError> {
    std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem(bytes))
        .map_err(|_| ExtractionError::Parse("pdf-extract panicked on malformed input".to_string()))?
        .map_err(|e| ExtractionError::Parse(e.to_string()))
}


use lopdf::Document;
use tracing::{debug, warn};

use crate::{DocQaError, Result};

/// Text extracted from an uploaded PDF, one entry per page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub filename: String,
    pub pages: Vec<String>,
}

impl ExtractedDocument {
    /// Full document text with pages joined by blank lines.
    #[inline]
    pub fn text(&self) -> String {
        self.pages.join("\n\n")
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pages.iter().all(|page| page.trim().is_empty())
    }
}

/// Extract text from PDF bytes, page by page in page order.
///
/// A page that cannot be decoded is logged and contributes an empty entry
/// rather than failing the whole document; a document that cannot be parsed
/// at all is rejected.
#[inline]
pub fn extract_pages(pdf_bytes: &[u8], filename: &str) -> Result<ExtractedDocument> {
    let document = Document::load_mem(pdf_bytes).map_err(|e| {
        DocQaError::InvalidInput(format!("unreadable PDF '{filename}': {e}"))
    })?;

    let page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
    let mut pages = Vec::with_capacity(page_numbers.len());

    for number in page_numbers {
        match document.extract_text(&[number]) {
            Ok(text) => pages.push(text),
            Err(e) => {
                warn!("failed to extract text from page {number} of '{filename}': {e}");
                pages.push(String::new());
            }
        }
    }

    debug!("extracted {} pages from '{filename}'", pages.len());

    Ok(ExtractedDocument {
        filename: filename.to_string(),
        pages,
    })
}

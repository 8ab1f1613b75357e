// src/pdf_extract.rs

use crate::error::ExtractionFailure;
use crate::normalize::PageFragment;
use lopdf::{Dictionary, Document};
use std::path::Path;
use tracing::{info, warn};

/// Form feed: page separator in plain-text exports and in `pdf-extract` output.
const PAGE_BREAK: char = '\u{c}';

/// Read a manifest file into page fragments. `.pdf` goes through the PDF
/// extractor; anything else is read as text.
pub fn load_manifest(path: impl AsRef<Path>) -> Result<Vec<PageFragment>, ExtractionFailure> {
    let path = path.as_ref();
    let span = tracing::info_span!("manifest", file = %path.display());
    let _guard = span.enter();

    let bytes = std::fs::read(path).map_err(|e| ExtractionFailure::Io(e.to_string()))?;
    let is_pdf = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
        || bytes.starts_with(b"%PDF");

    if is_pdf {
        extract_pages(&bytes)
    } else {
        let text = String::from_utf8_lossy(&bytes);
        let pages = text_pages(&text);
        info!(pages = pages.len(), "Read plain-text manifest");
        Ok(pages)
    }
}

/// Split exported text into pages (form feeds) and tokens (whitespace).
pub fn text_pages(text: &str) -> Vec<PageFragment> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    text.split(PAGE_BREAK)
        .map(|page| page.split_whitespace().map(str::to_string).collect())
        .collect()
}

/// Main entry point: takes raw PDF bytes and returns one fragment per page.
pub fn extract_pages(pdf_bytes: &[u8]) -> Result<Vec<PageFragment>, ExtractionFailure> {
    // --- Phase 1: structural check with lopdf ---
    let doc = Document::load_mem(pdf_bytes)
        .map_err(|e| ExtractionFailure::Malformed(e.to_string()))?;

    if looks_like_scanned(&doc) {
        info!("PDF structural check: likely scanned / image-only");
        return Err(ExtractionFailure::ScannedImage);
    }

    // --- Phase 2: per-page text via lopdf ---
    let mut pages: Vec<PageFragment> = Vec::new();
    for page_num in doc.get_pages().keys() {
        match doc.extract_text(&[*page_num]) {
            Ok(text) => pages.push(text.split_whitespace().map(str::to_string).collect()),
            Err(e) => {
                warn!(page = page_num, error = %e, "Page text extraction failed");
                pages.push(Vec::new());
            }
        }
    }

    let tokens: usize = pages.iter().map(Vec::len).sum();
    if tokens > 0 || pages.is_empty() {
        info!(pages = pages.len(), tokens, "Text extracted per page");
        return Ok(pages);
    }

    // --- Phase 3: whole-document fallback ---
    match ::pdf_extract::extract_text_from_mem(pdf_bytes) {
        Ok(text) => {
            let pages = text_pages(&text);
            info!(pages = pages.len(), "Text extracted with pdf-extract fallback");
            Ok(pages)
        }
        Err(e) => {
            warn!(error = %e, "pdf-extract failed");
            Err(ExtractionFailure::Text(e.to_string()))
        }
    }
}

/// A page with XObject images but no Font resources is a scanned page;
/// a manifest made mostly of those has no text layer worth parsing.
fn looks_like_scanned(doc: &Document) -> bool {
    let pages = doc.get_pages();
    if pages.is_empty() {
        return false; // zero pages is a valid, empty manifest
    }

    let image_only_pages = pages
        .values()
        .filter_map(|object_id| doc.get_object(*object_id).ok())
        .filter_map(|page_obj| page_obj.as_dict().ok())
        .filter(|page_dict| {
            has_resource(doc, page_dict, b"XObject") && !has_resource(doc, page_dict, b"Font")
        })
        .count();

    let total = pages.len();
    let ratio = image_only_pages as f64 / total as f64;
    info!(
        total_pages = total,
        image_only = image_only_pages,
        ratio = format!("{ratio:.2}"),
        "Scanned-page analysis"
    );

    ratio >= 0.8
}

/// Does the page's `Resources` dictionary carry a non-empty `key` entry?
fn has_resource(doc: &Document, page_dict: &Dictionary, key: &[u8]) -> bool {
    page_dict
        .get(b"Resources")
        .ok()
        .and_then(|r| doc.dereference(r).ok())
        .and_then(|(_, resolved)| resolved.as_dict().ok())
        .and_then(|res| res.get(key).ok())
        .and_then(|x| doc.dereference(x).ok())
        .and_then(|(_, resolved)| resolved.as_dict().ok())
        .is_some_and(|d| !d.is_empty())
}

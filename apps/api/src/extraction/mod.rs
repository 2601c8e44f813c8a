//! Text extraction from uploaded résumé files.
//!
//! `AppState` holds an `Arc<dyn TextExtractor>` so tests can swap in a stub.

use async_trait::async_trait;
use bytes::Bytes;
use tracing::warn;

/// Turns raw upload bytes into plain text. Returns an empty string when
/// nothing can be extracted; callers treat that as an input error.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, bytes: Bytes) -> String;
}

/// PDF extractor backed by `pdf_extract`.
pub struct PdfTextExtractor;

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    async fn extract(&self, bytes: Bytes) -> String {
        // pdf_extract is synchronous and may panic on malformed input
        let extracted =
            tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes)).await;

        match extracted {
            Ok(Ok(text)) => clean_text(&text),
            Ok(Err(e)) => {
                warn!("PDF extraction failed: {e}");
                String::new()
            }
            Err(e) => {
                warn!("PDF extraction task aborted: {e}");
                String::new()
            }
        }
    }
}

/// Collapses runs of spaces and tabs into one space and trims the result.
/// Line breaks are kept so paragraphs stay distinguishable.
pub fn clean_text(raw: &str) -> String {
    let mut cleaned = String::with_capacity(raw.len());
    let mut in_gap = false;
    for ch in raw.chars() {
        if ch == ' ' || ch == '\t' {
            if !in_gap {
                cleaned.push(' ');
                in_gap = true;
            }
        } else {
            cleaned.push(ch);
            in_gap = false;
        }
    }
    cleaned.trim().to_string()
}

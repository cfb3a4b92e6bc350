use async_trait::async_trait;
use tracing::debug;

use crate::TimetableError;

/// Turns an uploaded document into plain text for the parser.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, document: Vec<u8>) -> Result<String, TimetableError>;
}

pub struct PdfTextExtractor;

#[async_trait]
impl TextExtractor for PdfTextExtractor {
    async fn extract(&self, document: Vec<u8>) -> Result<String, TimetableError> {
        // pdf-extract is synchronous and CPU bound
        let raw = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&document))
            .await
            .map_err(|e| TimetableError::Extraction(e.to_string()))?
            .map_err(|e| TimetableError::Extraction(e.to_string()))?;

        let text = normalize_whitespace(&raw);
        debug!("Extracted {} chars of timetable text", text.len());
        Ok(text)
    }
}

/// Collapses every whitespace run to a single space and trims the ends.
pub fn normalize_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(
            normalize_whitespace("  Mon\tB201\n\nB201   LAB \r\n"),
            "Mon B201 B201 LAB"
        );
        assert_eq!(normalize_whitespace(" \n\t "), "");
    }

    #[tokio::test]
    async fn test_garbage_bytes_are_an_extraction_error() {
        let err = PdfTextExtractor
            .extract(b"definitely not a pdf".to_vec())
            .await
            .unwrap_err();
        assert!(matches!(err, TimetableError::Extraction(_)));
    }
}

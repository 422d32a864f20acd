//! Document loading for the vision/document call path.
//!
//! Images are attached as binary parts. Everything else is reduced to text
//! out-of-band and inlined into the prompt, so the downstream path only has
//! to handle text regardless of the original format.

use crate::error::AgentError;
use crate::llm::ImagePart;
use crate::Result;
use sha2::{Digest, Sha256};
use std::path::Path;

const TRUNCATION_MARKER: &str = "\n\n[truncated to fit request budget]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Image(&'static str),
    Pdf,
    PlainText,
    Unknown,
}

#[derive(Debug, Clone)]
pub enum DocumentPayload {
    Image(ImagePart),
    Text { text: String, truncated: bool },
}

/// Infer the document kind from the file extension.
pub fn classify_path(path: &Path) -> DocumentKind {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "png" => DocumentKind::Image("image/png"),
        "jpg" | "jpeg" => DocumentKind::Image("image/jpeg"),
        "webp" => DocumentKind::Image("image/webp"),
        "gif" => DocumentKind::Image("image/gif"),
        "heic" => DocumentKind::Image("image/heic"),
        "heif" => DocumentKind::Image("image/heif"),
        "pdf" => DocumentKind::Pdf,
        "txt" | "csv" | "tsv" | "md" | "json" | "xml" | "html" | "htm" => DocumentKind::PlainText,
        _ => DocumentKind::Unknown,
    }
}

/// Read `path` and turn it into something a generation call can carry.
pub async fn load_document(path: &Path, char_budget: usize) -> Result<DocumentPayload> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        AgentError::Document(format!("cannot read {}: {}", path.display(), e))
    })?;

    if bytes.is_empty() {
        return Err(AgentError::Document(format!("{} is empty", path.display())));
    }

    match classify_path(path) {
        DocumentKind::Image(mime_type) => {
            if !looks_like(mime_type, &bytes) {
                return Err(AgentError::Document(format!(
                    "{} does not decode as {}",
                    path.display(),
                    mime_type
                )));
            }
            Ok(DocumentPayload::Image(ImagePart {
                mime_type: mime_type.to_string(),
                data: bytes,
            }))
        }
        DocumentKind::Pdf => {
            let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
                .await
                .map_err(|e| AgentError::Document(format!("PDF extraction task failed: {}", e)))?
                .map_err(|e| AgentError::Document(format!("PDF text extraction failed: {}", e)))?;

            if text.trim().is_empty() {
                return Err(AgentError::Document(format!(
                    "{} has no extractable text (scanned pages?)",
                    path.display()
                )));
            }
            Ok(text_payload(&text, char_budget))
        }
        DocumentKind::PlainText | DocumentKind::Unknown => {
            let text = String::from_utf8(bytes).map_err(|_| {
                AgentError::Document(format!("unsupported document format: {}", path.display()))
            })?;
            Ok(text_payload(&text, char_budget))
        }
    }
}

/// SHA-256 of the file contents, hex encoded.
pub async fn file_digest(path: &Path) -> Result<String> {
    let bytes = tokio::fs::read(path).await?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

fn text_payload(text: &str, char_budget: usize) -> DocumentPayload {
    let (text, truncated) = truncate_chars(text.trim(), char_budget);
    DocumentPayload::Text { text, truncated }
}

/// Keep at most `budget` characters, marker included.
pub fn truncate_chars(text: &str, budget: usize) -> (String, bool) {
    if text.chars().count() <= budget {
        return (text.to_string(), false);
    }
    let marker_chars = TRUNCATION_MARKER.chars().count();
    if budget <= marker_chars {
        // no room for the marker
        return (text.chars().take(budget).collect(), true);
    }
    let mut out: String = text.chars().take(budget - marker_chars).collect();
    out.push_str(TRUNCATION_MARKER);
    (out, true)
}

/// Cheap signature check so a mislabelled file fails here, not remotely.
fn looks_like(mime_type: &str, bytes: &[u8]) -> bool {
    match mime_type {
        "image/png" => bytes.starts_with(&[0x89, b'P', b'N', b'G']),
        "image/jpeg" => bytes.starts_with(&[0xFF, 0xD8, 0xFF]),
        "image/gif" => bytes.starts_with(b"GIF8"),
        "image/webp" => bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP",
        "image/heic" | "image/heif" => bytes.len() >= 12 && &bytes[4..8] == b"ftyp",
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_file(name: &str, contents: &[u8]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cfo-doc-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_classify_path() {
        assert_eq!(classify_path(Path::new("bill.JPG")), DocumentKind::Image("image/jpeg"));
        assert_eq!(classify_path(Path::new("statement.pdf")), DocumentKind::Pdf);
        assert_eq!(classify_path(Path::new("ledger.csv")), DocumentKind::PlainText);
        assert_eq!(classify_path(Path::new("mystery")), DocumentKind::Unknown);
    }

    #[test]
    fn test_truncate_chars() {
        let (same, truncated) = truncate_chars("short", 100);
        assert_eq!(same, "short");
        assert!(!truncated);

        let long = "₹".repeat(500);
        let (cut, truncated) = truncate_chars(&long, 100);
        assert!(truncated);
        assert_eq!(cut.chars().count(), 100);
        assert!(cut.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_truncate_budget_smaller_than_marker() {
        let (cut, truncated) = truncate_chars("a long line of ledger text", 10);
        assert!(truncated);
        assert_eq!(cut, "a long lin");

        let (empty, truncated) = truncate_chars("abc", 0);
        assert!(truncated);
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_is_document_error() {
        let result = load_document(Path::new("/nonexistent/invoice.jpg"), 1000).await;
        assert!(matches!(result, Err(AgentError::Document(_))));
    }

    #[tokio::test]
    async fn test_mislabelled_image_rejected() {
        let path = temp_file("fake.png", b"definitely not a png");
        let result = load_document(&path, 1000).await;
        assert!(matches!(result, Err(AgentError::Document(msg)) if msg.contains("does not decode")));
    }

    #[tokio::test]
    async fn test_png_attached_as_image() {
        let path = temp_file("ok.png", &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
        match load_document(&path, 1000).await.unwrap() {
            DocumentPayload::Image(image) => assert_eq!(image.mime_type, "image/png"),
            other => panic!("expected image payload, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_text_document_is_inlined_and_truncated() {
        let path = temp_file("ledger.csv", "date,amount\n".repeat(100).as_bytes());
        match load_document(&path, 200).await.unwrap() {
            DocumentPayload::Text { text, truncated } => {
                assert!(truncated);
                assert!(text.starts_with("date,amount"));
                assert_eq!(text.chars().count(), 200);
            }
            other => panic!("expected text payload, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_binary_unknown_rejected() {
        let path = temp_file("blob.bin", &[0xFF, 0xFE, 0x00, 0x80]);
        assert!(load_document(&path, 1000).await.is_err());
    }

    #[tokio::test]
    async fn test_file_digest() {
        let path = temp_file("a.txt", b"abc");
        assert_eq!(
            file_digest(&path).await.unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}

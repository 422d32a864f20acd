//! Document processor: one consolidated identify/extract/validate call.

use super::personas;
use crate::extractor;
use crate::models::{ExtractedDocument, GenerationRequest};
use crate::reasoning::{document, Reasoner};
use crate::store::{format_master, FinanceStore};
use crate::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Below this self-reported confidence an extraction goes to a human.
const REVIEW_THRESHOLD: f64 = 0.6;
const NOTES_FALLBACK_CHARS: usize = 200;

const EXTRACTION_QUESTION: &str = r#"Analyze this document completely.

PART 1: IDENTIFICATION
- What type of document is this? (invoice, receipt, bank statement, etc)
- Is it readable?

PART 2: EXTRACTION
Extract ALL financial details. Look for:
- key_dates (date, due_date)
- entities (vendor_name, client_name, bank_name)
- amounts (base_amount, tax_amount, total_amount)
- references (invoice_number, po_number)
- line_items (summary of what was bought/sold)

PART 3: VALIDATION
- Do the numbers add up? (base + tax = total)
- Are dates valid?
- Any warning flags?

OUTPUT FORMAT:
Give your thinking first, then the final extraction as one valid JSON object:
{
    "document_type": "...",
    "extracted_data": { ... },
    "validation_notes": "...",
    "confidence_score": 0.0 to 1.0
}"#;

const VENDOR_MATCH_QUESTION: &str = r#"Is this vendor already in our system? Look for:
- Exact matches
- Partial matches (abbreviations, spelling variations)
- Similar sounding names

If you find a match, which one and how confident? If no match, this might be a new vendor.
Give your answer as a JSON object with keys: matched_vendor (null if none), confidence, and notes."#;

/// Vendor master lookup judgment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VendorMatch {
    #[serde(default)]
    pub matched_vendor: Option<String>,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub notes: String,
}

pub struct DocProcessor {
    reasoner: Arc<Reasoner>,
    store: Arc<dyn FinanceStore>,
}

impl DocProcessor {
    pub fn new(reasoner: Arc<Reasoner>, store: Arc<dyn FinanceStore>) -> Self {
        Self { reasoner, store }
    }

    /// Read a document into an [`ExtractedDocument`]. Never fails; problems
    /// surface as `needs_human_review` and in the validation notes.
    pub async fn process(&self, path: &Path) -> ExtractedDocument {
        let analysis = self
            .reasoner
            .see_and_think(personas::DOC_PROCESSOR, path, EXTRACTION_QUESTION)
            .await;

        let mut structured = extractor::extract_mapping(&analysis.final_answer);
        if structured.is_empty() {
            structured = extractor::extract_mapping(&format!(
                "{}\n\n{}",
                analysis.rationale, analysis.final_answer
            ));
        }

        let document_kind = structured
            .get("document_type")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| guess_kind(&analysis.final_answer).to_string());

        let fields = structured
            .get("extracted_data")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let validation_notes = match structured.get("validation_notes") {
            Some(Value::String(notes)) => notes.clone(),
            Some(other) if !other.is_null() => other.to_string(),
            _ => analysis.final_answer.chars().take(NOTES_FALLBACK_CHARS).collect(),
        };

        let low_confidence = structured
            .get("confidence_score")
            .and_then(Value::as_f64)
            .is_some_and(|c| c < REVIEW_THRESHOLD);

        let needs_human_review = analysis.needs_human_review || structured.is_empty() || low_confidence;

        let content_digest = match document::file_digest(path).await {
            Ok(digest) => digest,
            Err(e) => {
                warn!(file = %path.display(), "Could not hash document: {}", e);
                String::new()
            }
        };

        let extracted = ExtractedDocument {
            document_id: generate_id("doc"),
            document_kind,
            source_file: path.display().to_string(),
            content_digest,
            extracted_at: Utc::now(),
            raw_analysis: analysis.final_answer,
            fields,
            validation_notes,
            needs_human_review,
        };

        info!(
            document_id = %extracted.document_id,
            kind = %extracted.document_kind,
            fields = extracted.fields.len(),
            needs_human_review,
            "Document processed"
        );
        extracted
    }

    /// Match an extracted vendor name against the vendor master.
    pub async fn match_vendor(&self, vendor_name: &str) -> Result<VendorMatch> {
        let vendors = self.store.vendors().await?;
        let context = format!(
            "Extracted vendor name: {}\nKnown vendors in our system: {}",
            vendor_name,
            format_master(&vendors, "No vendor master data.")
        );

        let result = self
            .reasoner
            .think(
                &GenerationRequest::new(personas::DOC_PROCESSOR, context, VENDOR_MATCH_QUESTION)
                    .structured(),
            )
            .await?;

        Ok(extractor::extract_as(&result.final_answer).unwrap_or_default())
    }
}

/// Keyword guess when the model did not name the document type.
fn guess_kind(text: &str) -> &'static str {
    let lowered = text.to_lowercase();
    if lowered.contains("invoice") {
        "invoice"
    } else if lowered.contains("statement") {
        "bank_statement"
    } else if lowered.contains("receipt") {
        "receipt"
    } else {
        "unknown_document"
    }
}

fn generate_id(prefix: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}_{}", prefix, &id[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedBackend;
    use crate::retry::{RetryExecutor, RetryPolicy};
    use crate::store::fixtures::sample_database;
    use crate::store::JsonFileStore;
    use serde_json::json;
    use std::time::Duration;

    fn processor(backend: Arc<ScriptedBackend>) -> DocProcessor {
        let retry = RetryExecutor::new(RetryPolicy::new(1, Duration::from_millis(1)));
        let reasoner = Arc::new(Reasoner::new(backend, retry));
        let store = Arc::new(JsonFileStore::from_value(sample_database()).unwrap());
        DocProcessor::new(reasoner, store)
    }

    fn temp_text(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("cfo-inv-{}.txt", Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn test_structured_extraction() {
        let path = temp_text("TAX INVOICE 17 UltraTech Cement total 1,18,000");
        let backend = Arc::new(ScriptedBackend::with_replies(&[
            "Readable GST invoice, numbers add up.\n\n```json\n{\"document_type\": \"invoice\", \"extracted_data\": {\"invoice_number\": \"17\", \"total_amount\": 118000}, \"validation_notes\": \"Base + GST = total\", \"confidence_score\": 0.92}\n```",
        ]));

        let doc = processor(backend).process(&path).await;

        assert_eq!(doc.document_kind, "invoice");
        assert_eq!(doc.fields.get("total_amount"), Some(&json!(118000)));
        assert_eq!(doc.validation_notes, "Base + GST = total");
        assert!(!doc.needs_human_review);
        assert_eq!(doc.content_digest.len(), 64);
        assert!(doc.document_id.starts_with("doc_"));
    }

    #[tokio::test]
    async fn test_unstructured_reply_falls_back() {
        let path = temp_text("HDFC account statement");
        let reply = format!("This looks like a bank statement for March. {}", "x".repeat(300));
        let backend = Arc::new(ScriptedBackend::with_replies(&[reply.as_str()]));

        let doc = processor(backend).process(&path).await;

        assert_eq!(doc.document_kind, "bank_statement");
        assert!(doc.fields.is_empty());
        assert_eq!(doc.validation_notes.chars().count(), NOTES_FALLBACK_CHARS);
        assert!(doc.needs_human_review);
    }

    #[tokio::test]
    async fn test_missing_file_needs_review() {
        let backend = Arc::new(ScriptedBackend::new());
        let doc = processor(backend.clone())
            .process(Path::new("/no/such/bill.png"))
            .await;

        assert!(doc.needs_human_review);
        assert!(doc.content_digest.is_empty());
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_low_confidence_needs_review() {
        let path = temp_text("blurry receipt");
        let backend = Arc::new(ScriptedBackend::with_replies(&[
            "{\"document_type\": \"receipt\", \"extracted_data\": {}, \"confidence_score\": 0.3}",
        ]));
        let doc = processor(backend).process(&path).await;
        assert_eq!(doc.document_kind, "receipt");
        assert!(doc.needs_human_review);
    }

    #[tokio::test]
    async fn test_match_vendor() {
        let backend = Arc::new(ScriptedBackend::with_replies(&[
            "Abbreviation of UltraTech.\nJSON: {\"matched_vendor\": \"V1\", \"confidence\": 0.8, \"notes\": \"abbreviation\"}",
        ]));
        let processor = processor(backend.clone());
        let matched = processor.match_vendor("Ultratech Cem.").await.unwrap();

        assert_eq!(matched.matched_vendor.as_deref(), Some("V1"));
        assert!(backend.prompts()[0].contains("UltraTech Cement"));
    }

    #[tokio::test]
    async fn test_match_vendor_unparseable_is_no_match() {
        let backend = Arc::new(ScriptedBackend::with_replies(&["Not sure."]));
        let matched = processor(backend).match_vendor("Acme").await.unwrap();
        assert_eq!(matched, VendorMatch::default());
    }

    #[test]
    fn test_guess_kind() {
        assert_eq!(guess_kind("An INVOICE from Tata"), "invoice");
        assert_eq!(guess_kind("cash receipt"), "receipt");
        assert_eq!(guess_kind("photo of a site"), "unknown_document");
    }
}

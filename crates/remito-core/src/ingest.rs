//! Upload surface: one document in, one persisted draft out.

use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::catalog::CatalogLookup;
use crate::error::{PdfError, Result, StoreError};
use crate::models::document::PurchaseDocument;
use crate::models::draft::{DraftStatus, NumberTrust};
use crate::models::events::PipelineStage;
use crate::pipeline::ExtractionPipeline;
use crate::store::PurchaseStore;

/// How the pipeline run ended, independent of draft status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestOutcome {
    /// At least one line was extracted.
    Parsed,
    /// A zero-line draft was created for human review.
    NeedsReview,
    /// Catastrophic parse failure; the zero-line draft still exists.
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParsedSummary {
    pub invoice_number: String,
    pub number_trust: NumberTrust,
    pub line_count: usize,
    pub oracle_lines: usize,
    pub classic_confidence: f32,
    pub strategy_used: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadReport {
    pub purchase_id: i64,
    pub status: DraftStatus,
    pub outcome: IngestOutcome,
    pub filename: String,
    pub parsed_summary: ParsedSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal: Option<String>,
}

/// Ingest one uploaded document: run the cascade, persist the draft (even
/// on zero lines) together with its event trail.
///
/// Distinct error conditions: [`PdfError::NotPdf`] for an invalid file
/// type, [`StoreError::UnknownSupplier`] for an unregistered supplier.
/// Fatal extraction failures are surfaced on the report, not as errors,
/// because the draft and its trail still exist for triage.
pub fn ingest_document(
    store: &PurchaseStore,
    pipeline: &ExtractionPipeline<'_>,
    supplier_id: &str,
    filename: &str,
    bytes: &[u8],
) -> Result<UploadReport> {
    if !PurchaseDocument::looks_like_pdf(bytes) {
        return Err(PdfError::NotPdf.into());
    }
    if !store.supplier_exists(supplier_id) {
        return Err(StoreError::UnknownSupplier(supplier_id.to_string()).into());
    }

    let document = PurchaseDocument::new(supplier_id, filename, bytes);
    let document_id = store.insert_document(&document, bytes)?;

    let run = pipeline.run(&document, bytes);

    let mut draft = run.draft;
    let purchase_id = store.insert_draft(&mut draft, Some(document_id))?;
    store.append_events(purchase_id, &run.events)?;
    store.record_event(
        purchase_id,
        PipelineStage::Persist,
        "draft_persisted",
        &json!({"document_id": document_id, "lines": draft.lines.len()}),
    )?;

    let outcome = if run.fatal.is_some() {
        IngestOutcome::Failed
    } else if draft.lines.is_empty() {
        IngestOutcome::NeedsReview
    } else {
        IngestOutcome::Parsed
    };

    info!(
        purchase_id,
        supplier = supplier_id,
        filename,
        outcome = ?outcome,
        "document ingested"
    );

    Ok(UploadReport {
        purchase_id,
        status: draft.status,
        outcome,
        filename: filename.to_string(),
        parsed_summary: ParsedSummary {
            invoice_number: draft.header.invoice_number.clone(),
            number_trust: draft.header.number_trust,
            line_count: draft.lines.len(),
            oracle_lines: run.oracle_lines_added,
            classic_confidence: run.confidence.classic_confidence,
            strategy_used: run.confidence.strategy_used.clone(),
        },
        fatal: run.fatal,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemitoConfig;
    use crate::error::RemitoError;

    #[test]
    fn test_invalid_file_type_rejected() {
        let store = PurchaseStore::open_in_memory().unwrap();
        store.add_supplier("acme", "ACME").unwrap();
        let config = RemitoConfig::default();
        let pipeline = ExtractionPipeline::new(&config, &store);

        let result = ingest_document(&store, &pipeline, "acme", "listado.xlsx", b"PK\x03\x04");
        assert!(matches!(result, Err(RemitoError::Pdf(PdfError::NotPdf))));
    }

    #[test]
    fn test_unknown_supplier_rejected() {
        let store = PurchaseStore::open_in_memory().unwrap();
        let config = RemitoConfig::default();
        let pipeline = ExtractionPipeline::new(&config, &store);

        let result = ingest_document(&store, &pipeline, "nadie", "r.pdf", b"%PDF-1.4");
        assert!(matches!(
            result,
            Err(RemitoError::Store(StoreError::UnknownSupplier(_)))
        ));
    }

    #[test]
    fn test_corrupt_pdf_still_creates_draft_with_trail() {
        let store = PurchaseStore::open_in_memory().unwrap();
        store.add_supplier("acme", "ACME").unwrap();
        let config = RemitoConfig::default();
        let pipeline = ExtractionPipeline::new(&config, &store);

        // Valid magic, unparseable body.
        let report = ingest_document(&store, &pipeline, "acme", "roto.pdf", b"%PDF-1.4 basura")
            .unwrap();

        assert_eq!(report.outcome, IngestOutcome::Failed);
        assert!(report.fatal.is_some());
        assert_eq!(report.parsed_summary.line_count, 0);
        assert_eq!(report.parsed_summary.number_trust, NumberTrust::Filename);

        let draft = store.get_draft(report.purchase_id).unwrap();
        assert_eq!(draft.status, DraftStatus::Draft);
        assert!(draft.lines.is_empty());

        let events = store.events_for(report.purchase_id).unwrap();
        assert!(events.iter().any(|e| e.name == "fatal_parse_failure"));
        assert!(events.iter().any(|e| e.name == "draft_persisted"));
    }
}

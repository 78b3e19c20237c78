//! Core library for supplier remito ingestion.
//!
//! This crate provides:
//! - PDF text extraction and document classification
//! - The cascading extraction pipeline (structured, heuristic, optical,
//!   relaxed, AI-oracle fallback) with confidence scoring
//! - Purchase drafts with a forward-only confirmation state machine
//! - An append-only stock ledger with rollback and resend recovery
//! - Rolling-window pipeline diagnostics

pub mod catalog;
pub mod config;
pub mod confirm;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod ledger;
pub mod metrics;
pub mod models;
pub mod oracle;
pub mod pdf;
pub mod pipeline;
pub mod store;

pub use catalog::{CatalogLookup, MemoryCatalog};
pub use config::RemitoConfig;
pub use confirm::{
    ConfirmOptions, ConfirmReport, ConfirmStatus, ConfirmationEngine, ResendReport,
    RollbackReport, ValidateReport,
};
pub use error::{RemitoError, Result};
pub use extract::{ConfidenceReport, OpticalCapability};
pub use ingest::{IngestOutcome, UploadReport, ingest_document};
pub use ledger::StockLedgerEntry;
pub use metrics::PipelineMetrics;
pub use models::{
    DraftStatus, ExtractionEvent, LineSource, LinkState, PipelineStage, PurchaseDocument,
    PurchaseDraft, PurchaseHeader, PurchaseLine,
};
pub use oracle::{OracleAdapter, OracleClient, OracleRequest};
pub use pdf::{PdfExtractor, PdfProcessor, PdfType};
pub use pipeline::{ExtractionPipeline, ExtractionStrategy, PipelineRun};
pub use store::PurchaseStore;

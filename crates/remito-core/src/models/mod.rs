//! Data models for purchase ingestion.

pub mod document;
pub mod draft;
pub mod events;

pub use document::PurchaseDocument;
pub use draft::{
    DraftStatus, LineSource, LinkState, NumberTrust, PurchaseDraft, PurchaseHeader, PurchaseLine,
};
pub use events::{EventTrail, ExtractionEvent, PipelineStage};

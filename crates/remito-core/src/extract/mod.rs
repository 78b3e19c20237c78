//! Extraction stages: patterns, grammars, header resolution, SKU recovery,
//! confidence scoring, and the optical seam.

pub mod confidence;
pub mod header;
pub mod heuristic;
pub mod numbers;
pub mod optical;
pub mod patterns;
pub mod sku;
pub mod structured;

pub use confidence::{ConfidenceReport, score};
pub use header::{HeaderResolution, HeaderResolver};
pub use heuristic::{HeuristicOutcome, HeuristicParser};
pub use optical::{FixedOptical, OpticalCapability};
pub use sku::{SkuDecision, SkuRecovery};
pub use structured::{StructuredExtractor, StructuredOutcome};

//! Error types for the remito-core library.

use thiserror::Error;

/// Main error type for the remito library.
#[derive(Error, Debug)]
pub enum RemitoError {
    /// PDF processing error.
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    /// Extraction pipeline error.
    #[error("extraction error: {0}")]
    Extract(#[from] ExtractError),

    /// AI oracle error.
    #[error("oracle error: {0}")]
    Oracle(#[from] OracleError),

    /// Persistence error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Confirmation engine error.
    #[error("confirmation error: {0}")]
    Confirm(#[from] ConfirmError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl RemitoError {
    /// Whether a caller may retry the same call and expect a different
    /// outcome. Everything else is terminal.
    pub fn is_retryable(&self) -> bool {
        match self {
            RemitoError::Oracle(e) => e.is_retryable(),
            RemitoError::Extract(ExtractError::Optical(_)) => true,
            RemitoError::Confirm(ConfirmError::Conflict { .. }) => true,
            _ => false,
        }
    }
}

/// Errors related to PDF processing.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// Failed to extract text from PDF.
    #[error("failed to extract text: {0}")]
    TextExtraction(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// The uploaded bytes are not a PDF document.
    #[error("not a PDF document")]
    NotPdf,
}

/// Errors raised by extraction strategies. A stage error never aborts the
/// cascade; the controller logs it and moves to the next strategy.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The opaque rasterize-and-extract capability failed.
    #[error("optical capability failed: {0}")]
    Optical(String),

    /// No optical capability is wired into the pipeline.
    #[error("no optical capability configured")]
    OpticalUnavailable,

    /// Failed to parse a value out of recognized text.
    #[error("failed to parse {field}: {value}")]
    Parse { field: String, value: String },
}

/// Errors from the AI fallback oracle adapter.
#[derive(Error, Debug)]
pub enum OracleError {
    /// The oracle call itself failed (network, process, timeout).
    #[error("oracle transport failed: {0}")]
    Transport(String),

    /// The oracle answered, but the response does not conform to the
    /// extraction schema.
    #[error("oracle response rejected by schema: {0}")]
    Schema(String),

    /// All attempts failed; the pipeline degrades to the classic result.
    #[error("oracle gave no usable response after {attempts} attempts")]
    Exhausted { attempts: u32 },
}

impl OracleError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, OracleError::Transport(_) | OracleError::Schema(_))
    }
}

/// Errors from the SQLite-backed purchase store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database error.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The requested purchase does not exist.
    #[error("purchase {0} not found")]
    PurchaseNotFound(i64),

    /// The supplier id is not registered in the catalog.
    #[error("unknown supplier: {0}")]
    UnknownSupplier(String),

    /// A stored row failed to round-trip into its model.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Errors from the confirmation state machine. A total mismatch is NOT an
/// error (it is a guarded [`crate::confirm::ConfirmReport`] outcome); these
/// are the rejected transitions.
#[derive(Error, Debug)]
pub enum ConfirmError {
    /// The operation is not valid for the draft's current status.
    #[error("cannot {op} purchase {id} while it is {status}")]
    InvalidState {
        id: i64,
        op: &'static str,
        status: String,
    },

    /// Another caller holds the confirmation of this draft.
    #[error("purchase {id} is being confirmed by another caller")]
    Conflict { id: i64 },
}

/// Result type for the remito library.
pub type Result<T> = std::result::Result<T, RemitoError>;

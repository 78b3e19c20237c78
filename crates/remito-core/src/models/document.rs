//! Uploaded purchase document metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata for an uploaded supplier document. Immutable once stored; the
/// raw bytes live alongside it in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseDocument {
    /// Supplier the document was uploaded for.
    pub supplier_id: String,

    /// Original filename, used as the last-resort invoice-number source.
    pub filename: String,

    /// Size of the raw document in bytes.
    pub byte_len: usize,

    /// Upload timestamp.
    pub uploaded_at: DateTime<Utc>,
}

impl PurchaseDocument {
    pub fn new(supplier_id: impl Into<String>, filename: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            supplier_id: supplier_id.into(),
            filename: filename.into(),
            byte_len: bytes.len(),
            uploaded_at: Utc::now(),
        }
    }

    /// Check the PDF magic header.
    pub fn looks_like_pdf(bytes: &[u8]) -> bool {
        bytes.starts_with(b"%PDF-")
    }

    /// Filename without its extension, for number derivation.
    pub fn stem(&self) -> &str {
        self.filename
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(&self.filename)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pdf_magic() {
        assert!(PurchaseDocument::looks_like_pdf(b"%PDF-1.7\n..."));
        assert!(!PurchaseDocument::looks_like_pdf(b"PK\x03\x04"));
        assert!(!PurchaseDocument::looks_like_pdf(b""));
    }

    #[test]
    fn test_stem() {
        let doc = PurchaseDocument::new("acme", "REM-0001-00000042.pdf", b"%PDF-");
        assert_eq!(doc.stem(), "REM-0001-00000042");
    }
}

//! Configuration structures for the ingestion pipeline.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Main configuration for the remito pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemitoConfig {
    /// PDF processing configuration.
    pub pdf: PdfConfig,

    /// Extraction cascade configuration.
    pub extraction: ExtractionConfig,

    /// AI oracle fallback configuration.
    pub oracle: OracleConfig,

    /// Confirmation engine configuration.
    pub confirm: ConfirmConfig,
}

/// PDF processing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// Minimum embedded-text length to treat a PDF as digitally born.
    pub min_text_length: usize,

    /// Maximum pages to process (0 = unlimited).
    pub max_pages: usize,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            min_text_length: 50,
            max_pages: 10,
        }
    }
}

/// Extraction cascade configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Minimum line count for a classic stage to be sufficient.
    pub min_lines: usize,

    /// Minimum column-consistent rows for structured extraction to win.
    pub min_table_rows: usize,

    /// Classic confidence below which the cascade keeps falling through.
    pub confidence_threshold: f32,

    /// Quantities above this are clamped and flagged, never kept as-is.
    pub quantity_clamp: Decimal,

    /// Unit costs above this are excluded from totals and flagged.
    pub unit_cost_ceiling: Decimal,

    /// Digit count of a tax identifier (CUIT); pure-numeric tokens of this
    /// length are never invoice-number candidates.
    pub tax_id_digits: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_lines: 1,
            min_table_rows: 2,
            confidence_threshold: 0.6,
            quantity_clamp: Decimal::new(9_999, 0),
            unit_cost_ceiling: Decimal::new(10_000_000, 0),
            tax_id_digits: 11,
        }
    }
}

/// AI oracle fallback configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Whether the oracle stage may run at all.
    pub enabled: bool,

    /// Classic confidence below which the oracle is consulted.
    pub trigger_confidence: f32,

    /// Maximum attempts before the adapter gives up.
    pub max_attempts: u32,

    /// Wall-clock budget handed to the oracle client, in seconds.
    pub timeout_secs: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            trigger_confidence: 0.4,
            max_attempts: 2,
            timeout_secs: 30,
        }
    }
}

/// Confirmation engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmConfig {
    /// Absolute tolerance between declared and applied totals.
    pub tolerance_abs: Decimal,

    /// Relative tolerance (fraction of the declared total).
    pub tolerance_pct: Decimal,

    /// Allow confirming while unmatched lines remain.
    pub allow_partial: bool,
}

impl Default for ConfirmConfig {
    fn default() -> Self {
        Self {
            tolerance_abs: Decimal::new(100, 2),
            tolerance_pct: Decimal::new(1, 2),
            allow_partial: false,
        }
    }
}

impl RemitoConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        std::fs::write(path, content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_round_trip() {
        let config = RemitoConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: RemitoConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.extraction.tax_id_digits, 11);
        assert_eq!(back.confirm.tolerance_abs, Decimal::new(100, 2));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: RemitoConfig =
            serde_json::from_str(r#"{"oracle": {"enabled": true}}"#).unwrap();
        assert!(config.oracle.enabled);
        assert_eq!(config.oracle.max_attempts, 2);
        assert_eq!(config.extraction.min_table_rows, 2);
    }
}

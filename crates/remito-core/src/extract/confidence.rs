//! Classic-extraction confidence scoring.

use serde::{Deserialize, Serialize};

/// Confidence report for a classic (non-oracle) extraction run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceReport {
    /// Overall classic confidence (0.0 - 1.0).
    pub classic_confidence: f32,

    /// Name of the strategy that produced the kept lines.
    pub strategy_used: String,

    /// Fraction of tokens in the source text that are numeric.
    pub numeric_density: f32,

    /// Fraction of scanned candidate lines matching the full grammar.
    pub grammar_match_ratio: f32,

    /// Whether a trusted (non-filename) header number was resolved.
    pub header_found: bool,

    /// Lines whose quantity was clamped during normalization.
    pub outlier_clamped_count: u32,
}

/// Weighted mix of grammar coverage, numeric density, and header presence.
///
/// Density saturates at `DENSITY_TARGET`: a document whose tokens are a
/// quarter numbers is as table-like as it gets.
const DENSITY_TARGET: f32 = 0.25;

pub fn score(
    strategy_used: &str,
    text: &str,
    scanned: usize,
    strict_matches: usize,
    header_found: bool,
    outlier_clamped_count: u32,
) -> ConfidenceReport {
    let numeric_density = numeric_density(text);
    let grammar_match_ratio = if scanned == 0 {
        0.0
    } else {
        strict_matches as f32 / scanned as f32
    };

    let density_component = (numeric_density / DENSITY_TARGET).min(1.0);
    let header_component = if header_found { 1.0 } else { 0.0 };

    let classic_confidence = if strict_matches == 0 {
        0.0
    } else {
        (0.5 * grammar_match_ratio + 0.3 * density_component + 0.2 * header_component)
            .clamp(0.0, 1.0)
    };

    ConfidenceReport {
        classic_confidence,
        strategy_used: strategy_used.to_string(),
        numeric_density,
        grammar_match_ratio,
        header_found,
        outlier_clamped_count,
    }
}

fn numeric_density(text: &str) -> f32 {
    let mut total = 0usize;
    let mut numeric = 0usize;

    for token in text.split_whitespace() {
        total += 1;
        let digits = token.chars().filter(|c| c.is_ascii_digit()).count();
        if digits * 2 >= token.chars().count() {
            numeric += 1;
        }
    }

    if total == 0 {
        0.0
    } else {
        numeric as f32 / total as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_lines_scores_zero() {
        let report = score("heuristic", "nada que ver aca", 4, 0, true, 0);
        assert_eq!(report.classic_confidence, 0.0);
    }

    #[test]
    fn test_clean_table_scores_high() {
        let text = "\
CODIGO CANTIDAD DESCRIPCION P.UNITARIO IMPORTE
YER-500 2 YERBA 1.850,00 3.700,00
AZ-1201 5 AZUCAR 950,00 4.750,00
FID-235 12 FIDEOS 980,50 11.766,00
LAV-055 3 LAVANDINA 720,00 2.160,00
GAS-225 6 GASEOSA 1.500,00 9.000,00";
        let report = score("structured", text, 5, 5, true, 0);
        assert!(
            report.classic_confidence >= 0.8,
            "expected >= 0.8, got {}",
            report.classic_confidence
        );
        assert_eq!(report.grammar_match_ratio, 1.0);
    }

    #[test]
    fn test_missing_header_lowers_score() {
        let text = "2 YERBA 1.850,00\n5 AZUCAR 950,00";
        let with_header = score("heuristic", text, 2, 2, true, 0);
        let without = score("heuristic", text, 2, 2, false, 0);
        assert!(with_header.classic_confidence > without.classic_confidence);
    }

    #[test]
    fn test_density_saturates() {
        let dense = "1 2 3 4 5 6 7 8";
        let report = score("heuristic", dense, 1, 1, false, 0);
        assert!(report.numeric_density > 0.9);
        assert!(report.classic_confidence <= 1.0);
    }
}

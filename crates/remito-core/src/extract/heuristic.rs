//! Text-heuristic purchase line extraction.
//!
//! Scans raw text lines with the remito line grammar: optional code,
//! quantity, wrapped title, unit cost, optional discount and subtotal.
//! Standalone percentage markers fold into the preceding line; plain-text
//! lines directly below a parsed line rejoin wrapped titles.

use rust_decimal::Decimal;
use tracing::debug;

use super::numbers::{clamp_quantity, is_amount_token, parse_amount, parse_quantity};
use super::patterns::{DISCOUNT_MARKER, PERCENT_TOKEN, SKU_TOKEN, TABLE_END, TABLE_HEADER};
use crate::models::draft::PurchaseLine;

/// Result of a heuristic pass over a text block.
#[derive(Debug, Default)]
pub struct HeuristicOutcome {
    /// Candidate purchase lines, in document order.
    pub lines: Vec<PurchaseLine>,

    /// Non-empty, non-summary lines that were examined.
    pub scanned: usize,

    /// Lines that matched the full grammar.
    pub strict_matches: usize,
}

/// Heuristic line parser. `relaxed` additionally accepts lines with just a
/// quantity and any amount, at reduced confidence.
pub struct HeuristicParser {
    relaxed: bool,
    quantity_clamp: Decimal,
    unit_cost_ceiling: Decimal,
}

const STRICT_CONFIDENCE: f32 = 0.9;
const RELAXED_CONFIDENCE: f32 = 0.5;

impl HeuristicParser {
    pub fn new(quantity_clamp: Decimal, unit_cost_ceiling: Decimal) -> Self {
        Self {
            relaxed: false,
            quantity_clamp,
            unit_cost_ceiling,
        }
    }

    pub fn with_relaxed(mut self, relaxed: bool) -> Self {
        self.relaxed = relaxed;
        self
    }

    pub fn parse(&self, text: &str) -> HeuristicOutcome {
        let mut outcome = HeuristicOutcome::default();
        let mut last_was_line = false;

        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            // Standalone discount markers apply to the previous line.
            if let Some(caps) = DISCOUNT_MARKER.captures(line) {
                if last_was_line {
                    if let Some(prev) = outcome.lines.last_mut() {
                        prev.discount_pct = parse_amount(&caps[1]);
                    }
                }
                continue;
            }

            // A short line without digits directly below a parsed line is a
            // wrapped title continuation.
            if !line.chars().any(|c| c.is_ascii_digit()) {
                if last_was_line && line.len() <= 40 {
                    if let Some(prev) = outcome.lines.last_mut() {
                        prev.title.push(' ');
                        prev.title.push_str(line);
                    }
                }
                last_was_line = false;
                continue;
            }

            if TABLE_HEADER.is_match(line) || TABLE_END.is_match(line) {
                last_was_line = false;
                continue;
            }

            outcome.scanned += 1;

            if let Some(parsed) = self.parse_strict(line) {
                outcome.strict_matches += 1;
                outcome.lines.push(parsed);
                last_was_line = true;
            } else if self.relaxed {
                if let Some(parsed) = self.parse_relaxed(line) {
                    outcome.lines.push(parsed);
                    last_was_line = true;
                } else {
                    last_was_line = false;
                }
            } else {
                last_was_line = false;
            }
        }

        debug!(
            lines = outcome.lines.len(),
            scanned = outcome.scanned,
            strict = outcome.strict_matches,
            relaxed = self.relaxed,
            "heuristic pass finished"
        );
        outcome
    }

    /// Full grammar: `[code] qty title.. unit [disc%] [subtotal]` with the
    /// quantity also accepted at the end of the head section.
    pub(crate) fn parse_strict(&self, line: &str) -> Option<PurchaseLine> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 3 {
            return None;
        }

        // Trailing numeric section: amounts and an optional percent token.
        let mut tail_start = tokens.len();
        while tail_start > 0 {
            let t = tokens[tail_start - 1];
            if is_amount_token(t) || PERCENT_TOKEN.is_match(t) || t == "$" {
                tail_start -= 1;
            } else {
                break;
            }
        }

        let tail = &tokens[tail_start..];
        let amounts: Vec<Decimal> = tail
            .iter()
            .filter(|t| is_amount_token(t))
            .filter_map(|t| parse_amount(t))
            .collect();
        if amounts.is_empty() {
            return None;
        }

        // First trailing amount is the unit cost; the last one, when
        // present, is the printed subtotal.
        let unit_cost = amounts[0];
        let discount_pct = tail
            .iter()
            .find_map(|t| PERCENT_TOKEN.captures(t))
            .and_then(|c| parse_amount(&c[1]));

        let head = &tokens[..tail_start];
        if head.is_empty() {
            return None;
        }

        let (sku, qty_token, title_tokens): (Option<&str>, &str, &[&str]) =
            if parse_quantity(head[0]).is_some() {
                (None, head[0], &head[1..])
            } else if head.len() >= 2
                && SKU_TOKEN.is_match(head[0])
                && parse_quantity(head[1]).is_some()
            {
                (Some(head[0]), head[1], &head[2..])
            } else if head.len() >= 2 && parse_quantity(head[head.len() - 1]).is_some() {
                (None, head[head.len() - 1], &head[..head.len() - 1])
            } else {
                return None;
            };

        let title = title_tokens.join(" ");
        if title.trim().is_empty() {
            return None;
        }

        Some(self.build_line(sku, qty_token, title, unit_cost, discount_pct, STRICT_CONFIDENCE))
    }

    /// Relaxed grammar: any quantity token plus any amount token.
    fn parse_relaxed(&self, line: &str) -> Option<PurchaseLine> {
        let tokens: Vec<&str> = line.split_whitespace().collect();

        let qty_token = tokens
            .iter()
            .find(|t| !is_amount_token(t) && parse_quantity(t).is_some())?;
        let unit_cost = tokens
            .iter()
            .rev()
            .find(|t| is_amount_token(t))
            .and_then(|t| parse_amount(t))?;

        let title: String = tokens
            .iter()
            .filter(|t| *t != qty_token && !is_amount_token(t) && !PERCENT_TOKEN.is_match(t))
            .copied()
            .collect::<Vec<_>>()
            .join(" ");
        if title.trim().is_empty() {
            return None;
        }

        Some(self.build_line(None, qty_token, title, unit_cost, None, RELAXED_CONFIDENCE))
    }

    fn build_line(
        &self,
        sku: Option<&str>,
        qty_token: &str,
        title: String,
        unit_cost: Decimal,
        discount_pct: Option<Decimal>,
        confidence: f32,
    ) -> PurchaseLine {
        let qty = parse_quantity(qty_token).unwrap_or(Decimal::ONE);
        let (quantity, qty_clamped) = clamp_quantity(qty, self.quantity_clamp);

        let mut line = PurchaseLine::new(title, quantity, unit_cost);
        line.supplier_sku = sku.map(|s| s.to_string());
        line.discount_pct = discount_pct;
        line.confidence = confidence;
        line.qty_clamped = qty_clamped;
        line.cost_outlier = unit_cost > self.unit_cost_ceiling;
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn parser() -> HeuristicParser {
        HeuristicParser::new(dec("9999"), dec("10000000"))
    }

    #[test]
    fn test_qty_first_line() {
        let out = parser().parse("5 GASEOSA COLA 2.25L 1.500,00");
        assert_eq!(out.lines.len(), 1);
        let line = &out.lines[0];
        assert_eq!(line.quantity, dec("5"));
        assert_eq!(line.title, "GASEOSA COLA 2.25L");
        assert_eq!(line.unit_cost, dec("1500.00"));
        assert_eq!(out.strict_matches, 1);
    }

    #[test]
    fn test_sku_qty_title_unit_subtotal() {
        let out = parser().parse("YER-500 2 YERBA SUAVE 500 GR 1.850,00 3.700,00");
        let line = &out.lines[0];
        assert_eq!(line.supplier_sku.as_deref(), Some("YER-500"));
        assert_eq!(line.quantity, dec("2"));
        assert_eq!(line.title, "YERBA SUAVE 500 GR");
        assert_eq!(line.unit_cost, dec("1850.00"));
    }

    #[test]
    fn test_qty_trailing_in_head() {
        let out = parser().parse("FIDEOS GUISEROS 12 980,50");
        let line = &out.lines[0];
        assert_eq!(line.quantity, dec("12"));
        assert_eq!(line.title, "FIDEOS GUISEROS");
        assert_eq!(line.unit_cost, dec("980.50"));
    }

    #[test]
    fn test_inline_discount() {
        let out = parser().parse("2 YERBA SUAVE 1.850,00 10% 3.330,00");
        let line = &out.lines[0];
        assert_eq!(line.discount_pct, Some(dec("10")));
        assert_eq!(line.unit_cost, dec("1850.00"));
    }

    #[test]
    fn test_discount_marker_folds_into_previous_line() {
        let text = "2 YERBA SUAVE 1.850,00\nDTO 10%";
        let out = parser().parse(text);
        assert_eq!(out.lines.len(), 1);
        assert_eq!(out.lines[0].discount_pct, Some(dec("10")));
    }

    #[test]
    fn test_wrapped_title_rejoined() {
        let text = "1 HARINA TRIPLE CERO 1.200,00\nREFINADA MOLINO\n2 AZUCAR COMUN 900,00";
        let out = parser().parse(text);
        assert_eq!(out.lines.len(), 2);
        assert_eq!(out.lines[0].title, "HARINA TRIPLE CERO REFINADA MOLINO");
        assert_eq!(out.lines[1].title, "AZUCAR COMUN");
    }

    #[test]
    fn test_quantity_clamped_and_flagged() {
        let out = parser().parse("9000 TORNILLOS 10,00");
        assert!(!out.lines[0].qty_clamped);

        let tight = HeuristicParser::new(dec("100"), dec("10000000"));
        let out = tight.parse("9000 TORNILLOS 10,00");
        let line = &out.lines[0];
        assert_eq!(line.quantity, dec("100"));
        assert!(line.qty_clamped);
    }

    #[test]
    fn test_cost_outlier_flagged() {
        let tight = HeuristicParser::new(dec("9999"), dec("1000"));
        let out = tight.parse("1 MAQUINA ENVASADORA 1.500.000,00");
        let line = &out.lines[0];
        assert!(line.cost_outlier);
        assert_eq!(line.unit_cost, dec("1500000.00"));
    }

    #[test]
    fn test_summary_rows_skipped() {
        let text = "2 YERBA 1.850,00\nSUBTOTAL 3.700,00\nTOTAL 3.700,00";
        let out = parser().parse(text);
        assert_eq!(out.lines.len(), 1);
        assert_eq!(out.scanned, 1);
    }

    #[test]
    fn test_strict_rejects_prose() {
        let out = parser().parse("Entrega sujeta a revision en deposito 24 hs");
        assert_eq!(out.lines.len(), 0);
        assert_eq!(out.strict_matches, 0);
    }

    #[test]
    fn test_relaxed_accepts_amount_without_decimals_layout() {
        let text = "CAJA TORNILLOS x 24 total 1.200,00";
        let strict_only = parser().parse(text);
        assert_eq!(strict_only.lines.len(), 0);

        let relaxed = parser().with_relaxed(true);
        let out = relaxed.parse(text);
        assert_eq!(out.lines.len(), 1);
        assert_eq!(out.lines[0].quantity, dec("24"));
        assert_eq!(out.lines[0].confidence, RELAXED_CONFIDENCE);
    }
}

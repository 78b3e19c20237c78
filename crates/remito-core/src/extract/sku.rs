//! Supplier SKU recovery from noisy candidate lines.

use crate::catalog::CatalogLookup;
use crate::models::draft::PurchaseLine;

use super::patterns::{SKU_TOKEN, UNIT_TOKEN};

/// Decisions made while recovering a SKU, surfaced as pipeline events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkuDecision {
    /// A numeric token was immediately followed by a unit of measure
    /// ("500 ML") and is therefore not an identifier.
    RejectedUnitAdjacent { token: String },
    /// A code split by the extractor was compacted back together.
    Compacted { from: String, to: String },
    /// The title matched a previously-seen product; its known code was used.
    FromTitleMemory { sku: String },
}

/// SKU recovery pass, run per candidate line.
pub struct SkuRecovery<'a> {
    catalog: &'a dyn CatalogLookup,
}

impl<'a> SkuRecovery<'a> {
    pub fn new(catalog: &'a dyn CatalogLookup) -> Self {
        Self { catalog }
    }

    /// Recover a supplier SKU for the line, mutating `line.supplier_sku`.
    pub fn recover(&self, supplier_id: &str, line: &mut PurchaseLine) -> Vec<SkuDecision> {
        let mut decisions = Vec::new();

        if let Some(existing) = line.supplier_sku.take() {
            line.supplier_sku = Some(clean_token(&existing));
        }

        if line.supplier_sku.is_none() {
            let (sku, mut scan_decisions) = self.scan_title(&line.title);
            decisions.append(&mut scan_decisions);
            line.supplier_sku = sku;
        }

        if line.supplier_sku.is_none() {
            if let Some(sku) = self.catalog.known_sku_for_title(supplier_id, &line.title) {
                decisions.push(SkuDecision::FromTitleMemory { sku: sku.clone() });
                line.supplier_sku = Some(sku);
            }
        }

        decisions
    }

    /// Codes print at the start of a line; only the leading tokens are
    /// candidates.
    fn scan_title(&self, title: &str) -> (Option<String>, Vec<SkuDecision>) {
        let tokens: Vec<&str> = title.split_whitespace().collect();
        let mut decisions = Vec::new();

        for (i, raw) in tokens.iter().take(2).enumerate() {
            let token = clean_token(raw);
            if token.is_empty() {
                continue;
            }

            let numeric = token.chars().all(|c| c.is_ascii_digit());
            let next_is_unit = tokens
                .get(i + 1)
                .map(|t| UNIT_TOKEN.is_match(t))
                .unwrap_or(false);

            // A quantity+unit pair like "500 ML" is never an identifier.
            if numeric && next_is_unit {
                decisions.push(SkuDecision::RejectedUnitAdjacent { token });
                continue;
            }

            // Compact a code truncated across a token boundary ("ABC- 123").
            if (token.ends_with('-') || token.ends_with('/')) && token.len() >= 3 {
                if let Some(next) = tokens.get(i + 1) {
                    let tail = clean_token(next);
                    if !tail.is_empty()
                        && tail.len() <= 6
                        && tail.chars().all(|c| c.is_ascii_alphanumeric())
                    {
                        let joined = format!("{}{}", token, tail);
                        let joined_numeric = joined.chars().all(|c| c.is_ascii_digit());
                        if is_sku_shaped(&joined, joined_numeric) {
                            decisions.push(SkuDecision::Compacted {
                                from: format!("{} {}", token, tail),
                                to: joined.clone(),
                            });
                            return (Some(joined), decisions);
                        }
                    }
                }
                continue;
            }

            if !is_sku_shaped(&token, numeric) {
                continue;
            }

            return (Some(token), decisions);
        }

        (None, decisions)
    }
}

/// Strip boundary punctuation noise and uppercase.
fn clean_token(raw: &str) -> String {
    raw.trim_matches(|c: char| matches!(c, '*' | '.' | ',' | ';' | ':' | '(' | ')' | '#' | '·' | '…'))
        .to_uppercase()
}

/// A SKU carries at least one digit; bare numbers must be long enough not
/// to be a quantity.
fn is_sku_shaped(token: &str, numeric: bool) -> bool {
    if !SKU_TOKEN.is_match(token) {
        return false;
    }
    let has_digit = token.chars().any(|c| c.is_ascii_digit());
    if !has_digit {
        return false;
    }
    if numeric {
        return token.len() >= 5;
    }
    true
}

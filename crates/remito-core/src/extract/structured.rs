//! Structured (table-oriented) extraction for digitally born documents.
//!
//! Looks for runs of rows whose numeric tails are column-consistent, gated
//! by a detected table header when one is printed. Only a consistent row
//! set counts as structured output; stray matches fall through to the
//! heuristic stage.

use rust_decimal::Decimal;
use tracing::debug;

use super::heuristic::HeuristicParser;
use super::numbers::is_amount_token;
use super::patterns::{TABLE_END, TABLE_HEADER};
use crate::models::draft::PurchaseLine;

/// Result of a structured pass.
#[derive(Debug, Default)]
pub struct StructuredOutcome {
    /// Rows of the winning run, empty when no consistent set was found.
    pub lines: Vec<PurchaseLine>,

    /// Length of the longest row run seen, consistent or not.
    pub rows_seen: usize,

    /// Whether the winning run was column-consistent.
    pub consistent: bool,
}

pub struct StructuredExtractor {
    min_rows: usize,
    parser: HeuristicParser,
}

impl StructuredExtractor {
    pub fn new(min_rows: usize, quantity_clamp: Decimal, unit_cost_ceiling: Decimal) -> Self {
        Self {
            min_rows,
            parser: HeuristicParser::new(quantity_clamp, unit_cost_ceiling),
        }
    }

    pub fn extract(&self, text: &str) -> StructuredOutcome {
        let mut best: Vec<(PurchaseLine, usize)> = Vec::new();
        let mut current: Vec<(PurchaseLine, usize)> = Vec::new();
        let mut in_table = false;

        for raw in text.lines() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            if TABLE_HEADER.is_match(line) {
                promote(&mut best, &mut current);
                in_table = true;
                continue;
            }

            if TABLE_END.is_match(line) {
                promote(&mut best, &mut current);
                in_table = false;
                continue;
            }

            match self.parser.parse_strict(line) {
                Some(parsed) => current.push((parsed, amount_signature(line))),
                None => {
                    // Inside a table, a digit-free line is a wrapped title.
                    let continuation = in_table
                        && !line.chars().any(|c| c.is_ascii_digit())
                        && line.len() <= 40;
                    if continuation {
                        if let Some((prev, _)) = current.last_mut() {
                            prev.title.push(' ');
                            prev.title.push_str(line);
                        }
                    } else {
                        promote(&mut best, &mut current);
                    }
                }
            }
        }
        promote(&mut best, &mut current);

        let rows_seen = best.len();
        let consistent = rows_seen >= self.min_rows
            && best.iter().all(|(_, sig)| *sig == best[0].1);

        debug!(rows_seen, consistent, "structured pass finished");

        StructuredOutcome {
            lines: if consistent {
                best.into_iter().map(|(line, _)| line).collect()
            } else {
                Vec::new()
            },
            rows_seen,
            consistent,
        }
    }
}

/// Keep the longest run seen so far.
fn promote(best: &mut Vec<(PurchaseLine, usize)>, current: &mut Vec<(PurchaseLine, usize)>) {
    if current.len() > best.len() {
        std::mem::swap(best, current);
    }
    current.clear();
}

/// Column signature of a row: how many amount tokens it carries.
fn amount_signature(line: &str) -> usize {
    line.split_whitespace().filter(|t| is_amount_token(t)).count()
}

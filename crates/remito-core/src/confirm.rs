//! Purchase confirmation state machine.
//!
//! Operations run inside single store transactions, so a confirm or
//! rollback is either fully applied or not at all. Status is re-read
//! inside the transaction, which with the store's single writer gives
//! at-most-one concurrent confirm per draft; callers may retry
//! at-least-once.

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::config::ConfirmConfig;
use crate::error::{ConfirmError, Result};
use crate::ledger;
use crate::models::draft::{DraftStatus, LinkState, PurchaseDraft, PurchaseLine};
use crate::models::events::PipelineStage;
use crate::store::{self, PurchaseStore};

/// Options for one confirm call.
#[derive(Debug, Clone)]
pub struct ConfirmOptions {
    pub tolerance_abs: Decimal,
    /// Fraction of the declared total (0.01 = 1%).
    pub tolerance_pct: Decimal,
    /// Apply stock even when the totals mismatch.
    pub force: bool,
    /// Confirm while unmatched lines remain (they stay excluded).
    pub allow_partial: bool,
    /// Include per-line detail in the report.
    pub debug: bool,
}

impl ConfirmOptions {
    pub fn from_config(config: &ConfirmConfig) -> Self {
        Self {
            tolerance_abs: config.tolerance_abs,
            tolerance_pct: config.tolerance_pct,
            force: false,
            allow_partial: config.allow_partial,
            debug: false,
        }
    }
}

/// Per-product stock effect of a confirm.
#[derive(Debug, Clone, Serialize)]
pub struct AppliedDelta {
    pub product_id: i64,
    pub delta: Decimal,
    pub balance_after: Decimal,
}

/// Declared-vs-applied totals comparison.
#[derive(Debug, Clone, Serialize)]
pub struct TotalsBreakdown {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_total: Option<Decimal>,
    pub applied_total: Decimal,
    pub diff: Decimal,
    pub tolerance_abs: Decimal,
    pub tolerance_pct: Decimal,
    pub mismatch: bool,
}

/// A line excluded from the applied total for lack of a catalog link.
#[derive(Debug, Clone, Serialize)]
pub struct UnresolvedLine {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_id: Option<i64>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplier_sku: Option<String>,
}

/// Guarded outcome of a confirm call. Mismatch and unresolved states are
/// not errors; they require an explicit caller decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmStatus {
    Applied,
    AlreadyConfirmed,
    Mismatch,
    Unresolved,
}

#[derive(Debug, Clone, Serialize)]
pub struct LineDebug {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_id: Option<i64>,
    pub title: String,
    pub subtotal: Decimal,
    pub included: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfirmReport {
    pub status: ConfirmStatus,
    pub applied_deltas: Vec<AppliedDelta>,
    pub totals: TotalsBreakdown,
    pub can_rollback: bool,
    pub unresolved_lines: Vec<UnresolvedLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_lines: Option<Vec<LineDebug>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidateReport {
    pub status: DraftStatus,
    pub total_lines: usize,
    pub linked: usize,
    pub unmatched_count: usize,
    pub missing_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RevertedDelta {
    pub product_id: i64,
    pub delta: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct RollbackReport {
    pub status: DraftStatus,
    /// True when the draft was already voided and nothing was reversed.
    pub noop: bool,
    pub reverted: Vec<RevertedDelta>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResendReport {
    pub status: DraftStatus,
    /// Whether deltas were written (false = preview).
    pub applied: bool,
    /// Lines whose stock effect was missing.
    pub missing: Vec<AppliedDelta>,
    /// Lines already reflected and skipped.
    pub skipped: usize,
}

/// The confirmation engine, bound to a store.
pub struct ConfirmationEngine<'a> {
    store: &'a PurchaseStore,
}

impl<'a> ConfirmationEngine<'a> {
    pub fn new(store: &'a PurchaseStore) -> Self {
        Self { store }
    }

    /// Auto-link unmatched lines against the catalog by supplier code.
    /// Never touches quantities, costs, or header fields.
    pub fn validate(&self, purchase_id: i64) -> Result<ValidateReport> {
        self.store.with_tx(|tx| {
            let draft = store::load_draft(tx, purchase_id)?;

            let mut linked = 0usize;
            let mut missing = Vec::new();
            let mutable = draft.status.is_confirmable();

            for line in &draft.lines {
                match line.link_state {
                    LinkState::Deleted => {}
                    LinkState::Matched => linked += 1,
                    LinkState::Unmatched => {
                        let resolved = match (&line.supplier_sku, mutable) {
                            (Some(sku), true) => store::find_supplier_sku_conn(
                                tx,
                                &draft.header.supplier_id,
                                sku,
                            )?,
                            _ => None,
                        };

                        match (resolved, line.id) {
                            (Some(product_id), Some(line_id)) => {
                                store::set_line_link(
                                    tx,
                                    line_id,
                                    Some(product_id),
                                    LinkState::Matched,
                                )?;
                                linked += 1;
                            }
                            _ => missing.push(
                                line.supplier_sku
                                    .clone()
                                    .unwrap_or_else(|| line.title.clone()),
                            ),
                        }
                    }
                }
            }

            let status = if draft.status == DraftStatus::Draft {
                store::set_status(tx, purchase_id, DraftStatus::Validated)?;
                DraftStatus::Validated
            } else {
                draft.status
            };

            store::append_event(
                tx,
                purchase_id,
                PipelineStage::Confirm,
                "auto_link_finished",
                &json!({"linked": linked, "missing": missing.len()}),
            )?;

            Ok(ValidateReport {
                status,
                total_lines: draft
                    .lines
                    .iter()
                    .filter(|l| l.link_state != LinkState::Deleted)
                    .count(),
                linked,
                unmatched_count: missing.len(),
                missing_ids: missing,
            })
        })
    }

    /// Compare totals and, within tolerance, atomically apply stock deltas
    /// and ledger entries. Idempotent: an already-confirmed draft is
    /// reported, never re-applied.
    pub fn confirm(&self, purchase_id: i64, opts: &ConfirmOptions) -> Result<ConfirmReport> {
        self.store.with_tx(|tx| {
            let draft = store::load_draft(tx, purchase_id)?;

            match draft.status {
                DraftStatus::Confirmed => {
                    let totals = compute_totals(&draft, opts);
                    return Ok(ConfirmReport {
                        status: ConfirmStatus::AlreadyConfirmed,
                        applied_deltas: Vec::new(),
                        totals,
                        can_rollback: true,
                        unresolved_lines: unresolved_lines(&draft),
                        debug_lines: debug_lines(&draft, opts),
                    });
                }
                DraftStatus::Voided => {
                    return Err(ConfirmError::InvalidState {
                        id: purchase_id,
                        op: "confirm",
                        status: draft.status.as_str().to_string(),
                    }
                    .into());
                }
                DraftStatus::Draft | DraftStatus::Validated => {}
            }

            let unresolved = unresolved_lines(&draft);
            let totals = compute_totals(&draft, opts);

            if !unresolved.is_empty() && !opts.allow_partial {
                store::append_event(
                    tx,
                    purchase_id,
                    PipelineStage::Confirm,
                    "confirm_refused_unresolved",
                    &json!({"unresolved": unresolved.len()}),
                )?;
                return Ok(ConfirmReport {
                    status: ConfirmStatus::Unresolved,
                    applied_deltas: Vec::new(),
                    totals,
                    can_rollback: false,
                    unresolved_lines: unresolved,
                    debug_lines: debug_lines(&draft, opts),
                });
            }

            if totals.mismatch && !opts.force {
                store::append_event(
                    tx,
                    purchase_id,
                    PipelineStage::Confirm,
                    "confirm_total_mismatch",
                    &json!({
                        "declared": totals.declared_total.map(|d| d.to_string()),
                        "applied": totals.applied_total.to_string(),
                        "diff": totals.diff.to_string(),
                    }),
                )?;
                return Ok(ConfirmReport {
                    status: ConfirmStatus::Mismatch,
                    applied_deltas: Vec::new(),
                    totals,
                    can_rollback: false,
                    unresolved_lines: unresolved,
                    debug_lines: debug_lines(&draft, opts),
                });
            }

            let mut applied = Vec::new();
            for line in applicable_lines(&draft) {
                let product_id = line.product_id.unwrap_or_default();
                let entry = ledger::append(
                    tx,
                    product_id,
                    purchase_id,
                    line.id,
                    line.quantity,
                    None,
                )?;
                applied.push(AppliedDelta {
                    product_id,
                    delta: entry.delta,
                    balance_after: entry.balance_after,
                });
            }

            store::set_status(tx, purchase_id, DraftStatus::Confirmed)?;
            store::append_event(
                tx,
                purchase_id,
                PipelineStage::Confirm,
                "stock_applied",
                &json!({"lines": applied.len(), "forced": opts.force}),
            )?;

            info!(purchase_id, lines = applied.len(), "purchase confirmed");

            Ok(ConfirmReport {
                status: ConfirmStatus::Applied,
                applied_deltas: applied,
                totals,
                can_rollback: true,
                unresolved_lines: unresolved,
                debug_lines: debug_lines(&draft, opts),
            })
        })
    }

    /// Exactly reverse the deltas recorded at confirmation. A second
    /// rollback on a voided draft is an explicit no-op, never a double
    /// reversal.
    pub fn rollback(&self, purchase_id: i64) -> Result<RollbackReport> {
        self.store.with_tx(|tx| {
            let draft = store::load_draft(tx, purchase_id)?;

            match draft.status {
                DraftStatus::Voided => Ok(RollbackReport {
                    status: DraftStatus::Voided,
                    noop: true,
                    reverted: Vec::new(),
                }),
                DraftStatus::Confirmed => {
                    let originals = ledger::unreversed_entries_for_purchase(tx, purchase_id)?;

                    let mut reverted = Vec::new();
                    for original in &originals {
                        let inverse = ledger::append(
                            tx,
                            original.product_id,
                            purchase_id,
                            original.line_id,
                            -original.delta,
                            Some(original.id),
                        )?;
                        reverted.push(RevertedDelta {
                            product_id: original.product_id,
                            delta: inverse.delta,
                        });
                    }

                    store::set_status(tx, purchase_id, DraftStatus::Voided)?;
                    store::append_event(
                        tx,
                        purchase_id,
                        PipelineStage::Rollback,
                        "stock_reversed",
                        &json!({"entries": reverted.len()}),
                    )?;

                    info!(purchase_id, entries = reverted.len(), "purchase rolled back");

                    Ok(RollbackReport {
                        status: DraftStatus::Voided,
                        noop: false,
                        reverted,
                    })
                }
                _ => Err(ConfirmError::InvalidState {
                    id: purchase_id,
                    op: "rollback",
                    status: draft.status.as_str().to_string(),
                }
                .into()),
            }
        })
    }

    /// Recovery for a confirmed draft whose stock effect is suspected
    /// lost. Preview computes without writing; apply is an idempotent
    /// partial re-confirm limited to lines not yet reflected.
    pub fn resend_stock(&self, purchase_id: i64, apply: bool) -> Result<ResendReport> {
        self.store.with_tx(|tx| {
            let draft = store::load_draft(tx, purchase_id)?;

            if draft.status != DraftStatus::Confirmed {
                return Err(ConfirmError::InvalidState {
                    id: purchase_id,
                    op: "resend_stock",
                    status: draft.status.as_str().to_string(),
                }
                .into());
            }

            let mut missing = Vec::new();
            let mut skipped = 0usize;

            for line in applicable_lines(&draft) {
                let line_id = match line.id {
                    Some(id) => id,
                    None => continue,
                };
                if ledger::line_is_reflected(tx, purchase_id, line_id)? {
                    skipped += 1;
                    continue;
                }

                let product_id = line.product_id.unwrap_or_default();
                if apply {
                    let entry =
                        ledger::append(tx, product_id, purchase_id, Some(line_id), line.quantity, None)?;
                    missing.push(AppliedDelta {
                        product_id,
                        delta: entry.delta,
                        balance_after: entry.balance_after,
                    });
                } else {
                    let balance = ledger::balance(tx, product_id)?;
                    missing.push(AppliedDelta {
                        product_id,
                        delta: line.quantity,
                        balance_after: balance + line.quantity,
                    });
                }
            }

            if apply {
                store::append_event(
                    tx,
                    purchase_id,
                    PipelineStage::Confirm,
                    "stock_resent",
                    &json!({"lines": missing.len(), "skipped": skipped}),
                )?;
            }

            Ok(ResendReport {
                status: draft.status,
                applied: apply,
                missing,
                skipped,
            })
        })
    }

    /// Void a draft that never touched stock.
    pub fn cancel(&self, purchase_id: i64) -> Result<DraftStatus> {
        self.store.with_tx(|tx| {
            let draft = store::load_draft(tx, purchase_id)?;

            if !draft.status.is_confirmable() {
                return Err(ConfirmError::InvalidState {
                    id: purchase_id,
                    op: "cancel",
                    status: draft.status.as_str().to_string(),
                }
                .into());
            }

            store::set_status(tx, purchase_id, DraftStatus::Voided)?;
            store::append_event(
                tx,
                purchase_id,
                PipelineStage::Confirm,
                "draft_cancelled",
                &json!({}),
            )?;
            Ok(DraftStatus::Voided)
        })
    }
}

fn applicable_lines(draft: &PurchaseDraft) -> impl Iterator<Item = &PurchaseLine> {
    draft.lines.iter().filter(|l| l.is_applicable())
}

fn unresolved_lines(draft: &PurchaseDraft) -> Vec<UnresolvedLine> {
    draft
        .unmatched()
        .map(|l| UnresolvedLine {
            line_id: l.id,
            title: l.title.clone(),
            supplier_sku: l.supplier_sku.clone(),
        })
        .collect()
}

fn compute_totals(draft: &PurchaseDraft, opts: &ConfirmOptions) -> TotalsBreakdown {
    let applied_total = draft.applied_total().round_dp(2);
    let declared_total = draft.header.declared_total;

    let diff = declared_total
        .map(|d| (d - applied_total).abs())
        .unwrap_or(Decimal::ZERO);

    let mismatch = match declared_total {
        Some(declared) => diff > opts.tolerance_abs && diff > opts.tolerance_pct * declared,
        None => false,
    };

    TotalsBreakdown {
        declared_total,
        applied_total,
        diff,
        tolerance_abs: opts.tolerance_abs,
        tolerance_pct: opts.tolerance_pct,
        mismatch,
    }
}

fn debug_lines(draft: &PurchaseDraft, opts: &ConfirmOptions) -> Option<Vec<LineDebug>> {
    if !opts.debug {
        return None;
    }
    Some(
        draft
            .lines
            .iter()
            .map(|l| LineDebug {
                line_id: l.id,
                title: l.title.clone(),
                subtotal: l.subtotal().round_dp(2),
                included: l.is_applicable(),
            })
            .collect(),
    )
}

//! Purchase draft aggregate: header, lines, and the status state machine.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a purchase draft. Transitions are forward-only;
/// `Voided` is reachable from `Confirmed` via rollback and from
/// `Draft`/`Validated` via cancel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    Draft,
    Validated,
    Confirmed,
    Voided,
}

impl DraftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DraftStatus::Draft => "draft",
            DraftStatus::Validated => "validated",
            DraftStatus::Confirmed => "confirmed",
            DraftStatus::Voided => "voided",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(DraftStatus::Draft),
            "validated" => Some(DraftStatus::Validated),
            "confirmed" => Some(DraftStatus::Confirmed),
            "voided" => Some(DraftStatus::Voided),
            _ => None,
        }
    }

    /// Whether a transition to `next` is allowed.
    pub fn can_transition_to(&self, next: DraftStatus) -> bool {
        use DraftStatus::*;
        matches!(
            (self, next),
            (Draft, Validated)
                | (Draft, Confirmed)
                | (Draft, Voided)
                | (Validated, Confirmed)
                | (Validated, Voided)
                | (Confirmed, Voided)
        )
    }

    /// Stock may only be applied from these states.
    pub fn is_confirmable(&self) -> bool {
        matches!(self, DraftStatus::Draft | DraftStatus::Validated)
    }
}

/// How much the resolved invoice number can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberTrust {
    /// Matched the canonical point-of-sale + sequence pattern.
    Canonical,
    /// Found next to a document-number label.
    Labelled,
    /// Derived from the filename; low trust.
    Filename,
}

impl NumberTrust {
    pub fn as_str(&self) -> &'static str {
        match self {
            NumberTrust::Canonical => "canonical",
            NumberTrust::Labelled => "labelled",
            NumberTrust::Filename => "filename",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "canonical" => Some(NumberTrust::Canonical),
            "labelled" => Some(NumberTrust::Labelled),
            "filename" => Some(NumberTrust::Filename),
            _ => None,
        }
    }
}

/// Which pipeline produced a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineSource {
    /// Structured, heuristic, or optical extraction.
    Classic,
    /// AI fallback oracle.
    Oracle,
    /// Entered or corrected by a human.
    Manual,
}

impl LineSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineSource::Classic => "classic",
            LineSource::Oracle => "oracle",
            LineSource::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "classic" => Some(LineSource::Classic),
            "oracle" => Some(LineSource::Oracle),
            "manual" => Some(LineSource::Manual),
            _ => None,
        }
    }
}

/// Catalog linkage state of a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Matched,
    Unmatched,
    Deleted,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Matched => "matched",
            LinkState::Unmatched => "unmatched",
            LinkState::Deleted => "deleted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "matched" => Some(LinkState::Matched),
            "unmatched" => Some(LinkState::Unmatched),
            "deleted" => Some(LinkState::Deleted),
            _ => None,
        }
    }
}

/// Header extracted for a purchase draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseHeader {
    /// Supplier the purchase belongs to.
    pub supplier_id: String,

    /// Resolved document number.
    pub invoice_number: String,

    /// Trust level of the resolved number.
    pub number_trust: NumberTrust,

    /// Document date, if one was found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invoice_date: Option<NaiveDate>,

    /// Document-wide discount percentage.
    pub global_discount_pct: Decimal,

    /// VAT (IVA) rate percentage.
    pub vat_rate: Decimal,

    /// Total declared on the document, if one was found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_total: Option<Decimal>,
}

impl PurchaseHeader {
    pub fn empty(supplier_id: impl Into<String>) -> Self {
        Self {
            supplier_id: supplier_id.into(),
            invoice_number: String::new(),
            number_trust: NumberTrust::Filename,
            invoice_date: None,
            global_discount_pct: Decimal::ZERO,
            vat_rate: Decimal::new(21, 0),
            declared_total: None,
        }
    }
}

/// A single candidate purchase line. Mutable until confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseLine {
    /// Row id once persisted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    /// Supplier's product code, if one was recovered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supplier_sku: Option<String>,

    /// Linked catalog product, set by validation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<i64>,

    /// Product description as printed on the document.
    pub title: String,

    /// Normalized quantity, always > 0.
    pub quantity: Decimal,

    /// Unit cost before discounts.
    pub unit_cost: Decimal,

    /// Line discount percentage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_pct: Option<Decimal>,

    /// Which pipeline produced the line.
    pub source: LineSource,

    /// Extraction confidence for this line (0.0 - 1.0).
    pub confidence: f32,

    /// Catalog linkage state.
    pub link_state: LinkState,

    /// Quantity exceeded the clamp threshold and was clamped.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub qty_clamped: bool,

    /// Unit cost exceeded the ceiling; excluded from totals.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cost_outlier: bool,
}

impl PurchaseLine {
    pub fn new(title: impl Into<String>, quantity: Decimal, unit_cost: Decimal) -> Self {
        Self {
            id: None,
            supplier_sku: None,
            product_id: None,
            title: title.into(),
            quantity,
            unit_cost,
            discount_pct: None,
            source: LineSource::Classic,
            confidence: 0.0,
            link_state: LinkState::Unmatched,
            qty_clamped: false,
            cost_outlier: false,
        }
    }

    /// Line subtotal after the line discount.
    pub fn subtotal(&self) -> Decimal {
        let gross = self.quantity * self.unit_cost;
        match self.discount_pct {
            Some(pct) => gross * (Decimal::ONE_HUNDRED - pct) / Decimal::ONE_HUNDRED,
            None => gross,
        }
    }

    /// Whether this line participates in totals and stock application:
    /// linked to a product and not an outlier.
    pub fn is_applicable(&self) -> bool {
        self.link_state == LinkState::Matched && self.product_id.is_some() && !self.cost_outlier
    }
}

/// The purchase draft aggregate root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseDraft {
    /// Row id once persisted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    pub header: PurchaseHeader,

    pub lines: Vec<PurchaseLine>,

    pub status: DraftStatus,

    pub created_at: DateTime<Utc>,
}

impl PurchaseDraft {
    pub fn new(header: PurchaseHeader) -> Self {
        Self {
            id: None,
            header,
            lines: Vec::new(),
            status: DraftStatus::Draft,
            created_at: Utc::now(),
        }
    }

    /// Sum of applicable line subtotals after the global discount. Outlier,
    /// deleted, and unmatched lines never contribute.
    pub fn applied_total(&self) -> Decimal {
        let sum: Decimal = self
            .lines
            .iter()
            .filter(|l| l.is_applicable())
            .map(|l| l.subtotal())
            .sum();
        sum * (Decimal::ONE_HUNDRED - self.header.global_discount_pct) / Decimal::ONE_HUNDRED
    }

    /// Lines still waiting for a catalog link.
    pub fn unmatched(&self) -> impl Iterator<Item = &PurchaseLine> {
        self.lines
            .iter()
            .filter(|l| l.link_state == LinkState::Unmatched)
    }

    pub fn unmatched_count(&self) -> usize {
        self.unmatched().count()
    }

    /// Validate the draft and return any issues found.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.header.invoice_number.is_empty() {
            issues.push("Missing invoice number".to_string());
        }

        if self.header.number_trust == NumberTrust::Filename {
            issues.push("Invoice number derived from filename (low trust)".to_string());
        }

        if self.lines.is_empty() {
            issues.push("No purchase lines".to_string());
        }

        for line in &self.lines {
            if line.quantity <= Decimal::ZERO {
                issues.push(format!("Line '{}' has non-positive quantity", line.title));
            }
            if line.qty_clamped {
                issues.push(format!("Line '{}' had its quantity clamped", line.title));
            }
            if line.cost_outlier {
                issues.push(format!(
                    "Line '{}' unit cost is an outlier; excluded from totals",
                    line.title
                ));
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_status_transitions() {
        use DraftStatus::*;
        assert!(Draft.can_transition_to(Validated));
        assert!(Draft.can_transition_to(Confirmed));
        assert!(Validated.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Voided));
        assert!(Draft.can_transition_to(Voided));

        assert!(!Confirmed.can_transition_to(Draft));
        assert!(!Voided.can_transition_to(Confirmed));
        assert!(!Confirmed.can_transition_to(Validated));
        assert!(!Voided.can_transition_to(Voided));
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            DraftStatus::Draft,
            DraftStatus::Validated,
            DraftStatus::Confirmed,
            DraftStatus::Voided,
        ] {
            assert_eq!(DraftStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(DraftStatus::parse("posted"), None);
    }

    #[test]
    fn test_line_subtotal_with_discount() {
        let mut line = PurchaseLine::new("YERBA 1KG", dec("10"), dec("1500.00"));
        assert_eq!(line.subtotal(), dec("15000.00"));

        line.discount_pct = Some(dec("10"));
        assert_eq!(line.subtotal(), dec("13500.000"));
    }

    #[test]
    fn test_applied_total_excludes_outliers_and_unmatched() {
        let mut draft = PurchaseDraft::new(PurchaseHeader::empty("acme"));

        let mut a = PurchaseLine::new("A", dec("2"), dec("100.00"));
        a.product_id = Some(1);
        a.link_state = LinkState::Matched;

        let mut b = PurchaseLine::new("B", dec("1"), dec("50.00"));
        b.product_id = Some(2);
        b.link_state = LinkState::Matched;
        b.cost_outlier = true;

        let c = PurchaseLine::new("C", dec("3"), dec("10.00"));

        draft.lines = vec![a, b, c];
        assert_eq!(draft.applied_total(), dec("200.0000"));
    }

    #[test]
    fn test_applied_total_global_discount() {
        let mut draft = PurchaseDraft::new(PurchaseHeader::empty("acme"));
        draft.header.global_discount_pct = dec("5");

        let mut a = PurchaseLine::new("A", dec("1"), dec("1000.00"));
        a.product_id = Some(1);
        a.link_state = LinkState::Matched;
        draft.lines = vec![a];

        assert_eq!(draft.applied_total().round_dp(2), dec("950.00"));
    }
}

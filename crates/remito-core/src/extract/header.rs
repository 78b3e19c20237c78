//! Header resolution: invoice number disambiguation, date, rates.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::debug;

use super::numbers::parse_amount;
use super::patterns::{
    CUIT_PATTERN, DATE_DMY, DATE_LABELLED, GLOBAL_DISCOUNT, IVA_RATE, NUMBER_LABELLED,
    REMITO_CANONICAL, TOTAL_LABELLED,
};
use crate::models::draft::{NumberTrust, PurchaseHeader};

/// Outcome of header resolution, including the tokens that were rejected
/// for looking like tax identifiers (surfaced as events by the pipeline).
#[derive(Debug, Clone)]
pub struct HeaderResolution {
    pub header: PurchaseHeader,
    pub rejected_tax_tokens: Vec<String>,
}

/// Header resolver. Runs independently of line extraction.
pub struct HeaderResolver {
    tax_id_digits: usize,
    default_vat_rate: Decimal,
}

impl HeaderResolver {
    pub fn new(tax_id_digits: usize) -> Self {
        Self {
            tax_id_digits,
            default_vat_rate: Decimal::new(21, 0),
        }
    }

    pub fn with_default_vat(mut self, rate: Decimal) -> Self {
        self.default_vat_rate = rate;
        self
    }

    /// Resolve the header from document text, falling back to the filename
    /// stem when no acceptable number is found.
    pub fn resolve(&self, supplier_id: &str, text: &str, filename_stem: &str) -> HeaderResolution {
        let mut rejected = Vec::new();

        let (invoice_number, number_trust) = match self.resolve_number(text, &mut rejected) {
            Some(found) => found,
            None => (derive_from_filename(filename_stem), NumberTrust::Filename),
        };

        debug!(
            number = %invoice_number,
            trust = number_trust.as_str(),
            rejected = rejected.len(),
            "resolved invoice number"
        );

        let header = PurchaseHeader {
            supplier_id: supplier_id.to_string(),
            invoice_number,
            number_trust,
            invoice_date: self.extract_date(text),
            global_discount_pct: GLOBAL_DISCOUNT
                .captures(text)
                .and_then(|c| parse_amount(&c[1]))
                .unwrap_or(Decimal::ZERO),
            vat_rate: IVA_RATE
                .captures(text)
                .and_then(|c| parse_amount(&c[1]))
                .unwrap_or(self.default_vat_rate),
            declared_total: TOTAL_LABELLED
                .captures(text)
                .and_then(|c| parse_amount(&c[1])),
        };

        HeaderResolution {
            header,
            rejected_tax_tokens: rejected,
        }
    }

    fn resolve_number(
        &self,
        text: &str,
        rejected: &mut Vec<String>,
    ) -> Option<(String, NumberTrust)> {
        // Canonical pattern wins outright.
        if let Some(caps) = REMITO_CANONICAL.captures(text) {
            return Some((format!("{}-{}", &caps[1], &caps[2]), NumberTrust::Canonical));
        }

        // Labelled candidates, skipping anything shaped like a tax id.
        for caps in NUMBER_LABELLED.captures_iter(text) {
            let candidate = caps[1].trim().to_string();
            if self.looks_like_tax_id(&candidate) {
                rejected.push(candidate);
                continue;
            }
            return Some((candidate.to_uppercase(), NumberTrust::Labelled));
        }

        None
    }

    /// A pure-numeric token whose digit count matches the tax identifier
    /// length is never an invoice-number candidate.
    fn looks_like_tax_id(&self, token: &str) -> bool {
        let digits = token.chars().filter(|c| c.is_ascii_digit()).count();
        let numeric_only = token.chars().all(|c| c.is_ascii_digit() || c == '-');

        (numeric_only && digits == self.tax_id_digits)
            || CUIT_PATTERN
                .find(token)
                .map(|m| m.as_str() == token)
                .unwrap_or(false)
    }

    fn extract_date(&self, text: &str) -> Option<NaiveDate> {
        // Prefer a labelled date line, then any d/m/y token.
        if let Some(caps) = DATE_LABELLED.captures(text) {
            if let Some(date) = DATE_DMY
                .captures(&caps[1])
                .and_then(|c| parse_dmy(&c[1], &c[2], &c[3]))
            {
                return Some(date);
            }
        }

        DATE_DMY
            .captures_iter(text)
            .find_map(|c| parse_dmy(&c[1], &c[2], &c[3]))
    }
}

fn parse_dmy(day: &str, month: &str, year: &str) -> Option<NaiveDate> {
    let day: u32 = day.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    let mut year: i32 = year.parse().ok()?;
    if year < 100 {
        year += 2000;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Sanitize a filename stem into a low-trust document number.
fn derive_from_filename(stem: &str) -> String {
    let cleaned: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect::<String>()
        .to_uppercase();

    let trimmed = cleaned.trim_matches('-');
    if trimmed.is_empty() {
        "SIN-NUMERO".to_string()
    } else {
        trimmed.chars().take(24).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn resolver() -> HeaderResolver {
        HeaderResolver::new(11)
    }

    #[test]
    fn test_canonical_number_wins() {
        let text = "REMITO N° 0001-00012345\nFecha: 15/03/2024\nCUIT: 30-71234567-8";
        let res = resolver().resolve("acme", text, "scan-001");

        assert_eq!(res.header.invoice_number, "0001-00012345");
        assert_eq!(res.header.number_trust, NumberTrust::Canonical);
        assert_eq!(
            res.header.invoice_date,
            NaiveDate::from_ymd_opt(2024, 3, 15)
        );
    }

    #[test]
    fn test_tax_id_length_is_rejected() {
        // The only labelled candidate is an 11-digit CUIT; it must be
        // rejected and the filename used instead.
        let text = "Comprobante Nro 30712345678\nEntrega de mercaderia";
        let res = resolver().resolve("acme", text, "rem_174");

        assert_eq!(res.header.number_trust, NumberTrust::Filename);
        assert_eq!(res.header.invoice_number, "REM_174");
        assert_eq!(res.rejected_tax_tokens, vec!["30712345678".to_string()]);
    }

    #[test]
    fn test_dashed_cuit_is_rejected() {
        let text = "Documento: 30-71234567-8";
        let res = resolver().resolve("acme", text, "x");
        assert_eq!(res.header.number_trust, NumberTrust::Filename);
        assert_eq!(res.rejected_tax_tokens.len(), 1);
    }

    #[test]
    fn test_labelled_number_accepted() {
        let text = "Remito nro A-4471\nFecha 02/01/24";
        let res = resolver().resolve("acme", text, "x");
        assert_eq!(res.header.invoice_number, "A-4471");
        assert_eq!(res.header.number_trust, NumberTrust::Labelled);
        assert_eq!(res.header.invoice_date, NaiveDate::from_ymd_opt(2024, 1, 2));
    }

    #[test]
    fn test_rates_and_declared_total() {
        let text = "REMITO 0002-00000011\nIVA 10,5%\nBONIF GENERAL 5%\nTOTAL $ 1.234,56";
        let res = resolver().resolve("acme", text, "x");

        assert_eq!(res.header.vat_rate, Decimal::from_str("10.5").unwrap());
        assert_eq!(res.header.global_discount_pct, Decimal::from_str("5").unwrap());
        assert_eq!(
            res.header.declared_total,
            Some(Decimal::from_str("1234.56").unwrap())
        );
    }

    #[test]
    fn test_filename_fallback_sanitized() {
        let res = resolver().resolve("acme", "sin datos", "scan (final) v2");
        assert_eq!(res.header.invoice_number, "SCAN--FINAL--V2");
        assert_eq!(res.header.number_trust, NumberTrust::Filename);
    }
}

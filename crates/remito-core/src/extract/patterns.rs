//! Common regex patterns for supplier remito extraction.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Canonical remito number: point of sale + sequence, anchored at the prefix
    pub static ref REMITO_CANONICAL: Regex = Regex::new(
        r"(?i)\b(?:REMITO|RTO\.?|R)\s*(?:N[°ºo]?\.?\s*|NRO\.?\s*)?[:#]?\s*(\d{4})\s*-\s*(\d{8})\b"
    ).unwrap();

    // Labelled document number (any comprobante label)
    pub static ref NUMBER_LABELLED: Regex = Regex::new(
        r"(?i)(?:remito|comprobante|documento|factura|entrega)\s*(?:n[°ºo]?\.?|nro\.?|num(?:ero)?\.?)?\s*[:#]?\s*([A-Za-z0-9][A-Za-z0-9/\-]{2,18})"
    ).unwrap();

    // CUIT (Argentine tax id): 11 digits, optionally dashed
    pub static ref CUIT_PATTERN: Regex = Regex::new(
        r"\b(\d{2})-?(\d{8})-?(\d)\b"
    ).unwrap();

    // Dates
    pub static ref DATE_DMY: Regex = Regex::new(
        r"\b(\d{1,2})[/\-.](\d{1,2})[/\-.](\d{4}|\d{2})\b"
    ).unwrap();

    pub static ref DATE_LABELLED: Regex = Regex::new(
        r"(?i)(?:fecha(?:\s+de\s+emisi[oó]n)?|emitido|emisi[oó]n)[\s:]*(.+?)(?:\n|$)"
    ).unwrap();

    // Amounts (Spanish format: 1.234,56; plain decimals also accepted)
    pub static ref AMOUNT_PATTERN: Regex = Regex::new(
        r"\$?\s*(\d{1,3}(?:\.\d{3})+,\d{2}|\d+,\d{2}|\d+\.\d{2})\b"
    ).unwrap();

    // Declared document total
    pub static ref TOTAL_LABELLED: Regex = Regex::new(
        r"(?i)\b(?:TOTAL(?:\s+GENERAL)?|IMPORTE\s+TOTAL|TOTAL\s+REMITO)\s*[:$]?\s*\$?\s*(\d{1,3}(?:\.\d{3})*,\d{2}|\d+[.,]\d{2})"
    ).unwrap();

    // Document-wide discount
    pub static ref GLOBAL_DISCOUNT: Regex = Regex::new(
        r"(?i)\b(?:BONIF(?:\.|ICACI[OÓ]N)?\s+GENERAL|DESCUENTO\s+GENERAL|DTO\.?\s+GLOBAL)\s*:?\s*(\d{1,2}(?:[.,]\d{1,2})?)\s*%"
    ).unwrap();

    // IVA rate
    pub static ref IVA_RATE: Regex = Regex::new(
        r"(?i)\bIVA\s*:?\s*(\d{1,2}(?:[.,]\d{1,2})?)\s*%"
    ).unwrap();

    // Standalone discount marker folded into the preceding line
    pub static ref DISCOUNT_MARKER: Regex = Regex::new(
        r"(?i)^\s*(?:DTO\.?|DESC(?:\.|UENTO)?|BONIF(?:\.|ICACI[OÓ]N)?)\s*:?\s*(\d{1,2}(?:[.,]\d{1,2})?)\s*%\s*$"
    ).unwrap();

    // Inline percentage token inside a parsed line
    pub static ref PERCENT_TOKEN: Regex = Regex::new(
        r"^(\d{1,2}(?:[.,]\d{1,2})?)%$"
    ).unwrap();

    // Unit-of-measure tokens that disqualify an adjacent numeric token as a SKU
    pub static ref UNIT_TOKEN: Regex = Regex::new(
        r"(?i)^(?:UN|UNI|U|KG|KGS|GR|GRS|LT|LTS|L|ML|CC|MT|MTS|CM|MM|M2|M3|PK|PACK|CAJA|CJA|DOC|X)\.?$"
    ).unwrap();

    // Candidate supplier SKU token (validated further in code)
    pub static ref SKU_TOKEN: Regex = Regex::new(
        r"^[A-Za-z0-9][A-Za-z0-9./\-]{2,15}$"
    ).unwrap();

    // Table header row of a line-item block
    pub static ref TABLE_HEADER: Regex = Regex::new(
        r"(?i)\b(?:CANT(?:\.|IDAD)?|CTDAD)\b.*\b(?:DETALLE|DESCRIPCI[OÓ]N|ART[IÍ]CULO|PRODUCTO|CONCEPTO)\b|\b(?:DETALLE|DESCRIPCI[OÓ]N|ART[IÍ]CULO|PRODUCTO|CONCEPTO)\b.*\b(?:CANT(?:\.|IDAD)?|CTDAD)\b"
    ).unwrap();

    // Summary rows that terminate a line-item block
    pub static ref TABLE_END: Regex = Regex::new(
        r"(?i)^\s*(?:SUB\s*TOTAL|TOTAL|IMPORTE|SON\s+PESOS|OBSERVACIONES)\b"
    ).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_remito_number() {
        let caps = REMITO_CANONICAL
            .captures("REMITO N° 0001-00012345")
            .unwrap();
        assert_eq!(&caps[1], "0001");
        assert_eq!(&caps[2], "00012345");

        assert!(REMITO_CANONICAL.is_match("Rto. 0003-00000921"));
        assert!(REMITO_CANONICAL.is_match("R 0001 - 00045678"));
        assert!(!REMITO_CANONICAL.is_match("CUIT 30-71234567-8"));
    }

    #[test]
    fn test_cuit_pattern() {
        assert!(CUIT_PATTERN.is_match("30-71234567-8"));
        assert!(CUIT_PATTERN.is_match("30712345678"));
    }

    #[test]
    fn test_discount_marker() {
        let caps = DISCOUNT_MARKER.captures("  DTO 10%  ").unwrap();
        assert_eq!(&caps[1], "10");
        assert!(DISCOUNT_MARKER.is_match("BONIF. 12,5 %"));
        assert!(!DISCOUNT_MARKER.is_match("GASEOSA 2 1500,00 10%"));
    }

    #[test]
    fn test_unit_tokens() {
        for unit in ["ML", "ml", "KG", "UN", "LTS", "CAJA", "un."] {
            assert!(UNIT_TOKEN.is_match(unit), "expected unit match: {unit}");
        }
        assert!(!UNIT_TOKEN.is_match("YERBA"));
    }

    #[test]
    fn test_table_header() {
        assert!(TABLE_HEADER.is_match("CODIGO  DESCRIPCION  CANT  P.UNIT  IMPORTE"));
        assert!(TABLE_HEADER.is_match("Cantidad | Detalle | Precio"));
        assert!(!TABLE_HEADER.is_match("GASEOSA COLA 1.5L"));
    }

    #[test]
    fn test_amounts() {
        assert!(AMOUNT_PATTERN.is_match("$ 1.234,56"));
        assert!(AMOUNT_PATTERN.is_match("1500,00"));
        assert!(AMOUNT_PATTERN.is_match("99.90"));
    }
}

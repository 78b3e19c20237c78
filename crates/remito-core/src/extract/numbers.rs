//! Amount and quantity parsing for Spanish-formatted documents.

use rust_decimal::Decimal;
use std::str::FromStr;

/// Parse a Spanish-formatted amount (e.g., "1.234,56", "1500,00", "99.90").
pub fn parse_amount(s: &str) -> Option<Decimal> {
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    // Whichever separator comes last is the decimal separator.
    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        (Some(c), Some(d)) if c > d => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) => cleaned.replace(',', "."),
        _ => cleaned,
    };

    Decimal::from_str(&normalized).ok()
}

/// Parse a quantity token: up to four integer digits with an optional
/// fraction. Returns `None` for zero or negative values.
pub fn parse_quantity(s: &str) -> Option<Decimal> {
    let s = s.trim();
    if s.is_empty() || s.len() > 9 {
        return None;
    }
    if !s.chars().all(|c| c.is_ascii_digit() || c == ',' || c == '.') {
        return None;
    }

    let int_digits = s
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .count();
    if int_digits == 0 || int_digits > 4 {
        return None;
    }

    let qty = parse_amount(s)?;
    if qty <= Decimal::ZERO { None } else { Some(qty) }
}

/// Clamp a quantity against the configured threshold. Returns the
/// normalized value and whether clamping happened; oversized values are
/// flagged, never kept and never dropped.
pub fn clamp_quantity(qty: Decimal, clamp: Decimal) -> (Decimal, bool) {
    if qty > clamp { (clamp, true) } else { (qty, false) }
}

/// Does this token look like a money amount (two decimal places)?
pub fn is_amount_token(s: &str) -> bool {
    let s = s.trim_start_matches('$').trim();
    super::patterns::AMOUNT_PATTERN
        .find(s)
        .map(|m| m.start() == 0 && m.end() == s.len())
        .unwrap_or(false)
}

/// Format an amount in Spanish style (1.234,56).
pub fn format_amount(amount: Decimal) -> String {
    let s = format!("{:.2}", amount);
    let (int_part, dec_part) = s.split_once('.').unwrap_or((s.as_str(), "00"));

    let (sign, digits) = match int_part.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", int_part),
    };

    let chars: Vec<char> = digits.chars().collect();
    let mut grouped = String::new();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(*c);
    }

    format!("{}{},{}", sign, grouped, dec_part)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1.234,56"), Some(dec("1234.56")));
        assert_eq!(parse_amount("1500,00"), Some(dec("1500.00")));
        assert_eq!(parse_amount("99.90"), Some(dec("99.90")));
        assert_eq!(parse_amount("$ 12.345.678,90"), Some(dec("12345678.90")));
        assert_eq!(parse_amount("1,234.56"), Some(dec("1234.56")));
        assert_eq!(parse_amount(""), None);
    }

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("5"), Some(dec("5")));
        assert_eq!(parse_quantity("2,5"), Some(dec("2.5")));
        assert_eq!(parse_quantity("0"), None);
        assert_eq!(parse_quantity("12345"), None);
        assert_eq!(parse_quantity("x3"), None);
    }

    #[test]
    fn test_clamp_quantity() {
        let clamp = dec("9999");
        assert_eq!(clamp_quantity(dec("10"), clamp), (dec("10"), false));
        assert_eq!(clamp_quantity(dec("50000"), clamp), (dec("9999"), true));
    }

    #[test]
    fn test_is_amount_token() {
        assert!(is_amount_token("1.234,56"));
        assert!(is_amount_token("$1500,00"));
        assert!(!is_amount_token("1234"));
        assert!(!is_amount_token("GASEOSA"));
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(dec("1234.56")), "1.234,56");
        assert_eq!(format_amount(dec("12345678.9")), "12.345.678,90");
        assert_eq!(format_amount(dec("-950")), "-950,00");
    }
}

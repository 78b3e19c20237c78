//! AI fallback oracle adapter.
//!
//! The oracle is a schema-constrained external collaborator. The adapter
//! owns the fixed response schema, strict validation, and bounded retries;
//! a non-conforming response is a failure, never partially accepted.

use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use tracing::warn;

use crate::error::OracleError;
use crate::models::draft::{LineSource, LinkState, PurchaseLine};

/// Request handed to the oracle: raw text plus classic-pipeline hints.
#[derive(Debug, Clone)]
pub struct OracleRequest {
    pub raw_text: String,
    pub hint_lines: usize,
    pub hint_confidence: f32,
}

/// One schema-validated oracle line.
#[derive(Debug, Clone)]
pub struct OracleLine {
    pub sku: Option<String>,
    pub title: String,
    pub qty: Decimal,
    pub unit_cost: Decimal,
    pub discount_pct: Option<Decimal>,
}

/// Schema-validated oracle header fields.
#[derive(Debug, Clone, Default)]
pub struct OracleHeader {
    pub invoice_number: Option<String>,
    pub invoice_date: Option<String>,
}

/// A fully validated oracle extraction.
#[derive(Debug, Clone)]
pub struct OracleExtraction {
    pub header: OracleHeader,
    pub lines: Vec<OracleLine>,
}

/// External oracle transport. Implementations own their timeouts.
pub trait OracleClient: Send + Sync {
    /// Ask the oracle for an extraction; returns the raw JSON response.
    fn extract(&self, request: &OracleRequest) -> Result<Value, OracleError>;
}

/// Adapter wrapping a client with schema validation and bounded retries.
pub struct OracleAdapter {
    client: Box<dyn OracleClient>,
    max_attempts: u32,
}

impl OracleAdapter {
    pub fn new(client: Box<dyn OracleClient>, max_attempts: u32) -> Self {
        Self {
            client,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Run the oracle with bounded retries. Every failed attempt is logged;
    /// exhaustion degrades to an error the pipeline absorbs.
    pub fn extract(&self, request: &OracleRequest) -> Result<OracleExtraction, OracleError> {
        for attempt in 1..=self.max_attempts {
            match self.client.extract(request) {
                Ok(value) => match validate_response(&value) {
                    Ok(extraction) => return Ok(extraction),
                    Err(e) => {
                        warn!(attempt, error = %e, "oracle response failed schema validation");
                    }
                },
                Err(e) => {
                    warn!(attempt, error = %e, "oracle call failed");
                    if !e.is_retryable() {
                        return Err(e);
                    }
                }
            }
        }

        Err(OracleError::Exhausted {
            attempts: self.max_attempts,
        })
    }
}

const LINE_FIELDS: [&str; 5] = ["sku", "title", "qty", "unit_cost", "discount_pct"];

/// Validate a raw oracle response against the fixed schema:
/// `{header?, lines: [{sku?, title, qty, unit_cost, discount_pct?}]}`.
pub fn validate_response(value: &Value) -> Result<OracleExtraction, OracleError> {
    let root = value
        .as_object()
        .ok_or_else(|| schema_err("response is not an object"))?;

    let header = match root.get("header") {
        None | Some(Value::Null) => OracleHeader::default(),
        Some(h) => {
            let h = h
                .as_object()
                .ok_or_else(|| schema_err("header is not an object"))?;
            OracleHeader {
                invoice_number: opt_string(h.get("invoice_number"), "header.invoice_number")?,
                invoice_date: opt_string(h.get("invoice_date"), "header.invoice_date")?,
            }
        }
    };

    let lines_value = root
        .get("lines")
        .ok_or_else(|| schema_err("missing lines array"))?
        .as_array()
        .ok_or_else(|| schema_err("lines is not an array"))?;

    let mut lines = Vec::with_capacity(lines_value.len());
    for (i, line) in lines_value.iter().enumerate() {
        lines.push(validate_line(line, i)?);
    }

    Ok(OracleExtraction { header, lines })
}

fn validate_line(value: &Value, index: usize) -> Result<OracleLine, OracleError> {
    let obj = value
        .as_object()
        .ok_or_else(|| schema_err(&format!("lines[{index}] is not an object")))?;

    for key in obj.keys() {
        if !LINE_FIELDS.contains(&key.as_str()) {
            return Err(schema_err(&format!("lines[{index}] has unknown field '{key}'")));
        }
    }

    let title = obj
        .get("title")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| schema_err(&format!("lines[{index}] missing non-empty title")))?;

    let qty = required_decimal(obj.get("qty"), index, "qty")?;
    if qty <= Decimal::ZERO {
        return Err(schema_err(&format!("lines[{index}].qty must be > 0")));
    }

    let unit_cost = required_decimal(obj.get("unit_cost"), index, "unit_cost")?;
    if unit_cost < Decimal::ZERO {
        return Err(schema_err(&format!("lines[{index}].unit_cost must be >= 0")));
    }

    let discount_pct = match obj.get("discount_pct") {
        None | Some(Value::Null) => None,
        some => Some(required_decimal(some, index, "discount_pct")?),
    };

    Ok(OracleLine {
        sku: opt_string(obj.get("sku"), &format!("lines[{index}].sku"))?,
        title: title.to_string(),
        qty,
        unit_cost,
        discount_pct,
    })
}

fn required_decimal(value: Option<&Value>, index: usize, field: &str) -> Result<Decimal, OracleError> {
    let value = value.ok_or_else(|| schema_err(&format!("lines[{index}] missing {field}")))?;
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .map_err(|_| schema_err(&format!("lines[{index}].{field} is not a valid number"))),
        _ => Err(schema_err(&format!("lines[{index}].{field} is not a number"))),
    }
}

fn opt_string(value: Option<&Value>, field: &str) -> Result<Option<String>, OracleError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(schema_err(&format!("{field} is not a string"))),
    }
}

fn schema_err(msg: &str) -> OracleError {
    OracleError::Schema(msg.to_string())
}

impl OracleLine {
    /// Convert into a draft line, tagged oracle-sourced.
    pub fn into_purchase_line(self) -> PurchaseLine {
        let mut line = PurchaseLine::new(self.title, self.qty, self.unit_cost);
        line.supplier_sku = self.sku;
        line.discount_pct = self.discount_pct;
        line.source = LineSource::Oracle;
        line.link_state = LinkState::Unmatched;
        line.confidence = 0.6;
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// Client that plays back a scripted sequence of responses.
    struct ScriptedClient {
        responses: Mutex<Vec<Result<Value, OracleError>>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<Result<Value, OracleError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
            }
        }
    }

    impl OracleClient for ScriptedClient {
        fn extract(&self, _request: &OracleRequest) -> Result<Value, OracleError> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Err(OracleError::Transport("script exhausted".to_string()))
            } else {
                responses.remove(0)
            }
        }
    }

    fn request() -> OracleRequest {
        OracleRequest {
            raw_text: "texto".to_string(),
            hint_lines: 0,
            hint_confidence: 0.0,
        }
    }

    fn valid_response() -> Value {
        json!({
            "header": {"invoice_number": "0001-00000001"},
            "lines": [
                {"sku": "YER-500", "title": "YERBA SUAVE", "qty": 2, "unit_cost": 1850.0},
                {"title": "AZUCAR COMUN", "qty": 5, "unit_cost": 950.0, "discount_pct": 10}
            ]
        })
    }

    #[test]
    fn test_valid_response_accepted() {
        let extraction = validate_response(&valid_response()).unwrap();
        assert_eq!(extraction.lines.len(), 2);
        assert_eq!(extraction.lines[0].sku.as_deref(), Some("YER-500"));
        assert_eq!(
            extraction.header.invoice_number.as_deref(),
            Some("0001-00000001")
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        let response = json!({
            "lines": [{"title": "X", "qty": 1, "unit_cost": 1.0, "total": 1.0}]
        });
        assert!(matches!(
            validate_response(&response),
            Err(OracleError::Schema(_))
        ));
    }

    #[test]
    fn test_non_positive_qty_rejected() {
        let response = json!({
            "lines": [{"title": "X", "qty": 0, "unit_cost": 1.0}]
        });
        assert!(matches!(
            validate_response(&response),
            Err(OracleError::Schema(_))
        ));
    }

    #[test]
    fn test_missing_lines_rejected() {
        assert!(matches!(
            validate_response(&json!({"header": {}})),
            Err(OracleError::Schema(_))
        ));
    }

    #[test]
    fn test_adapter_retries_then_succeeds() {
        let client = ScriptedClient::new(vec![
            Ok(json!({"lines": "garbage"})),
            Ok(valid_response()),
        ]);
        let adapter = OracleAdapter::new(Box::new(client), 2);

        let extraction = adapter.extract(&request()).unwrap();
        assert_eq!(extraction.lines.len(), 2);
    }

    #[test]
    fn test_adapter_exhausts_after_bounded_attempts() {
        let client = ScriptedClient::new(vec![
            Err(OracleError::Transport("down".to_string())),
            Err(OracleError::Transport("down".to_string())),
            Ok(valid_response()),
        ]);
        let adapter = OracleAdapter::new(Box::new(client), 2);

        assert!(matches!(
            adapter.extract(&request()),
            Err(OracleError::Exhausted { attempts: 2 })
        ));
    }
}

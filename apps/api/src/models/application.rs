use serde::Serialize;
use serde_json::{json, Map, Value};

/// Loan data as structured by the LLM. No schema is enforced; `warnings`
/// lists what a credit officer would expect to see but the model did not return.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuredApplication {
    pub data: Value,
    /// False when the reply was not JSON and `data` is the `{"data": <raw>}` wrapper.
    pub parsed: bool,
    pub warnings: Vec<String>,
}

impl StructuredApplication {
    pub fn from_object(data: Map<String, Value>) -> Self {
        let data = Value::Object(data);
        let warnings = check_loan_fields(&data);
        Self {
            data,
            parsed: true,
            warnings,
        }
    }

    /// Wraps an unparseable reply verbatim.
    pub fn from_raw(raw: &str) -> Self {
        Self {
            data: json!({ "data": raw }),
            parsed: false,
            warnings: vec![
                "The model reply was not valid JSON; it is kept as raw text under \"data\"."
                    .to_string(),
            ],
        }
    }
}

const AMOUNT_KEYS: &[&str] = &["amount", "principal"];
const TERM_KEYS: &[&str] = &["term", "tenor", "duration"];
const BORROWER_KEYS: &[&str] = &["name", "borrower", "applicant", "initials"];

/// Lenient presence check for the fields a credit assessment depends on.
/// Matches any nested key containing one of the hints, ignoring case and punctuation.
pub fn check_loan_fields(data: &Value) -> Vec<String> {
    let mut warnings = Vec::new();
    if !has_field(data, AMOUNT_KEYS) {
        warnings.push("No loan amount found in the structured data.".to_string());
    }
    if !has_field(data, TERM_KEYS) {
        warnings.push("No loan term found in the structured data.".to_string());
    }
    if !has_field(data, BORROWER_KEYS) {
        warnings.push("No borrower identity found in the structured data.".to_string());
    }
    warnings
}

fn has_field(value: &Value, hints: &[&str]) -> bool {
    match value {
        Value::Object(map) => map.iter().any(|(key, v)| {
            let key = normalize_key(key);
            (hints.iter().any(|h| key.contains(h)) && is_present(v)) || has_field(v, hints)
        }),
        Value::Array(items) => items.iter().any(|v| has_field(v, hints)),
        _ => false,
    }
}

fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        _ => true,
    }
}

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

pub const AMOUNT_FIELD: &str = "Amount";
pub const DEFAULT_REFERENCE_FIELD: &str = "pnr";
/// Width of the stored reference column.
pub const MAX_REFERENCE_LENGTH: usize = 100;

/// First rule an initiation body violated. The display text is returned to the caller verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("request is empty.")]
    EmptyRequest,

    #[error("missing key ~ <{0}>.")]
    MissingKey(String),

    #[error("<{0}> cannot be empty.")]
    EmptyValue(String),

    #[error("<{0}> must be a number.")]
    NotANumber(String),

    #[error("<{0}> cannot be less than or equal to zero.")]
    NotPositive(String),

    #[error("<{0}> must be a string.")]
    NotAString(String),

    #[error("<{0}> cannot be longer than {1} characters.")]
    TooLong(String, usize),
}

pub type ValidationResult<T> = Result<T, ValidationError>;

/// A normalized initiation request: `Amount` coerced to an integer, reference rendered as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentRequest {
    pub reference: String,
    pub amount: i64,
}

/// Checks initiation bodies field by field and stops at the first failure.
#[derive(Debug, Clone)]
pub struct Validator {
    reference_field: String,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(DEFAULT_REFERENCE_FIELD)
    }
}

impl Validator {
    pub fn new(reference_field: impl Into<String>) -> Self {
        Self {
            reference_field: reference_field.into(),
        }
    }

    /// `body` is `None` when the request could not be parsed as JSON at all.
    pub fn validate(&self, body: Option<&Value>) -> ValidationResult<PaymentRequest> {
        let fields = match body {
            Some(Value::Object(map)) if !map.is_empty() => map,
            _ => return Err(ValidationError::EmptyRequest),
        };

        // Presence and emptiness of every field come before any value parsing.
        let amount = required(fields, AMOUNT_FIELD)?;
        let reference = required(fields, &self.reference_field)?;

        let amount = parse_amount(AMOUNT_FIELD, amount)?;

        let reference = match reference {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return Err(ValidationError::NotAString(self.reference_field.clone())),
        };
        if reference.chars().count() > MAX_REFERENCE_LENGTH {
            return Err(ValidationError::TooLong(
                self.reference_field.clone(),
                MAX_REFERENCE_LENGTH,
            ));
        }

        Ok(PaymentRequest { reference, amount })
    }
}

/// Presence (`null` counts as absent) followed by non-emptiness.
fn required<'a>(fields: &'a Map<String, Value>, field: &str) -> ValidationResult<&'a Value> {
    let value = match fields.get(field) {
        None | Some(Value::Null) => return Err(ValidationError::MissingKey(field.to_string())),
        Some(value) => value,
    };

    let empty = match value {
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    };
    if empty {
        return Err(ValidationError::EmptyValue(field.to_string()));
    }

    Ok(value)
}

fn parse_amount(field: &str, value: &Value) -> ValidationResult<i64> {
    let amount = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| ValidationError::NotANumber(field.to_string()))?;

    if amount <= 0 {
        return Err(ValidationError::NotPositive(field.to_string()));
    }

    Ok(amount)
}

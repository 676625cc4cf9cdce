use serde::Serialize;
use serde_json::{Number, Value};

/// A creation request that passed [`validate_create_paste`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreatePasteRequest {
    pub content: String,
    pub ttl_seconds: Option<i64>,
    pub max_views: Option<i64>,
}

/// Every rule the request broke, in field order.
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    pub errors: Vec<String>,
}

/// Checks a raw JSON body. All violations are collected; nothing is coerced,
/// so `"60"` is not an integer. A body that is not an object has no fields.
///
/// # Errors
/// Will return [`Err`] listing one message per violated rule.
pub fn validate_create_paste(body: &Value) -> Result<CreatePasteRequest, ValidationErrors> {
    let mut errors = Vec::new();

    let content = match body.get("content") {
        Some(Value::String(content)) if content.is_empty() => {
            errors.push("content cannot be empty".to_owned());
            None
        }
        Some(Value::String(content)) => Some(content.clone()),
        _ => {
            errors.push("content must be a string".to_owned());
            None
        }
    };
    let ttl_seconds = positive_integer_field(body, "ttl_seconds", &mut errors);
    let max_views = positive_integer_field(body, "max_views", &mut errors);

    match content {
        Some(content) if errors.is_empty() => Ok(CreatePasteRequest {
            content,
            ttl_seconds,
            max_views,
        }),
        _ => Err(ValidationErrors { errors }),
    }
}

/// Absent and `null` both mean "not set".
fn positive_integer_field(body: &Value, field: &str, errors: &mut Vec<String>) -> Option<i64> {
    match body.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::Number(number)) => match integer_value(number) {
            Some(value) if value >= 1 => Some(value),
            Some(_) => {
                errors.push(format!("{field} must be a positive integer"));
                None
            }
            None => {
                errors.push(format!("{field} must be an integer"));
                None
            }
        },
        Some(_) => {
            errors.push(format!("{field} must be an integer"));
            None
        }
    }
}

/// Integer-valued numbers, including ones written with a fractional part like `5.0`.
/// Out-of-range values saturate.
#[allow(clippy::cast_possible_truncation)]
fn integer_value(number: &Number) -> Option<i64> {
    if let Some(value) = number.as_i64() {
        return Some(value);
    }
    if number.as_u64().is_some() {
        return Some(i64::MAX);
    }
    number
        .as_f64()
        .filter(|value| value.is_finite() && value.fract() == 0.0)
        .map(|value| value as i64)
}

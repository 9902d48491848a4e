//! Request body validation against closed-world shapes.
//!
//! A `Shape` is a schema-by-example: scalar leaves carry an example value whose
//! JSON type is enforced, objects list exactly the keys they accept, arrays
//! give a repeating template, and `Optional` marks a slot that may be absent,
//! `null` or `""`.

use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::error::{ApiError, ApiResult, codes};

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Leaf(Value),
    Array(Vec<Shape>),
    Object(Vec<(&'static str, Shape)>),
    Optional(Box<Shape>),
}

impl Shape {
    pub fn string(example: &str) -> Self {
        Self::Leaf(Value::from(example))
    }

    pub fn number(example: i64) -> Self {
        Self::Leaf(Value::from(example))
    }

    pub fn boolean(example: bool) -> Self {
        Self::Leaf(Value::Bool(example))
    }

    pub fn null() -> Self {
        Self::Leaf(Value::Null)
    }

    pub fn array(template: impl IntoIterator<Item = Shape>) -> Self {
        Self::Array(template.into_iter().collect())
    }

    pub fn object(fields: impl IntoIterator<Item = (&'static str, Shape)>) -> Self {
        Self::Object(fields.into_iter().collect())
    }

    pub fn optional(self) -> Self {
        match self {
            Self::Optional(_) => self,
            other => Self::Optional(Box::new(other)),
        }
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, Self::Optional(_))
    }

    /// JSON type name this slot requires.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Leaf(example) => json_type(example),
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Optional(inner) => inner.type_name(),
        }
    }

    /// A payload that satisfies this shape, optional fields included.
    pub fn example(&self) -> Value {
        match self {
            Self::Leaf(example) => example.clone(),
            Self::Array(template) => Value::Array(template.iter().map(Shape::example).collect()),
            Self::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(key, shape)| (key.to_string(), shape.example()))
                    .collect::<Map<_, _>>(),
            ),
            Self::Optional(inner) => inner.example(),
        }
    }
}

pub fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Check `actual` against `expected` and hand it back untouched.
///
/// `None` means the request carried no JSON body at all, which usually means
/// the client forgot the `Content-Type` header.
pub fn validate(actual: Option<Value>, expected: &Shape) -> ApiResult<Value> {
    let Some(value) = actual else {
        if expected.is_optional() {
            return Ok(Value::Null);
        }
        return Err(ApiError::bad_request(
            codes::INVALID_BODY,
            "Request body is missing; send JSON with Content-Type: application/json",
        )
        .with_data(json!({
            "expected": expected.type_name(),
            "actual": "undefined",
            "example": expected.example(),
        })));
    };

    Validator { root: expected }.check(&value, expected, &[])?;
    Ok(value)
}

struct Validator<'a> {
    root: &'a Shape,
}

impl Validator<'_> {
    fn check(&self, actual: &Value, expected: &Shape, path: &[String]) -> ApiResult<()> {
        if let Shape::Optional(inner) = expected {
            if is_blank(actual) {
                return Ok(());
            }
            return self.check(actual, inner, path);
        }

        let actual_type = json_type(actual);
        if actual_type != expected.type_name() {
            let path = display_path(path);
            return Err(ApiError::bad_request(
                codes::INVALID_BODY,
                format!(
                    "Expected {path} to be of type {}, got {actual_type}",
                    expected.type_name()
                ),
            )
            .with_data(json!({
                "path": path,
                "expected": expected.type_name(),
                "actual": actual_type,
                "example": self.root.example(),
            })));
        }

        match (expected, actual) {
            (Shape::Leaf(_), Value::String(s)) if s.is_empty() => {
                let path = display_path(path);
                Err(ApiError::bad_request(
                    codes::INVALID_BODY,
                    format!("{path} cannot be empty"),
                )
                .with_data(json!({ "path": path })))
            }
            (Shape::Array(template), Value::Array(values)) if !template.is_empty() => {
                for (i, value) in values.iter().enumerate() {
                    let shape = &template[i % template.len()];
                    self.check(value, shape, &child(path, i.to_string()))?;
                }
                Ok(())
            }
            (Shape::Object(fields), Value::Object(map)) => self.check_object(fields, map, path),
            _ => Ok(()),
        }
    }

    fn check_object(
        &self,
        fields: &[(&'static str, Shape)],
        map: &Map<String, Value>,
        path: &[String],
    ) -> ApiResult<()> {
        let missing: Vec<&str> = fields
            .iter()
            .filter(|(key, shape)| !shape.is_optional() && !map.contains_key(*key))
            .map(|(key, _)| *key)
            .collect();
        if !missing.is_empty() {
            return Err(ApiError::bad_request(
                codes::MISSING_FIELDS,
                format!("{} is missing fields: {}", display_path(path), missing.join(", ")),
            )
            .with_data(json!({ "path": display_path(path), "fields": missing })));
        }

        let unexpected: Vec<&str> = map
            .keys()
            .map(String::as_str)
            .filter(|key| !fields.iter().any(|(name, _)| name == key))
            .collect();
        if !unexpected.is_empty() {
            return Err(ApiError::bad_request(
                codes::UNEXPECTED_FIELDS,
                format!(
                    "{} has unexpected fields: {}",
                    display_path(path),
                    unexpected.join(", ")
                ),
            )
            .with_data(json!({ "path": display_path(path), "fields": unexpected })));
        }

        for (key, shape) in fields {
            if let Some(value) = map.get(*key) {
                self.check(value, shape, &child(path, key.to_string()))?;
            }
        }
        Ok(())
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

fn child(path: &[String], segment: String) -> Vec<String> {
    let mut next = path.to_vec();
    next.push(segment);
    next
}

fn display_path(path: &[String]) -> String {
    let joined = path
        .iter()
        .filter(|segment| !segment.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(".");
    if joined.is_empty() {
        "body".to_string()
    } else {
        joined
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("not a number")]
pub struct NotANumber;

/// Strict numeric parse for route and query parameters: an optional sign
/// followed by ASCII digits, or `Infinity`. Nothing else is a number.
pub fn parse_strict_number(raw: &str) -> Result<f64, NotANumber> {
    let (negative, unsigned) = match raw.as_bytes().first() {
        Some(b'-') => (true, &raw[1..]),
        Some(b'+') => (false, &raw[1..]),
        _ => (false, raw),
    };

    if unsigned == "Infinity" {
        return Ok(if negative { f64::NEG_INFINITY } else { f64::INFINITY });
    }
    if unsigned.is_empty() || !unsigned.bytes().all(|b| b.is_ascii_digit()) {
        return Err(NotANumber);
    }
    raw.parse().map_err(|_| NotANumber)
}

/// Parse a route id segment, rejecting anything that is not an `i64`.
pub fn route_id(name: &str, raw: &str) -> ApiResult<i64> {
    let invalid = || {
        ApiError::bad_request(
            codes::INVALID_ROUTE_PARAM,
            format!("Route parameter {name} must be an integer, got {raw:?}"),
        )
        .with_data(json!({ "param": name, "value": raw }))
    };

    parse_strict_number(raw).map_err(|_| invalid())?;
    raw.parse::<i64>().map_err(|_| invalid())
}

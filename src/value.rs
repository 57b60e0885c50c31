use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A single scalar as it appears in a row field or a calculation result.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Text(String),
    Boolean(bool),
    Absent,
}

impl Value {
    /// Best-effort cast to a number. Anything that does not look numeric becomes NaN.
    pub fn to_number(&self) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Boolean(true) => 1.0,
            Value::Boolean(false) => 0.0,
            Value::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    0.0
                } else if is_decimal_literal(trimmed) {
                    trimmed.parse::<f64>().unwrap_or(f64::NAN)
                } else {
                    f64::NAN
                }
            }
            Value::Absent => f64::NAN,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Text(s) => !s.is_empty(),
            Value::Boolean(b) => *b,
            Value::Absent => false,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    /// Text form used by string functions and concatenation. Absent renders as "".
    pub fn to_text(&self) -> String {
        match self {
            Value::Absent => String::new(),
            other => other.to_string(),
        }
    }

    /// True when the value is text that does not coerce to a number.
    pub fn is_non_numeric_text(&self) -> bool {
        matches!(self, Value::Text(_)) && self.to_number().is_nan()
    }

    /// Equality used by `==`: numeric when both sides coerce, otherwise textual.
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Absent, Value::Absent) => true,
            (Value::Absent, _) | (_, Value::Absent) => false,
            _ => {
                let (a, b) = (self.to_number(), other.to_number());
                if a.is_nan() || b.is_nan() {
                    self.to_text() == other.to_text()
                } else {
                    a == b
                }
            }
        }
    }

    /// Ordering used by `<`, `<=`, `>` and `>=`. `None` when the values are not comparable.
    pub fn loose_cmp(&self, other: &Value) -> Option<Ordering> {
        let (a, b) = (self.to_number(), other.to_number());
        if !a.is_nan() && !b.is_nan() {
            return a.partial_cmp(&b);
        }
        match (self, other) {
            (Value::Text(x), Value::Text(y)) => Some(x.cmp(y)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => format_number(*n, f),
            Value::Text(s) => write!(f, "{}", s),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Absent => write!(f, "null"),
        }
    }
}

// `f64::from_str` also takes "inf", "infinity" and "NaN", which are text here.
fn is_decimal_literal(text: &str) -> bool {
    text.bytes()
        .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'))
}

fn format_number(n: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if n.is_nan() {
        write!(f, "NaN")
    } else if n.is_infinite() {
        write!(f, "{}Infinity", if n < 0.0 { "-" } else { "" })
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        write!(f, "{}", n as i64)
    } else {
        write!(f, "{}", n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&serde_json::Value> for Value {
    fn from(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Absent,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => n.as_f64().map_or(Value::Absent, Value::Number),
            serde_json::Value::String(s) => Value::Text(s.clone()),
            nested => Value::Text(nested.to_string()),
        }
    }
}

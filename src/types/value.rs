use std::cmp::Ordering;
use std::fmt;

use chrono::NaiveDateTime;

use super::operator::Operator;

const DATE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Scalar values a rule can compare a field against.
///
/// `Null` is the sentinel for "field not present" in `=`/`!=` comparisons,
/// and an unrestricted bound for `<`/`>`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    /// A 64-bit signed integer.
    Int(i64),
    /// A 64-bit floating-point number.
    Float(f64),
    /// A UTF-8 string.
    Str(String),
    /// A calendar date-time, encoded in array form as `"%Y-%m-%dT%H:%M:%S"`.
    Date(NaiveDateTime),
}

impl Value {
    /// Resolve loose typing once, at construction time: a string that reads
    /// as a number becomes that number, one that reads as a date-time
    /// becomes a `Date`. All later comparisons are typed, so `"3"` and `3`
    /// unify no matter in which order they were inserted.
    #[must_use]
    pub fn canonicalized(self) -> Value {
        let Value::Str(s) = self else {
            return self;
        };
        if let Ok(i) = s.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(f) = s.parse::<f64>() {
            return Value::Float(f);
        }
        for format in DATE_FORMATS {
            if let Ok(dt) = NaiveDateTime::parse_from_str(&s, format) {
                return Value::Date(dt);
            }
        }
        if let Ok(d) = s.parse::<chrono::NaiveDate>() {
            return Value::Date(d.and_hms_opt(0, 0, 0).unwrap_or_default());
        }
        Value::Str(s)
    }

    /// Compare this value to another using the given comparison operator.
    /// Returns `None` for incomparable kinds and for non-comparison
    /// operators (`in`, `!in`, `regexp`).
    #[must_use]
    pub fn compare(&self, op: Operator, other: &Value) -> Option<bool> {
        let ord = self.partial_cmp_value(other)?;
        Some(match op {
            Operator::Equal => ord == Ordering::Equal,
            Operator::NotEqual => ord != Ordering::Equal,
            Operator::Above => ord == Ordering::Greater,
            Operator::AboveOrEqual => ord != Ordering::Less,
            Operator::Below => ord == Ordering::Less,
            Operator::BelowOrEqual => ord != Ordering::Greater,
            Operator::In | Operator::NotIn | Operator::Regexp => return None,
        })
    }

    /// Equality after canonicalization; incomparable kinds are not equal.
    #[must_use]
    pub fn loose_eq(&self, other: &Value) -> bool {
        self.partial_cmp_value(other) == Some(Ordering::Equal)
    }

    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn partial_cmp_value(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
            (Value::Date(a), Value::Date(b)) => a.partial_cmp(b),
            _ => None,
        }
    }

    /// Total order used for deterministic tie-breaks during unification.
    /// Kinds sort as Null < Bool < numbers < Str < Date; incomparable
    /// numbers (NaN) sort last within their kind.
    #[must_use]
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        fn kind_rank(v: &Value) -> u8 {
            match v {
                Value::Null => 0,
                Value::Bool(_) => 1,
                Value::Int(_) | Value::Float(_) => 2,
                Value::Str(_) => 3,
                Value::Date(_) => 4,
            }
        }
        match kind_rank(self).cmp(&kind_rank(other)) {
            Ordering::Equal => match (self.is_nan(), other.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => self.partial_cmp_value(other).unwrap_or(Ordering::Equal),
            },
            unequal => unequal,
        }
    }

    #[must_use]
    pub fn is_nan(&self) -> bool {
        matches!(self, Value::Float(f) if f.is_nan())
    }

    #[must_use]
    pub fn is_positive_infinity(&self) -> bool {
        matches!(self, Value::Float(f) if f.is_infinite() && *f > 0.0)
    }

    #[must_use]
    pub fn is_negative_infinity(&self) -> bool {
        matches!(self, Value::Float(f) if f.is_infinite() && *f < 0.0)
    }

    /// Textual form used by the `regexp` operator when matching
    /// non-string values.
    #[must_use]
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Str(s) => Some(s.clone()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            _ => None,
        }
    }

    pub(crate) fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::Str(s) => serde_json::Value::from(s.as_str()),
            Value::Date(d) => serde_json::Value::from(d.format("%Y-%m-%dT%H:%M:%S").to_string()),
        }
    }

    pub(crate) fn from_json(v: &serde_json::Value) -> Option<Value> {
        match v {
            serde_json::Value::Null => Some(Value::Null),
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Value::Int(i))
                } else {
                    n.as_f64().map(Value::Float)
                }
            }
            serde_json::Value::String(s) => Some(Value::Str(s.clone()).canonicalized()),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Date(v)
    }
}

impl serde::Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "'{v}'"),
            Value::Date(v) => write!(f, "'{}'", v.format("%Y-%m-%dT%H:%M:%S")),
        }
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// A dynamic value held by a flag: boolean, number or string.
///
/// Serialized untagged so the JSON form is the bare literal
/// (`true`, `100`, `"knight"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(f64),
    String(String),
}

impl Value {
    /// Truthiness used by `is_set`: everything except `false`, `0` and `""`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Number(n) => *n != 0.0,
            Self::String(s) => !s.is_empty(),
        }
    }

    /// Numeric view used by the ordering operators.
    ///
    /// Booleans count as 1/0 and strings are parsed; a string that is not a
    /// number yields NaN, which makes every ordering comparison false.
    pub fn as_number(&self) -> f64 {
        match self {
            Self::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Self::Number(n) => *n,
            Self::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => write!(f, "{}", s),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

/// The eight operators a condition can apply to a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    IsSet,
    IsNotSet,
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    GreaterEqual,
    LessEqual,
}

impl Operator {
    /// All operators except `is_set`/`is_not_set` compare against a value.
    pub fn requires_value(&self) -> bool {
        !matches!(self, Self::IsSet | Self::IsNotSet)
    }

    /// Script symbol for comparison operators (`==`, `>=`, ...).
    pub fn symbol(&self) -> Option<&'static str> {
        match self {
            Self::IsSet | Self::IsNotSet => None,
            Self::Equals => Some("=="),
            Self::NotEquals => Some("!="),
            Self::GreaterThan => Some(">"),
            Self::LessThan => Some("<"),
            Self::GreaterEqual => Some(">="),
            Self::LessEqual => Some("<="),
        }
    }

    /// Parse a comparison operator written in a script expression.
    ///
    /// Accepts the symbolic forms plus Yarn's word operators.
    pub fn from_symbol(symbol: &str) -> Option<Operator> {
        match symbol {
            "==" | "is" | "eq" => Some(Self::Equals),
            "!=" | "neq" => Some(Self::NotEquals),
            ">" | "gt" => Some(Self::GreaterThan),
            "<" | "lt" => Some(Self::LessThan),
            ">=" | "gte" => Some(Self::GreaterEqual),
            "<=" | "lte" => Some(Self::LessEqual),
            _ => None,
        }
    }
}

/// A single test against a named flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub flag: String,
    pub operator: Operator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Condition {
    pub fn is_set(flag: impl Into<String>) -> Self {
        Self {
            flag: flag.into(),
            operator: Operator::IsSet,
            value: None,
        }
    }

    pub fn is_not_set(flag: impl Into<String>) -> Self {
        Self {
            flag: flag.into(),
            operator: Operator::IsNotSet,
            value: None,
        }
    }

    pub fn compare(flag: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            flag: flag.into(),
            operator,
            value: Some(value.into()),
        }
    }
}

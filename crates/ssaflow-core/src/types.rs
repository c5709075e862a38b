//! Value types and constant literals.
//!
//! Front-end languages are dynamically or loosely typed, so [`SsaType`] is a
//! structural, best-effort annotation rather than a checked type system. A
//! value without a type is simply untyped (`None` on the instruction).

use std::fmt;

use serde::{Deserialize, Serialize};

/// Structural type attached to a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SsaType {
    Any,
    Null,
    Boolean,
    Number,
    String,
    Bytes,
    /// Ordered sequence of one element type.
    Slice(Box<SsaType>),
    /// Key/value container.
    Map { key: Box<SsaType>, value: Box<SsaType> },
    /// Named object or class instance.
    Object { name: String },
    /// Callable signature.
    Function {
        params: Vec<SsaType>,
        returns: Vec<SsaType>,
        variadic: bool,
    },
}

impl fmt::Display for SsaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SsaType::Any => write!(f, "any"),
            SsaType::Null => write!(f, "null"),
            SsaType::Boolean => write!(f, "boolean"),
            SsaType::Number => write!(f, "number"),
            SsaType::String => write!(f, "string"),
            SsaType::Bytes => write!(f, "bytes"),
            SsaType::Slice(elem) => write!(f, "[]{}", elem),
            SsaType::Map { key, value } => write!(f, "map[{}]{}", key, value),
            SsaType::Object { name } => write!(f, "{}", name),
            SsaType::Function {
                params,
                returns,
                variadic,
            } => {
                let params: Vec<String> = params.iter().map(|p| p.to_string()).collect();
                let returns: Vec<String> = returns.iter().map(|r| r.to_string()).collect();
                write!(
                    f,
                    "func({}{}) {}",
                    params.join(", "),
                    if *variadic { "..." } else { "" },
                    returns.join(", ")
                )
            }
        }
    }
}

/// Literal carried by a `Const` instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConstValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl ConstValue {
    /// Type implied by the literal.
    pub fn ty(&self) -> SsaType {
        match self {
            ConstValue::Null => SsaType::Null,
            ConstValue::Bool(_) => SsaType::Boolean,
            ConstValue::Int(_) | ConstValue::Float(_) => SsaType::Number,
            ConstValue::Str(_) => SsaType::String,
        }
    }

    /// Returns the literal as an integer index, if it is one.
    pub fn as_index(&self) -> Option<i64> {
        match self {
            ConstValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Returns the string payload for string constants.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConstValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

/// Raw rendering: strings are printed without quotes, which is what name
/// matching compares against.
impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Null => write!(f, "null"),
            ConstValue::Bool(b) => write!(f, "{}", b),
            ConstValue::Int(i) => write!(f, "{}", i),
            ConstValue::Float(x) => write!(f, "{}", x),
            ConstValue::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for ConstValue {
    fn from(s: &str) -> Self {
        ConstValue::Str(s.to_string())
    }
}

impl From<i64> for ConstValue {
    fn from(i: i64) -> Self {
        ConstValue::Int(i)
    }
}

impl From<i32> for ConstValue {
    fn from(i: i32) -> Self {
        ConstValue::Int(i64::from(i))
    }
}

impl From<String> for ConstValue {
    fn from(s: String) -> Self {
        ConstValue::Str(s)
    }
}

impl From<bool> for ConstValue {
    fn from(b: bool) -> Self {
        ConstValue::Bool(b)
    }
}

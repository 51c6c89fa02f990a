//! Runtime value representation.
//!
//! [`Value`] is the single tagged type that flows through the data stack,
//! bindings, and the executable's constant/binding tables. Equality is
//! structural for atoms and element-wise for lists (§3); function, foreign,
//! and future values compare by identity since they name a thing rather
//! than holding data to compare.

use std::fmt;
use std::sync::Arc;

use crate::future::Future;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Bindings captured by a closure at the point its `FunctionPtr` was
/// constructed (§4.D "Closure construction", §9).
pub type Bindings = std::collections::HashMap<String, Value>;

/// A runtime value.
///
/// `Clone` is cheap: lists, strings, and captures are the only variants
/// that own heap data, and they are only cloned when a value moves between
/// stack slots or bindings — never mutated in place (§4.A: lists are
/// immutable at the VM level).
#[derive(Debug, Clone)]
pub enum Value {
    /// Double-precision real number.
    Number(f64),
    /// A string value.
    String(String),
    /// An identifier used for lookup. Rarely appears as data; included for
    /// fidelity with the value model (§3).
    Symbol(String),
    Bool(bool),
    /// The empty-list-compatible singleton.
    Null,
    /// An ordered, possibly heterogeneous, finite list.
    List(Vec<Value>),
    /// A pointer to a compiled function, with an optional snapshot of
    /// bindings captured at closure-construction time.
    FunctionPtr {
        id: String,
        captures: Option<Arc<Bindings>>,
    },
    /// A pointer to a host (foreign) function.
    ForeignPtr { name: String, module: String },
    /// The name of a built-in primitive usable as a callable.
    InstructionRef(String),
    /// An opaque handle to a controller-owned future.
    FutureHandle(Arc<Future>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Symbol(_) => "symbol",
            Value::Bool(_) => "bool",
            Value::Null => "null",
            Value::List(_) => "list",
            Value::FunctionPtr { .. } => "function",
            Value::ForeignPtr { .. } => "foreign",
            Value::InstructionRef(_) => "instruction",
            Value::FutureHandle(_) => "future",
        }
    }

    /// True iff the argument is not a list (used by the `atomp` builtin).
    pub fn is_atom(&self) -> bool {
        !matches!(self, Value::List(_))
    }

    /// True iff the argument is the empty list, or `Null` standing in for
    /// it (used by the `nullp` builtin).
    pub fn is_null_list(&self) -> bool {
        match self {
            Value::Null => true,
            Value::List(items) => items.is_empty(),
            _ => false,
        }
    }

    /// View this value as a list, treating `Null` as the empty list. Used
    /// wherever a list or `Null` are interchangeable (§4.A).
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            Value::Null => Some(&[]),
            _ => None,
        }
    }

    pub fn is_future(&self) -> bool {
        matches!(self, Value::FutureHandle(_))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Null, Value::Null) => true,
            // Null and the empty list compare equal as lists (§4.A).
            (Value::Null, Value::List(items)) | (Value::List(items), Value::Null) => {
                items.is_empty()
            }
            (Value::List(a), Value::List(b)) => a == b,
            (Value::FunctionPtr { id: a, .. }, Value::FunctionPtr { id: b, .. }) => a == b,
            (
                Value::ForeignPtr {
                    name: n1,
                    module: m1,
                },
                Value::ForeignPtr {
                    name: n2,
                    module: m2,
                },
            ) => n1 == n2 && m1 == m2,
            (Value::InstructionRef(a), Value::InstructionRef(b)) => a == b,
            (Value::FutureHandle(a), Value::FutureHandle(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Symbol(s) => write!(f, "{s}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Null => write!(f, "null"),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::FunctionPtr { id, .. } => write!(f, "<function {id}>"),
            Value::ForeignPtr { name, module } => write!(f, "<foreign {module}.{name}>"),
            Value::InstructionRef(name) => write!(f, "<builtin {name}>"),
            Value::FutureHandle(fut) => write!(f, "<future {:p}>", Arc::as_ptr(fut)),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

/// Wire form of [`Value`] for the `serde` feature: identical to `Value`
/// except `FunctionPtr` carries only its `id` (captures are never present
/// on a value worth serializing — see below) and there is no variant for
/// `FutureHandle`, which names a live, in-process future and has no
/// meaningful representation as data.
#[cfg(feature = "serde")]
#[derive(Serialize, Deserialize)]
enum WireValue {
    Number(f64),
    String(String),
    Symbol(String),
    Bool(bool),
    Null,
    List(Vec<Value>),
    FunctionPtr { id: String },
    ForeignPtr { name: String, module: String },
    InstructionRef(String),
}

#[cfg(feature = "serde")]
impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::Error;
        let wire = match self {
            Value::Number(n) => WireValue::Number(*n),
            Value::String(s) => WireValue::String(s.clone()),
            Value::Symbol(s) => WireValue::Symbol(s.clone()),
            Value::Bool(b) => WireValue::Bool(*b),
            Value::Null => WireValue::Null,
            Value::List(items) => WireValue::List(items.clone()),
            Value::FunctionPtr { id, .. } => WireValue::FunctionPtr { id: id.clone() },
            Value::ForeignPtr { name, module } => WireValue::ForeignPtr {
                name: name.clone(),
                module: module.clone(),
            },
            Value::InstructionRef(name) => WireValue::InstructionRef(name.clone()),
            Value::FutureHandle(_) => {
                return Err(S::Error::custom("cannot serialize a live future handle"))
            }
        };
        wire.serialize(serializer)
    }
}

#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(match WireValue::deserialize(deserializer)? {
            WireValue::Number(n) => Value::Number(n),
            WireValue::String(s) => Value::String(s),
            WireValue::Symbol(s) => Value::Symbol(s),
            WireValue::Bool(b) => Value::Bool(b),
            WireValue::Null => Value::Null,
            WireValue::List(items) => Value::List(items),
            WireValue::FunctionPtr { id } => Value::FunctionPtr { id, captures: None },
            WireValue::ForeignPtr { name, module } => Value::ForeignPtr { name, module },
            WireValue::InstructionRef(name) => Value::InstructionRef(name),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::{assert_eq, assert_ne};

    #[test]
    fn null_equals_empty_list() {
        assert_eq!(Value::Null, Value::List(vec![]));
        assert_eq!(Value::List(vec![]), Value::Null);
    }

    #[test]
    fn lists_compare_elementwise() {
        let a = Value::List(vec![Value::Number(1.0), Value::Number(2.0)]);
        let b = Value::List(vec![Value::Number(1.0), Value::Number(2.0)]);
        let c = Value::List(vec![Value::Number(1.0), Value::Number(3.0)]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn function_ptrs_compare_by_identifier_not_captures() {
        let a = Value::FunctionPtr {
            id: "#0:f".to_string(),
            captures: None,
        };
        let mut captures = Bindings::new();
        captures.insert("x".to_string(), Value::Number(1.0));
        let b = Value::FunctionPtr {
            id: "#0:f".to_string(),
            captures: Some(Arc::new(captures)),
        };
        assert_eq!(a, b);
    }

    #[test]
    fn atomp_and_nullp() {
        assert!(Value::Number(1.0).is_atom());
        assert!(!Value::List(vec![]).is_atom());
        assert!(Value::Null.is_null_list());
        assert!(Value::List(vec![]).is_null_list());
        assert!(!Value::List(vec![Value::Number(1.0)]).is_null_list());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn round_trips_through_json_except_futures() {
        let value = Value::List(vec![
            Value::Number(1.0),
            Value::String("hi".to_string()),
            Value::FunctionPtr {
                id: "#0:f".to_string(),
                captures: None,
            },
        ]);
        let json = serde_json::to_string(&value).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value, back);

        let fut = Value::FutureHandle(Arc::new(Future::new()));
        assert!(serde_json::to_string(&fut).is_err());
    }
}

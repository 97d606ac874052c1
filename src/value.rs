//! Canonical runtime value type for the agent execution engine.
//!
//! Every atom and expression produces or consumes a `Value`. The type is
//! deeply compositional: arrays and maps may contain any other value,
//! including nested arrays and maps. `Null` is the "absent" value used
//! throughout the evaluator for missing identifiers, optional-chaining
//! short circuits, and uninitialized slots.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Opaque, shared-by-reference capability handle carried as a first-class value.
///
/// Handles are never serialized back out to program-visible JSON; they only
/// flow between atoms within a single run (e.g. a cursor returned by
/// `store.query`).
#[derive(Clone)]
pub struct CapabilityHandle {
    pub label: String,
    pub payload: Arc<dyn std::any::Any + Send + Sync>,
}

impl fmt::Debug for CapabilityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CapabilityHandle({})", self.label)
    }
}

impl PartialEq for CapabilityHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.payload, &other.payload)
    }
}

/// An opaque handle to a stored procedure (see `crate::procedures`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcToken(pub String);

impl fmt::Display for ProcToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The monadic error carrier: `{ $error: true, message, op }` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorValue {
    #[serde(rename = "$error")]
    pub marker: bool,
    pub message: String,
    pub op: String,
}

impl ErrorValue {
    pub fn new(op: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            marker: true,
            message: message.into(),
            op: op.into(),
        }
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (in {})", self.message, self.op)
    }
}

/// Dynamic tagged value for the engine.
///
/// `Int`/`Float` are kept distinct (see `DESIGN.md`) but coerce losslessly at arithmetic and
/// comparison boundaries so the observable semantics match a single
/// dynamic numeric type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Map(IndexMap<String, Value>),
    #[serde(skip)]
    Capability(CapabilityHandle),
    Proc(ProcToken),
    Error(ErrorValue),
    /// A `Set` instance. Structural, not reference-identity:
    /// mutating methods (`add`/`remove`/`clear`) return a new `Set` rather
    /// than aliasing the original, consistent with every other `Value`
    /// variant in this engine being plain owned data (see DESIGN.md).
    Set(Vec<Value>),
    /// A `Date` instance: milliseconds since the Unix epoch, UTC.
    Date(i64),
    /// A built-in namespace or top-level function marker (`Math`, `Set`,
    /// `parseInt`, ...). Never produced by program JSON and never
    /// serialized back out — see `crate::builtins`.
    #[serde(skip)]
    Builtin(crate::builtins::Builtin),
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Capability(_) => "capability",
            Value::Proc(_) => "proc",
            Value::Error(_) => "error",
            Value::Set(_) => "set",
            Value::Date(_) => "date",
            Value::Builtin(_) => "builtin",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// JS-like truthiness: `null`, `false`, `0`, `""`, `NaN` are falsy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Map(_) | Value::Capability(_) | Value::Proc(_) => true,
            Value::Error(_) => true,
            Value::Set(_) | Value::Date(_) | Value::Builtin(_) => true,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a.as_slice()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn number(n: f64) -> Value {
        if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
            Value::Int(n as i64)
        } else {
            Value::Float(n)
        }
    }

    /// Stringifies for templating/concatenation (`String(x)` semantics).
    pub fn stringify(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Date(ms) => serde_json::Value::String(crate::builtins::date::millis_to_iso(*ms)),
            Value::Builtin(_) => serde_json::Value::Null,
            Value::Set(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            _ => serde_json::to_value(self).unwrap_or(serde_json::Value::Null),
        }
    }

    pub fn from_json(v: serde_json::Value) -> Value {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(arr) => {
                Value::Array(arr.into_iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => Value::Map(
                map.into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Capability(a), Value::Capability(b)) => a == b,
            (Value::Proc(a), Value::Proc(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Builtin(a), Value::Builtin(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{k}:{v}")?;
                }
                write!(f, "}}")
            }
            Value::Capability(c) => write!(f, "<capability:{}>", c.label),
            Value::Proc(t) => write!(f, "<proc:{t}>"),
            Value::Error(e) => write!(f, "<error:{e}>"),
            Value::Set(items) => {
                write!(f, "Set(")?;
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, ")")
            }
            Value::Date(ms) => write!(f, "{}", crate::builtins::date::millis_to_iso(*ms)),
            Value::Builtin(_) => write!(f, "<builtin>"),
        }
    }
}

/// The closed set of forbidden property / method / identifier names.
/// Accessing any of these — by member, method call, or dot-path string —
/// is a security violation: the prototype pollution guard.
pub fn forbidden_properties() -> &'static HashSet<&'static str> {
    use once_cell::sync::Lazy;
    static SET: Lazy<HashSet<&'static str>> = Lazy::new(|| {
        ["__proto__", "constructor", "prototype"]
            .into_iter()
            .collect()
    });
    &SET
}

pub fn is_forbidden_property(name: &str) -> bool {
    forbidden_properties().contains(name)
}

//! The safe built-ins pool: a closed set of
//! namespaces, top-level functions, and instance factories available to
//! program identifiers. Nothing here reaches the host filesystem,
//! network, or process — those live behind capabilities
//! (`crate::capability`), not the built-ins pool.

pub mod date;
pub mod math;

use indexmap::IndexMap;

use crate::error::kind;
use crate::value::{is_forbidden_property, ErrorValue, Value};

/// A built-in namespace object (`Math`, `JSON`, `Array`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Namespace {
    Math,
    Json,
    ArrayNs,
    ObjectNs,
    StringNs,
    NumberNs,
    UriNs,
    SchemaNs,
    SetCtor,
    DateCtor,
}

/// A directly-callable top-level function name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopFn {
    ParseInt,
    ParseFloat,
    IsNaN,
    IsFinite,
    EncodeUriComponent,
    DecodeUriComponent,
    EncodeUri,
    DecodeUri,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Namespace(Namespace),
    Fn(TopFn),
}

/// The outcome of resolving a bare identifier against the built-ins pool,
/// distinguishing "not a built-in at all" (caller falls through to
/// absent) from "named and explicitly denied" (a fixed, helpful message).
pub enum IdentResolution {
    Value(Value),
    Denied(String),
    Absent,
}

/// Names denied with a fixed, helpful message.
fn denial_message(name: &str) -> Option<String> {
    Some(match name {
        "process" => "`process` is not available in the sandbox".to_string(),
        "globalThis" | "window" | "global" => {
            format!("`{name}` is not available in the sandbox")
        }
        "Promise" => "`Promise` is not available in the sandbox".to_string(),
        "eval" | "Function" => format!("`{name}` is not available in the sandbox"),
        "setTimeout" | "setInterval" | "clearTimeout" | "clearInterval" => {
            format!("`{name}` is not available in the sandbox")
        }
        "fetch" | "XMLHttpRequest" => {
            format!("`{name}` is not available in the sandbox; use the `httpFetch` atom")
        }
        "RegExp" => "`RegExp` is not available in the sandbox; use `regexMatch`".to_string(),
        "require" | "import" => format!("`{name}` is not available in the sandbox"),
        _ => return None,
    })
}

/// Resolves a bare identifier against the built-ins pool.
pub fn resolve_ident(name: &str) -> IdentResolution {
    if let Some(msg) = denial_message(name) {
        return IdentResolution::Denied(msg);
    }
    use IdentResolution::Value as V;
    match name {
        "Math" => V(Value::Builtin(Builtin::Namespace(Namespace::Math))),
        "JSON" => V(Value::Builtin(Builtin::Namespace(Namespace::Json))),
        "Array" => V(Value::Builtin(Builtin::Namespace(Namespace::ArrayNs))),
        "Object" => V(Value::Builtin(Builtin::Namespace(Namespace::ObjectNs))),
        "String" => V(Value::Builtin(Builtin::Namespace(Namespace::StringNs))),
        "Number" => V(Value::Builtin(Builtin::Namespace(Namespace::NumberNs))),
        "Schema" => V(Value::Builtin(Builtin::Namespace(Namespace::SchemaNs))),
        "Set" => V(Value::Builtin(Builtin::Namespace(Namespace::SetCtor))),
        "Date" => V(Value::Builtin(Builtin::Namespace(Namespace::DateCtor))),
        "parseInt" => V(Value::Builtin(Builtin::Fn(TopFn::ParseInt))),
        "parseFloat" => V(Value::Builtin(Builtin::Fn(TopFn::ParseFloat))),
        "isNaN" => V(Value::Builtin(Builtin::Fn(TopFn::IsNaN))),
        "isFinite" => V(Value::Builtin(Builtin::Fn(TopFn::IsFinite))),
        "encodeURIComponent" => V(Value::Builtin(Builtin::Fn(TopFn::EncodeUriComponent))),
        "decodeURIComponent" => V(Value::Builtin(Builtin::Fn(TopFn::DecodeUriComponent))),
        "encodeURI" => V(Value::Builtin(Builtin::Fn(TopFn::EncodeUri))),
        "decodeURI" => V(Value::Builtin(Builtin::Fn(TopFn::DecodeUri))),
        "undefined" | "null" => V(Value::Null),
        "NaN" => V(Value::Float(f64::NAN)),
        "Infinity" => V(Value::Float(f64::INFINITY)),
        _ => IdentResolution::Absent,
    }
}

/// Invokes a top-level built-in function name directly (a `call` node
/// whose callee is not `"Error"`), including the `Set`/`Date` factories.
pub fn call_top_level(op: &str, callee: &str, args: &[Value]) -> Result<Value, ErrorValue> {
    match callee {
        "Set" => Ok(construct_set(args)),
        "Date" => date::construct(args),
        "parseInt" => Ok(parse_int(args)),
        "parseFloat" => Ok(parse_float(args)),
        "isNaN" => Ok(Value::Bool(
            args.first().and_then(Value::as_f64).map(f64::is_nan).unwrap_or(true),
        )),
        "isFinite" => Ok(Value::Bool(
            args.first().and_then(Value::as_f64).map(f64::is_finite).unwrap_or(false),
        )),
        "encodeURIComponent" => uri_encode(args, true),
        "decodeURIComponent" => uri_decode(args, true),
        "encodeURI" => uri_encode(args, false),
        "decodeURI" => uri_decode(args, false),
        other => Err(kind::validation(op, format!("'{other}' is not callable"))),
    }
}

fn parse_int(args: &[Value]) -> Value {
    let s = args.first().map(Value::stringify).unwrap_or_default();
    let trimmed = s.trim();
    let radix = args.get(1).and_then(Value::as_f64).map(|n| n as u32).unwrap_or(10);
    let digits: String = trimmed
        .chars()
        .take_while(|c| c.is_digit(radix.max(2)) || *c == '-' || *c == '+')
        .collect();
    match i64::from_str_radix(digits.trim_start_matches('+'), radix.max(2)) {
        Ok(n) => Value::Int(n),
        Err(_) => Value::Float(f64::NAN),
    }
}

fn parse_float(args: &[Value]) -> Value {
    let s = args.first().map(Value::stringify).unwrap_or_default();
    let trimmed = s.trim();
    let prefix: String = {
        let mut seen_dot = false;
        let mut seen_digit = false;
        trimmed
            .chars()
            .take_while(|c| {
                if c.is_ascii_digit() {
                    seen_digit = true;
                    true
                } else if *c == '.' && !seen_dot {
                    seen_dot = true;
                    true
                } else if (*c == '-' || *c == '+') && !seen_digit {
                    true
                } else {
                    false
                }
            })
            .collect()
    };
    prefix.parse::<f64>().map(Value::Float).unwrap_or(Value::Float(f64::NAN))
}

fn uri_encode(args: &[Value], component: bool) -> Result<Value, ErrorValue> {
    let s = args.first().map(Value::stringify).unwrap_or_default();
    let reserved: &[u8] = if component {
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_.!~*'()"
    } else {
        b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_.!~*'();/?:@&=+$,#"
    };
    let mut out = String::new();
    for b in s.as_bytes() {
        if reserved.contains(b) {
            out.push(*b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    Ok(Value::String(out))
}

fn uri_decode(args: &[Value], _component: bool) -> Result<Value, ErrorValue> {
    let s = args.first().map(Value::stringify).unwrap_or_default();
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let Ok(b) = u8::from_str_radix(&s[i + 1..i + 3], 16) {
                out.push(b);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out)
        .map(Value::String)
        .map_err(|_| kind::type_error("decodeURIComponent", "invalid percent-encoding"))
}

fn construct_set(args: &[Value]) -> Value {
    let mut items: Vec<Value> = Vec::new();
    if let Some(Value::Array(init)) = args.first() {
        for item in init {
            if !items.contains(item) {
                items.push(item.clone());
            }
        }
    }
    Value::Set(items)
}

/// Property access on a built-in namespace or a `Date` instance
/// (`Math.PI`, `Number.MAX_SAFE_INTEGER`, `aDate.year`).
pub fn member_get(op: &str, receiver: &Value, property: &str) -> Result<Value, ErrorValue> {
    if is_forbidden_property(property) {
        return Err(kind::security(op, property));
    }
    match receiver {
        Value::Builtin(Builtin::Namespace(Namespace::Math)) => math::constant(property)
            .ok_or_else(|| kind::unsupported_global(op, &format!("Math.{property}"))),
        Value::Builtin(Builtin::Namespace(Namespace::NumberNs)) => {
            number_constant(property).ok_or_else(|| {
                kind::unsupported_global(op, &format!("Number.{property}"))
            })
        }
        Value::Date(ms) => date::accessor(*ms, property)
            .ok_or_else(|| kind::unsupported_global(op, &format!("Date.{property}"))),
        Value::Set(items) => match property {
            "size" => Ok(Value::Int(items.len() as i64)),
            _ => Err(kind::unsupported_global(op, &format!("Set.{property}"))),
        },
        other => Err(kind::type_error(
            op,
            format!("cannot read property '{property}' of {}", other.type_name()),
        )),
    }
}

fn number_constant(name: &str) -> Option<Value> {
    Some(match name {
        "MIN_SAFE_INTEGER" => Value::Int(-(2i64.pow(53) - 1)),
        "MAX_SAFE_INTEGER" => Value::Int(2i64.pow(53) - 1),
        "MIN_VALUE" => Value::Float(f64::MIN_POSITIVE),
        "MAX_VALUE" => Value::Float(f64::MAX),
        "EPSILON" => Value::Float(f64::EPSILON),
        "POSITIVE_INFINITY" => Value::Float(f64::INFINITY),
        "NEGATIVE_INFINITY" => Value::Float(f64::NEG_INFINITY),
        "NaN" => Value::Float(f64::NAN),
        _ => return None,
    })
}

/// `methodCall` dispatch for built-in namespaces and instances
/// (`Math.sqrt(x)`, `aSet.add(v)`, `aDate.format(...)`).
pub fn method_call(
    op: &str,
    receiver: &Value,
    method: &str,
    args: &[Value],
) -> Result<Value, ErrorValue> {
    if is_forbidden_property(method) {
        return Err(kind::security(op, method));
    }
    match receiver {
        Value::Builtin(Builtin::Namespace(Namespace::Math)) => math::call(method, args),
        Value::Builtin(Builtin::Namespace(Namespace::Json)) => json_method(method, args),
        Value::Builtin(Builtin::Namespace(Namespace::ArrayNs)) => array_static(method, args),
        Value::Builtin(Builtin::Namespace(Namespace::ObjectNs)) => object_static(op, method, args),
        Value::Builtin(Builtin::Namespace(Namespace::StringNs)) => string_static(method, args),
        Value::Builtin(Builtin::Namespace(Namespace::NumberNs)) => number_static(method, args),
        Value::Builtin(Builtin::Namespace(Namespace::SchemaNs)) => schema_method(method, args),
        Value::Builtin(Builtin::Namespace(Namespace::DateCtor)) => match method {
            "now" => Ok(date::now()),
            "parse" => {
                let s = args.first().and_then(Value::as_str).unwrap_or_default();
                date::parse(s)
                    .map(Value::Date)
                    .ok_or_else(|| kind::type_error(op, format!("Date.parse: could not parse '{s}'")))
            }
            other => Err(kind::unsupported_global(op, &format!("Date.{other}"))),
        },
        Value::Date(ms) => date::method(op, *ms, method, args),
        Value::Set(items) => set_method(op, items, method, args),
        other => Err(kind::type_error(
            op,
            format!("no method '{method}' on {}", other.type_name()),
        )),
    }
}

fn json_method(method: &str, args: &[Value]) -> Result<Value, ErrorValue> {
    let op = "JSON";
    match method {
        "parse" => {
            let s = args.first().and_then(Value::as_str).ok_or_else(|| {
                kind::type_error(op, "JSON.parse expects a string")
            })?;
            serde_json::from_str::<serde_json::Value>(s)
                .map(Value::from_json)
                .map_err(|e| kind::validation(op, format!("JSON.parse: {e}")))
        }
        "stringify" => {
            let v = args.first().cloned().unwrap_or(Value::Null);
            serde_json::to_string(&v.to_json())
                .map(Value::String)
                .map_err(|e| kind::type_error(op, format!("JSON.stringify: {e}")))
        }
        other => Err(kind::unsupported_global(op, &format!("JSON.{other}"))),
    }
}

fn array_static(method: &str, args: &[Value]) -> Result<Value, ErrorValue> {
    let op = "Array";
    match method {
        "isArray" => Ok(Value::Bool(matches!(args.first(), Some(Value::Array(_))))),
        "of" => Ok(Value::Array(args.to_vec())),
        "from" => match args.first() {
            Some(Value::Array(a)) => Ok(Value::Array(a.clone())),
            Some(Value::Set(s)) => Ok(Value::Array(s.clone())),
            Some(Value::String(s)) => {
                Ok(Value::Array(s.chars().map(|c| Value::String(c.to_string())).collect()))
            }
            Some(Value::Int(n)) => Ok(Value::Array(vec![Value::Null; (*n).max(0) as usize])),
            _ => Err(kind::type_error(op, "Array.from: unsupported source")),
        },
        other => Err(kind::unsupported_global(op, &format!("Array.{other}"))),
    }
}

fn object_static(op: &str, method: &str, args: &[Value]) -> Result<Value, ErrorValue> {
    match method {
        "keys" => map_of(op, args)
            .map(|m| Value::Array(m.keys().cloned().map(Value::String).collect())),
        "values" => map_of(op, args).map(|m| Value::Array(m.values().cloned().collect())),
        "entries" => map_of(op, args).map(|m| {
            Value::Array(
                m.iter()
                    .map(|(k, v)| Value::Array(vec![Value::String(k.clone()), v.clone()]))
                    .collect(),
            )
        }),
        "fromEntries" => {
            let arr = args
                .first()
                .and_then(Value::as_array)
                .ok_or_else(|| kind::type_error(op, "Object.fromEntries expects an array"))?;
            let mut out = IndexMap::new();
            for entry in arr {
                let pair = entry
                    .as_array()
                    .ok_or_else(|| kind::type_error(op, "Object.fromEntries: entry is not a pair"))?;
                let key = pair
                    .first()
                    .and_then(Value::as_str)
                    .ok_or_else(|| kind::type_error(op, "Object.fromEntries: key is not a string"))?;
                let value = pair.get(1).cloned().unwrap_or(Value::Null);
                out.insert(key.to_string(), value);
            }
            Ok(Value::Map(out))
        }
        "assign" => {
            let mut out = IndexMap::new();
            for a in args {
                if let Value::Map(m) = a {
                    for (k, v) in m {
                        out.insert(k.clone(), v.clone());
                    }
                }
            }
            Ok(Value::Map(out))
        }
        "hasOwn" => {
            let m = map_of(op, args)?;
            let key = args
                .get(1)
                .and_then(Value::as_str)
                .ok_or_else(|| kind::type_error(op, "Object.hasOwn expects a key string"))?;
            Ok(Value::Bool(m.contains_key(key)))
        }
        "create" | "defineProperty" | "getPrototypeOf" | "setPrototypeOf" => {
            Err(kind::security(op, &format!("Object.{method}")))
        }
        other => Err(kind::unsupported_global(op, &format!("Object.{other}"))),
    }
}

fn map_of<'a>(op: &str, args: &'a [Value]) -> Result<&'a IndexMap<String, Value>, ErrorValue> {
    args.first()
        .and_then(Value::as_map)
        .ok_or_else(|| kind::type_error(op, "expected a map/object argument"))
}

fn string_static(method: &str, args: &[Value]) -> Result<Value, ErrorValue> {
    let op = "String";
    match method {
        "fromCharCode" => {
            let mut s = String::new();
            for a in args {
                let code = a.as_f64().ok_or_else(|| {
                    kind::type_error(op, "String.fromCharCode expects numeric codes")
                })? as u32;
                s.push(char::from_u32(code).unwrap_or('\u{FFFD}'));
            }
            Ok(Value::String(s))
        }
        "fromCodePoint" => string_static("fromCharCode", args),
        other => Err(kind::unsupported_global(op, &format!("String.{other}"))),
    }
}

fn number_static(method: &str, args: &[Value]) -> Result<Value, ErrorValue> {
    let op = "Number";
    match method {
        "isNaN" => Ok(Value::Bool(
            matches!(args.first(), Some(Value::Float(n)) if n.is_nan()),
        )),
        "isFinite" => Ok(Value::Bool(
            matches!(args.first(), Some(v) if v.as_f64().map(f64::is_finite).unwrap_or(false)),
        )),
        "isInteger" => {
            let is_numeric = matches!(args.first(), Some(Value::Int(_)) | Some(Value::Float(_)));
            let is_whole = args
                .first()
                .and_then(Value::as_f64)
                .map(|n| n.fract() == 0.0)
                .unwrap_or(false);
            Ok(Value::Bool(is_numeric && is_whole))
        }
        "isSafeInteger" => {
            let n = args.first().and_then(Value::as_f64).unwrap_or(f64::NAN);
            Ok(Value::Bool(n.fract() == 0.0 && n.abs() <= (2i64.pow(53) - 1) as f64))
        }
        "parseFloat" => Ok(parse_float(args)),
        "parseInt" => Ok(parse_int(args)),
        other => Err(kind::unsupported_global(op, &format!("Number.{other}"))),
    }
}

/// `Schema` is treated as opaque: `response` and
/// `fromExample` wrap a property set into a descriptor-shaped map,
/// `isValid` does a shallow required-key structural check.
fn schema_method(method: &str, args: &[Value]) -> Result<Value, ErrorValue> {
    let op = "Schema";
    match method {
        "response" | "fromExample" => {
            let mut properties = IndexMap::new();
            if let Some(Value::Map(m)) = args.first() {
                for (k, v) in m {
                    properties.insert(k.clone(), v.clone());
                }
            }
            let mut out = IndexMap::new();
            out.insert("properties".to_string(), Value::Map(properties));
            Ok(Value::Map(out))
        }
        "isValid" => {
            let value = args.first().cloned().unwrap_or(Value::Null);
            let schema = args.get(1).and_then(Value::as_map);
            let required = schema
                .and_then(|s| s.get("properties"))
                .and_then(Value::as_map);
            let ok = match (required, value.as_map()) {
                (Some(props), Some(m)) => props.keys().all(|k| m.contains_key(k)),
                (Some(_), None) => false,
                (None, _) => true,
            };
            Ok(Value::Bool(ok))
        }
        other => Err(kind::unsupported_global(op, &format!("Schema.{other}"))),
    }
}

fn set_method(
    op: &str,
    items: &[Value],
    method: &str,
    args: &[Value],
) -> Result<Value, ErrorValue> {
    match method {
        "has" => Ok(Value::Bool(args.first().map(|v| items.contains(v)).unwrap_or(false))),
        "size" => Ok(Value::Int(items.len() as i64)),
        "add" => {
            let mut out = items.to_vec();
            if let Some(v) = args.first() {
                if !out.contains(v) {
                    out.push(v.clone());
                }
            }
            Ok(Value::Set(out))
        }
        "remove" => {
            let mut out = items.to_vec();
            if let Some(v) = args.first() {
                out.retain(|x| x != v);
            }
            Ok(Value::Set(out))
        }
        "clear" => Ok(Value::Set(Vec::new())),
        "union" => {
            let mut out = items.to_vec();
            if let Some(Value::Set(other)) = args.first() {
                for v in other {
                    if !out.contains(v) {
                        out.push(v.clone());
                    }
                }
            }
            Ok(Value::Set(out))
        }
        "intersection" => {
            let other = match args.first() {
                Some(Value::Set(o)) => o.clone(),
                _ => Vec::new(),
            };
            Ok(Value::Set(items.iter().filter(|v| other.contains(v)).cloned().collect()))
        }
        "diff" => {
            let other = match args.first() {
                Some(Value::Set(o)) => o.clone(),
                _ => Vec::new(),
            };
            Ok(Value::Set(items.iter().filter(|v| !other.contains(v)).cloned().collect()))
        }
        "toArray" | "toJSON" => Ok(Value::Array(items.to_vec())),
        "map" | "filter" | "forEach" => Err(kind::validation(
            op,
            format!("Set.{method} requires expression steps; use the `map`/`filter` atoms over `toArray()`"),
        )),
        other => Err(kind::unsupported_global(op, &format!("Set.{other}"))),
    }
}

//! `Date` factory and instance methods.
//!
//! Instances are stored as `Value::Date(millis_since_epoch_utc)`; all
//! arithmetic and formatting goes through `chrono` (proleptic Gregorian,
//! UTC-normalized).

use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::error::kind;
use crate::value::{ErrorValue, Value};

fn to_datetime(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_else(|| DateTime::from_timestamp(0, 0).unwrap())
}

pub fn millis_to_iso(ms: i64) -> String {
    to_datetime(ms).to_rfc3339()
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// `Date(init?)`: no argument → now; a number → epoch millis; a string →
/// RFC3339/ISO parse.
pub fn construct(args: &[Value]) -> Result<Value, ErrorValue> {
    let op = "Date";
    match args.first() {
        None => Ok(Value::Date(now_millis())),
        Some(Value::Int(n)) => Ok(Value::Date(*n)),
        Some(Value::Float(n)) => Ok(Value::Date(*n as i64)),
        Some(Value::String(s)) => parse(s).map(Value::Date).ok_or_else(|| {
            kind::type_error(op, format!("Date: could not parse '{s}'"))
        }),
        Some(other) => Err(kind::type_error(
            op,
            format!("Date: cannot construct from {}", other.type_name()),
        )),
    }
}

pub fn parse(s: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.timestamp_millis())
        .ok()
}

pub fn now() -> Value {
    Value::Date(now_millis())
}

/// Accessors (`Date.year`, `.month`, ...) — property access, not calls.
pub fn accessor(ms: i64, name: &str) -> Option<Value> {
    let dt = to_datetime(ms);
    Some(match name {
        "year" => Value::Int(dt.year() as i64),
        "month" => Value::Int(dt.month() as i64),
        "day" => Value::Int(dt.day() as i64),
        "hours" => Value::Int(dt.hour() as i64),
        "minutes" => Value::Int(dt.minute() as i64),
        "seconds" => Value::Int(dt.second() as i64),
        "dayOfWeek" => Value::Int(dt.weekday().num_days_from_sunday() as i64),
        "timestamp" | "value" => Value::Int(ms),
        _ => return None,
    })
}

fn other_ms(op: &str, args: &[Value], i: usize) -> Result<i64, ErrorValue> {
    match args.get(i) {
        Some(Value::Date(ms)) => Ok(*ms),
        Some(Value::Int(n)) => Ok(*n),
        Some(Value::Float(n)) => Ok(*n as i64),
        _ => Err(kind::type_error(op, "expected a Date or epoch-millis argument")),
    }
}

/// Methods (`add`, `diff`, `format`, `isBefore`, `isAfter`, `toJSON`, `toString`).
pub fn method(op: &str, ms: i64, method: &str, args: &[Value]) -> Result<Value, ErrorValue> {
    match method {
        "add" => {
            let amount = args
                .first()
                .and_then(Value::as_f64)
                .ok_or_else(|| kind::type_error(op, "Date.add expects a numeric amount"))?;
            let unit = args
                .get(1)
                .and_then(Value::as_str)
                .unwrap_or("milliseconds");
            let delta_ms = unit_to_millis(unit, amount).ok_or_else(|| {
                kind::type_error(op, format!("Date.add: unknown unit '{unit}'"))
            })?;
            Ok(Value::Date(ms + delta_ms))
        }
        "diff" => {
            let other = other_ms(op, args, 0)?;
            let unit = args.get(1).and_then(Value::as_str).unwrap_or("milliseconds");
            let delta_ms = (ms - other) as f64;
            Ok(Value::number(millis_to_unit(unit, delta_ms).ok_or_else(|| {
                kind::type_error(op, format!("Date.diff: unknown unit '{unit}'"))
            })?))
        }
        "format" => {
            let pattern = args.get(0).and_then(Value::as_str).unwrap_or("%Y-%m-%dT%H:%M:%S%.3fZ");
            Ok(Value::String(to_datetime(ms).format(pattern).to_string()))
        }
        "isBefore" => Ok(Value::Bool(ms < other_ms(op, args, 0)?)),
        "isAfter" => Ok(Value::Bool(ms > other_ms(op, args, 0)?)),
        "toJSON" | "toString" => Ok(Value::String(millis_to_iso(ms))),
        other => Err(kind::unsupported_global(op, &format!("Date.{other}"))),
    }
}

fn unit_to_millis(unit: &str, amount: f64) -> Option<i64> {
    let factor = match unit {
        "milliseconds" | "ms" => 1.0,
        "seconds" | "s" => 1_000.0,
        "minutes" | "m" => 60_000.0,
        "hours" | "h" => 3_600_000.0,
        "days" | "d" => 86_400_000.0,
        _ => return None,
    };
    Some((amount * factor) as i64)
}

fn millis_to_unit(unit: &str, ms: f64) -> Option<f64> {
    let factor = match unit {
        "milliseconds" | "ms" => 1.0,
        "seconds" | "s" => 1_000.0,
        "minutes" | "m" => 60_000.0,
        "hours" | "h" => 3_600_000.0,
        "days" | "d" => 86_400_000.0,
        _ => return None,
    };
    Some(ms / factor)
}

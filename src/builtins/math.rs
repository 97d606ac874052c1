//! `Math` namespace.

use rand::RngCore;

use crate::error::kind;
use crate::value::{ErrorValue, Value};

pub fn constant(name: &str) -> Option<Value> {
    Some(Value::Float(match name {
        "PI" => std::f64::consts::PI,
        "E" => std::f64::consts::E,
        "LN2" => std::f64::consts::LN_2,
        "LN10" => std::f64::consts::LN_10,
        "LOG2E" => std::f64::consts::LOG2_E,
        "LOG10E" => std::f64::consts::LOG10_E,
        "SQRT2" => std::f64::consts::SQRT_2,
        "SQRT1_2" => std::f64::consts::FRAC_1_SQRT_2,
        _ => return None,
    }))
}

fn arg(args: &[Value], i: usize, op: &str) -> Result<f64, ErrorValue> {
    args.get(i)
        .and_then(Value::as_f64)
        .ok_or_else(|| kind::type_error(op, format!("Math.{op} expects a numeric argument")))
}

pub fn call(method: &str, args: &[Value]) -> Result<Value, ErrorValue> {
    let op = "Math";
    let r = match method {
        "abs" => arg(args, 0, "abs")?.abs(),
        "ceil" => arg(args, 0, "ceil")?.ceil(),
        "floor" => arg(args, 0, "floor")?.floor(),
        "round" => arg(args, 0, "round")?.round(),
        "trunc" => arg(args, 0, "trunc")?.trunc(),
        "sign" => arg(args, 0, "sign")?.signum(),
        "sqrt" => arg(args, 0, "sqrt")?.sqrt(),
        "cbrt" => arg(args, 0, "cbrt")?.cbrt(),
        "pow" => arg(args, 0, "pow")?.powf(arg(args, 1, "pow")?),
        "exp" => arg(args, 0, "exp")?.exp(),
        "expm1" => arg(args, 0, "expm1")?.exp_m1(),
        "log" => arg(args, 0, "log")?.ln(),
        "log2" => arg(args, 0, "log2")?.log2(),
        "log10" => arg(args, 0, "log10")?.log10(),
        "log1p" => arg(args, 0, "log1p")?.ln_1p(),
        "sin" => arg(args, 0, "sin")?.sin(),
        "cos" => arg(args, 0, "cos")?.cos(),
        "tan" => arg(args, 0, "tan")?.tan(),
        "asin" => arg(args, 0, "asin")?.asin(),
        "acos" => arg(args, 0, "acos")?.acos(),
        "atan" => arg(args, 0, "atan")?.atan(),
        "atan2" => arg(args, 0, "atan2")?.atan2(arg(args, 1, "atan2")?),
        "sinh" => arg(args, 0, "sinh")?.sinh(),
        "cosh" => arg(args, 0, "cosh")?.cosh(),
        "tanh" => arg(args, 0, "tanh")?.tanh(),
        "asinh" => arg(args, 0, "asinh")?.asinh(),
        "acosh" => arg(args, 0, "acosh")?.acosh(),
        "atanh" => arg(args, 0, "atanh")?.atanh(),
        "hypot" => {
            let mut sum_sq = 0.0;
            for v in args {
                let f = v.as_f64().ok_or_else(|| {
                    kind::type_error(op, "Math.hypot expects numeric arguments")
                })?;
                sum_sq += f * f;
            }
            sum_sq.sqrt()
        }
        "min" => {
            let mut m = f64::INFINITY;
            for v in args {
                m = m.min(arg(std::slice::from_ref(v), 0, "min")?);
            }
            m
        }
        "max" => {
            let mut m = f64::NEG_INFINITY;
            for v in args {
                m = m.max(arg(std::slice::from_ref(v), 0, "max")?);
            }
            m
        }
        "clz32" => {
            let n = arg(args, 0, "clz32")? as i64 as u32;
            n.leading_zeros() as f64
        }
        "imul" => {
            let a = arg(args, 0, "imul")? as i32;
            let b = arg(args, 1, "imul")? as i32;
            a.wrapping_mul(b) as f64
        }
        "fround" => arg(args, 0, "fround")? as f32 as f64,
        "random" => {
            let mut buf = [0u8; 8];
            rand::rngs::OsRng.fill_bytes(&mut buf);
            (u64::from_le_bytes(buf) as f64 / u64::MAX as f64).min(0.999_999_999_999)
        }
        other => return Err(kind::unsupported_global(op, &format!("Math.{other}"))),
    };
    Ok(Value::number(r))
}

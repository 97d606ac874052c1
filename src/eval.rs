//! The expression evaluator and value resolution.
//!
//! Pure and synchronous: no atom dispatch, no capability I/O. Every node
//! debits `crate::fuel::EXPR_NODE_COST`; exhaustion sets `ctx.error` and
//! unwinds back out as `Value::Null` (the caller always checks
//! `ctx.should_halt()` before trusting a result).

use indexmap::IndexMap;
use serde_json::Value as Json;

use crate::ast::expr::{BinaryOp, ExprNode, LogicalOp, UnaryOp};
use crate::builtins::{self, IdentResolution};
use crate::context::RuntimeContext;
use crate::error::kind;
use crate::value::{is_forbidden_property, Value};

/// Evaluates an expression node against the current scope/args/builtins.
/// Returns `Value::Null` once `ctx.error` is set (callers must not trust
/// that as a real result; check `ctx.has_error()`).
pub async fn evaluate(node: &ExprNode, ctx: &mut RuntimeContext) -> Value {
    if !ctx.debit_expr_fuel(node_label(node)) {
        return Value::Null;
    }
    if ctx.has_error() {
        return Value::Null;
    }
    match node {
        ExprNode::Literal { value } => Value::from_json(value.clone()),

        ExprNode::Ident { name } => eval_ident(name, ctx).await,

        ExprNode::Member {
            object,
            property,
            optional,
        } => {
            let obj = Box::pin(evaluate(object, ctx)).await;
            if ctx.has_error() {
                return Value::Null;
            }
            if *optional && obj.is_null() {
                return Value::Null;
            }
            if is_forbidden_property(property) {
                ctx.error = Some(kind::security("member", property));
                return Value::Null;
            }
            member_get(&obj, property, ctx)
        }

        ExprNode::Binary { op, left, right } => {
            let l = Box::pin(evaluate(left, ctx)).await;
            if ctx.has_error() {
                return Value::Null;
            }
            let r = Box::pin(evaluate(right, ctx)).await;
            if ctx.has_error() {
                return Value::Null;
            }
            eval_binary(op, l, r, ctx)
        }

        ExprNode::Unary { op, argument } => {
            let v = Box::pin(evaluate(argument, ctx)).await;
            if ctx.has_error() {
                return Value::Null;
            }
            eval_unary(op, v, ctx)
        }

        ExprNode::Logical { op, left, right } => {
            let l = Box::pin(evaluate(left, ctx)).await;
            if ctx.has_error() {
                return Value::Null;
            }
            match LogicalOp::parse(op) {
                Some(LogicalOp::And) => {
                    if !l.is_truthy() {
                        l
                    } else {
                        Box::pin(evaluate(right, ctx)).await
                    }
                }
                Some(LogicalOp::Or) => {
                    if l.is_truthy() {
                        l
                    } else {
                        Box::pin(evaluate(right, ctx)).await
                    }
                }
                Some(LogicalOp::NullishCoalesce) => {
                    if !l.is_null() {
                        l
                    } else {
                        Box::pin(evaluate(right, ctx)).await
                    }
                }
                None => {
                    ctx.error = Some(kind::validation("logical", format!("unknown operator '{op}'")));
                    Value::Null
                }
            }
        }

        ExprNode::Conditional {
            test,
            consequent,
            alternate,
        } => {
            let t = Box::pin(evaluate(test, ctx)).await;
            if ctx.has_error() {
                return Value::Null;
            }
            if t.is_truthy() {
                Box::pin(evaluate(consequent, ctx)).await
            } else {
                Box::pin(evaluate(alternate, ctx)).await
            }
        }

        ExprNode::Array { elements } => {
            let mut out = Vec::with_capacity(elements.len());
            for el in elements {
                let v = Box::pin(evaluate(el, ctx)).await;
                if ctx.has_error() {
                    return Value::Null;
                }
                out.push(v);
            }
            Value::Array(out)
        }

        ExprNode::Object { properties } => {
            let mut out = IndexMap::new();
            for prop in properties {
                if is_forbidden_property(&prop.key) {
                    ctx.error = Some(kind::security("object", &prop.key));
                    return Value::Null;
                }
                let v = Box::pin(evaluate(&prop.value, ctx)).await;
                if ctx.has_error() {
                    return Value::Null;
                }
                out.insert(prop.key.clone(), v);
            }
            Value::Map(out)
        }

        ExprNode::Call { callee, arguments } => {
            if callee == "Error" {
                let mut arg_values = Vec::with_capacity(arguments.len());
                for a in arguments {
                    let v = Box::pin(evaluate(a, ctx)).await;
                    if ctx.has_error() {
                        return Value::Null;
                    }
                    arg_values.push(v);
                }
                let message = arg_values.first().map(Value::stringify).unwrap_or_default();
                ctx.error = Some(crate::value::ErrorValue::new("Error", message));
                return Value::Null;
            }
            let mut arg_values = Vec::with_capacity(arguments.len());
            for a in arguments {
                let v = Box::pin(evaluate(a, ctx)).await;
                if ctx.has_error() {
                    return Value::Null;
                }
                arg_values.push(v);
            }
            match builtins::call_top_level("call", callee, &arg_values) {
                Ok(v) => v,
                Err(e) => {
                    ctx.error = Some(e);
                    Value::Null
                }
            }
        }

        ExprNode::MethodCall {
            object,
            method,
            arguments,
            optional,
        } => {
            let receiver = Box::pin(evaluate(object, ctx)).await;
            if ctx.has_error() {
                return Value::Null;
            }
            if *optional && receiver.is_null() {
                return Value::Null;
            }
            if is_forbidden_property(method) {
                ctx.error = Some(kind::security("methodCall", method));
                return Value::Null;
            }
            let mut arg_values = Vec::with_capacity(arguments.len());
            for a in arguments {
                let v = Box::pin(evaluate(a, ctx)).await;
                if ctx.has_error() {
                    return Value::Null;
                }
                arg_values.push(v);
            }
            match builtins::method_call("methodCall", &receiver, method, &arg_values) {
                Ok(v) => v,
                Err(e) => {
                    ctx.error = Some(e);
                    Value::Null
                }
            }
        }
    }
}

fn node_label(node: &ExprNode) -> &'static str {
    match node {
        ExprNode::Literal { .. } => "literal",
        ExprNode::Ident { .. } => "ident",
        ExprNode::Member { .. } => "member",
        ExprNode::Binary { .. } => "binary",
        ExprNode::Unary { .. } => "unary",
        ExprNode::Logical { .. } => "logical",
        ExprNode::Conditional { .. } => "conditional",
        ExprNode::Array { .. } => "array",
        ExprNode::Object { .. } => "object",
        ExprNode::Call { .. } => "call",
        ExprNode::MethodCall { .. } => "methodCall",
    }
}

async fn eval_ident(name: &str, ctx: &mut RuntimeContext) -> Value {
    if let Some(v) = ctx.state.get(name).await {
        return v;
    }
    if let Some(v) = ctx.args.get(name) {
        return v.clone();
    }
    match builtins::resolve_ident(name) {
        IdentResolution::Value(v) => v,
        IdentResolution::Denied(msg) => {
            ctx.error = Some(kind::unsupported_global("ident", &msg));
            Value::Null
        }
        IdentResolution::Absent => Value::Null,
    }
}

fn member_get(obj: &Value, property: &str, ctx: &mut RuntimeContext) -> Value {
    match obj {
        Value::Array(items) => property
            .parse::<usize>()
            .ok()
            .and_then(|i| items.get(i))
            .cloned()
            .unwrap_or(Value::Null),
        Value::Map(map) => map.get(property).cloned().unwrap_or(Value::Null),
        Value::String(s) => {
            if property == "length" {
                Value::Int(s.chars().count() as i64)
            } else {
                Value::Null
            }
        }
        Value::Builtin(_) | Value::Date(_) | Value::Set(_) => {
            match builtins::member_get("member", obj, property) {
                Ok(v) => v,
                Err(e) => {
                    ctx.error = Some(e);
                    Value::Null
                }
            }
        }
        Value::Null => Value::Null,
        other => {
            ctx.error = Some(kind::type_error(
                "member",
                format!("cannot read property '{property}' of {}", other.type_name()),
            ));
            Value::Null
        }
    }
}

fn eval_binary(op: &str, l: Value, r: Value, ctx: &mut RuntimeContext) -> Value {
    let Some(parsed) = BinaryOp::parse(op) else {
        ctx.error = Some(kind::validation("binary", format!("unknown operator '{op}'")));
        return Value::Null;
    };
    use BinaryOp::*;
    match parsed {
        Add => match (&l, &r) {
            (Value::String(_), _) | (_, Value::String(_)) => {
                Value::String(format!("{}{}", l.stringify(), r.stringify()))
            }
            _ => match (l.as_f64(), r.as_f64()) {
                (Some(a), Some(b)) => Value::number(a + b),
                _ => type_err(ctx, "+", &l, &r),
            },
        },
        Sub => numeric(ctx, "-", &l, &r, |a, b| a - b),
        Mul => numeric(ctx, "*", &l, &r, |a, b| a * b),
        Div => numeric(ctx, "/", &l, &r, |a, b| a / b),
        Mod => numeric(ctx, "%", &l, &r, |a, b| a % b),
        Pow => numeric(ctx, "**", &l, &r, f64::powf),
        Eq => Value::Bool(loose_eq(&l, &r)),
        NotEq => Value::Bool(!loose_eq(&l, &r)),
        StrictEq => Value::Bool(strict_eq(&l, &r)),
        StrictNotEq => Value::Bool(!strict_eq(&l, &r)),
        Gt => compare(ctx, ">", &l, &r, |o| o == std::cmp::Ordering::Greater),
        Lt => compare(ctx, "<", &l, &r, |o| o == std::cmp::Ordering::Less),
        Gte => compare(ctx, ">=", &l, &r, |o| o != std::cmp::Ordering::Less),
        Lte => compare(ctx, "<=", &l, &r, |o| o != std::cmp::Ordering::Greater),
    }
}

fn numeric(ctx: &mut RuntimeContext, op: &str, l: &Value, r: &Value, f: impl Fn(f64, f64) -> f64) -> Value {
    match (l.as_f64(), r.as_f64()) {
        (Some(a), Some(b)) => Value::number(f(a, b)),
        _ => type_err(ctx, op, l, r),
    }
}

fn compare(ctx: &mut RuntimeContext, op: &str, l: &Value, r: &Value, f: impl Fn(std::cmp::Ordering) -> bool) -> Value {
    match (l, r) {
        (Value::String(a), Value::String(b)) => Value::Bool(f(a.cmp(b))),
        _ => match (l.as_f64(), r.as_f64()) {
            (Some(a), Some(b)) => match a.partial_cmp(&b) {
                Some(o) => Value::Bool(f(o)),
                None => Value::Bool(false),
            },
            _ => type_err(ctx, op, l, r),
        },
    }
}

fn type_err(ctx: &mut RuntimeContext, op: &str, l: &Value, r: &Value) -> Value {
    ctx.error = Some(kind::type_error(
        "binary",
        format!("operator '{op}' is not supported between {} and {}", l.type_name(), r.type_name()),
    ));
    Value::Null
}

fn loose_eq(l: &Value, r: &Value) -> bool {
    if l == r {
        return true;
    }
    match (l, r) {
        (Value::Null, Value::Bool(false)) | (Value::Bool(false), Value::Null) => false,
        _ => match (l.as_f64(), r.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => l.stringify() == r.stringify() && !l.is_null() && !r.is_null(),
        },
    }
}

fn strict_eq(l: &Value, r: &Value) -> bool {
    match (l.as_f64(), r.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => l.type_name() == r.type_name() && l == r,
    }
}

fn eval_unary(op: &str, v: Value, ctx: &mut RuntimeContext) -> Value {
    let Some(parsed) = UnaryOp::parse(op) else {
        ctx.error = Some(kind::validation("unary", format!("unknown operator '{op}'")));
        return Value::Null;
    };
    match parsed {
        UnaryOp::Not => Value::Bool(!v.is_truthy()),
        UnaryOp::Neg => match v.as_f64() {
            Some(n) => Value::number(-n),
            None => {
                ctx.error = Some(kind::type_error("unary", format!("cannot negate {}", v.type_name())));
                Value::Null
            }
        },
        UnaryOp::Pos => match v.as_f64() {
            Some(n) => Value::number(n),
            None => {
                ctx.error = Some(kind::type_error("unary", format!("cannot coerce {} to a number", v.type_name())));
                Value::Null
            }
        },
        UnaryOp::TypeOf => Value::String(v.type_name().to_string()),
    }
}

/// `resolveValue`: resolves a field that may be a literal,
/// an `$expr` node, a `{$kind:"arg"}` reference, a dot-path string, or a
/// plain nested mapping/array requiring recursive resolution.
pub async fn resolve_value(v: &Json, ctx: &mut RuntimeContext) -> Value {
    if ctx.has_error() {
        return Value::Null;
    }
    if let Json::Object(map) = v {
        if map.get("$kind").and_then(Json::as_str) == Some("arg") {
            let path = map.get("path").and_then(Json::as_str).unwrap_or_default();
            return ctx.args.get(path).cloned().unwrap_or(Value::Null);
        }
        if map.contains_key("$expr") {
            return match serde_json::from_value::<ExprNode>(v.clone()) {
                Ok(node) => Box::pin(evaluate(&node, ctx)).await,
                Err(e) => {
                    ctx.error = Some(kind::validation("resolveValue", format!("malformed expression: {e}")));
                    Value::Null
                }
            };
        }
        let mut out = IndexMap::new();
        for (k, val) in map {
            if is_forbidden_property(k) {
                ctx.error = Some(kind::security("resolveValue", k));
                return Value::Null;
            }
            let resolved = Box::pin(resolve_value(val, ctx)).await;
            if ctx.has_error() {
                return Value::Null;
            }
            out.insert(k.clone(), resolved);
        }
        return Value::Map(out);
    }
    if let Json::Array(items) = v {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            let resolved = Box::pin(resolve_value(item, ctx)).await;
            if ctx.has_error() {
                return Value::Null;
            }
            out.push(resolved);
        }
        return Value::Array(out);
    }
    if let Json::String(s) = v {
        return resolve_string(s, ctx).await;
    }
    Value::from_json(v.clone())
}

async fn resolve_string(s: &str, ctx: &mut RuntimeContext) -> Value {
    if let Some(rest) = s.strip_prefix("args.") {
        return ctx.args.get(rest).cloned().unwrap_or(Value::Null);
    }
    if s.contains('.') {
        let mut segments = s.split('.');
        let head = segments.next().unwrap_or_default();
        if is_forbidden_property(head) {
            ctx.error = Some(kind::security("resolveValue", head));
            return Value::Null;
        }
        let Some(mut current) = ctx.state.get(head).await else {
            return Value::Null;
        };
        for seg in segments {
            if is_forbidden_property(seg) {
                ctx.error = Some(kind::security("resolveValue", seg));
                return Value::Null;
            }
            current = member_get(&current, seg, ctx);
            if ctx.has_error() || current.is_null() {
                return current;
            }
        }
        return current;
    }
    if let Some(v) = ctx.state.get(s).await {
        return v;
    }
    Value::String(s.to_string())
}

//! Collection atoms: `map`, `filter`, `reduce`, `find`,
//! `push`, `len`. Each of `map`/`filter`/`reduce`/`find` runs its body in
//! a fresh child frame per element and polls the abort signal between
//! elements.

use crate::ast::expr::ExprNode;
use crate::ast::Atom;
use crate::atom::{AtomBody, AtomFault, AtomRegistry, AtomResult, BoxFuture, Cost};
use crate::context::RuntimeContext;
use crate::error::kind;
use crate::eval::{evaluate, resolve_value};
use crate::value::Value;

pub fn register(reg: &mut AtomRegistry) {
    reg_with(reg, "map", map_atom);
    reg_with(reg, "filter", filter_atom);
    reg_with(reg, "reduce", reduce_atom);
    reg_with(reg, "find", find_atom);
    reg_with(reg, "push", push_atom);
    reg_with(reg, "len", len_atom);
}

fn reg_with(reg: &mut AtomRegistry, op: &'static str, body: AtomBody) {
    reg.register_def(crate::atom::AtomDef {
        op,
        cost: Cost::PerItem { base: 0.1, per_item: 0.05 },
        timeout_ms: 0,
        body,
        docs: "",
    });
}

async fn resolve_items(op: &str, atom: &Atom, ctx: &mut RuntimeContext) -> Result<Vec<Value>, AtomFault> {
    let field = atom.require_field("items")?.clone();
    let resolved = resolve_value(&field, ctx).await;
    if ctx.has_error() {
        return Ok(Vec::new());
    }
    match resolved {
        Value::Array(items) => Ok(items),
        other => Err(AtomFault::Monadic(kind::type_error(
            op,
            format!("'items' resolved to {}, expected an array", other.type_name()),
        ))),
    }
}

fn check_abort(op: &str, ctx: &RuntimeContext) -> Result<(), AtomFault> {
    if ctx.signal.is_cancelled() {
        return Err(AtomFault::Monadic(kind::aborted(op)));
    }
    Ok(())
}

fn map_atom(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let items = resolve_items("map", atom, ctx).await?;
        let as_name: String = atom.decode_required("as")?;
        let steps: Vec<Atom> = atom.decode_field("steps")?.unwrap_or_default();
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            if ctx.should_halt() {
                break;
            }
            check_abort("map", ctx)?;
            let parent = ctx.state.clone();
            ctx.state = parent.child();
            ctx.state.set_local(&as_name, item, false).await;
            let outcome = crate::atoms::control::run_steps(&steps, ctx).await;
            let element = ctx.state.snapshot_local().await.get("result").cloned().unwrap_or(Value::Null);
            ctx.state = parent;
            outcome?;
            out.push(element);
        }
        Ok(Value::Array(out))
    })
}

fn filter_atom(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let items = resolve_items("filter", atom, ctx).await?;
        let as_name: String = atom.decode_required("as")?;
        let condition: ExprNode = atom.decode_required("condition")?;
        let mut out = Vec::new();
        for item in items {
            if ctx.should_halt() {
                break;
            }
            check_abort("filter", ctx)?;
            let parent = ctx.state.clone();
            ctx.state = parent.child();
            ctx.state.set_local(&as_name, item.clone(), false).await;
            let test = evaluate(&condition, ctx).await;
            ctx.state = parent;
            if ctx.has_error() {
                break;
            }
            if test.is_truthy() {
                out.push(item);
            }
        }
        Ok(Value::Array(out))
    })
}

fn reduce_atom(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let items = resolve_items("reduce", atom, ctx).await?;
        let as_name: String = atom.decode_required("as")?;
        let accumulator_name: String = atom.decode_required("accumulator")?;
        let initial_field = atom.require_field("initial")?.clone();
        let steps: Vec<Atom> = atom.decode_field("steps")?.unwrap_or_default();

        let mut acc = resolve_value(&initial_field, ctx).await;
        if ctx.has_error() {
            return Ok(Value::Null);
        }
        for item in items {
            if ctx.should_halt() {
                break;
            }
            check_abort("reduce", ctx)?;
            let parent = ctx.state.clone();
            ctx.state = parent.child();
            ctx.state.set_local(&accumulator_name, acc.clone(), false).await;
            ctx.state.set_local(&as_name, item, false).await;
            let outcome = crate::atoms::control::run_steps(&steps, ctx).await;
            let next = ctx.state.snapshot_local().await.get("result").cloned();
            ctx.state = parent;
            outcome?;
            if let Some(next) = next {
                acc = next;
            }
        }
        Ok(acc)
    })
}

fn find_atom(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let items = resolve_items("find", atom, ctx).await?;
        let as_name: String = atom.decode_required("as")?;
        let condition: ExprNode = atom.decode_required("condition")?;
        for item in items {
            if ctx.should_halt() {
                break;
            }
            check_abort("find", ctx)?;
            let parent = ctx.state.clone();
            ctx.state = parent.child();
            ctx.state.set_local(&as_name, item.clone(), false).await;
            let test = evaluate(&condition, ctx).await;
            ctx.state = parent;
            if ctx.has_error() {
                break;
            }
            if test.is_truthy() {
                return Ok(item);
            }
        }
        Ok(Value::Null)
    })
}

fn push_atom(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let array_field = atom.require_field("array")?.clone();
        let value_field = atom.require_field("value")?.clone();
        let array = resolve_value(&array_field, ctx).await;
        let value = resolve_value(&value_field, ctx).await;
        if ctx.has_error() {
            return Ok(Value::Null);
        }
        let mut items = match array {
            Value::Array(items) => items,
            other => {
                return Err(AtomFault::Monadic(kind::type_error(
                    "push",
                    format!("'array' resolved to {}, expected an array", other.type_name()),
                )))
            }
        };
        items.push(value);
        Ok(Value::Array(items))
    })
}

fn len_atom(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let value_field = atom.require_field("value")?.clone();
        let value = resolve_value(&value_field, ctx).await;
        if ctx.has_error() {
            return Ok(Value::Null);
        }
        let n = match &value {
            Value::Array(items) => items.len(),
            Value::Map(map) => map.len(),
            Value::String(s) => s.chars().count(),
            Value::Set(items) => items.len(),
            other => {
                return Err(AtomFault::Monadic(kind::type_error(
                    "len",
                    format!("cannot take len() of {}", other.type_name()),
                )))
            }
        };
        Ok(Value::Int(n as i64))
    })
}

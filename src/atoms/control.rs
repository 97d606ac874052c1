//! Control-flow atoms: `seq`, `if`, `while`, `return`,
//! `try`, `scope`, `Error`.

use crate::ast::expr::ExprNode;
use crate::ast::{Atom, SchemaDescriptor};
use crate::atom::{execute_atom, AtomBody, AtomFault, AtomRegistry, AtomResult, BoxFuture, Cost};
use crate::context::RuntimeContext;
use crate::error::kind;
use crate::eval::{evaluate, resolve_value};
use crate::fuel::WHILE_ITER_COST;
use crate::value::Value;

pub fn register(reg: &mut AtomRegistry) {
    reg_with(reg, "seq", Cost::Static(0.0), 0, seq);
    reg_with(reg, "if", Cost::Static(0.1), 0, if_atom);
    reg_with(reg, "while", Cost::Static(0.1), 0, while_atom);
    reg_with(reg, "return", Cost::Static(0.1), 0, return_atom);
    reg_with(reg, "try", Cost::Static(0.1), 0, try_atom);
    reg_with(reg, "scope", Cost::Static(0.1), 0, scope_atom);
    reg_with(reg, "Error", Cost::Static(0.1), 0, error_atom);
}

fn reg_with(reg: &mut AtomRegistry, op: &'static str, cost: Cost, timeout_ms: u64, body: AtomBody) {
    reg.register_def(crate::atom::AtomDef {
        op,
        cost,
        timeout_ms,
        body,
        docs: "",
    });
}

/// Decodes an `if`/`while` `condition` field, accepting both the
/// canonical `ExprNode` shape and the legacy flat string-expression +
/// `vars` mapping shape.
fn decode_condition(atom: &Atom) -> Result<ExprNode, crate::value::ErrorValue> {
    let field = atom.require_field("condition")?;
    if let serde_json::Value::String(source) = field {
        let vars = atom.field("vars").cloned().unwrap_or(serde_json::Value::Null);
        return crate::legacy_expr::parse(&atom.op, source, &vars);
    }
    atom.decode_required("condition")
}

pub(crate) async fn run_steps(steps: &[Atom], ctx: &mut RuntimeContext) -> Result<(), crate::error::EngineError> {
    for step in steps {
        if ctx.should_halt() {
            break;
        }
        execute_atom(step, ctx).await?;
    }
    Ok(())
}

fn seq(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let steps: Vec<Atom> = atom.decode_required("steps")?;
        run_steps(&steps, ctx).await?;
        Ok(Value::Null)
    })
}

fn if_atom(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let condition = decode_condition(atom)?;
        let test = evaluate(&condition, ctx).await;
        if ctx.has_error() {
            return Ok(Value::Null);
        }
        let branch: Vec<Atom> = if test.is_truthy() {
            atom.decode_field("then")?.unwrap_or_default()
        } else {
            atom.decode_field("else")?.unwrap_or_default()
        };
        run_steps(&branch, ctx).await?;
        Ok(Value::Null)
    })
}

fn while_atom(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let condition = decode_condition(atom)?;
        let steps: Vec<Atom> = atom.decode_field("steps")?.unwrap_or_default();
        loop {
            if ctx.has_output() {
                break;
            }
            if ctx.signal.is_cancelled() {
                return Err(AtomFault::Monadic(kind::aborted("while")));
            }
            if ctx.fuel.debit(WHILE_ITER_COST) <= 0.0 {
                return Err(AtomFault::Monadic(kind::out_of_fuel("while")));
            }
            let test = evaluate(&condition, ctx).await;
            if ctx.has_error() {
                break;
            }
            if !test.is_truthy() {
                break;
            }
            run_steps(&steps, ctx).await?;
        }
        Ok(Value::Null)
    })
}

/// Resolved shape for `return`'s own fields: an explicit `value`
/// expression takes priority; otherwise a
/// `schema` restricts which state properties become the output mapping
/// (`filter: false` returns the full visible state instead of the
/// schema-restricted subset); with neither, falls back to `state.result`.
fn return_atom(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        if let Some(value_field) = atom.field("value").cloned() {
            let v = resolve_value(&value_field, ctx).await;
            if ctx.has_error() {
                return Ok(Value::Null);
            }
            ctx.output = Some(v);
            return Ok(Value::Null);
        }
        if let Some(schema) = atom.decode_field::<SchemaDescriptor>("schema")? {
            let filter = atom.decode_field::<bool>("filter")?.unwrap_or(true);
            let visible = ctx.state.snapshot_visible().await;
            let out = if filter {
                let mut out = indexmap::IndexMap::new();
                for name in schema.property_names() {
                    out.insert(name.to_string(), visible.get(name).cloned().unwrap_or(Value::Null));
                }
                Value::Map(out)
            } else {
                Value::Map(visible)
            };
            ctx.output = Some(out);
            return Ok(Value::Null);
        }
        let fallback = ctx.state.get("result").await.unwrap_or(Value::Null);
        ctx.output = Some(fallback);
        Ok(Value::Null)
    })
}

fn try_atom(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let try_steps: Vec<Atom> = atom.decode_field("try")?.unwrap_or_default();
        let catch_steps: Option<Vec<Atom>> = atom.decode_field("catch")?;
        let catch_param = atom
            .decode_field::<String>("catchParam")?
            .unwrap_or_else(|| "error".to_string());

        run_steps(&try_steps, ctx).await?;

        if let Some(catch_steps) = catch_steps {
            if let Some(err) = ctx.error.take() {
                ctx.state.set_local(&catch_param, Value::String(err.message), false).await;
                ctx.state.set_local("errorOp", Value::String(err.op), false).await;
                run_steps(&catch_steps, ctx).await?;
            }
        }
        Ok(Value::Null)
    })
}

fn scope_atom(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let steps: Vec<Atom> = atom.decode_field("steps")?.unwrap_or_default();
        let parent = ctx.state.clone();
        ctx.state = parent.child();
        let outcome = run_steps(&steps, ctx).await;
        ctx.state = parent;
        outcome?;
        Ok(Value::Null)
    })
}

fn error_atom(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let message = match atom.field("message").cloned() {
            Some(json) => resolve_value(&json, ctx).await.stringify(),
            None => String::new(),
        };
        if ctx.has_error() {
            return Ok(Value::Null);
        }
        Err(AtomFault::Monadic(kind::user("Error", message)))
    })
}

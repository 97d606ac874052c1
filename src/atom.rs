//! The atom registry and the 8-step atom executor.
//!
//! Every statement-level opcode is a `fn` pointer returning a boxed
//! future (`AtomBody`). A `fn` pointer, not a closure, so the registry
//! can be a plain `'static` table built once at `RuntimeContext`
//! construction. Boxing each body breaks the otherwise-infinite future
//! size that direct recursion would create: `seq` dispatches back into
//! `execute_atom`, which dispatches into e.g. `if`'s body, which
//! dispatches back into `seq` for its `then`/`else` branch.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use crate::ast::Atom;
use crate::context::RuntimeContext;
use crate::error::kind;
use crate::trace::{self, TraceEvent};
use crate::value::{ErrorValue, Value};

/// A statement-level failure. `Monadic` is anything that should surface
/// in `RunResult.error`; `Host` is the narrow set of true
/// programmer errors (currently: unknown opcode) that unwind all the way
/// out of `vm::run` instead.
#[derive(Debug)]
pub enum AtomFault {
    Monadic(ErrorValue),
    Host(crate::error::EngineError),
}

impl From<ErrorValue> for AtomFault {
    fn from(e: ErrorValue) -> Self {
        AtomFault::Monadic(e)
    }
}

impl From<crate::error::EngineError> for AtomFault {
    fn from(e: crate::error::EngineError) -> Self {
        AtomFault::Host(e)
    }
}

pub type AtomResult = Result<Value, AtomFault>;
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
pub type AtomBody = for<'a> fn(&'a Atom, &'a mut RuntimeContext) -> BoxFuture<'a, AtomResult>;

#[derive(Clone, Copy)]
pub enum Cost {
    Static(f64),
    /// Declared cost that scales with input, e.g. collection atoms
    /// charging per resolved item.
    PerItem { base: f64, per_item: f64 },
}

impl Cost {
    fn evaluate(&self, item_count: usize) -> f64 {
        match self {
            Cost::Static(c) => *c,
            Cost::PerItem { base, per_item } => base + per_item * item_count as f64,
        }
    }
}

pub struct AtomDef {
    pub op: &'static str,
    pub cost: Cost,
    pub timeout_ms: u64,
    pub body: AtomBody,
    pub docs: &'static str,
}

pub struct AtomRegistry(HashMap<&'static str, AtomDef>);

impl AtomRegistry {
    pub fn get(&self, op: &str) -> Option<&AtomDef> {
        self.0.get(op)
    }

    pub(crate) fn register_def(&mut self, def: AtomDef) {
        self.0.insert(def.op, def);
    }

    pub fn builtin() -> Self {
        let mut reg = Self(HashMap::new());
        crate::atoms::control::register(&mut reg);
        crate::atoms::state::register(&mut reg);
        crate::atoms::collections::register(&mut reg);
        crate::atoms::strings::register(&mut reg);
        crate::atoms::io::register(&mut reg);
        crate::atoms::memo::register(&mut reg);
        reg
    }
}

impl Default for AtomRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Estimates the "item count" an atom's declared per-item cost scales
/// with, by peeking at its most common collection field without fully
/// resolving it (resolution happens inside the atom body itself).
fn item_count_hint(atom: &Atom) -> usize {
    for field in ["items", "steps"] {
        if let Some(serde_json::Value::Array(items)) = atom.field(field) {
            return items.len();
        }
    }
    1
}

/// Dispatches one statement-level atom through the full 8-step contract.
/// Unknown opcodes are the one case this function surfaces as a host
/// exception rather than a monadic error.
pub async fn execute_atom(atom: &Atom, ctx: &mut RuntimeContext) -> Result<(), crate::error::EngineError> {
    // Step 1: monadic skip.
    if ctx.has_error() {
        return Ok(());
    }

    tracing::trace!(op = %atom.op, fuel = ctx.fuel.current(), "dispatching atom");

    let registry = ctx.registry.clone();
    let (cost, timeout_ms, body) = registry.get(&atom.op).map(|d| (d.cost, d.timeout_ms, d.body)).ok_or_else(|| {
        tracing::error!(op = %atom.op, "unknown opcode");
        crate::error::EngineError::UnknownOpcode { op: atom.op.clone() }
    })?;

    // Step 3: trace snapshot (before).
    let trace_before = if ctx.trace_enabled {
        Some((ctx.state.snapshot_visible().await, ctx.fuel.current()))
    } else {
        None
    };

    // Step 4: fuel debit.
    let effective_cost = ctx
        .cost_override(&atom.op, atom)
        .unwrap_or_else(|| cost.evaluate(item_count_hint(atom)));
    let fuel_before = ctx.fuel.current();
    if ctx.fuel.debit(effective_cost) <= 0.0 {
        tracing::debug!(op = %atom.op, "out of fuel");
        ctx.error = Some(kind::out_of_fuel(&atom.op));
        emit_trace(atom, ctx, trace_before, fuel_before).await;
        return Ok(());
    }

    // Step 5: execute, optionally racing a timeout.
    let outcome = if timeout_ms == 0 {
        body(atom, ctx).await
    } else {
        match tokio::time::timeout(Duration::from_millis(timeout_ms), body(atom, ctx)).await {
            Ok(r) => r,
            Err(_) => Err(AtomFault::Monadic(kind::timeout(&atom.op))),
        }
    };

    // Steps 6-7: bind result / capture error, or unwind a host exception.
    match outcome {
        Ok(value) => {
            if let Some(name) = &atom.result {
                if ctx.state.is_const_anywhere(name).await {
                    ctx.error = Some(kind::const_violation(&atom.op, name));
                } else {
                    ctx.state.set_local(name, value, atom.result_const).await;
                }
            }
        }
        Err(AtomFault::Monadic(e)) => {
            tracing::debug!(op = %atom.op, message = %e.message, "atom raised a monadic error");
            ctx.error = Some(e);
        }
        Err(AtomFault::Host(e)) => {
            tracing::error!(op = %atom.op, error = %e, "atom raised a host exception");
            return Err(e);
        }
    }

    // Step 8: trace emission (after).
    emit_trace(atom, ctx, trace_before, fuel_before).await;
    Ok(())
}

async fn emit_trace(
    atom: &Atom,
    ctx: &mut RuntimeContext,
    before: Option<(indexmap::IndexMap<String, Value>, f64)>,
    fuel_before: f64,
) {
    let Some((state_before, _)) = before else {
        return;
    };
    let state_after = ctx.state.snapshot_visible().await;
    let event = TraceEvent {
        op: atom.op.clone(),
        input: serde_json::to_value(&atom.fields).unwrap_or(serde_json::Value::Null),
        state_diff: trace::diff_state(&state_before, &state_after),
        result: atom
            .result
            .as_ref()
            .and_then(|name| state_after.get(name))
            .map(Value::to_json),
        error: ctx.error.clone(),
        fuel_before,
        fuel_after: ctx.fuel.current(),
        timestamp: trace::now_iso8601(),
    };
    ctx.trace.push(event).await;
}

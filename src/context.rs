//! `RuntimeContext`: the single per-run container threaded through every
//! atom and expression evaluation.
//!
//! There is exactly one `RuntimeContext` per VM run; it is
//! always accessed through a unique `&mut` reference, so most of its
//! fields are plain owned data. The exception is `state` (the scope
//! frame chain), which uses shared, reference-counted frames so a nested
//! block can swap in a child frame and later restore the parent without
//! copying the whole chain (see `crate::scope`).

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::atom::AtomRegistry;
use crate::ast::Atom;
use crate::capability::CapabilitySet;
use crate::fuel::FuelCell;
use crate::procedures::ProcedureStore;
use crate::scope::ScopeRef;
use crate::signal::CancellationToken;
use crate::trace::TraceSink;
use crate::value::{ErrorValue, Value};

/// Caller-supplied, read-only request metadata used for policy decisions
/// (fetch allowlist, sub-agent permission checks). This is always the
/// *caller's* context — stored procedures never see the storer's
/// context at call time.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub user: Option<Value>,
    pub permissions: Vec<String>,
    pub allowed_fetch_domains: Option<Vec<String>>,
    pub request_depth: u32,
    pub extra: IndexMap<String, Value>,
}

impl RequestContext {
    pub fn has_permission(&self, name: &str) -> bool {
        self.permissions.iter().any(|p| p == name)
    }
}

/// A per-opcode fuel cost override.
#[derive(Clone)]
pub enum CostOverride {
    Static(f64),
    Dynamic(Arc<dyn Fn(&Atom) -> f64 + Send + Sync>),
}

pub const MAX_FETCH_DEPTH: u32 = 10;
pub const DEFAULT_FUEL: f64 = 1000.0;
pub const DEFAULT_MAX_AGENT_DEPTH: u32 = 16;

pub struct RuntimeContext {
    pub fuel: FuelCell,
    pub args: IndexMap<String, Value>,
    pub state: ScopeRef,
    pub capabilities: CapabilitySet,
    pub output: Option<Value>,
    pub error: Option<ErrorValue>,
    pub memo: HashMap<String, Value>,
    pub trace_enabled: bool,
    pub trace: TraceSink,
    pub signal: CancellationToken,
    pub cost_overrides: HashMap<String, CostOverride>,
    pub context: Option<RequestContext>,
    pub registry: Arc<AtomRegistry>,
    pub procedures: ProcedureStore,
    /// Sub-agent / procedure nesting depth, distinct from the fetch depth
    /// counter carried in `RequestContext::request_depth`.
    pub agent_depth: u32,
    pub max_agent_depth: u32,
}

impl RuntimeContext {
    /// Returns the currently outstanding error, if any, without clearing it.
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn has_output(&self) -> bool {
        self.output.is_some()
    }

    /// True once either `output` or `error` has been set — the universal
    /// "stop dispatching" condition checked before each step of a `seq`
    /// and each iteration of `while`/collection atoms.
    pub fn should_halt(&self) -> bool {
        self.has_output() || self.has_error()
    }

    pub fn cost_override(&self, op: &str, atom: &Atom) -> Option<f64> {
        match self.cost_overrides.get(op)? {
            CostOverride::Static(v) => Some(*v),
            CostOverride::Dynamic(f) => Some(f(atom)),
        }
    }

    /// Debits fuel for one expression node, setting
    /// `ctx.error` and returning `false` on exhaustion.
    pub fn debit_expr_fuel(&mut self, op: &str) -> bool {
        let remaining = self.fuel.debit(crate::fuel::EXPR_NODE_COST);
        if remaining <= 0.0 {
            self.error = Some(crate::error::kind::out_of_fuel(op));
            false
        } else {
            true
        }
    }
}

//! The VM entry point: orchestrates one program
//! execution — resource init, root check, boot, teardown — and returns
//! a `RunResult`.
//!
//! A `Vm` owns the two resources that live across runs within one
//! process: the atom registry and the procedure store.
//! Construct one `Vm` per embedder process and call `run()` per program
//! execution; each call gets a fresh `RuntimeContext`.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ast::Atom;
use crate::atom::{execute_atom, AtomRegistry};
use crate::capability::CapabilitySet;
use crate::config::VmConfig;
use crate::context::{CostOverride, RequestContext, RuntimeContext};
use crate::error::EngineError;
use crate::fuel::FuelCell;
use crate::procedures::ProcedureStore;
use crate::scope::ScopeRef;
use crate::signal::CancellationToken;
use crate::trace::{TraceEvent, TraceSink};
use crate::value::{ErrorValue, Value};

/// A program handed to `Vm::run`: either an inline AST or an opaque
/// procedure-store token.
#[derive(Debug, Clone)]
pub enum ProgramInput {
    Ast(Atom),
    Token(String),
}

impl From<Atom> for ProgramInput {
    fn from(ast: Atom) -> Self {
        ProgramInput::Ast(ast)
    }
}

impl From<String> for ProgramInput {
    fn from(token: String) -> Self {
        ProgramInput::Token(token)
    }
}

/// Per-run overrides. Anything left `None`/empty
/// falls back to the `Vm`'s `VmConfig`.
#[derive(Default)]
pub struct RunOptions {
    pub fuel: Option<f64>,
    pub capabilities: CapabilitySet,
    pub signal: Option<CancellationToken>,
    pub context: Option<RequestContext>,
    pub cost_overrides: HashMap<String, CostOverride>,
    pub trace: bool,
    pub max_agent_depth: Option<u32>,
}

/// The monadic result contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub result: Value,
    pub error: Option<ErrorValue>,
    #[serde(rename = "fuelUsed")]
    pub fuel_used: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<Vec<TraceEvent>>,
}

pub struct Vm {
    registry: Arc<AtomRegistry>,
    procedures: ProcedureStore,
    config: VmConfig,
}

impl Default for Vm {
    fn default() -> Self {
        Self::new(VmConfig::default())
    }
}

impl Vm {
    pub fn new(config: VmConfig) -> Self {
        Self {
            registry: Arc::new(AtomRegistry::builtin()),
            procedures: ProcedureStore::new(),
            config,
        }
    }

    pub fn with_registry(config: VmConfig, registry: AtomRegistry) -> Self {
        Self { registry: Arc::new(registry), procedures: ProcedureStore::new(), config }
    }

    /// The process-wide procedure store, so an embedder can call
    /// `storeProcedure`/`releaseProcedure`/`clearExpiredProcedures`
    /// outside of a `run()` call (e.g. a background sweep task).
    pub fn procedures(&self) -> &ProcedureStore {
        &self.procedures
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    /// Runs one program to completion.
    ///
    /// Step 1/2 (root-not-seq, unknown opcode, unknown procedure token)
    /// surface as `Err(EngineError)` — host exceptions, never folded
    /// into `RunResult`. Everything else a
    /// program can trigger surfaces in `RunResult.error`.
    pub async fn run(
        &self,
        program: ProgramInput,
        args: IndexMap<String, Value>,
        options: RunOptions,
    ) -> Result<RunResult, EngineError> {
        let ast = self.resolve_program(program).await?;
        if !ast.is_seq() {
            return Err(EngineError::MalformedRoot { found: ast.op.clone() });
        }

        let fuel_start = options.fuel.unwrap_or(self.config.default_fuel);
        let mut ctx = RuntimeContext {
            fuel: FuelCell::new(fuel_start),
            args,
            state: ScopeRef::root(),
            capabilities: options.capabilities.with_default_store(),
            output: None,
            error: None,
            memo: HashMap::new(),
            trace_enabled: options.trace,
            trace: TraceSink::default(),
            signal: options.signal.unwrap_or_default(),
            cost_overrides: options.cost_overrides,
            context: options.context,
            registry: self.registry.clone(),
            procedures: self.procedures.clone(),
            agent_depth: 0,
            max_agent_depth: options.max_agent_depth.unwrap_or(self.config.max_agent_depth),
        };

        tracing::debug!(fuel = fuel_start, "vm run starting");
        let dispatch = execute_atom(&ast, &mut ctx).await;
        let fuel_used = fuel_start - ctx.fuel.current();

        match dispatch {
            Ok(()) => {
                if let Some(err) = &ctx.error {
                    tracing::warn!(op = %err.op, message = %err.message, "run ended with monadic error");
                } else {
                    tracing::debug!(fuel_used, "run completed");
                }
                let trace = if options.trace { Some(ctx.trace.drain().await) } else { None };
                Ok(RunResult {
                    result: ctx.output.unwrap_or(Value::Null),
                    error: ctx.error,
                    fuel_used,
                    trace,
                })
            }
            Err(host_err) => {
                tracing::error!(error = %host_err, "run aborted on host exception");
                Err(host_err)
            }
        }
    }

    async fn resolve_program(&self, program: ProgramInput) -> Result<Atom, EngineError> {
        match program {
            ProgramInput::Ast(ast) => Ok(ast),
            ProgramInput::Token(token) => {
                let entry = self
                    .procedures
                    .lookup(&token)
                    .await
                    .ok_or_else(|| EngineError::UnknownProcedure { token: token.clone() })?;
                Ok((*entry.ast).clone())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn atom_from(json: serde_json::Value) -> Atom {
        serde_json::from_value(json).unwrap()
    }

    #[tokio::test]
    async fn arithmetic_return_scenario() {
        // sums a + b, returns {sum: a+b}.
        let program = atom_from(json!({
            "op": "seq",
            "steps": [
                {
                    "op": "varSet",
                    "name": "sum",
                    "value": { "$expr": "binary", "op": "+",
                        "left": { "$expr": "ident", "name": "a" },
                        "right": { "$expr": "ident", "name": "b" } }
                },
                { "op": "return", "schema": { "properties": { "sum": {} } } }
            ]
        }));
        let mut args = IndexMap::new();
        args.insert("a".to_string(), Value::Int(5));
        args.insert("b".to_string(), Value::Int(3));

        let vm = Vm::default();
        let result = vm.run(program.into(), args, RunOptions::default()).await.unwrap();
        assert!(result.error.is_none());
        assert_eq!(result.result, Value::Map(IndexMap::from([("sum".to_string(), Value::Int(8))])));
        assert!(result.fuel_used > 0.0);
    }

    #[tokio::test]
    async fn out_of_fuel_on_infinite_loop() {
        // an unconditional loop runs dry on a small fuel budget.
        let program = atom_from(json!({
            "op": "seq",
            "steps": [{
                "op": "while",
                "condition": { "$expr": "literal", "value": true },
                "steps": [{ "op": "varSet", "name": "x", "value": 1 }]
            }]
        }));
        let vm = Vm::default();
        let opts = RunOptions { fuel: Some(10.0), ..Default::default() };
        let result = vm.run(program.into(), IndexMap::new(), opts).await.unwrap();
        assert_eq!(result.error.unwrap().message, "Out of Fuel");
    }

    #[tokio::test]
    async fn malformed_root_is_a_host_exception() {
        let program = atom_from(json!({ "op": "varSet", "name": "x", "value": 1 }));
        let vm = Vm::default();
        let err = vm.run(program.into(), IndexMap::new(), RunOptions::default()).await;
        assert!(matches!(err, Err(EngineError::MalformedRoot { .. })));
    }

    #[tokio::test]
    async fn security_guard_on_forbidden_property() {
        // member access onto a forbidden property is rejected before eval.
        let program = atom_from(json!({
            "op": "seq",
            "steps": [{
                "op": "varSet",
                "name": "leak",
                "value": { "$expr": "member",
                    "object": { "$expr": "literal", "value": { "foo": "bar" } },
                    "property": "__proto__" }
            }]
        }));
        let vm = Vm::default();
        let result = vm.run(program.into(), IndexMap::new(), RunOptions::default()).await.unwrap();
        let err = result.error.unwrap();
        assert!(err.message.contains("Security Error"));
        assert!(err.message.contains("__proto__"));
    }

    #[tokio::test]
    async fn unknown_opcode_is_a_host_exception() {
        let program = atom_from(json!({ "op": "seq", "steps": [{ "op": "notARealOp" }] }));
        let vm = Vm::default();
        let err = vm.run(program.into(), IndexMap::new(), RunOptions::default()).await;
        assert!(matches!(err, Err(EngineError::UnknownOpcode { .. })));
    }
}

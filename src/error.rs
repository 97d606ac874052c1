//! Error taxonomy.
//!
//! Program-level faults (out of fuel, security violations, capability
//! failures, timeouts, user `Error(...)`) are never exceptions — they are
//! captured into `RuntimeContext::error` and surfaced monadically in
//! `RunResult::error` (see `crate::value::ErrorValue`). Only two
//! conditions are genuine host exceptions: a malformed program root and
//! an unknown opcode, both signaling a bug in the embedder or atom
//! registry, not in the program under execution.

use miette::Diagnostic;
use thiserror::Error;

/// Host-level, non-monadic failures. These indicate the caller handed the
/// VM something it cannot run at all, rather than a fault the program
/// itself produced.
#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error("program root must be a `seq` atom, found `{found}`")]
    #[diagnostic(code(agentrt::malformed_root))]
    MalformedRoot { found: String },

    #[error("unknown opcode `{op}`")]
    #[diagnostic(code(agentrt::unknown_opcode), help("is this atom registered?"))]
    UnknownOpcode { op: String },

    #[error("procedure token `{token}` not found")]
    #[diagnostic(code(agentrt::unknown_procedure))]
    UnknownProcedure { token: String },

    #[error("malformed atom `{op}`: {reason}")]
    #[diagnostic(code(agentrt::malformed_atom))]
    MalformedAtom { op: String, reason: String },
}

/// Shorthand constructors for the monadic error carrier.
pub mod kind {
    use crate::value::ErrorValue;

    pub fn out_of_fuel(op: &str) -> ErrorValue {
        ErrorValue::new(op, "Out of Fuel")
    }

    pub fn security(op: &str, path: &str) -> ErrorValue {
        ErrorValue::new(op, format!("Security Error: forbidden access to '{path}'"))
    }

    pub fn unsupported_global(op: &str, name: &str) -> ErrorValue {
        ErrorValue::new(
            op,
            format!("'{name}' is not available in the sandbox; see the built-ins pool"),
        )
    }

    pub fn capability_missing(op: &str, name: &str) -> ErrorValue {
        ErrorValue::new(op, format!("Capability '{name}' missing"))
    }

    pub fn capability_error(op: &str, message: impl Into<String>) -> ErrorValue {
        ErrorValue::new(op, message.into())
    }

    pub fn timeout(op: &str) -> ErrorValue {
        ErrorValue::new(op, format!("Timeout in '{op}'"))
    }

    pub fn depth_exceeded(op: &str) -> ErrorValue {
        ErrorValue::new(op, "depth exceeded")
    }

    pub fn const_violation(op: &str, name: &str) -> ErrorValue {
        ErrorValue::new(op, format!("cannot reassign const '{name}'"))
    }

    pub fn const_redeclare(op: &str, name: &str) -> ErrorValue {
        ErrorValue::new(op, format!("cannot redeclare '{name}'"))
    }

    pub fn validation(op: &str, message: impl Into<String>) -> ErrorValue {
        ErrorValue::new(op, message.into())
    }

    pub fn type_error(op: &str, message: impl Into<String>) -> ErrorValue {
        ErrorValue::new(op, message.into())
    }

    pub fn aborted(op: &str) -> ErrorValue {
        ErrorValue::new(op, "Execution aborted")
    }

    pub fn user(op: &str, message: impl Into<String>) -> ErrorValue {
        ErrorValue::new(op, message.into())
    }
}

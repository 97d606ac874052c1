//! Memoization and cache: `memoize` runs against
//! `RuntimeContext::memo`, a table scoped to one VM run; `cache` runs
//! against the `store` capability and wraps each value in a
//! `{ val, _exp }` TTL envelope the embedder's KV need not understand.

use indexmap::IndexMap;
use sha2::{Digest, Sha256};

use crate::ast::Atom;
use crate::atom::{AtomBody, AtomFault, AtomRegistry, AtomResult, BoxFuture, Cost};
use crate::builtins::date::now_millis;
use crate::context::RuntimeContext;
use crate::error::kind;
use crate::eval::resolve_value;
use crate::value::Value;

pub fn register(reg: &mut AtomRegistry) {
    reg.register_def(crate::atom::AtomDef {
        op: "memoize",
        cost: Cost::Static(0.5),
        timeout_ms: 0,
        body: memoize_atom,
        docs: "",
    });
    reg.register_def(crate::atom::AtomDef {
        op: "cache",
        cost: Cost::Static(1.0),
        timeout_ms: 0,
        body: cache_atom,
        docs: "",
    });
}

pub const DEFAULT_CACHE_TTL_MS: i64 = 24 * 60 * 60 * 1000;

/// Default key when `key` is omitted: a hash of the step list's
/// canonical JSON form.
fn hash_steps(steps: &[Atom]) -> String {
    let canonical = serde_json::to_vec(steps).unwrap_or_default();
    let digest = Sha256::digest(&canonical);
    hex_encode(&digest)
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

/// Runs `steps` in a fresh child frame and returns whichever of
/// `ctx.output` / `state.result` the body produced ("capture output ??
/// state.result"). Mirrors the pattern collection atoms use for their
/// body results (`crate::atoms::collections`).
async fn run_body(steps: &[Atom], ctx: &mut RuntimeContext) -> Result<Value, AtomFault> {
    let parent = ctx.state.clone();
    ctx.state = parent.child();
    let outcome = crate::atoms::control::run_steps(steps, ctx).await;
    let captured = match &ctx.output {
        Some(v) => v.clone(),
        None => ctx.state.get("result").await.unwrap_or(Value::Null),
    };
    ctx.state = parent;
    outcome?;
    Ok(captured)
}

fn memoize_atom(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let steps: Vec<Atom> = atom.decode_field("steps")?.unwrap_or_default();
        let key = match atom.field("key") {
            Some(json) => resolve_value(json, ctx).await.stringify(),
            None => hash_steps(&steps),
        };
        if ctx.has_error() {
            return Ok(Value::Null);
        }
        if let Some(cached) = ctx.memo.get(&key) {
            return Ok(cached.clone());
        }
        let value = run_body(&steps, ctx).await?;
        if ctx.has_error() {
            return Ok(Value::Null);
        }
        ctx.memo.insert(key, value.clone());
        Ok(value)
    })
}

fn cache_atom(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let steps: Vec<Atom> = atom.decode_field("steps")?.unwrap_or_default();
        let key = match atom.field("key") {
            Some(json) => resolve_value(json, ctx).await.stringify(),
            None => hash_steps(&steps),
        };
        let ttl_ms = atom.decode_field::<i64>("ttlMs")?.unwrap_or(DEFAULT_CACHE_TTL_MS);
        if ctx.has_error() {
            return Ok(Value::Null);
        }
        let cap = ctx
            .capabilities
            .store
            .clone()
            .ok_or_else(|| kind::capability_missing("cache", "store"))?;
        let cache_key = format!("cache:{key}");

        let existing = cap.get(&cache_key).await.map_err(|e| kind::capability_error("cache", e))?;
        if let Value::Map(envelope) = &existing {
            let expired = envelope
                .get("_exp")
                .and_then(Value::as_f64)
                .map(|exp| exp <= now_millis() as f64)
                .unwrap_or(true);
            if !expired {
                return Ok(envelope.get("val").cloned().unwrap_or(Value::Null));
            }
        }

        let value = run_body(&steps, ctx).await?;
        if ctx.has_error() {
            return Ok(Value::Null);
        }

        let mut envelope = IndexMap::new();
        envelope.insert("val".to_string(), value.clone());
        envelope.insert("_exp".to_string(), Value::Int(now_millis() + ttl_ms));
        cap.set(&cache_key, Value::Map(envelope))
            .await
            .map_err(|e| kind::capability_error("cache", e))?;
        Ok(value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_steps_is_stable_for_identical_input() {
        let a = vec![Atom { op: "varSet".into(), result: None, result_const: false, fields: IndexMap::new() }];
        let b = a.clone();
        assert_eq!(hash_steps(&a), hash_steps(&b));
    }

    #[test]
    fn hash_steps_differs_for_different_ops() {
        let a = vec![Atom { op: "varSet".into(), result: None, result_const: false, fields: IndexMap::new() }];
        let b = vec![Atom { op: "varGet".into(), result: None, result_const: false, fields: IndexMap::new() }];
        assert_ne!(hash_steps(&a), hash_steps(&b));
    }
}

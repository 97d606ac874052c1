//! State atoms: `varSet`, `constSet`, `varsImport`,
//! `varsLet`, `varsExport`, `varGet`.

use indexmap::IndexMap;
use serde_json::Value as Json;

use crate::ast::Atom;
use crate::atom::{AtomBody, AtomFault, AtomRegistry, AtomResult, BoxFuture, Cost};
use crate::context::RuntimeContext;
use crate::error::kind;
use crate::eval::resolve_value;
use crate::value::Value;

pub fn register(reg: &mut AtomRegistry) {
    reg_with(reg, "varSet", var_set);
    reg_with(reg, "constSet", const_set);
    reg_with(reg, "varsImport", vars_import);
    reg_with(reg, "varsLet", vars_let);
    reg_with(reg, "varsExport", vars_export);
    reg_with(reg, "varGet", var_get);
}

fn reg_with(reg: &mut AtomRegistry, op: &'static str, body: AtomBody) {
    reg.register_def(crate::atom::AtomDef {
        op,
        cost: Cost::Static(0.1),
        timeout_ms: 0,
        body,
        docs: "",
    });
}

fn var_set(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let name: String = atom.decode_required("name")?;
        let value_field = atom.require_field("value")?.clone();
        let value = resolve_value(&value_field, ctx).await;
        if ctx.has_error() {
            return Ok(Value::Null);
        }
        if ctx.state.is_const_anywhere(&name).await {
            return Err(AtomFault::Monadic(kind::const_violation("varSet", &name)));
        }
        ctx.state.set_local(&name, value, false).await;
        Ok(Value::Null)
    })
}

fn const_set(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let name: String = atom.decode_required("name")?;
        let value_field = atom.require_field("value")?.clone();
        let value = resolve_value(&value_field, ctx).await;
        if ctx.has_error() {
            return Ok(Value::Null);
        }
        if ctx.state.has_local(&name).await {
            return Err(AtomFault::Monadic(kind::const_redeclare("constSet", &name)));
        }
        ctx.state.set_local(&name, value, true).await;
        Ok(Value::Null)
    })
}

fn vars_import(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let names = atom.require_field("names")?.clone();
        match names {
            Json::Array(list) => {
                for item in list {
                    let name = item.as_str().ok_or_else(|| {
                        kind::validation("varsImport", "names entries must be strings")
                    })?;
                    let value = ctx.args.get(name).cloned().unwrap_or(Value::Null);
                    ctx.state.set_local(name, value, false).await;
                }
            }
            Json::Object(map) => {
                for (alias, path_json) in map {
                    let path = path_json.as_str().ok_or_else(|| {
                        kind::validation("varsImport", "names mapping values must be strings")
                    })?;
                    let value = ctx.args.get(path).cloned().unwrap_or(Value::Null);
                    ctx.state.set_local(&alias, value, false).await;
                }
            }
            _ => {
                return Err(AtomFault::Monadic(kind::validation(
                    "varsImport",
                    "names must be an array or a mapping",
                )))
            }
        }
        Ok(Value::Null)
    })
}

fn vars_let(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        for (key, json) in &atom.fields {
            let resolved = resolve_value(json, ctx).await;
            if ctx.has_error() {
                return Ok(Value::Null);
            }
            ctx.state.set_local(key, resolved, false).await;
        }
        Ok(Value::Null)
    })
}

fn vars_export(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let keys = atom.require_field("keys")?.clone();
        let mut out = IndexMap::new();
        match keys {
            Json::Array(list) => {
                for item in list {
                    let name = item.as_str().ok_or_else(|| {
                        kind::validation("varsExport", "keys entries must be strings")
                    })?;
                    let value = ctx.state.get(name).await.unwrap_or(Value::Null);
                    out.insert(name.to_string(), value);
                }
            }
            Json::Object(map) => {
                for (export_name, source_json) in map {
                    let source = source_json.as_str().ok_or_else(|| {
                        kind::validation("varsExport", "keys mapping values must be strings")
                    })?;
                    let value = ctx.state.get(source).await.unwrap_or(Value::Null);
                    out.insert(export_name, value);
                }
            }
            _ => {
                return Err(AtomFault::Monadic(kind::validation(
                    "varsExport",
                    "keys must be an array or a mapping",
                )))
            }
        }
        Ok(Value::Map(out))
    })
}

fn var_get(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let name: String = atom.decode_required("name")?;
        Ok(ctx.state.get(&name).await.unwrap_or(Value::Null))
    })
}

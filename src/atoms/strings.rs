//! String/object/JSON atoms: `split`, `join`, `template`,
//! `regexMatch`, `pick`, `merge`, `keys`, `jsonParse`, `jsonStringify`.
//! (`xmlParse` is capability-gated and lives in `crate::atoms::io`.)

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::ast::Atom;
use crate::atom::{AtomBody, AtomFault, AtomRegistry, AtomResult, BoxFuture, Cost};
use crate::context::RuntimeContext;
use crate::error::kind;
use crate::eval::resolve_value;
use crate::value::Value;

pub fn register(reg: &mut AtomRegistry) {
    reg_with(reg, "split", split_atom);
    reg_with(reg, "join", join_atom);
    reg_with(reg, "template", template_atom);
    reg_with(reg, "regexMatch", regex_match_atom);
    reg_with(reg, "pick", pick_atom);
    reg_with(reg, "merge", merge_atom);
    reg_with(reg, "keys", keys_atom);
    reg_with(reg, "jsonParse", json_parse_atom);
    reg_with(reg, "jsonStringify", json_stringify_atom);
}

fn reg_with(reg: &mut AtomRegistry, op: &'static str, body: AtomBody) {
    reg.register_def(crate::atom::AtomDef {
        op,
        cost: Cost::Static(0.2),
        timeout_ms: 0,
        body,
        docs: "",
    });
}

async fn resolved_field(op: &str, atom: &Atom, name: &str, ctx: &mut RuntimeContext) -> Result<Value, AtomFault> {
    let json = atom.require_field(name)?.clone();
    let v = resolve_value(&json, ctx).await;
    if ctx.has_error() {
        return Err(AtomFault::Monadic(kind::aborted(op)));
    }
    Ok(v)
}

fn split_atom(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let s = resolved_field("split", atom, "string", ctx).await?;
        let sep = resolved_field("split", atom, "separator", ctx).await?;
        let s = s.as_str().ok_or_else(|| kind::type_error("split", "'string' must be a string"))?;
        let sep = sep.as_str().unwrap_or("");
        let parts: Vec<Value> = if sep.is_empty() {
            s.chars().map(|c| Value::String(c.to_string())).collect()
        } else {
            s.split(sep).map(|p| Value::String(p.to_string())).collect()
        };
        Ok(Value::Array(parts))
    })
}

fn join_atom(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let arr = resolved_field("join", atom, "array", ctx).await?;
        let sep_str = match atom.field("separator").cloned() {
            Some(json) => {
                let v = resolve_value(&json, ctx).await;
                if ctx.has_error() {
                    return Ok(Value::Null);
                }
                v.stringify()
            }
            None => ",".to_string(),
        };
        let items = arr.as_array().ok_or_else(|| kind::type_error("join", "'array' must be an array"))?;
        let joined = items.iter().map(Value::stringify).collect::<Vec<_>>().join(&sep_str);
        Ok(Value::String(joined))
    })
}

static TEMPLATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{\{\s*(\w+)\s*\}\}").unwrap());

fn template_atom(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let template: String = atom.decode_required("template")?;
        let vars_field = atom.field("vars").cloned().unwrap_or(serde_json::Value::Null);
        let vars = resolve_value(&vars_field, ctx).await;
        if ctx.has_error() {
            return Ok(Value::Null);
        }
        let vars_map = vars.as_map();
        let mut out = String::with_capacity(template.len());
        let mut last = 0;
        for m in TEMPLATE_RE.find_iter(&template) {
            out.push_str(&template[last..m.start()]);
            let name = &TEMPLATE_RE.captures(m.as_str()).unwrap()[1];
            let value = vars_map.and_then(|m| m.get(name)).cloned().unwrap_or(Value::Null);
            out.push_str(&value.stringify());
            last = m.end();
        }
        out.push_str(&template[last..]);
        Ok(Value::String(out))
    })
}

fn regex_match_atom(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let s = resolved_field("regexMatch", atom, "string", ctx).await?;
        let s = s.as_str().ok_or_else(|| kind::type_error("regexMatch", "'string' must be a string"))?;
        let pattern: String = atom.decode_required("pattern")?;
        let re = Regex::new(&pattern)
            .map_err(|e| kind::validation("regexMatch", format!("invalid pattern: {e}")))?;
        match re.captures(s) {
            None => Ok(Value::Null),
            Some(caps) => {
                let groups: Vec<Value> = caps
                    .iter()
                    .map(|g| g.map(|m| Value::String(m.as_str().to_string())).unwrap_or(Value::Null))
                    .collect();
                Ok(Value::Array(groups))
            }
        }
    })
}

fn pick_atom(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let obj = resolved_field("pick", atom, "object", ctx).await?;
        let keys_field = atom.require_field("keys")?.clone();
        let keys = resolve_value(&keys_field, ctx).await;
        if ctx.has_error() {
            return Ok(Value::Null);
        }
        let map = obj.as_map().ok_or_else(|| kind::type_error("pick", "'object' must be a map"))?;
        let key_list = keys.as_array().ok_or_else(|| kind::type_error("pick", "'keys' must be an array"))?;
        let mut out = IndexMap::new();
        for k in key_list {
            if let Some(name) = k.as_str() {
                if let Some(v) = map.get(name) {
                    out.insert(name.to_string(), v.clone());
                }
            }
        }
        Ok(Value::Map(out))
    })
}

fn merge_atom(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let objects_field = atom.require_field("objects")?.clone();
        let objects = resolve_value(&objects_field, ctx).await;
        if ctx.has_error() {
            return Ok(Value::Null);
        }
        let list = objects.as_array().ok_or_else(|| kind::type_error("merge", "'objects' must be an array"))?;
        let mut out = IndexMap::new();
        for item in list {
            if let Some(m) = item.as_map() {
                for (k, v) in m {
                    out.insert(k.clone(), v.clone());
                }
            }
        }
        Ok(Value::Map(out))
    })
}

fn keys_atom(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let obj = resolved_field("keys", atom, "object", ctx).await?;
        let map = obj.as_map().ok_or_else(|| kind::type_error("keys", "'object' must be a map"))?;
        Ok(Value::Array(map.keys().map(|k| Value::String(k.clone())).collect()))
    })
}

fn json_parse_atom(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let s = resolved_field("jsonParse", atom, "value", ctx).await?;
        let s = s.as_str().ok_or_else(|| kind::type_error("jsonParse", "'value' must be a string"))?;
        serde_json::from_str::<serde_json::Value>(s)
            .map(Value::from_json)
            .map_err(|e| kind::validation("jsonParse", format!("{e}")).into())
    })
}

fn json_stringify_atom(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let v = resolved_field("jsonStringify", atom, "value", ctx).await?;
        serde_json::to_string(&v.to_json())
            .map(Value::String)
            .map_err(|e| kind::type_error("jsonStringify", format!("{e}")).into())
    })
}

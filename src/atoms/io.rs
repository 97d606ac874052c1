//! I/O atoms behind capabilities: `httpFetch`, `storeGet`,
//! `storeSet`, `storeQuery`, `storeVectorSearch`, `llmPredict`, `xmlParse`,
//! `agentRun`.
//!
//! Every atom here either delegates to an embedder-supplied capability or
//! fails cleanly with "Capability 'x' missing" — none of
//! them touch the network or disk directly except `httpFetch`'s internal
//! `reqwest` fallback, which is itself gated by the domain allowlist.

use base64::Engine;

use crate::ast::Atom;
use crate::atom::{execute_atom, AtomBody, AtomFault, AtomRegistry, AtomResult, BoxFuture, Cost};
use crate::capability::FetchRequest;
use crate::context::{RuntimeContext, MAX_FETCH_DEPTH};
use crate::error::kind;
use crate::eval::resolve_value;
use crate::value::Value;

pub fn register(reg: &mut AtomRegistry) {
    reg_with(reg, "httpFetch", 30_000, http_fetch);
    reg_with(reg, "storeGet", 5_000, store_get);
    reg_with(reg, "storeSet", 5_000, store_set);
    reg_with(reg, "storeQuery", 10_000, store_query);
    reg_with(reg, "storeVectorSearch", 10_000, store_vector_search);
    reg_with(reg, "llmPredict", 60_000, llm_predict);
    reg_with(reg, "xmlParse", 5_000, xml_parse);
    reg_with(reg, "agentRun", 0, agent_run);
    reg_with(reg, "storeProcedure", 0, store_procedure);
    reg_with(reg, "releaseProcedure", 0, release_procedure);
    reg_with(reg, "clearExpiredProcedures", 0, clear_expired_procedures);
}

fn reg_with(reg: &mut AtomRegistry, op: &'static str, timeout_ms: u64, body: AtomBody) {
    reg.register_def(crate::atom::AtomDef {
        op,
        cost: Cost::Static(1.0),
        timeout_ms,
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

async fn resolved_input(atom: &Atom, ctx: &mut RuntimeContext) -> Result<Value, AtomFault> {
    match atom.field("input") {
        Some(json) => {
            let v = resolve_value(json, ctx).await;
            if ctx.has_error() {
                return Err(AtomFault::Monadic(kind::aborted("agentRun")));
            }
            Ok(v)
        }
        None => Ok(Value::Null),
    }
}

async fn optional_field(atom: &Atom, name: &str, ctx: &mut RuntimeContext) -> Option<Value> {
    let json = atom.field(name)?.clone();
    let v = resolve_value(&json, ctx).await;
    if ctx.has_error() {
        return None;
    }
    Some(v)
}

fn is_loopback_host(host: &str) -> bool {
    host == "localhost" || host == "127.0.0.1" || host == "::1"
}

fn domain_allowed(host: &str, allowlist: &Option<Vec<String>>) -> Result<(), String> {
    match allowlist {
        None => {
            if is_loopback_host(host) {
                Ok(())
            } else {
                Err(format!(
                    "httpFetch: '{host}' is not loopback and no 'allowedFetchDomains' is configured"
                ))
            }
        }
        Some(domains) => {
            for d in domains {
                if let Some(suffix) = d.strip_prefix("*.") {
                    if host == suffix || host.ends_with(&format!(".{suffix}")) {
                        return Ok(());
                    }
                } else if host == d {
                    return Ok(());
                }
            }
            Err(format!("httpFetch: '{host}' is not in 'allowedFetchDomains'"))
        }
    }
}

fn http_fetch(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let url_v = resolved_field("httpFetch", atom, "url", ctx).await?;
        let url = url_v
            .as_str()
            .ok_or_else(|| kind::type_error("httpFetch", "'url' must be a string"))?
            .to_string();
        let method = match optional_field(atom, "method", ctx).await {
            Some(v) => v.as_str().unwrap_or("GET").to_uppercase(),
            None => "GET".to_string(),
        };
        let headers = match optional_field(atom, "headers", ctx).await {
            Some(Value::Map(m)) => m
                .into_iter()
                .map(|(k, v)| (k, v.stringify()))
                .collect::<Vec<_>>(),
            _ => Vec::new(),
        };
        let body = optional_field(atom, "body", ctx).await.map(|v| match v {
            Value::String(s) => s,
            other => other.stringify(),
        });
        let response_type = optional_field(atom, "responseType", ctx)
            .await
            .and_then(|v| v.as_str().map(|s| s.to_string()));
        if ctx.has_error() {
            return Ok(Value::Null);
        }

        let parsed = reqwest::Url::parse(&url)
            .map_err(|e| kind::validation("httpFetch", format!("invalid url: {e}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| kind::validation("httpFetch", "url has no host"))?
            .to_string();

        let allowlist = ctx.context.as_ref().and_then(|c| c.allowed_fetch_domains.clone());
        if let Err(msg) = domain_allowed(&host, &allowlist) {
            return Err(AtomFault::Monadic(kind::security("httpFetch", &msg)));
        }

        let request_depth = ctx.context.as_ref().map(|c| c.request_depth).unwrap_or(0);
        let agent_depth_header = 1 + request_depth;
        if agent_depth_header > MAX_FETCH_DEPTH {
            return Err(AtomFault::Monadic(kind::depth_exceeded("httpFetch")));
        }
        let mut headers = headers;
        headers.push(("X-Agent-Depth".to_string(), agent_depth_header.to_string()));

        let req = FetchRequest {
            url: url.clone(),
            method,
            headers,
            body,
            response_type: response_type.clone(),
        };

        let (status, content_type, body_bytes) = if let Some(cap) = ctx.capabilities.fetch.clone() {
            let signal = Some(ctx.signal.clone());
            cap.fetch(req, signal)
                .await
                .map(|r| (r.status, r.content_type, r.body))
                .map_err(|e| kind::capability_error("httpFetch", e))?
        } else {
            tracing::warn!("no fetch capability supplied, falling back to the built-in reqwest client");
            fetch_via_reqwest(req)
                .await
                .map_err(|e| kind::capability_error("httpFetch", e))?
        };

        if !(200..300).contains(&status) {
            return Err(AtomFault::Monadic(kind::capability_error(
                "httpFetch",
                format!("http status {status}"),
            )));
        }

        let is_json_ct = content_type.as_deref().is_some_and(|ct| ct.contains("application/json"));
        match response_type.as_deref() {
            Some("dataUrl") => {
                let ct = content_type.clone().unwrap_or_else(|| "application/octet-stream".to_string());
                let encoded = base64::engine::general_purpose::STANDARD.encode(&body_bytes);
                Ok(Value::String(format!("data:{ct};base64,{encoded}")))
            }
            Some("json") => {
                let text = String::from_utf8_lossy(&body_bytes);
                serde_json::from_str::<serde_json::Value>(&text)
                    .map(Value::from_json)
                    .map_err(|e| kind::validation("httpFetch", format!("invalid json response: {e}")).into())
            }
            _ if is_json_ct => {
                let text = String::from_utf8_lossy(&body_bytes);
                serde_json::from_str::<serde_json::Value>(&text)
                    .map(Value::from_json)
                    .map_err(|e| kind::validation("httpFetch", format!("invalid json response: {e}")).into())
            }
            _ => Ok(Value::String(String::from_utf8_lossy(&body_bytes).to_string())),
        }
    })
}

async fn fetch_via_reqwest(req: FetchRequest) -> Result<crate::capability::FetchResponse, String> {
    let client = reqwest::Client::new();
    let method = reqwest::Method::from_bytes(req.method.as_bytes()).map_err(|e| e.to_string())?;
    let mut builder = client.request(method, &req.url);
    for (k, v) in &req.headers {
        builder = builder.header(k, v);
    }
    if let Some(body) = req.body {
        builder = builder.body(body);
    }
    let resp = builder.send().await.map_err(|e| e.to_string())?;
    let status = resp.status().as_u16();
    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());
    let body = resp.bytes().await.map_err(|e| e.to_string())?.to_vec();
    Ok(crate::capability::FetchResponse { status, content_type, body })
}

fn store_get(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let key_v = resolved_field("storeGet", atom, "key", ctx).await?;
        let key = key_v.stringify();
        let cap = ctx
            .capabilities
            .store
            .clone()
            .ok_or_else(|| kind::capability_missing("storeGet", "store"))?;
        cap.get(&key).await.map_err(|e| kind::capability_error("storeGet", e).into())
    })
}

fn store_set(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let key_v = resolved_field("storeSet", atom, "key", ctx).await?;
        let value = resolved_field("storeSet", atom, "value", ctx).await?;
        let key = key_v.stringify();
        let cap = ctx
            .capabilities
            .store
            .clone()
            .ok_or_else(|| kind::capability_missing("storeSet", "store"))?;
        cap.set(&key, value)
            .await
            .map(|_| Value::Null)
            .map_err(|e| kind::capability_error("storeSet", e).into())
    })
}

fn store_query(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let query = resolved_field("storeQuery", atom, "query", ctx).await?;
        let cap = ctx
            .capabilities
            .store
            .clone()
            .ok_or_else(|| kind::capability_missing("storeQuery", "store"))?;
        cap.query(query)
            .await
            .map(Value::Array)
            .map_err(|e| kind::capability_error("storeQuery", e).into())
    })
}

fn store_vector_search(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let collection_v = resolved_field("storeVectorSearch", atom, "collection", ctx).await?;
        let vector_v = resolved_field("storeVectorSearch", atom, "vector", ctx).await?;
        let collection = collection_v
            .as_str()
            .ok_or_else(|| kind::type_error("storeVectorSearch", "'collection' must be a string"))?
            .to_string();
        let vector: Vec<f64> = vector_v
            .as_array()
            .ok_or_else(|| kind::type_error("storeVectorSearch", "'vector' must be an array"))?
            .iter()
            .filter_map(Value::as_f64)
            .collect();
        let k = optional_field(atom, "k", ctx).await.and_then(|v| v.as_f64()).map(|n| n as u32);
        let filter = optional_field(atom, "filter", ctx).await;
        let cap = ctx
            .capabilities
            .store
            .clone()
            .ok_or_else(|| kind::capability_missing("storeVectorSearch", "store"))?;
        cap.vector_search(&collection, vector, k, filter)
            .await
            .map(Value::Array)
            .map_err(|e| kind::capability_error("storeVectorSearch", e).into())
    })
}

fn llm_predict(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let prompt = resolved_field("llmPredict", atom, "prompt", ctx).await?;
        let options = optional_field(atom, "options", ctx).await;
        let cap = ctx
            .capabilities
            .llm
            .clone()
            .ok_or_else(|| kind::capability_missing("llmPredict", "llm"))?;
        cap.predict(prompt, options)
            .await
            .map_err(|e| kind::capability_error("llmPredict", e).into())
    })
}

fn xml_parse(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let text_v = resolved_field("xmlParse", atom, "text", ctx).await?;
        let text = text_v
            .as_str()
            .ok_or_else(|| kind::type_error("xmlParse", "'text' must be a string"))?;
        let cap = ctx
            .capabilities
            .xml
            .clone()
            .ok_or_else(|| kind::capability_missing("xmlParse", "xml"))?;
        cap.parse(text)
            .await
            .map_err(|e| kind::capability_error("xmlParse", e).into())
    })
}

/// Executes either an inline AST, a stored procedure token, or (for a
/// string that does not carry the procedure-token prefix) delegates to
/// the `agent` capability as an externally-addressed agent id — the
/// three shapes `atom.field("agent")` can take on the wire. The AST/token
/// paths run via *this* VM using the *caller's* context and
/// capabilities — the callee shares `ctx.fuel`, `ctx.signal`,
/// `ctx.registry`, and `ctx.procedures` with the caller, but runs in its
/// own fresh scope frame and its own `output`/`error` slots so a failure
/// inside the callee doesn't leak into the caller's dispatch loop before
/// being explicitly re-raised below.
fn agent_run(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        if ctx.agent_depth >= ctx.max_agent_depth {
            return Err(AtomFault::Monadic(kind::depth_exceeded("agentRun")));
        }

        let agent_field = atom
            .field("agent")
            .ok_or_else(|| kind::validation("agentRun", "missing field 'agent'"))?
            .clone();

        if let serde_json::Value::String(id) = &agent_field {
            if !id.starts_with(crate::procedures::TOKEN_PREFIX) {
                let input = resolved_input(atom, ctx).await?;
                let cap = ctx
                    .capabilities
                    .agent
                    .clone()
                    .ok_or_else(|| kind::capability_missing("agentRun", "agent"))?;
                return cap
                    .run(id, input)
                    .await
                    .map_err(|e| kind::capability_error("agentRun", e).into());
            }
        }

        let ast = match &agent_field {
            serde_json::Value::String(token) => {
                let entry = ctx
                    .procedures
                    .lookup(token)
                    .await
                    .ok_or_else(|| kind::validation("agentRun", format!("unknown or expired procedure '{token}'")))?;
                (*entry.ast).clone()
            }
            json => serde_json::from_value::<crate::ast::Atom>(json.clone())
                .map_err(|e| kind::validation("agentRun", format!("'agent' is not a valid AST: {e}")))?,
        };
        if !ast.is_seq() {
            return Err(AtomFault::Monadic(kind::validation(
                "agentRun",
                "callee AST must be rooted at `seq`",
            )));
        }

        let input = resolved_input(atom, ctx).await?;
        let args = match input {
            Value::Map(m) => m,
            other => {
                let mut m = indexmap::IndexMap::new();
                m.insert("input".to_string(), other);
                m
            }
        };

        let mut callee_ctx = RuntimeContext {
            fuel: ctx.fuel.clone(),
            args,
            state: crate::scope::ScopeRef::root(),
            capabilities: ctx.capabilities.clone(),
            output: None,
            error: None,
            memo: std::collections::HashMap::new(),
            trace_enabled: ctx.trace_enabled,
            trace: ctx.trace.clone(),
            signal: ctx.signal.clone(),
            cost_overrides: ctx.cost_overrides.clone(),
            context: ctx.context.clone(),
            registry: ctx.registry.clone(),
            procedures: ctx.procedures.clone(),
            agent_depth: ctx.agent_depth + 1,
            max_agent_depth: ctx.max_agent_depth,
        };

        execute_atom(&ast, &mut callee_ctx).await?;

        if let Some(err) = callee_ctx.error {
            return Err(AtomFault::Monadic(err));
        }
        Ok(callee_ctx.output.unwrap_or(Value::Null))
    })
}

/// `storeProcedure(ast, ttl?, maxSize?)`: `ast` is a raw
/// AST fragment, not an expression to resolve — mirrors how `agentRun`
/// reads its own `agent` field directly off the wire.
fn store_procedure(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let ast_json = atom
            .field("ast")
            .ok_or_else(|| kind::validation("storeProcedure", "missing field 'ast'"))?
            .clone();
        let ast: crate::ast::Atom = serde_json::from_value(ast_json)
            .map_err(|e| kind::validation("storeProcedure", format!("'ast' is not a valid AST: {e}")))?;
        let ttl_ms = atom.decode_field::<u64>("ttl")?;
        let max_size = atom.decode_field::<usize>("maxSize")?;
        let owner_hint = ctx.context.as_ref().and_then(|c| c.user.as_ref()).map(Value::stringify);

        if ctx.has_error() {
            return Ok(Value::Null);
        }

        let token = ctx
            .procedures
            .store(ast, ttl_ms, max_size, owner_hint)
            .await
            .map_err(|e| kind::validation("storeProcedure", e.message()))?;
        Ok(Value::Proc(token))
    })
}

/// Accepts either a `Value::Proc` (the shape `storeProcedure` returns) or
/// a plain string carrying the same token text.
fn token_text(op: &str, v: &Value) -> Result<&str, crate::value::ErrorValue> {
    match v {
        Value::Proc(t) => Ok(t.0.as_str()),
        Value::String(s) => Ok(s.as_str()),
        _ => Err(kind::type_error(op, "'token' must be a proc token or string")),
    }
}

fn release_procedure(atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let token_v = resolved_field("releaseProcedure", atom, "token", ctx).await?;
        let token = token_text("releaseProcedure", &token_v)?;
        let released = ctx.procedures.release(token).await;
        Ok(Value::Bool(released))
    })
}

fn clear_expired_procedures(_atom: &Atom, ctx: &mut RuntimeContext) -> BoxFuture<'_, AtomResult> {
    Box::pin(async move {
        let removed = ctx.procedures.clear_expired().await;
        Ok(Value::Int(removed as i64))
    })
}

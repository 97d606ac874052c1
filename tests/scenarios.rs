//! End-to-end scenarios run through the public `Vm` API.

use agentrt::context::RequestContext;
use agentrt::vm::{RunOptions, Vm};
use agentrt::value::Value;
use indexmap::IndexMap;
use serde_json::json;

fn atom(json: serde_json::Value) -> agentrt::ast::Atom {
    serde_json::from_value(json).unwrap()
}

#[tokio::test]
async fn arithmetic_return() {
    let program = atom(json!({
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

fn conditional_program() -> agentrt::ast::Atom {
    atom(json!({
        "op": "seq",
        "steps": [
            {
                "op": "if",
                "condition": { "$expr": "binary", "op": ">=",
                    "left": { "$expr": "ident", "name": "age" },
                    "right": { "$expr": "literal", "value": 18 } },
                "then": [{ "op": "varSet", "name": "status", "value": "adult" }],
                "else": [{ "op": "varSet", "name": "status", "value": "minor" }]
            },
            { "op": "return", "schema": { "properties": { "status": {} } } }
        ]
    }))
}

#[tokio::test]
async fn conditional_adult() {
    let vm = Vm::default();
    let mut args = IndexMap::new();
    args.insert("age".to_string(), Value::Int(25));
    let result = vm.run(conditional_program().into(), args, RunOptions::default()).await.unwrap();
    assert_eq!(
        result.result,
        Value::Map(IndexMap::from([("status".to_string(), Value::String("adult".into()))]))
    );
}

#[tokio::test]
async fn conditional_minor() {
    let vm = Vm::default();
    let mut args = IndexMap::new();
    args.insert("age".to_string(), Value::Int(15));
    let result = vm.run(conditional_program().into(), args, RunOptions::default()).await.unwrap();
    assert_eq!(
        result.result,
        Value::Map(IndexMap::from([("status".to_string(), Value::String("minor".into()))]))
    );
}

#[tokio::test]
async fn infinite_loop_with_small_fuel() {
    let program = atom(json!({
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
async fn security_guard_on_forbidden_property() {
    let program = atom(json!({
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
async fn recursive_fetch_guard_rejects_before_any_http() {
    // requestDepth already at the ceiling: httpFetch must refuse before
    // issuing any outbound call, regardless of capability wiring.
    let program = atom(json!({
        "op": "seq",
        "steps": [{
            "op": "httpFetch",
            "url": "http://localhost/self"
        }]
    }));
    let vm = Vm::default();
    let opts = RunOptions {
        context: Some(RequestContext { request_depth: 10, ..Default::default() }),
        ..Default::default()
    };
    let result = vm.run(program.into(), IndexMap::new(), opts).await.unwrap();
    let err = result.error.unwrap();
    assert!(err.message.contains("depth exceeded"), "got: {}", err.message);
}

#[tokio::test]
async fn caller_context_isolation_of_stored_procedure() {
    // Store a procedure once, then invoke it twice with different caller
    // contexts: the callee always sees the *current caller's* context,
    // never the storer's.
    let vm = Vm::default();
    let stored = atom(json!({
        "op": "seq",
        "steps": [{ "op": "return", "value": { "$expr": "literal", "value": "ok" } }]
    }));
    let token = vm.procedures().store(stored, None, None, Some("storer".to_string())).await.unwrap();

    let caller_a = atom(json!({
        "op": "seq",
        "steps": [{ "op": "agentRun", "result": "out", "agent": token.0.clone(), "input": {} }]
    }));
    let opts_a = RunOptions {
        context: Some(RequestContext { permissions: vec!["admin".to_string()], ..Default::default() }),
        ..Default::default()
    };
    let result_a = vm.run(caller_a.into(), IndexMap::new(), opts_a).await.unwrap();
    assert!(result_a.error.is_none());

    // A second, differently-permissioned caller reuses the same token;
    // the stored AST carries no trace of caller A's context.
    let caller_b = atom(json!({
        "op": "seq",
        "steps": [{ "op": "agentRun", "result": "out", "agent": token.0, "input": {} }]
    }));
    let opts_b = RunOptions {
        context: Some(RequestContext { permissions: vec!["read".to_string()], ..Default::default() }),
        ..Default::default()
    };
    let result_b = vm.run(caller_b.into(), IndexMap::new(), opts_b).await.unwrap();
    assert!(result_b.error.is_none());
}

#[tokio::test]
async fn store_then_release_procedure_token() {
    let vm = Vm::default();
    let ast = atom(json!({ "op": "seq", "steps": [] }));
    let program = atom(json!({
        "op": "seq",
        "steps": [{
            "op": "storeProcedure",
            "result": "token",
            "ast": ast
        }, {
            "op": "releaseProcedure",
            "result": "released",
            "token": { "$expr": "ident", "name": "token" }
        }],
    }));
    let result = vm.run(program.into(), IndexMap::new(), RunOptions::default()).await.unwrap();
    assert!(result.error.is_none());
}

#[tokio::test]
async fn malformed_root_and_unknown_opcode_are_host_exceptions() {
    let vm = Vm::default();
    let not_seq = atom(json!({ "op": "varSet", "name": "x", "value": 1 }));
    assert!(matches!(
        vm.run(not_seq.into(), IndexMap::new(), RunOptions::default()).await,
        Err(agentrt::EngineError::MalformedRoot { .. })
    ));

    let unknown_op = atom(json!({ "op": "seq", "steps": [{ "op": "notARealOp" }] }));
    assert!(matches!(
        vm.run(unknown_op.into(), IndexMap::new(), RunOptions::default()).await,
        Err(agentrt::EngineError::UnknownOpcode { .. })
    ));
}

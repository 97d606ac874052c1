//! Exercises the legacy flat-string `if`/`while` condition shape
//! end-to-end through `Vm::run`.

use agentrt::value::Value;
use agentrt::vm::{RunOptions, Vm};
use indexmap::IndexMap;
use serde_json::json;

fn atom(json: serde_json::Value) -> agentrt::ast::Atom {
    serde_json::from_value(json).unwrap()
}

#[tokio::test]
async fn legacy_string_condition_with_vars_rename() {
    let program = atom(json!({
        "op": "seq",
        "steps": [
            {
                "op": "if",
                "condition": "n > 10",
                "vars": { "n": "threshold" },
                "then": [{ "op": "varSet", "name": "big", "value": true }],
                "else": [{ "op": "varSet", "name": "big", "value": false }]
            },
            { "op": "return", "schema": { "properties": { "big": {} } } }
        ]
    }));
    let mut args = IndexMap::new();
    args.insert("threshold".to_string(), Value::Int(42));

    let vm = Vm::default();
    let result = vm.run(program.into(), args, RunOptions::default()).await.unwrap();
    assert!(result.error.is_none());
    assert_eq!(
        result.result,
        Value::Map(IndexMap::from([("big".to_string(), Value::Bool(true))]))
    );
}

#[tokio::test]
async fn legacy_while_condition_terminates_on_state_update() {
    let program = atom(json!({
        "op": "seq",
        "steps": [
            { "op": "varSet", "name": "count", "value": 0 },
            {
                "op": "while",
                "condition": "count < 3",
                "steps": [{
                    "op": "varSet",
                    "name": "count",
                    "value": { "$expr": "binary", "op": "+",
                        "left": { "$expr": "ident", "name": "count" },
                        "right": { "$expr": "literal", "value": 1 } }
                }]
            },
            { "op": "return", "schema": { "properties": { "count": {} } } }
        ]
    }));

    let vm = Vm::default();
    let result = vm.run(program.into(), IndexMap::new(), RunOptions::default()).await.unwrap();
    assert!(result.error.is_none());
    assert_eq!(
        result.result,
        Value::Map(IndexMap::from([("count".to_string(), Value::Int(3))]))
    );
}

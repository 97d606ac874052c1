//! Fixture-driven test harness: loads a JSON fixture describing a
//! program, its args, and the expected outcome, runs it through `Vm`,
//! and asserts. Fixtures compare `RunResult` fields directly since the
//! wire format is already structured JSON.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use agentrt::value::Value;
use agentrt::vm::{RunOptions, Vm};
use indexmap::IndexMap;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Fixture {
    pub program: agentrt::ast::Atom,
    #[serde(default)]
    pub args: IndexMap<String, serde_json::Value>,
    #[serde(default)]
    pub fuel: Option<f64>,
    pub expect: Expectation,
}

#[derive(Debug, Deserialize)]
pub struct Expectation {
    /// Expected `RunResult.result`, compared as JSON.
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    /// Substring expected in `RunResult.error.message`, if any.
    #[serde(default)]
    pub error_contains: Option<String>,
    /// When true, asserts `RunResult.error` is `None`.
    #[serde(default)]
    pub no_error: bool,
}

fn fixtures_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

pub fn load_fixture(name: &str) -> Fixture {
    let path = fixtures_dir().join(name);
    let text = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("reading fixture '{}': {e}", path.display()));
    serde_json::from_str(&text).unwrap_or_else(|e| panic!("parsing fixture '{}': {e}", path.display()))
}

/// Runs a fixture's program against a fresh `Vm` and checks `expect`.
pub async fn run_and_check(name: &str) {
    let fixture = load_fixture(name);
    let args: IndexMap<String, Value> = fixture
        .args
        .into_iter()
        .map(|(k, v)| (k, Value::from_json(v)))
        .collect();
    let opts = RunOptions { fuel: fixture.fuel, ..Default::default() };

    let vm = Vm::default();
    let result = vm.run(fixture.program.into(), args, opts).await.unwrap();

    if fixture.expect.no_error {
        assert!(result.error.is_none(), "fixture '{name}' expected no error, got {:?}", result.error);
    }
    if let Some(expected) = fixture.expect.result {
        assert_eq!(result.result.to_json(), expected, "fixture '{name}' result mismatch");
    }
    if let Some(substr) = fixture.expect.error_contains {
        let message = result.error.map(|e| e.message).unwrap_or_default();
        assert!(
            message.contains(&substr),
            "fixture '{name}' expected error containing '{substr}', got '{message}'"
        );
    }
}

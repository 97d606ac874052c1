//! Regression test for the `agentrt-run` CLI harness.

use std::fs;

use assert_cmd::Command;
use predicates::str::contains;

#[test]
fn cli_runs_a_program_file_and_prints_json_result() {
    let program_path = "tests/tmp_arithmetic_program.json";
    fs::write(
        program_path,
        r#"{
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
        }"#,
    )
    .unwrap();

    let mut cmd = Command::cargo_bin("agentrt-run").unwrap();
    cmd.arg(program_path).arg("--arg").arg("a=5").arg("--arg").arg("b=3");
    cmd.assert().success().stdout(contains("\"sum\": 8"));

    let _ = fs::remove_file(program_path);
}

#[test]
fn cli_reports_malformed_root_as_a_diagnostic() {
    let program_path = "tests/tmp_malformed_program.json";
    fs::write(program_path, r#"{ "op": "varSet", "name": "x", "value": 1 }"#).unwrap();

    let mut cmd = Command::cargo_bin("agentrt-run").unwrap();
    cmd.arg(program_path);
    cmd.assert().failure().stderr(contains("seq"));

    let _ = fs::remove_file(program_path);
}

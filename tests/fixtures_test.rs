//! Runs the JSON fixtures under `tests/fixtures/` through the harness in
//! `tests/common/mod.rs`.

mod common;

#[tokio::test]
async fn arithmetic_return() {
    common::run_and_check("arithmetic_return.json").await;
}

#[tokio::test]
async fn conditional_status() {
    common::run_and_check("conditional_status.json").await;
}

#[tokio::test]
async fn out_of_fuel() {
    common::run_and_check("out_of_fuel.json").await;
}

#[tokio::test]
async fn forbidden_property() {
    common::run_and_check("forbidden_property.json").await;
}

//! The `agentrt-run` CLI harness, grounded in the
//! teacher's `cli.rs`: parse args, build `RunOptions`, call the engine,
//! print the result. Not a product surface — a way to run a program
//! from a shell for development and manual testing.

pub mod args;

use std::io::Read;

use indexmap::IndexMap;

use crate::ast::Atom;
use crate::config::VmConfig;
use crate::context::RequestContext;
use crate::value::Value;
use crate::vm::{ProgramInput, RunOptions, Vm};

use args::RunArgs;

pub async fn run(args: RunArgs) -> miette::Result<()> {
    let source = read_program_source(args.file.as_deref())?;
    let ast: Atom = serde_json::from_str(&source)
        .map_err(|e| miette::miette!("parsing program JSON: {e}"))?;

    let config = match &args.config {
        Some(path) => VmConfig::from_json_file(path)
            .map_err(|e| miette::miette!("loading config: {e}"))?,
        None => VmConfig::default(),
    };

    let program_args = parse_program_args(&args.args)
        .map_err(|e| miette::miette!("parsing --arg: {e}"))?;

    let context = if args.fetch_domains.is_empty() {
        None
    } else {
        Some(RequestContext { allowed_fetch_domains: Some(args.fetch_domains), ..Default::default() })
    };

    let vm = Vm::new(config);
    let options = RunOptions {
        fuel: args.fuel,
        trace: args.trace,
        context,
        ..Default::default()
    };

    let result = vm.run(ProgramInput::Ast(ast), program_args, options).await?;
    let printed = serde_json::to_string_pretty(&result)
        .map_err(|e| miette::miette!("serializing result: {e}"))?;
    println!("{printed}");
    Ok(())
}

fn read_program_source(file: Option<&std::path::Path>) -> miette::Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| miette::miette!("reading '{}': {e}", path.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| miette::miette!("reading stdin: {e}"))?;
            Ok(buf)
        }
    }
}

fn parse_program_args(pairs: &[(String, String)]) -> Result<IndexMap<String, Value>, String> {
    let mut out = IndexMap::new();
    for (key, raw) in pairs {
        let value = serde_json::from_str::<serde_json::Value>(raw)
            .map(Value::from_json)
            .unwrap_or_else(|_| Value::String(raw.clone()));
        out.insert(key.clone(), value);
    }
    Ok(out)
}

//! `eule`: compile a module, encode a call into it, and run it to
//! completion against a fresh state.
//!
//! Like `eulc`, the module is read as a JSON [`eulvm_emitter::ast::Module`]
//! rather than EulVM's concrete syntax.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use eulvm_emitter::ast::Module;
use eulvm_emitter::{encode_calldata, Emitter};
use eulvm_runtime::Interpreter;
use eulvm_storage::StateKv;

/// Compile an EulVM module (given as its JSON AST), call one of its
/// external entry points, and print the return data.
#[derive(Parser)]
struct Args {
    /// Path to the module's JSON AST.
    input: PathBuf,

    /// Name of the external function to call.
    entry: String,

    /// Arguments to the call, in declared parameter order.
    args: Vec<String>,

    /// Increase log verbosity; repeat for more (`-v`, `-vv`). Overridden
    /// by `RUST_LOG` if set.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    eulvm_cli::init_tracing(args.verbose);

    let config = eulvm_cli::load_config(
        args.input.parent().unwrap_or_else(|| std::path::Path::new(".")),
    )?;

    let source = fs::read_to_string(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let module: Module = serde_json::from_str(&source)
        .with_context(|| format!("parsing {} as a module AST", args.input.display()))?;

    let compiled = match Emitter::new().compile_module(&module) {
        Ok(compiled) => compiled,
        Err(e) => {
            eprintln!("ERROR {e}");
            return Ok(ExitCode::FAILURE);
        }
    };

    let calldata = match encode_calldata(&compiled.functions, &args.entry, &args.args) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("ERROR {e}");
            return Ok(ExitCode::FAILURE);
        }
    };

    let mut state = StateKv::with_config(config.storage);
    let mut interpreter = Interpreter::with_config(&mut state, config.vm);
    match interpreter.run(&compiled.program, &calldata) {
        Ok(words) => {
            for word in words {
                println!("{word}");
            }
            for line in interpreter.output() {
                println!("{line}");
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(fault) => {
            eprintln!("ERROR {fault}");
            Ok(ExitCode::FAILURE)
        }
    }
}

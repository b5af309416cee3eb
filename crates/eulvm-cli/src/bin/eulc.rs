//! `eulc`: compile a module to a bytecode dump.
//!
//! The source language's own lexer/parser is out of scope for this
//! toolchain slice, so `eulc` reads its input as the JSON encoding of
//! [`eulvm_emitter::ast::Module`] — the same tree a real front end would
//! hand the emitter — rather than EulVM's concrete surface syntax.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use eulvm_asm::codec;
use eulvm_emitter::ast::Module;
use eulvm_emitter::Emitter;

/// Compile an EulVM module (given as its JSON AST) to a bytecode dump.
#[derive(Parser)]
struct Args {
    /// Path to the module's JSON AST.
    input: PathBuf,

    /// Where to write the compiled bytecode dump. Defaults to `input`
    /// with its extension replaced by `.bin`.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Increase log verbosity; repeat for more (`-v`, `-vv`). Overridden
    /// by `RUST_LOG` if set.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();
    eulvm_cli::init_tracing(args.verbose);

    let source = fs::read_to_string(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let module: Module = serde_json::from_str(&source)
        .with_context(|| format!("parsing {} as a module AST", args.input.display()))?;

    let compiled = Emitter::new()
        .compile_module(&module)
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("compilation failed")?;

    let output = args
        .output
        .unwrap_or_else(|| args.input.with_extension("bin"));
    let bytes = codec::dump_to_vec(&compiled.program);
    fs::write(&output, &bytes).with_context(|| format!("writing {}", output.display()))?;

    tracing::info!(
        instructions = compiled.program.len(),
        prealloc_bytes = compiled.program.prealloc_memory.len(),
        output = %output.display(),
        "compiled"
    );
    Ok(())
}

//! Calldata encoding for a compiled module's external entry points:
//! `entry_addr:32 || arg_1:32 || ... || arg_n:32`.

use std::collections::HashMap;

use eulvm_types::Word;
use thiserror::Error;

use crate::ast::Type;
use crate::emitter::CompiledFunc;
use crate::literal;

/// A calldata-encoding failure, surfaced by the CLI's `eule` runner.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AbiError {
    /// The named entry function doesn't exist in the compiled module.
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
    /// The supplied argument count didn't match the function's declared
    /// parameter count.
    #[error("`{name}` expects {expected} argument(s), found {found}")]
    ArityMismatch {
        /// The entry function's name.
        name: String,
        /// Declared parameter count.
        expected: usize,
        /// Supplied argument count.
        found: usize,
    },
    /// One argument string couldn't be parsed as its parameter's declared
    /// type.
    #[error("argument {index} (`{value}`) is not a valid {ty}")]
    BadArgument {
        /// Zero-based argument index.
        index: usize,
        /// The offending argument text.
        value: String,
        /// The type it failed to parse as.
        ty: Type,
    },
}

/// Encode `args` (raw command-line strings) as calldata for a call into
/// `entry`, per `functions`' declared parameter types.
///
/// An `external` function's address is unresolved until after the whole
/// module compiles, so this is a free function over
/// [`crate::CompiledModule::functions`] rather than a method on the
/// emitter itself.
pub fn encode_calldata(
    functions: &HashMap<String, CompiledFunc>,
    entry: &str,
    args: &[String],
) -> Result<Vec<u8>, AbiError> {
    let func = functions
        .get(entry)
        .ok_or_else(|| AbiError::UnknownFunction(entry.to_string()))?;

    if func.params.len() != args.len() {
        return Err(AbiError::ArityMismatch {
            name: entry.to_string(),
            expected: func.params.len(),
            found: args.len(),
        });
    }

    let addr = func
        .addr
        .expect("every function's address is resolved once compile_module returns");

    let mut out = Vec::with_capacity(32 * (1 + args.len()));
    out.extend_from_slice(&Word::from_u64(addr).to_be_bytes());

    for (i, (arg, (_, ty))) in args.iter().zip(func.params.iter()).enumerate() {
        let word = encode_arg(arg, *ty).ok_or_else(|| AbiError::BadArgument {
            index: i,
            value: arg.clone(),
            ty: *ty,
        })?;
        out.extend_from_slice(&word.to_be_bytes());
    }

    Ok(out)
}

fn encode_arg(s: &str, ty: Type) -> Option<Word> {
    match ty {
        Type::I64 => s.parse::<i64>().ok().map(|v| Word::from_u64(v as u64)),
        Type::Bool => match s {
            "true" => Some(Word::ONE),
            "false" => Some(Word::ZERO),
            _ => None,
        },
        Type::Bytes32 => literal::parse_bytes32(s),
        Type::Address => literal::parse_address(s),
        Type::Void => None,
    }
}

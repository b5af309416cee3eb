//! Bytecode emitter and calldata ABI encoder: lowers a typed [`ast::Module`]
//! into an [`eulvm_asm::Program`], and encodes a call's arguments into the
//! calldata layout that program expects.
//!
//! This crate owns the compile-time half of the toolchain. The lexer and
//! parser that produce an [`ast::Module`] are out of scope — see
//! [`ast`]'s module doc.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod abi;
pub mod ast;
mod emitter;
mod error;
mod literal;
mod scope;

pub use abi::{encode_calldata, AbiError};
pub use emitter::{CompiledFunc, CompiledMap, CompiledModule, Emitter};
pub use error::{EmitError, SourceSpan};
pub use scope::{CompiledVar, ScopeTree, Storage};

//! Instruction set, program representation and binary dump format of the
//! EulVM.
//!
//! This crate is the wire format both the emitter (`eulvm-emitter`) and
//! the interpreter (`eulvm-runtime`) agree on: [`Opcode`]/[`Instruction`]
//! describe one bytecode op, [`Program`] is the ordered sequence plus its
//! preallocated memory image, and [`codec`] (de)serializes a `Program` to
//! its length-prefixed binary format, documented on [`codec::dump`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
mod hash;
mod instruction;
pub mod layout;
pub mod native;
mod opcode;
mod program;

pub use codec::DecodeError;
pub use hash::{keccak256, map_name_prefix, map_slot_key, variable_key};
pub use instruction::Instruction;
pub use opcode::Opcode;
pub use program::Program;

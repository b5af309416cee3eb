use thiserror::Error;

use eulvm_types::MemoryError;

/// Runtime fault kinds. Every variant is fatal: there is no in-program
/// recovery, faults always surface to the `run` caller.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// `ip` is out of range of the program.
    #[error("illegal program counter: ip {ip} is out of range (program has {program_len} instructions)")]
    IllegalProgramCounter {
        /// The offending instruction pointer.
        ip: usize,
        /// Length of the program being executed.
        program_len: usize,
    },

    /// A memory load/store went outside the buffer's capacity.
    #[error("invalid memory access: {0}")]
    InvalidMemoryAccess(#[from] MemoryError),

    /// A `NATIVE` instruction referenced an id with no registered handler.
    #[error("unknown native id {id}")]
    UnknownNative {
        /// The unregistered native id.
        id: u64,
    },

    /// Execution ran for the configured instruction budget
    /// ([`crate::VmConfig::exec_limit`]) without reaching `STOP`.
    #[error("execution limit exceeded ({limit} instructions)")]
    ExecutionLimit {
        /// The configured limit.
        limit: usize,
    },

    /// A `PUSH`/`DUP`/`CALL`/producing instruction was attempted with the
    /// stack already at [`crate::consts::STACK_CAP`].
    #[error("stack overflow: stack is already at capacity {capacity}")]
    StackOverflow {
        /// The stack's fixed capacity.
        capacity: usize,
    },

    /// A consuming instruction was attempted with fewer operands on the
    /// stack than it needs.
    #[error("stack underflow: needed {needed} operand(s), stack has {available}")]
    StackUnderflow {
        /// Operands the instruction needed.
        needed: usize,
        /// Operands actually available.
        available: usize,
    },
}

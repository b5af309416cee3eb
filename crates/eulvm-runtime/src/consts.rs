use eulvm_types::DEFAULT_MEM_CAP;

/// Maximum number of stack slots. Slot `0` is unused — the size counter
/// indexes from `1`, matching the emitter's `stack[++size]` convention —
/// so the usable depth is `STACK_CAP - 1`.
///
/// Fixed at compile time, unlike [`VmConfig`]'s other knobs: the stack is
/// a `[Word; STACK_CAP]` array, not a `Vec`, so there is no dynamic
/// growth to bound at runtime. Changing the usable depth means
/// recompiling.
pub const STACK_CAP: usize = 33;

/// Maximum number of instructions a single `run` will dispatch before
/// returning [`crate::Fault::ExecutionLimit`].
pub const EXEC_LIMIT: usize = 1024;

/// Overridable runtime parameters, with a [`Default`] matching
/// [`STACK_CAP`]'s sibling constants.
///
/// Mirrors an `InterpreterParams`/`ConsensusParameters` split: most
/// callers never touch this and get the built-in defaults, but the CLI
/// and tests can tune `exec_limit`/`mem_cap` without recompiling.
/// `STACK_CAP` itself stays a `const` — see its doc comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct VmConfig {
    /// Instruction budget per [`crate::Interpreter::run`] call.
    pub exec_limit: usize,
    /// Capacity, in bytes, of the interpreter's linear memory.
    pub mem_cap: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            exec_limit: EXEC_LIMIT,
            mem_cap: DEFAULT_MEM_CAP,
        }
    }
}

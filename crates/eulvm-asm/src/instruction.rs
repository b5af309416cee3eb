use eulvm_types::Word;

use crate::Opcode;

/// One bytecode instruction: an opcode plus its single operand slot.
///
/// Every instruction carries a `Word` operand regardless of whether the
/// opcode uses it (e.g. `Opcode::Stop`'s operand is always `Word::ZERO`).
/// This keeps the in-memory representation and the binary dump format
/// uniform, and is what lets the emitter treat "the operand of
/// instruction at index N" as a stable patchable slot for forward
/// references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Instruction {
    /// The opcode to execute.
    pub op: Opcode,
    /// The operand word, meaningful only for opcodes that use one.
    pub operand: Word,
}

impl Instruction {
    /// Construct an instruction with an explicit operand.
    pub fn new(op: Opcode, operand: Word) -> Self {
        Instruction { op, operand }
    }

    /// Construct an instruction whose operand is unused (zeroed).
    pub fn bare(op: Opcode) -> Self {
        Instruction {
            op,
            operand: Word::ZERO,
        }
    }

    /// `PUSH operand`.
    pub fn push(operand: Word) -> Self {
        Instruction::new(Opcode::Push, operand)
    }

    /// `JUMPDEST addr`.
    pub fn jumpdest(addr: u64) -> Self {
        Instruction::new(Opcode::Jumpdest, Word::from_u64(addr))
    }

    /// `JUMPI addr`.
    pub fn jumpi(addr: u64) -> Self {
        Instruction::new(Opcode::Jumpi, Word::from_u64(addr))
    }

    /// `CALL addr`.
    pub fn call(addr: u64) -> Self {
        Instruction::new(Opcode::Call, Word::from_u64(addr))
    }

    /// `SWAP n`.
    pub fn swap(n: u64) -> Self {
        Instruction::new(Opcode::Swap, Word::from_u64(n))
    }

    /// `NATIVE id`.
    pub fn native(id: u64) -> Self {
        Instruction::new(Opcode::Native, Word::from_u64(id))
    }

    /// `MAPVSSTORE prefix` / `MAPVSLOAD prefix`, where `prefix` is the
    /// map-name operand word as produced by [`crate::map_prefix`].
    pub fn map_op(op: Opcode, prefix: Word) -> Self {
        debug_assert!(matches!(op, Opcode::Mapvsstore | Opcode::Mapvsload));
        Instruction::new(op, prefix)
    }

    /// Patch this instruction's operand in place. Used by the emitter's
    /// forward-reference resolution to rewrite a `CALL`/`JUMPDEST`/`JUMPI`
    /// operand once the target address is known.
    pub fn patch_operand(&mut self, operand: Word) {
        self.operand = operand;
    }
}

impl core::fmt::Display for Instruction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?} {}", self.op, self.operand)
    }
}

use eulvm_types::Word;

use crate::Instruction;

/// A compiled program: an ordered sequence of instructions plus the
/// preallocated memory image the emitter placed constants and string
/// literals into.
///
/// A `Program` is self-contained — running it against any calldata and
/// any [`eulvm_storage::StateKv`] requires nothing else from the emitter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Program {
    instructions: Vec<Instruction>,
    /// The memory image installed into VM memory before execution starts.
    pub prealloc_memory: Vec<u8>,
}

impl Program {
    /// An empty program with no preallocated memory.
    pub fn new() -> Self {
        Program::default()
    }

    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// True if there are no instructions.
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Read-only view of the instruction sequence.
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Append an instruction, returning the index it was stored at. The
    /// emitter holds onto this index to patch the operand later when the
    /// instruction is a forward reference (to a function or a jump target
    /// not yet compiled).
    pub fn push_instruction(&mut self, inst: Instruction) -> usize {
        let index = self.instructions.len();
        self.instructions.push(inst);
        index
    }

    /// Overwrite the operand of a previously pushed instruction, by the
    /// index [`Program::push_instruction`] returned.
    pub fn patch_operand(&mut self, index: usize, operand: Word) {
        self.instructions[index].patch_operand(operand);
    }

    /// Fetch the instruction at `ip`, if in range.
    pub fn get(&self, ip: usize) -> Option<&Instruction> {
        self.instructions.get(ip)
    }
}

impl core::fmt::Display for Program {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for (addr, inst) in self.instructions.iter().enumerate() {
            writeln!(f, "{addr:>6}: {inst}")?;
        }
        Ok(())
    }
}

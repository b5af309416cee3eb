//! The compiled-program binary dump format:
//!
//! ```text
//! instruction_count: u64 LE
//! instruction_count × { opcode: u8, padding: [u8; 7], operand: [u8; 32] BE }
//! prealloc_memory_len: u64 LE
//! prealloc_memory_len × u8
//! ```

use std::io::{self, Read, Write};

use eulvm_types::Word;
use thiserror::Error;

use crate::{Instruction, Opcode, Program};

/// One encoded instruction's on-disk width: 1 opcode byte + 7 padding + 32
/// operand bytes.
const INSTRUCTION_WIDTH: usize = 1 + 7 + 32;

/// Failure decoding a dumped program.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Underlying I/O failure reading/writing the dump.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// A byte in the opcode slot didn't match any known [`Opcode`].
    #[error("unknown opcode byte 0x{0:02x} at instruction {1}")]
    UnknownOpcode(u8, usize),
}

/// Serialize `program` into the binary dump format.
pub fn dump<W: Write>(program: &Program, mut out: W) -> Result<(), DecodeError> {
    out.write_all(&(program.len() as u64).to_le_bytes())?;
    for inst in program.instructions() {
        let mut record = [0u8; INSTRUCTION_WIDTH];
        record[0] = inst.op as u8;
        record[8..].copy_from_slice(&inst.operand.to_be_bytes());
        out.write_all(&record)?;
    }
    out.write_all(&(program.prealloc_memory.len() as u64).to_le_bytes())?;
    out.write_all(&program.prealloc_memory)?;
    Ok(())
}

/// Serialize `program` into a freshly allocated byte vector.
pub fn dump_to_vec(program: &Program) -> Vec<u8> {
    let mut buf = Vec::new();
    dump(program, &mut buf).expect("writing to a Vec<u8> cannot fail");
    buf
}

/// Deserialize a program previously produced by [`dump`].
pub fn load<R: Read>(mut input: R) -> Result<Program, DecodeError> {
    let mut program = Program::new();

    let count = read_u64(&mut input)?;
    for i in 0..count {
        let mut record = [0u8; INSTRUCTION_WIDTH];
        input.read_exact(&mut record)?;
        let op = Opcode::from_repr(record[0])
            .ok_or(DecodeError::UnknownOpcode(record[0], i as usize))?;
        let mut operand_bytes = [0u8; 32];
        operand_bytes.copy_from_slice(&record[8..]);
        let operand = Word::from_be_bytes(&operand_bytes);
        program.push_instruction(Instruction::new(op, operand));
    }

    let mem_len = read_u64(&mut input)? as usize;
    let mut mem = vec![0u8; mem_len];
    input.read_exact(&mut mem)?;
    program.prealloc_memory = mem;

    Ok(program)
}

fn read_u64<R: Read>(mut input: R) -> Result<u64, DecodeError> {
    let mut buf = [0u8; 8];
    input.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Instruction::bare(Opcode::Stop))]
    #[case(Instruction::bare(Opcode::Add))]
    #[case(Instruction::push(Word::from_u64(42)))]
    #[case(Instruction::new(Opcode::Swap, Word::from_u64(3)))]
    #[case(Instruction::jumpdest(999))]
    #[case(Instruction::new(Opcode::Native, Word::from_u64(7)))]
    fn single_instruction_program_roundtrips(#[case] inst: Instruction) {
        let mut program = Program::new();
        program.push_instruction(inst);

        let bytes = dump_to_vec(&program);
        let loaded = load(&bytes[..]).unwrap();
        assert_eq!(program, loaded);
    }

    #[test]
    fn dump_then_load_roundtrips() {
        let mut program = Program::new();
        program.push_instruction(Instruction::push(Word::from_u64(10)));
        program.push_instruction(Instruction::push(Word::from_u64(1)));
        program.push_instruction(Instruction::bare(Opcode::Add));
        program.push_instruction(Instruction::bare(Opcode::Stop));
        program.prealloc_memory = b"hello".to_vec();

        let bytes = dump_to_vec(&program);
        let loaded = load(&bytes[..]).unwrap();
        assert_eq!(program, loaded);
    }

    #[test]
    fn load_rejects_unknown_opcode_byte() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1u64.to_le_bytes());
        let mut record = [0u8; INSTRUCTION_WIDTH];
        record[0] = 0xfe; // not a valid opcode
        bytes.extend_from_slice(&record);
        bytes.extend_from_slice(&0u64.to_le_bytes());

        assert!(matches!(
            load(&bytes[..]),
            Err(DecodeError::UnknownOpcode(0xfe, 0))
        ));
    }
}

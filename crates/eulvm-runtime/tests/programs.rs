//! Hand-assembled bytecode programs run end to end through the
//! interpreter, independent of the emitter crate: exercises the
//! `CALLDATA`/`CALL`/`RET` calling convention, the binary dump codec, and
//! custom native registration together.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use eulvm_asm::{codec, Instruction, Opcode, Program};
use eulvm_runtime::{Interpreter, NativeFn, NativeTable};
use eulvm_storage::StateKv;
use eulvm_types::Word;

/// Builds `fn add_then_double(a, b) { return (a + b) * 2; }` as raw
/// bytecode: the `CALLDATA` trampoline at address 0, the external entry
/// at address 2, and an internal `double` subroutine reached via `CALL`.
fn add_then_double_program() -> Program {
    let mut program = Program::new();
    program.push_instruction(Instruction::bare(Opcode::Calldata)); // 0
    program.push_instruction(Instruction::bare(Opcode::Stop)); // 1

    // entry: addr 2
    program.push_instruction(Instruction::push(Word::from_u64(32))); // 2
    program.push_instruction(Instruction::bare(Opcode::Dataload)); // 3: push arg a
    program.push_instruction(Instruction::push(Word::from_u64(64))); // 4
    program.push_instruction(Instruction::bare(Opcode::Dataload)); // 5: push arg b
    program.push_instruction(Instruction::bare(Opcode::Add)); // 6: a + b
    program.push_instruction(Instruction::call(9)); // 7: call double
    program.push_instruction(Instruction::bare(Opcode::Stop)); // 8: return (a+b)*2

    // double: addr 9
    program.push_instruction(Instruction::push(Word::from_u64(2))); // 9
    program.push_instruction(Instruction::bare(Opcode::Mul)); // 10
    program.push_instruction(Instruction::bare(Opcode::Ret)); // 11

    program
}

fn calldata(entry: u64, args: &[u64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(32 * (1 + args.len()));
    out.extend_from_slice(&Word::from_u64(entry).to_be_bytes());
    for &a in args {
        out.extend_from_slice(&Word::from_u64(a).to_be_bytes());
    }
    out
}

#[test]
fn calldata_trampoline_dispatches_to_entry_and_call_ret_returns() {
    let program = add_then_double_program();
    let mut state = StateKv::new();
    let mut interpreter = Interpreter::new(&mut state);

    let result = interpreter.run(&program, &calldata(2, &[3, 4])).unwrap();
    assert_eq!(result, vec![Word::from_u64(14)]); // (3 + 4) * 2
}

#[test]
fn program_survives_a_dump_and_load_round_trip_before_running() {
    let program = add_then_double_program();
    let bytes = codec::dump_to_vec(&program);
    let loaded = codec::load(&bytes[..]).unwrap();
    assert_eq!(program, loaded);

    let mut state = StateKv::new();
    let mut interpreter = Interpreter::new(&mut state);
    let result = interpreter.run(&loaded, &calldata(2, &[10, 20])).unwrap();
    assert_eq!(result, vec![Word::from_u64(60)]); // (10 + 20) * 2
}

#[test]
fn custom_native_replaces_the_default_registry() {
    // A program that calls a test-only native instead of one of the
    // built-in ones.
    let mut program = Program::new();
    program.push_instruction(Instruction::native(99));
    program.push_instruction(Instruction::bare(Opcode::Stop));

    let calls = Arc::new(AtomicU64::new(0));
    let counted = calls.clone();
    let count_native: NativeFn<StateKv> = Box::new(move |_vm| {
        counted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let mut natives = NativeTable::empty();
    natives.register(99, count_native);

    let mut state = StateKv::new();
    let mut interpreter = Interpreter::new(&mut state).with_natives(natives);
    interpreter.run(&program, &[]).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn vsstore_then_commit_is_visible_to_a_later_interpreter_run() {
    let mut program = Program::new();
    program.push_instruction(Instruction::push(Word::from_u64(77))); // value
    program.push_instruction(Instruction::push(Word::from_u64(1))); // key
    program.push_instruction(Instruction::bare(Opcode::Vsstore));
    program.push_instruction(Instruction::bare(Opcode::Stop));

    let mut state = StateKv::new();
    Interpreter::new(&mut state).run(&program, &[]).unwrap();
    state.commit();

    // A fresh interpreter over the same state sees the committed value.
    let mut load_program = Program::new();
    load_program.push_instruction(Instruction::push(Word::from_u64(1))); // key
    load_program.push_instruction(Instruction::bare(Opcode::Vsload));
    load_program.push_instruction(Instruction::bare(Opcode::Stop));

    let result = Interpreter::new(&mut state).run(&load_program, &[]).unwrap();
    assert_eq!(result, vec![Word::from_u64(77)]);
}

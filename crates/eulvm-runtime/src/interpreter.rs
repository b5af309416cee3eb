use eulvm_asm::{Opcode, Program};
use eulvm_storage::Kv;
use eulvm_types::{Memory, Word};

use crate::consts::{VmConfig, STACK_CAP};
use crate::error::Fault;
use crate::native::NativeTable;

/// The EulVM stack-machine interpreter.
///
/// Single-threaded, non-reentrant, synchronous: `run` blocks until the
/// program executes `STOP` or faults. Generic over `K: Kv` so the same
/// dispatch loop runs against a bare [`eulvm_storage::StateKv`]
/// (sequential execution) or a [`eulvm_storage::Slot`] (as one worker's
/// transaction inside a speculative window).
pub struct Interpreter<'a, K> {
    ip: usize,
    stack: [Word; STACK_CAP],
    stack_size: usize,
    memory: Memory,
    input: Vec<u8>,
    state: &'a mut K,
    natives: NativeTable<K>,
    output: Vec<String>,
    exec_limit: usize,
}

impl<'a, K: Kv> Interpreter<'a, K> {
    /// Construct an interpreter over `state`, with the default natives
    /// registered (see [`NativeTable::default`]) and [`VmConfig::default`].
    pub fn new(state: &'a mut K) -> Self {
        Self::with_config(state, VmConfig::default())
    }

    /// Construct an interpreter with explicit runtime parameters.
    pub fn with_config(state: &'a mut K, config: VmConfig) -> Self {
        Self::with_memory_and_limit(state, Memory::with_capacity(config.mem_cap), config.exec_limit)
    }

    /// Construct an interpreter with an explicit memory capacity,
    /// keeping [`VmConfig::default`]'s instruction budget.
    pub fn with_memory(state: &'a mut K, memory: Memory) -> Self {
        Self::with_memory_and_limit(state, memory, VmConfig::default().exec_limit)
    }

    fn with_memory_and_limit(state: &'a mut K, memory: Memory, exec_limit: usize) -> Self {
        Interpreter {
            ip: 0,
            stack: [Word::ZERO; STACK_CAP],
            stack_size: 0,
            memory,
            input: Vec::new(),
            state,
            natives: NativeTable::default(),
            output: Vec::new(),
            exec_limit,
        }
    }

    /// Replace the native registry (e.g. to add test-only debug natives).
    pub fn with_natives(mut self, natives: NativeTable<K>) -> Self {
        self.natives = natives;
        self
    }

    /// Lines emitted by `PRINT`/`NativeWrite`/`NativeWriteF` so far.
    pub fn output(&self) -> &[String] {
        &self.output
    }

    /// Current instruction pointer, exposed for tests and debugging.
    pub fn ip(&self) -> usize {
        self.ip
    }

    /// Current stack depth, exposed for tests and debugging.
    pub fn stack_size(&self) -> usize {
        self.stack_size
    }

    /// Read-only view of linear memory.
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Reset `ip` and the stack to empty, leaving memory and state
    /// untouched — used between transactions sharing a compiled program
    /// and a state.
    pub fn reset(&mut self) {
        self.ip = 0;
        self.stack_size = 0;
    }

    /// Run `program` against `input` (calldata) to completion.
    ///
    /// Installs `input`, resets `ip`/stack, copies the program's
    /// preallocated memory image into linear memory, then dispatches up
    /// to [`EXEC_LIMIT`] instructions. Returns `Ok(return_data)` on
    /// `STOP`, `Err(fault)` otherwise.
    pub fn run(&mut self, program: &Program, input: &[u8]) -> Result<Vec<Word>, Fault> {
        self.input = input.to_vec();
        self.reset();
        self.memory.load_image(&program.prealloc_memory)?;

        for _ in 0..self.exec_limit {
            match self.step(program)? {
                StepResult::Continue => {}
                StepResult::Halt => return Ok(self.return_data()),
            }
        }
        Err(Fault::ExecutionLimit {
            limit: self.exec_limit,
        })
    }

    fn return_data(&self) -> Vec<Word> {
        self.stack[1..=self.stack_size].to_vec()
    }

    /// Push a word, failing if the stack is already at capacity.
    pub(crate) fn push(&mut self, word: Word) -> Result<(), Fault> {
        if self.stack_size + 1 >= STACK_CAP {
            return Err(Fault::StackOverflow {
                capacity: STACK_CAP,
            });
        }
        self.stack_size += 1;
        self.stack[self.stack_size] = word;
        Ok(())
    }

    /// Pop a word, failing if the stack is empty.
    pub(crate) fn pop(&mut self) -> Result<Word, Fault> {
        if self.stack_size == 0 {
            return Err(Fault::StackUnderflow {
                needed: 1,
                available: 0,
            });
        }
        let word = self.stack[self.stack_size];
        self.stack_size -= 1;
        Ok(word)
    }

    fn require_depth(&self, needed: usize) -> Result<(), Fault> {
        if self.stack_size < needed {
            return Err(Fault::StackUnderflow {
                needed,
                available: self.stack_size,
            });
        }
        Ok(())
    }

    /// Append a line to the debug output buffer (used by natives).
    pub(crate) fn emit_output(&mut self, line: String) {
        self.output.push(line);
    }

    fn step(&mut self, program: &Program) -> Result<StepResult, Fault> {
        let inst = program
            .get(self.ip)
            .ok_or(Fault::IllegalProgramCounter {
                ip: self.ip,
                program_len: program.len(),
            })?;
        let op = inst.op;
        let operand = inst.operand;

        tracing::trace!(ip = self.ip, ?op, "dispatch");

        match op {
            Opcode::Stop => return Ok(StepResult::Halt),

            Opcode::Add => {
                self.require_depth(2)?;
                let rhs = self.stack[self.stack_size];
                let lhs = &mut self.stack[self.stack_size - 1];
                *lhs = lhs.wrapping_add(rhs);
                self.stack_size -= 1;
            }
            Opcode::Sub => {
                self.require_depth(2)?;
                let rhs = self.stack[self.stack_size];
                let lhs = &mut self.stack[self.stack_size - 1];
                *lhs = lhs.wrapping_sub(rhs);
                self.stack_size -= 1;
            }
            Opcode::Mul => {
                self.require_depth(2)?;
                let rhs = self.stack[self.stack_size];
                let lhs = &mut self.stack[self.stack_size - 1];
                *lhs = lhs.wrapping_mul(rhs);
                self.stack_size -= 1;
            }
            Opcode::Pop | Opcode::Drop => {
                self.pop()?;
            }
            Opcode::Push => {
                self.push(operand)?;
            }
            Opcode::Swap => {
                let n = operand.to_u64() as usize;
                self.require_depth(n + 1)?;
                self.stack.swap(self.stack_size, self.stack_size - n);
            }
            Opcode::Dup => {
                self.require_depth(1)?;
                let top = self.stack[self.stack_size];
                self.push(top)?;
            }

            Opcode::Jumpdest => {
                self.ip = operand.to_u64() as usize;
                return Ok(StepResult::Continue);
            }
            Opcode::Jumpi => {
                let cond = self.pop()?;
                if !cond.is_zero() {
                    self.ip = operand.to_u64() as usize;
                } else {
                    self.ip += 1;
                }
                return Ok(StepResult::Continue);
            }
            Opcode::Call => {
                self.push(Word::from_u64((self.ip + 1) as u64))?;
                self.ip = operand.to_u64() as usize;
                return Ok(StepResult::Continue);
            }
            Opcode::Ret => {
                let addr = self.pop()?;
                self.ip = addr.to_u64() as usize;
                return Ok(StepResult::Continue);
            }
            Opcode::Calldata => {
                let addr = self.dataload_word(0)?;
                self.push(Word::from_u64((self.ip + 1) as u64))?;
                self.ip = addr.to_u64() as usize;
                return Ok(StepResult::Continue);
            }
            Opcode::Dataload => {
                let offset = self.pop()?.to_u64() as usize;
                let word = self.dataload_word(offset)?;
                self.push(word)?;
            }

            Opcode::Mstore8 => {
                self.require_depth(2)?;
                let value = self.pop()?;
                let addr = self.pop()?.to_u64() as usize;
                self.memory.set8(addr, value.to_be_bytes()[31])?;
            }
            Opcode::Mstore256 => {
                self.require_depth(2)?;
                let value = self.pop()?;
                let addr = self.pop()?.to_u64() as usize;
                self.memory.set32(addr, value)?;
            }
            Opcode::Mload => {
                let addr = self.pop()?.to_u64() as usize;
                let byte = self.memory.load(addr, 1)?[0];
                self.push(Word::from_u64(byte as u64))?;
            }
            Opcode::Mload256 => {
                let addr = self.pop()?.to_u64() as usize;
                let word = self.memory.load32(addr)?;
                self.push(word)?;
            }

            Opcode::Lt => self.compare(|a, b| a < b)?,
            Opcode::Gt => self.compare(|a, b| a > b)?,
            Opcode::Eq => self.compare(|a, b| a == b)?,
            Opcode::Neq => self.compare(|a, b| a != b)?,
            Opcode::Not => {
                let v = self.pop()?;
                self.push(Word::from_bool(v.is_zero()))?;
            }
            Opcode::And => {
                self.require_depth(2)?;
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(a.bitand(b))?;
            }
            Opcode::Or => {
                self.require_depth(2)?;
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(a.bitor(b))?;
            }

            Opcode::Vsload => {
                let key = self.pop()?;
                let val = self.state.get(key);
                self.push(val)?;
            }
            Opcode::Vsstore => {
                self.require_depth(2)?;
                let value = self.pop()?;
                let key = self.pop()?;
                self.state.set(key, value);
            }
            Opcode::Mapvsload => {
                let key = self.pop()?;
                let slot = eulvm_asm::map_slot_key(key, operand);
                let val = self.state.get(slot);
                self.push(val)?;
            }
            Opcode::Mapvsstore => {
                self.require_depth(2)?;
                let value = self.pop()?;
                let key = self.pop()?;
                let slot = eulvm_asm::map_slot_key(key, operand);
                self.state.set(slot, value);
            }

            Opcode::Native => {
                let id = operand.to_u64();
                // SAFETY-free reborrow dance: natives need `&mut self` to
                // pop arguments, so the table can't also be borrowed from
                // `self` for the call. Take it out, call, put it back.
                let natives = std::mem::replace(&mut self.natives, NativeTable::empty());
                let result = natives.dispatch(id, self);
                self.natives = natives;
                result?;
            }
            Opcode::Nop => {}
            Opcode::Print => {
                let v = self.pop()?;
                let line = v.to_u64().to_string();
                tracing::info!(target: "eulvm::print", "{line}");
                self.emit_output(line);
            }
        }

        if !op.is_control_flow() {
            self.ip += 1;
        }
        Ok(StepResult::Continue)
    }

    fn compare(&mut self, f: impl Fn(Word, Word) -> bool) -> Result<(), Fault> {
        self.require_depth(2)?;
        let b = self.pop()?;
        let a = self.pop()?;
        self.push(Word::from_bool(f(a, b)))?;
        Ok(())
    }

    fn dataload_word(&self, offset: usize) -> Result<Word, Fault> {
        let mut bytes = [0u8; 32];
        let available = self.input.len().saturating_sub(offset).min(32);
        if available > 0 {
            bytes[..available].copy_from_slice(&self.input[offset..offset + available]);
        }
        Ok(Word::from_be_bytes(&bytes))
    }
}

enum StepResult {
    Continue,
    Halt,
}

#[cfg(test)]
mod tests {
    use eulvm_asm::{Instruction, Opcode, Program};
    use eulvm_storage::StateKv;
    use rstest::rstest;

    use super::*;

    fn program(instructions: impl IntoIterator<Item = Instruction>) -> Program {
        let mut program = Program::new();
        for inst in instructions {
            program.push_instruction(inst);
        }
        program
    }

    #[test]
    fn push_then_add_leaves_sum_on_stack() {
        // PUSH 1; PUSH 10; ADD; STOP leaves [11].
        let prog = program([
            Instruction::push(Word::from_u64(1)),
            Instruction::push(Word::from_u64(10)),
            Instruction::bare(Opcode::Add),
            Instruction::bare(Opcode::Stop),
        ]);
        let mut state = StateKv::new();
        let mut vm = Interpreter::new(&mut state);
        let out = vm.run(&prog, &[]).unwrap();
        assert_eq!(out, vec![Word::from_u64(11)]);
    }

    #[test]
    fn push_increments_stack_size_and_leaves_value_on_top() {
        let prog = program([Instruction::push(Word::from_u64(7)), Instruction::bare(Opcode::Stop)]);
        let mut state = StateKv::new();
        let mut vm = Interpreter::new(&mut state);
        vm.memory.load_image(&prog.prealloc_memory).unwrap();
        vm.step(&prog).unwrap();
        assert_eq!(vm.stack_size(), 1);
        assert_eq!(vm.stack[vm.stack_size], Word::from_u64(7));
    }

    #[test]
    fn call_then_ret_restores_ip_and_stack_size() {
        // CALLDATA trampoline at 0/1 isn't used here; build a bare CALL/RET
        // pair directly: CALL 3 jumps into a function that RETs immediately.
        let prog = program([
            Instruction::call(2),       // 0: CALL 2
            Instruction::bare(Opcode::Stop), // 1: STOP (never reached directly)
            Instruction::bare(Opcode::Ret),  // 2: RET -> pops return addr (1), jumps there
        ]);
        let mut state = StateKv::new();
        let mut vm = Interpreter::new(&mut state);
        let out = vm.run(&prog, &[]).unwrap();
        assert_eq!(out, Vec::<Word>::new());
    }

    #[test]
    fn ip_out_of_range_is_illegal_program_counter() {
        let prog = program([Instruction::jumpdest(999)]);
        let mut state = StateKv::new();
        let mut vm = Interpreter::new(&mut state);
        let err = vm.run(&prog, &[]).unwrap_err();
        assert!(matches!(err, Fault::IllegalProgramCounter { .. }));
    }

    #[test]
    fn popping_an_empty_stack_is_stack_underflow() {
        let prog = program([Instruction::bare(Opcode::Pop)]);
        let mut state = StateKv::new();
        let mut vm = Interpreter::new(&mut state);
        let err = vm.run(&prog, &[]).unwrap_err();
        assert!(matches!(err, Fault::StackUnderflow { .. }));
    }

    #[test]
    fn pushing_past_capacity_is_stack_overflow() {
        let mut instructions: Vec<Instruction> =
            (0..STACK_CAP).map(|_| Instruction::push(Word::ONE)).collect();
        instructions.push(Instruction::bare(Opcode::Stop));
        let prog = program(instructions);
        let mut state = StateKv::new();
        let mut vm = Interpreter::new(&mut state);
        let err = vm.run(&prog, &[]).unwrap_err();
        assert!(matches!(err, Fault::StackOverflow { .. }));
    }

    #[test]
    fn exceeding_exec_limit_without_stop_faults() {
        // JUMPDEST 0 loops forever.
        let prog = program([Instruction::jumpdest(0)]);
        let mut state = StateKv::new();
        let mut vm = Interpreter::new(&mut state);
        let err = vm.run(&prog, &[]).unwrap_err();
        assert!(matches!(err, Fault::ExecutionLimit { .. }));
    }

    #[test]
    fn mload256_past_capacity_minus_32_is_invalid_memory_access() {
        let prog = program([
            Instruction::push(Word::from_u64(eulvm_types::DEFAULT_MEM_CAP as u64 - 1)),
            Instruction::bare(Opcode::Mload256),
            Instruction::bare(Opcode::Stop),
        ]);
        let mut state = StateKv::new();
        let mut vm = Interpreter::new(&mut state);
        let err = vm.run(&prog, &[]).unwrap_err();
        assert!(matches!(err, Fault::InvalidMemoryAccess(_)));
    }

    #[test]
    fn unknown_native_id_faults() {
        let prog = program([Instruction::native(999), Instruction::bare(Opcode::Stop)]);
        let mut state = StateKv::new();
        let mut vm = Interpreter::new(&mut state);
        let err = vm.run(&prog, &[]).unwrap_err();
        assert!(matches!(err, Fault::UnknownNative { id: 999 }));
    }

    #[test]
    fn vsstore_then_vsload_round_trips_through_state() {
        let prog = program([
            Instruction::push(Word::from_u64(42)), // value
            Instruction::push(Word::from_u64(1)),  // key
            Instruction::bare(Opcode::Vsstore),
            Instruction::push(Word::from_u64(1)), // key
            Instruction::bare(Opcode::Vsload),
            Instruction::bare(Opcode::Stop),
        ]);
        let mut state = StateKv::new();
        let mut vm = Interpreter::new(&mut state);
        let out = vm.run(&prog, &[]).unwrap();
        assert_eq!(out, vec![Word::from_u64(42)]);
    }

    #[rstest]
    #[case(Opcode::Add, 3, 4, 7)]
    #[case(Opcode::Sub, 10, 3, 7)]
    #[case(Opcode::Mul, 6, 7, 42)]
    fn arithmetic_opcodes_match_table(#[case] op: Opcode, #[case] a: u64, #[case] b: u64, #[case] expected: u64) {
        let prog = program([
            Instruction::push(Word::from_u64(a)),
            Instruction::push(Word::from_u64(b)),
            Instruction::bare(op),
            Instruction::bare(Opcode::Stop),
        ]);
        let mut state = StateKv::new();
        let mut vm = Interpreter::new(&mut state);
        let out = vm.run(&prog, &[]).unwrap();
        assert_eq!(out, vec![Word::from_u64(expected)]);
    }

    #[rstest]
    #[case(Opcode::Lt, 3, 4, true)]
    #[case(Opcode::Lt, 4, 3, false)]
    #[case(Opcode::Gt, 4, 3, true)]
    #[case(Opcode::Eq, 5, 5, true)]
    #[case(Opcode::Neq, 5, 5, false)]
    fn compare_opcodes_match_table(#[case] op: Opcode, #[case] a: u64, #[case] b: u64, #[case] expected: bool) {
        let prog = program([
            Instruction::push(Word::from_u64(a)),
            Instruction::push(Word::from_u64(b)),
            Instruction::bare(op),
            Instruction::bare(Opcode::Stop),
        ]);
        let mut state = StateKv::new();
        let mut vm = Interpreter::new(&mut state);
        let out = vm.run(&prog, &[]).unwrap();
        assert_eq!(out, vec![Word::from_bool(expected)]);
    }

    #[test]
    fn swap_exchanges_top_with_nth_slot_below() {
        let prog = program([
            Instruction::push(Word::from_u64(1)),
            Instruction::push(Word::from_u64(2)),
            Instruction::push(Word::from_u64(3)),
            Instruction::swap(2), // exchange top (3) with 2 slots below (1)
            Instruction::bare(Opcode::Stop),
        ]);
        let mut state = StateKv::new();
        let mut vm = Interpreter::new(&mut state);
        let out = vm.run(&prog, &[]).unwrap();
        assert_eq!(out, vec![Word::from_u64(3), Word::from_u64(2), Word::from_u64(1)]);
    }
}

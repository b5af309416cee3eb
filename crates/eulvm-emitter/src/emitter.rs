//! Lowers a [`Module`] into an [`eulvm_asm::Program`].
//!
//! Compilation runs in two passes over the module's top-level
//! declarations: a header pass that registers every function, map and
//! enum name (so a function can call another declared later in the
//! file), then an emit pass that lays out static globals and compiles
//! function bodies in source order, patching forward `CALL` references
//! once the callee's address is known.

use std::collections::HashMap;

use eulvm_asm::{layout, map_name_prefix, Instruction, Opcode, Program};
use eulvm_types::{Memory, Word};

use crate::ast::{BinOp, Block, Expr, FuncDef, MapDef, Modifier, Module, Stmt, Top, Type, VarDef};
use crate::error::{EmitError, SourceSpan};
use crate::literal;
use crate::scope::{self, ScopeTree, Storage};

/// A compiled function's ABI-relevant shape, kept around after
/// compilation for [`crate::abi::encode_calldata`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledFunc {
    /// The function's name.
    pub name: String,
    /// Declared parameters, in order.
    pub params: Vec<(String, Type)>,
    /// Declared return types, in order.
    pub returns: Vec<Type>,
    /// `Internal` or `External`.
    pub modifier: Modifier,
    /// The function's entry address, filled in once its body is
    /// compiled. Always `Some` once [`Emitter::compile_module`] returns.
    pub addr: Option<u64>,
}

/// A declared map's key/value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompiledMap {
    /// The declared key type.
    pub key_type: Type,
    /// The declared value type.
    pub value_type: Type,
}

/// The result of compiling a whole [`Module`]: the bytecode, plus the
/// function table the ABI encoder needs to translate an entry name and
/// argument list into calldata.
#[derive(Debug, Clone)]
pub struct CompiledModule {
    /// The compiled bytecode and preallocated memory image.
    pub program: Program,
    /// Every declared function, keyed by name.
    pub functions: HashMap<String, CompiledFunc>,
}

/// Format specifiers `writef` recognizes, parsed out of its literal
/// format string at compile time (the set the runtime's `NativeWriteF`
/// understands — see `eulvm-runtime::native`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormatSpec {
    /// `%d` — an `i64` value.
    Int,
    /// `%s` — a string literal, passed as `(len, addr)`.
    Str,
    /// `%v` — a `bytes32` value.
    Hash,
    /// `%x` — an `address` value.
    Addr,
}

fn parse_format_specs(fmt: &str) -> Vec<FormatSpec> {
    let mut specs = Vec::new();
    let mut chars = fmt.chars();
    while let Some(c) = chars.next() {
        if c == '%' {
            match chars.next() {
                Some('d') => specs.push(FormatSpec::Int),
                Some('s') => specs.push(FormatSpec::Str),
                Some('v') => specs.push(FormatSpec::Hash),
                Some('x') => specs.push(FormatSpec::Addr),
                _ => {}
            }
        }
    }
    specs
}

/// The opcode and result type for one admissible `(operator, operand
/// type)` pair. `None` means the operator doesn't accept that operand
/// type.
fn binop_opcode(op: BinOp, operand_ty: Type) -> Option<(Opcode, Type)> {
    use BinOp::*;
    match (op, operand_ty) {
        (Add, Type::I64) => Some((Opcode::Add, Type::I64)),
        (Sub, Type::I64) => Some((Opcode::Sub, Type::I64)),
        (Mul, Type::I64) => Some((Opcode::Mul, Type::I64)),
        (Lt, Type::I64) => Some((Opcode::Lt, Type::Bool)),
        (Gt, Type::I64) => Some((Opcode::Gt, Type::Bool)),
        (And, Type::Bool) => Some((Opcode::And, Type::Bool)),
        (Or, Type::Bool) => Some((Opcode::Or, Type::Bool)),
        (Eq, _) if operand_ty != Type::Void => Some((Opcode::Eq, Type::Bool)),
        (Neq, _) if operand_ty != Type::Void => Some((Opcode::Neq, Type::Bool)),
        _ => None,
    }
}

const MAP_KEY_VALUE_TYPES: [Type; 4] = [Type::I64, Type::Bool, Type::Bytes32, Type::Address];

/// The bytecode emitter.
pub struct Emitter {
    program: Program,
    memory: Memory,
    scope: ScopeTree,
    funcs: HashMap<String, CompiledFunc>,
    maps: HashMap<String, CompiledMap>,
    enum_consts: HashMap<String, i64>,
    unresolved_calls: HashMap<String, Vec<usize>>,
    current_modifier: Option<Modifier>,
}

impl Emitter {
    /// A fresh emitter: the frame-pointer cell already initialized to
    /// [`layout::FRAME_REGION_BASE`] in the memory image, and the entry
    /// trampoline (`CALLDATA; STOP`) already placed at addresses 0 and 1.
    pub fn new() -> Self {
        let mut memory = Memory::new();
        memory
            .set32(
                layout::FRAME_POINTER_CELL as usize,
                Word::from_u64(layout::FRAME_REGION_BASE),
            )
            .expect("the frame-pointer cell fits in any non-trivial memory capacity");

        let mut program = Program::new();
        program.push_instruction(Instruction::bare(Opcode::Calldata));
        program.push_instruction(Instruction::bare(Opcode::Stop));

        Emitter {
            program,
            memory,
            scope: ScopeTree::new(),
            funcs: HashMap::new(),
            maps: HashMap::new(),
            enum_consts: HashMap::new(),
            unresolved_calls: HashMap::new(),
            current_modifier: None,
        }
    }

    /// Compile a whole module to a [`CompiledModule`].
    pub fn compile_module(mut self, module: &Module) -> Result<CompiledModule, EmitError> {
        self.header_pass(module)?;
        self.emit_pass(module)?;

        debug_assert!(
            self.unresolved_calls.is_empty(),
            "every name the header pass admitted as callable must have been compiled by now"
        );

        self.program.prealloc_memory = self.memory.store();
        Ok(CompiledModule {
            program: self.program,
            functions: self.funcs,
        })
    }

    fn header_pass(&mut self, module: &Module) -> Result<(), EmitError> {
        for top in &module.tops {
            match top {
                Top::Func(fd) => self.register_func(fd)?,
                Top::Map(md) => self.register_map(md)?,
                Top::Enum(ed) => {
                    for (i, variant) in ed.variants.iter().enumerate() {
                        if self.enum_consts.contains_key(variant) {
                            return Err(EmitError::DoubleDeclaration {
                                name: variant.clone(),
                                span: SourceSpan::UNKNOWN,
                            });
                        }
                        self.enum_consts.insert(variant.clone(), i as i64);
                    }
                }
                Top::Var(_) => {}
            }
        }
        Ok(())
    }

    fn register_func(&mut self, fd: &FuncDef) -> Result<(), EmitError> {
        if self.funcs.contains_key(&fd.name) {
            return Err(EmitError::DoubleDeclaration {
                name: fd.name.clone(),
                span: SourceSpan::UNKNOWN,
            });
        }
        self.funcs.insert(
            fd.name.clone(),
            CompiledFunc {
                name: fd.name.clone(),
                params: fd.params.clone(),
                returns: fd.returns.clone(),
                modifier: fd.modifier,
                addr: None,
            },
        );
        Ok(())
    }

    fn register_map(&mut self, md: &MapDef) -> Result<(), EmitError> {
        if self.maps.contains_key(&md.name) {
            return Err(EmitError::DoubleDeclaration {
                name: md.name.clone(),
                span: SourceSpan::UNKNOWN,
            });
        }
        if !MAP_KEY_VALUE_TYPES.contains(&md.key_type) {
            return Err(EmitError::InvalidMapType {
                name: md.name.clone(),
                ty: md.key_type,
                span: SourceSpan::UNKNOWN,
            });
        }
        if !MAP_KEY_VALUE_TYPES.contains(&md.value_type) {
            return Err(EmitError::InvalidMapType {
                name: md.name.clone(),
                ty: md.value_type,
                span: SourceSpan::UNKNOWN,
            });
        }
        if map_name_prefix(&md.name).is_none() {
            return Err(EmitError::NameTooLong {
                name: md.name.clone(),
                span: SourceSpan::UNKNOWN,
            });
        }
        self.maps.insert(
            md.name.clone(),
            CompiledMap {
                key_type: md.key_type,
                value_type: md.value_type,
            },
        );
        Ok(())
    }

    fn emit_pass(&mut self, module: &Module) -> Result<(), EmitError> {
        for top in &module.tops {
            match top {
                Top::Var(vd) => self.compile_global_var(vd)?,
                Top::Func(fd) => self.compile_func(fd)?,
                Top::Map(_) | Top::Enum(_) => {}
            }
        }
        Ok(())
    }

    // ---- instruction helpers --------------------------------------

    fn emit(&mut self, inst: Instruction) -> usize {
        self.program.push_instruction(inst)
    }

    fn emit_push_word(&mut self, w: Word) {
        self.emit(Instruction::push(w));
    }

    fn emit_push_addr(&mut self, addr: u64) {
        self.emit_push_word(Word::from_u64(addr));
    }

    /// Push the current frame's base address (`memory[FRAME_POINTER_CELL]`).
    fn emit_load_frame_base(&mut self) {
        self.emit_push_addr(layout::FRAME_POINTER_CELL);
        self.emit(Instruction::bare(Opcode::Mload256));
    }

    /// Push the absolute address of frame slot `offset` below the
    /// current frame base.
    fn emit_frame_slot_addr(&mut self, offset: u64) {
        self.emit_load_frame_base();
        self.emit_push_word(Word::from_u64(offset));
        self.emit(Instruction::bare(Opcode::Sub));
    }

    /// Store the value already sitting on top of the operand stack into
    /// `storage`. Used uniformly for assignments, initializers,
    /// parameter copies and multi-return destructuring: the value is
    /// always compiled (and therefore already pushed) before the
    /// storage target is resolved, so the address is computed second
    /// and the two are exchanged with `SWAP 1` before `MSTORE256`.
    fn emit_store(&mut self, storage: Storage) {
        match storage {
            Storage::Static(addr) => self.emit_push_addr(addr),
            Storage::StackFrame(offset) => self.emit_frame_slot_addr(offset),
            Storage::Calldata(_) => unreachable!("calldata storage is never assigned to"),
        }
        self.emit(Instruction::swap(1));
        self.emit(Instruction::bare(Opcode::Mstore256));
    }

    /// Install a new stack frame `frame_size` bytes below the caller's,
    /// saving the old base into the new frame's reserved slot 0. Stack
    /// neutral: touches only linear memory, never the operand stack.
    ///
    /// Derivation (bottom-to-top stack contents after each step; `C` is
    /// the frame-pointer cell's address, `OB`/`NB` the old/new base):
    /// `[C] [OB] [OB,OB] [OB,OB,FS] [OB,NB] [OB,NB,NB] [OB,NB,NB,C]
    /// [OB,NB,C,NB] [OB,NB] [NB,OB] []`.
    fn emit_push_new_frame(&mut self, frame_size: u64) {
        self.emit_push_addr(layout::FRAME_POINTER_CELL); // [C]
        self.emit(Instruction::bare(Opcode::Mload256)); // [OB]
        self.emit(Instruction::bare(Opcode::Dup)); // [OB, OB]
        self.emit_push_word(Word::from_u64(frame_size)); // [OB, OB, FS]
        self.emit(Instruction::bare(Opcode::Sub)); // [OB, NB]
        self.emit(Instruction::bare(Opcode::Dup)); // [OB, NB, NB]
        self.emit_push_addr(layout::FRAME_POINTER_CELL); // [OB, NB, NB, C]
        self.emit(Instruction::swap(1)); // [OB, NB, C, NB]
        self.emit(Instruction::bare(Opcode::Mstore256)); // [OB, NB]   cell := NB
        self.emit(Instruction::swap(1)); // [NB, OB]
        self.emit(Instruction::bare(Opcode::Mstore256)); // []        memory[NB] := OB
    }

    /// Restore the frame-pointer cell to the current frame's saved base,
    /// undoing [`Emitter::emit_push_new_frame`]. Also stack neutral.
    fn emit_pop_frame(&mut self) {
        self.emit_push_addr(layout::FRAME_POINTER_CELL); // [C]
        self.emit(Instruction::bare(Opcode::Dup)); // [C, C]
        self.emit(Instruction::bare(Opcode::Mload256)); // [C, NB]
        self.emit(Instruction::bare(Opcode::Mload256)); // [C, OB]
        self.emit(Instruction::bare(Opcode::Mstore256)); // []   cell := OB
    }

    /// Reserve `len` raw bytes of static memory, write `bytes` into the
    /// image there, and return `(addr, len)`.
    fn place_string_in_memory(&mut self, s: &str) -> (Word, u64) {
        let bytes = s.as_bytes();
        let addr = self.scope.alloc_static_bytes(bytes.len());
        self.memory
            .set(addr as usize, bytes)
            .expect("string literals fit in the static region of any non-trivial memory");
        (Word::from_u64(addr), bytes.len() as u64)
    }

    // ---- literals ----------------------------------------------------

    fn parse_bytes32(&self, s: &str, span: SourceSpan) -> Result<Word, EmitError> {
        literal::parse_bytes32(s).ok_or_else(|| EmitError::MalformedLiteral {
            ty: Type::Bytes32,
            value: s.to_string(),
            span,
        })
    }

    fn parse_address(&self, s: &str, span: SourceSpan) -> Result<Word, EmitError> {
        literal::parse_address(s).ok_or_else(|| EmitError::MalformedLiteral {
            ty: Type::Address,
            value: s.to_string(),
            span,
        })
    }

    /// Fold a top-level initializer into a `Word`, or reject it. Only
    /// literal expressions are admissible: there is no module-init
    /// trampoline to run arbitrary instructions before `CALLDATA`
    /// dispatches, so a top-level variable's initial value has to be
    /// known at compile time (see `EmitError::NonConstantGlobalInit`).
    fn const_fold_literal(
        &self,
        name: &str,
        ty: Type,
        expr: &Expr,
        span: SourceSpan,
    ) -> Result<Word, EmitError> {
        match (ty, expr) {
            (Type::I64, Expr::IntLit(v)) => Ok(Word::from_u64(*v as u64)),
            (Type::Bool, Expr::BoolLit(b)) => Ok(Word::from_bool(*b)),
            (Type::Bytes32, Expr::Bytes32Lit(s)) => self.parse_bytes32(s, span),
            (Type::Address, Expr::AddressLit(s)) => self.parse_address(s, span),
            _ => Err(EmitError::NonConstantGlobalInit {
                name: name.to_string(),
                span,
            }),
        }
    }

    // ---- top-level declarations --------------------------------------

    fn compile_global_var(&mut self, vd: &VarDef) -> Result<(), EmitError> {
        let span = SourceSpan::UNKNOWN;
        if vd.ty == Type::Void {
            return Err(EmitError::VoidVariable {
                name: vd.name.clone(),
                span,
            });
        }
        let addr = self.scope.alloc_static();
        self.scope
            .declare_var(&vd.name, vd.ty, Storage::Static(addr), span)?;
        if let Some(init) = &vd.init {
            let word = self.const_fold_literal(&vd.name, vd.ty, init, span)?;
            self.memory
                .set32(addr as usize, word)
                .expect("static region fits in preallocated memory");
        }
        Ok(())
    }

    fn compile_func(&mut self, fd: &FuncDef) -> Result<(), EmitError> {
        let span = SourceSpan::UNKNOWN;
        let addr = self.program.len() as u64;

        self.funcs
            .get_mut(&fd.name)
            .expect("the header pass registered every function before the emit pass runs")
            .addr = Some(addr);

        if let Some(idxs) = self.unresolved_calls.remove(&fd.name) {
            for idx in idxs {
                self.program.patch_operand(idx, Word::from_u64(addr));
            }
        }

        self.current_modifier = Some(fd.modifier);
        self.scope.push_scope(Some(fd.returns.clone()));

        let result = match fd.modifier {
            Modifier::Internal => self.compile_internal_func(fd, span),
            Modifier::External => self.compile_external_func(fd, span),
        };

        self.scope.pop_scope();
        self.current_modifier = None;
        result
    }

    fn compile_internal_func(&mut self, fd: &FuncDef, span: SourceSpan) -> Result<(), EmitError> {
        let frame_size = self.prescan_frame_size(fd, span)?;
        self.emit_push_new_frame(frame_size);
        self.scope.begin_function_frame();

        // the CALL that brought us here pushed (return_addr, then args in
        // reverse) — park the return address in its reserved slot before
        // touching anything else, then copy each argument (now in turn on
        // top, in declared order) into its own frame slot.
        let return_storage = self.scope.declare_return_addr_slot(span)?;
        debug_assert_eq!(return_storage, Storage::StackFrame(scope::RETURN_ADDR_OFFSET));
        self.emit_store(return_storage);

        for (name, ty) in &fd.params {
            if *ty == Type::Void {
                return Err(EmitError::VoidVariable {
                    name: name.clone(),
                    span,
                });
            }
            let storage = self.scope.declare_stack_var(name, *ty, span)?;
            self.emit_store(storage);
        }

        self.compile_block(&fd.body)?;
        self.emit_fallback_epilogue(fd.returns.len());
        Ok(())
    }

    fn compile_external_func(&mut self, fd: &FuncDef, span: SourceSpan) -> Result<(), EmitError> {
        // the CALLDATA trampoline pushed its own ip+1 "return address"
        // before jumping here, exactly as CALL does — but an external
        // entry always exits via STOP, never RET, so that word is
        // never consumed. Discard it now so it doesn't linger under the
        // function's eventual return values and corrupt `return_data`.
        self.emit(Instruction::bare(Opcode::Pop));

        for (i, (name, ty)) in fd.params.iter().enumerate() {
            if *ty == Type::Void {
                return Err(EmitError::VoidVariable {
                    name: name.clone(),
                    span,
                });
            }
            let offset = 32 + (i as u64) * 32;
            self.scope
                .declare_var(name, *ty, Storage::Calldata(offset), span)?;
        }

        self.compile_block(&fd.body)?;
        self.emit(Instruction::bare(Opcode::Stop));
        Ok(())
    }

    /// Pre-walk a function body with a disposable scope tree to compute
    /// its final stack-frame size before compiling a single instruction.
    /// `push_new_frame`'s operand has to be a compile-time constant, but
    /// the real frame size depends on every local the body declares —
    /// including ones in blocks compiled much later. Mirroring the exact
    /// push/pop structure [`Emitter::compile_internal_func`] and
    /// [`Emitter::compile_block`] use guarantees this dry run assigns
    /// the identical offsets the real pass will.
    fn prescan_frame_size(&self, fd: &FuncDef, span: SourceSpan) -> Result<u64, EmitError> {
        let mut scratch = ScopeTree::new();
        scratch.begin_function_frame();
        scratch.push_scope(Some(Vec::new()));
        scratch.declare_return_addr_slot(span)?;
        for (name, ty) in &fd.params {
            scratch.declare_stack_var(name, *ty, span)?;
        }
        scratch.push_scope(None);
        Self::prescan_block(&mut scratch, &fd.body, span)?;
        scratch.pop_scope();
        scratch.pop_scope();
        Ok(scratch.function_frame_size())
    }

    fn prescan_block(scratch: &mut ScopeTree, block: &Block, span: SourceSpan) -> Result<(), EmitError> {
        for stmt in block {
            match stmt {
                Stmt::VarDef { name, ty, .. } => {
                    scratch.declare_stack_var(name, *ty, span)?;
                }
                Stmt::If {
                    then_block,
                    else_block,
                    ..
                } => {
                    scratch.push_scope(None);
                    Self::prescan_block(scratch, then_block, span)?;
                    scratch.pop_scope();
                    if let Some(eb) = else_block {
                        scratch.push_scope(None);
                        Self::prescan_block(scratch, eb, span)?;
                        scratch.pop_scope();
                    }
                }
                Stmt::While { body, .. } => {
                    scratch.push_scope(None);
                    Self::prescan_block(scratch, body, span)?;
                    scratch.pop_scope();
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn emit_fallback_epilogue(&mut self, n_returns: usize) {
        for _ in 0..n_returns {
            self.emit_push_word(Word::ZERO);
        }
        match self.current_modifier {
            Some(Modifier::Internal) => {
                self.emit_frame_slot_addr(scope::RETURN_ADDR_OFFSET);
                self.emit(Instruction::bare(Opcode::Mload256));
                self.emit_pop_frame();
                self.emit(Instruction::bare(Opcode::Ret));
            }
            _ => {
                self.emit(Instruction::bare(Opcode::Stop));
            }
        }
    }

    // ---- statements ----------------------------------------------------

    fn compile_block(&mut self, block: &Block) -> Result<(), EmitError> {
        self.scope.push_scope(None);
        for stmt in block {
            self.compile_stmt(stmt)?;
        }
        self.scope.pop_scope();
        Ok(())
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<(), EmitError> {
        let span = SourceSpan::UNKNOWN;
        match stmt {
            Stmt::Expr(e) => match e {
                // A call in statement position may be a zero-return
                // internal function (nothing pushed, nothing to pop) as
                // well as a one-return one (pop the discarded result) or
                // `write`/`writef` (reported as a single `Void` "return"
                // that pushed nothing) — `compile_expr`'s `FuncCall` arm
                // hard-requires exactly one return, so calls need their
                // own path here rather than going through it.
                Expr::FuncCall { name, args } => {
                    let returns = self.compile_call(name, args, span)?;
                    match returns.len() {
                        0 => {}
                        1 if returns[0] == Type::Void => {}
                        1 => {
                            self.emit(Instruction::bare(Opcode::Pop));
                        }
                        found => {
                            return Err(EmitError::ArityMismatch {
                                name: name.clone(),
                                expected: 1,
                                found,
                                span,
                            });
                        }
                    }
                }
                _ => {
                    let ty = self.compile_expr(e)?;
                    if ty != Type::Void {
                        self.emit(Instruction::bare(Opcode::Pop));
                    }
                }
            },
            Stmt::If {
                cond,
                then_block,
                else_block,
            } => self.compile_if(cond, then_block, else_block.as_ref(), span)?,
            Stmt::While { cond, body } => self.compile_while(cond, body, span)?,
            Stmt::VarDef { name, ty, init } => self.compile_var_def(name, *ty, init.as_ref(), span)?,
            Stmt::VarAssign { name, value } => self.compile_var_assign(name, value, span)?,
            Stmt::MultiAssign { names, call } => self.compile_multi_assign(names, call, span)?,
            Stmt::MapWrite { map, key, value } => self.compile_map_write(map, key, value, span)?,
            Stmt::Return(exprs) => self.compile_return(exprs, span)?,
        }
        Ok(())
    }

    fn compile_if(
        &mut self,
        cond: &Expr,
        then_block: &Block,
        else_block: Option<&Block>,
        span: SourceSpan,
    ) -> Result<(), EmitError> {
        let cond_ty = self.compile_expr(cond)?;
        if cond_ty != Type::Bool {
            return Err(EmitError::TypeMismatch {
                expected: Type::Bool.to_string(),
                found: cond_ty.to_string(),
                span,
            });
        }
        self.emit(Instruction::bare(Opcode::Not));
        let jmp_to_else = self.emit(Instruction::jumpi(0));

        self.compile_block(then_block)?;
        let jmp_to_end = self.emit(Instruction::jumpdest(0));

        let else_addr = self.program.len() as u64;
        if let Some(eb) = else_block {
            self.compile_block(eb)?;
        }
        let end_addr = self.program.len() as u64;

        self.program
            .patch_operand(jmp_to_else, Word::from_u64(else_addr));
        self.program.patch_operand(jmp_to_end, Word::from_u64(end_addr));
        Ok(())
    }

    fn compile_while(&mut self, cond: &Expr, body: &Block, span: SourceSpan) -> Result<(), EmitError> {
        let cond_addr = self.program.len() as u64;
        let cond_ty = self.compile_expr(cond)?;
        if cond_ty != Type::Bool {
            return Err(EmitError::TypeMismatch {
                expected: Type::Bool.to_string(),
                found: cond_ty.to_string(),
                span,
            });
        }
        self.emit(Instruction::bare(Opcode::Not));
        let jmp_to_end = self.emit(Instruction::jumpi(0));

        self.compile_block(body)?;
        self.emit(Instruction::jumpdest(cond_addr));

        let end_addr = self.program.len() as u64;
        self.program.patch_operand(jmp_to_end, Word::from_u64(end_addr));
        Ok(())
    }

    fn compile_var_def(
        &mut self,
        name: &str,
        ty: Type,
        init: Option<&Expr>,
        span: SourceSpan,
    ) -> Result<(), EmitError> {
        if ty == Type::Void {
            return Err(EmitError::VoidVariable {
                name: name.to_string(),
                span,
            });
        }
        let storage = match self.current_modifier {
            Some(Modifier::Internal) => self.scope.declare_stack_var(name, ty, span)?,
            _ => {
                let addr = self.scope.alloc_static();
                self.scope.declare_var(name, ty, Storage::Static(addr), span)?;
                Storage::Static(addr)
            }
        };
        if let Some(init_expr) = init {
            let actual = self.compile_expr(init_expr)?;
            if actual != ty {
                return Err(EmitError::TypeMismatch {
                    expected: ty.to_string(),
                    found: actual.to_string(),
                    span,
                });
            }
            self.emit_store(storage);
        }
        Ok(())
    }

    fn compile_var_assign(&mut self, name: &str, value: &Expr, span: SourceSpan) -> Result<(), EmitError> {
        let var = self
            .scope
            .lookup(name)
            .ok_or_else(|| EmitError::UnknownIdentifier {
                name: name.to_string(),
                span,
            })?;
        if matches!(var.storage, Storage::Calldata(_)) {
            return Err(EmitError::TypeMismatch {
                expected: "an assignable variable".to_string(),
                found: format!("calldata parameter `{name}`"),
                span,
            });
        }
        let actual = self.compile_expr(value)?;
        if actual != var.ty {
            return Err(EmitError::TypeMismatch {
                expected: var.ty.to_string(),
                found: actual.to_string(),
                span,
            });
        }
        self.emit_store(var.storage);
        Ok(())
    }

    fn compile_multi_assign(&mut self, names: &[String], call: &Expr, span: SourceSpan) -> Result<(), EmitError> {
        let Expr::FuncCall { name, args } = call else {
            return Err(EmitError::TypeMismatch {
                expected: "a function call".to_string(),
                found: "expression".to_string(),
                span,
            });
        };
        let returns = self.compile_call(name, args, span)?;
        if returns.len() != names.len() {
            return Err(EmitError::ArityMismatch {
                name: name.clone(),
                expected: returns.len(),
                found: names.len(),
                span,
            });
        }
        for (target, ty) in names.iter().zip(returns.iter()) {
            let var = self
                .scope
                .lookup(target)
                .ok_or_else(|| EmitError::UnknownIdentifier {
                    name: target.clone(),
                    span,
                })?;
            if matches!(var.storage, Storage::Calldata(_)) {
                return Err(EmitError::TypeMismatch {
                    expected: "an assignable variable".to_string(),
                    found: format!("calldata parameter `{target}`"),
                    span,
                });
            }
            if var.ty != *ty {
                return Err(EmitError::TypeMismatch {
                    expected: var.ty.to_string(),
                    found: ty.to_string(),
                    span,
                });
            }
            self.emit_store(var.storage);
        }
        Ok(())
    }

    fn compile_map_write(&mut self, map: &str, key: &Expr, value: &Expr, span: SourceSpan) -> Result<(), EmitError> {
        let m = self
            .maps
            .get(map)
            .copied()
            .ok_or_else(|| EmitError::UnknownMap {
                name: map.to_string(),
                span,
            })?;
        let key_ty = self.compile_expr(key)?;
        if key_ty != m.key_type {
            return Err(EmitError::TypeMismatch {
                expected: m.key_type.to_string(),
                found: key_ty.to_string(),
                span,
            });
        }
        let val_ty = self.compile_expr(value)?;
        if val_ty != m.value_type {
            return Err(EmitError::TypeMismatch {
                expected: m.value_type.to_string(),
                found: val_ty.to_string(),
                span,
            });
        }
        let prefix = map_name_prefix(map).ok_or_else(|| EmitError::NameTooLong {
            name: map.to_string(),
            span,
        })?;
        self.emit(Instruction::map_op(Opcode::Mapvsstore, prefix));
        Ok(())
    }

    fn compile_return(&mut self, exprs: &[Expr], span: SourceSpan) -> Result<(), EmitError> {
        let expected: Vec<Type> = self.scope.expected_returns().unwrap_or(&[]).to_vec();
        if exprs.len() != expected.len() {
            return Err(EmitError::ReturnArityMismatch {
                expected: expected.len(),
                found: exprs.len(),
                span,
            });
        }
        // compiled in reverse declared order so the first declared
        // return value ends up on top of the stack, matching the
        // caller's expectation (and `MultiAssign`'s pop order).
        for (expr, ty) in exprs.iter().zip(expected.iter()).rev() {
            let actual = self.compile_expr(expr)?;
            if actual != *ty {
                return Err(EmitError::TypeMismatch {
                    expected: ty.to_string(),
                    found: actual.to_string(),
                    span,
                });
            }
        }
        match self.current_modifier {
            Some(Modifier::Internal) => {
                self.emit_frame_slot_addr(scope::RETURN_ADDR_OFFSET);
                self.emit(Instruction::bare(Opcode::Mload256));
                self.emit_pop_frame();
                self.emit(Instruction::bare(Opcode::Ret));
            }
            _ => {
                self.emit(Instruction::bare(Opcode::Stop));
            }
        }
        Ok(())
    }

    // ---- expressions ----------------------------------------------------

    fn compile_expr(&mut self, expr: &Expr) -> Result<Type, EmitError> {
        let span = SourceSpan::UNKNOWN;
        match expr {
            Expr::IntLit(v) => {
                self.emit_push_word(Word::from_u64(*v as u64));
                Ok(Type::I64)
            }
            Expr::BoolLit(b) => {
                self.emit_push_word(Word::from_bool(*b));
                Ok(Type::Bool)
            }
            Expr::Bytes32Lit(s) => {
                let w = self.parse_bytes32(s, span)?;
                self.emit_push_word(w);
                Ok(Type::Bytes32)
            }
            Expr::AddressLit(s) => {
                let w = self.parse_address(s, span)?;
                self.emit_push_word(w);
                Ok(Type::Address)
            }
            Expr::StrLit(_) => Err(EmitError::TypeMismatch {
                expected: "i64, bool, bytes32 or address".to_string(),
                found: "string literal".to_string(),
                span,
            }),
            Expr::VarRead(name) => self.compile_var_read(name, span),
            Expr::MapRead { map, key } => self.compile_map_read(map, key, span),
            Expr::FuncCall { name, args } => {
                let returns = self.compile_call(name, args, span)?;
                if returns.len() != 1 {
                    return Err(EmitError::ArityMismatch {
                        name: name.clone(),
                        expected: 1,
                        found: returns.len(),
                        span,
                    });
                }
                Ok(returns[0])
            }
            Expr::BinaryOp { op, lhs, rhs } => self.compile_binary_op(*op, lhs, rhs, span),
        }
    }

    fn compile_var_read(&mut self, name: &str, span: SourceSpan) -> Result<Type, EmitError> {
        if let Some(&val) = self.enum_consts.get(name) {
            self.emit_push_word(Word::from_u64(val as u64));
            return Ok(Type::I64);
        }
        let var = self
            .scope
            .lookup(name)
            .ok_or_else(|| EmitError::UnknownIdentifier {
                name: name.to_string(),
                span,
            })?;
        match var.storage {
            Storage::Static(addr) => {
                self.emit_push_addr(addr);
                self.emit(Instruction::bare(Opcode::Mload256));
            }
            Storage::StackFrame(offset) => {
                self.emit_frame_slot_addr(offset);
                self.emit(Instruction::bare(Opcode::Mload256));
            }
            Storage::Calldata(offset) => {
                self.emit_push_addr(offset);
                self.emit(Instruction::bare(Opcode::Dataload));
            }
        }
        Ok(var.ty)
    }

    fn compile_map_read(&mut self, map: &str, key: &Expr, span: SourceSpan) -> Result<Type, EmitError> {
        let m = self
            .maps
            .get(map)
            .copied()
            .ok_or_else(|| EmitError::UnknownMap {
                name: map.to_string(),
                span,
            })?;
        let key_ty = self.compile_expr(key)?;
        if key_ty != m.key_type {
            return Err(EmitError::TypeMismatch {
                expected: m.key_type.to_string(),
                found: key_ty.to_string(),
                span,
            });
        }
        let prefix = map_name_prefix(map).ok_or_else(|| EmitError::NameTooLong {
            name: map.to_string(),
            span,
        })?;
        self.emit(Instruction::map_op(Opcode::Mapvsload, prefix));
        Ok(m.value_type)
    }

    fn compile_binary_op(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr, span: SourceSpan) -> Result<Type, EmitError> {
        let lhs_ty = self.compile_expr(lhs)?;
        let rhs_ty = self.compile_expr(rhs)?;
        if lhs_ty != rhs_ty {
            return Err(EmitError::TypeMismatch {
                expected: lhs_ty.to_string(),
                found: rhs_ty.to_string(),
                span,
            });
        }
        let (opcode, result) = binop_opcode(op, lhs_ty).ok_or_else(|| EmitError::TypeMismatch {
            expected: "an operand type this operator accepts".to_string(),
            found: lhs_ty.to_string(),
            span,
        })?;
        self.emit(Instruction::bare(opcode));
        Ok(result)
    }

    /// Compile a call's arguments (reverse order, so the first declared
    /// parameter ends up on top) and its `CALL`, recording a forward
    /// reference if the callee hasn't been compiled yet. Shared by
    /// expression-position calls and `MultiAssign`.
    fn compile_call(&mut self, name: &str, args: &[Expr], span: SourceSpan) -> Result<Vec<Type>, EmitError> {
        if name == "write" || name == "writef" {
            self.compile_builtin_call(name, args, span)?;
            return Ok(vec![Type::Void]);
        }

        let header = self
            .funcs
            .get(name)
            .cloned()
            .ok_or_else(|| EmitError::UnknownIdentifier {
                name: name.to_string(),
                span,
            })?;
        if header.modifier == Modifier::External {
            return Err(EmitError::CallToExternal {
                name: name.to_string(),
                span,
            });
        }
        if header.params.len() != args.len() {
            return Err(EmitError::ArityMismatch {
                name: name.to_string(),
                expected: header.params.len(),
                found: args.len(),
                span,
            });
        }
        for i in (0..args.len()).rev() {
            let ty = self.compile_expr(&args[i])?;
            if ty != header.params[i].1 {
                return Err(EmitError::TypeMismatch {
                    expected: header.params[i].1.to_string(),
                    found: ty.to_string(),
                    span,
                });
            }
        }
        match header.addr {
            Some(addr) => {
                self.emit(Instruction::call(addr));
            }
            None => {
                let idx = self.emit(Instruction::call(0));
                self.unresolved_calls.entry(name.to_string()).or_default().push(idx);
            }
        }
        Ok(header.returns)
    }

    fn compile_builtin_call(&mut self, name: &str, args: &[Expr], span: SourceSpan) -> Result<(), EmitError> {
        match name {
            "write" => {
                if args.len() != 1 {
                    return Err(EmitError::ArityMismatch {
                        name: "write".to_string(),
                        expected: 1,
                        found: args.len(),
                        span,
                    });
                }
                let Expr::StrLit(s) = &args[0] else {
                    return Err(EmitError::TypeMismatch {
                        expected: "string literal".to_string(),
                        found: "expression".to_string(),
                        span,
                    });
                };
                let (addr, len) = self.place_string_in_memory(s);
                self.emit_push_word(addr);
                self.emit_push_word(Word::from_u64(len));
                self.emit(Instruction::native(eulvm_asm::native::NATIVE_WRITE));
            }
            "writef" => {
                if args.is_empty() {
                    return Err(EmitError::ArityMismatch {
                        name: "writef".to_string(),
                        expected: 1,
                        found: 0,
                        span,
                    });
                }
                let Expr::StrLit(fmt) = &args[0] else {
                    return Err(EmitError::TypeMismatch {
                        expected: "string literal".to_string(),
                        found: "expression".to_string(),
                        span,
                    });
                };
                let specs = parse_format_specs(fmt);
                if specs.len() != args.len() - 1 {
                    return Err(EmitError::ArityMismatch {
                        name: "writef".to_string(),
                        expected: specs.len(),
                        found: args.len() - 1,
                        span,
                    });
                }
                // pushed in reverse so the first specifier's value ends
                // up immediately below the format string on the stack —
                // `NativeWriteF` pops the format string first, then one
                // argument per specifier, left to right.
                for i in (0..specs.len()).rev() {
                    let arg = &args[i + 1];
                    match specs[i] {
                        FormatSpec::Str => {
                            let Expr::StrLit(s) = arg else {
                                return Err(EmitError::TypeMismatch {
                                    expected: "string literal".to_string(),
                                    found: "expression".to_string(),
                                    span,
                                });
                            };
                            let (addr, len) = self.place_string_in_memory(s);
                            // `%s` is popped as (addr, len) — addr on
                            // top — the opposite order from `write`'s
                            // own (addr, len) convention.
                            self.emit_push_word(Word::from_u64(len));
                            self.emit_push_word(addr);
                        }
                        FormatSpec::Int => {
                            let ty = self.compile_expr(arg)?;
                            if ty != Type::I64 {
                                return Err(EmitError::TypeMismatch {
                                    expected: Type::I64.to_string(),
                                    found: ty.to_string(),
                                    span,
                                });
                            }
                        }
                        FormatSpec::Hash => {
                            let ty = self.compile_expr(arg)?;
                            if ty != Type::Bytes32 {
                                return Err(EmitError::TypeMismatch {
                                    expected: Type::Bytes32.to_string(),
                                    found: ty.to_string(),
                                    span,
                                });
                            }
                        }
                        FormatSpec::Addr => {
                            let ty = self.compile_expr(arg)?;
                            if ty != Type::Address {
                                return Err(EmitError::TypeMismatch {
                                    expected: Type::Address.to_string(),
                                    found: ty.to_string(),
                                    span,
                                });
                            }
                        }
                    }
                }
                let (faddr, flen) = self.place_string_in_memory(fmt);
                self.emit_push_word(faddr);
                self.emit_push_word(Word::from_u64(flen));
                self.emit(Instruction::native(eulvm_asm::native::NATIVE_WRITE_F));
            }
            _ => unreachable!("compile_builtin_call is only reached for write/writef"),
        }
        Ok(())
    }
}

impl Default for Emitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::ast::{Modifier, Top};

    fn compile(module: Module) -> Result<CompiledModule, EmitError> {
        Emitter::new().compile_module(&module)
    }

    #[test]
    fn arithmetic_entry_adds_two_literals() {
        let module = Module {
            tops: vec![Top::Func(FuncDef {
                name: "main".to_string(),
                params: vec![],
                returns: vec![Type::I64],
                modifier: Modifier::External,
                body: vec![Stmt::Return(vec![Expr::BinaryOp {
                    op: BinOp::Add,
                    lhs: Box::new(Expr::IntLit(1)),
                    rhs: Box::new(Expr::IntLit(10)),
                }])],
            })],
        };
        let compiled = compile(module).unwrap();
        assert!(compiled.program.len() > 2);
        assert_eq!(compiled.functions["main"].addr, Some(2));
    }

    #[test]
    fn calling_an_external_function_is_rejected() {
        let module = Module {
            tops: vec![
                Top::Func(FuncDef {
                    name: "helper".to_string(),
                    params: vec![],
                    returns: vec![],
                    modifier: Modifier::External,
                    body: vec![Stmt::Return(vec![])],
                }),
                Top::Func(FuncDef {
                    name: "main".to_string(),
                    params: vec![],
                    returns: vec![],
                    modifier: Modifier::Internal,
                    body: vec![Stmt::Expr(Expr::FuncCall {
                        name: "helper".to_string(),
                        args: vec![],
                    })],
                }),
            ],
        };
        let err = compile(module).unwrap_err();
        assert!(matches!(err, EmitError::CallToExternal { .. }));
    }

    #[test]
    fn forward_referenced_internal_call_resolves() {
        let module = Module {
            tops: vec![
                Top::Func(FuncDef {
                    name: "main".to_string(),
                    params: vec![],
                    returns: vec![Type::I64],
                    modifier: Modifier::External,
                    body: vec![Stmt::Return(vec![Expr::FuncCall {
                        name: "helper".to_string(),
                        args: vec![Expr::IntLit(4)],
                    }])],
                }),
                Top::Func(FuncDef {
                    name: "helper".to_string(),
                    params: vec![("x".to_string(), Type::I64)],
                    returns: vec![Type::I64],
                    modifier: Modifier::Internal,
                    body: vec![Stmt::Return(vec![Expr::VarRead("x".to_string())])],
                }),
            ],
        };
        let compiled = compile(module).unwrap();
        let helper_addr = compiled.functions["helper"].addr.unwrap();
        let call_found = compiled
            .program
            .instructions()
            .iter()
            .any(|i| i.op == Opcode::Call && i.operand == Word::from_u64(helper_addr));
        assert!(call_found, "the CALL to `helper` should have been patched to its final address");
    }

    #[test]
    fn statement_position_call_to_a_zero_return_function_compiles_without_a_pop() {
        let module = Module {
            tops: vec![
                Top::Func(FuncDef {
                    name: "log_it".to_string(),
                    params: vec![],
                    returns: vec![],
                    modifier: Modifier::Internal,
                    body: vec![Stmt::Return(vec![])],
                }),
                Top::Func(FuncDef {
                    name: "main".to_string(),
                    params: vec![],
                    returns: vec![],
                    modifier: Modifier::External,
                    body: vec![Stmt::Expr(Expr::FuncCall {
                        name: "log_it".to_string(),
                        args: vec![],
                    })],
                }),
            ],
        };
        let compiled = compile(module).unwrap();
        let call_idx = compiled
            .program
            .instructions()
            .iter()
            .position(|i| i.op == Opcode::Call)
            .expect("the call to log_it should have been emitted");
        // a zero-return call pushes nothing, so nothing follows it to pop.
        assert_eq!(compiled.program.instructions()[call_idx + 1].op, Opcode::Stop);
    }

    #[test]
    fn statement_position_call_to_a_one_return_function_pops_the_result() {
        let module = Module {
            tops: vec![
                Top::Func(FuncDef {
                    name: "helper".to_string(),
                    params: vec![],
                    returns: vec![Type::I64],
                    modifier: Modifier::Internal,
                    body: vec![Stmt::Return(vec![Expr::IntLit(1)])],
                }),
                Top::Func(FuncDef {
                    name: "main".to_string(),
                    params: vec![],
                    returns: vec![],
                    modifier: Modifier::External,
                    body: vec![Stmt::Expr(Expr::FuncCall {
                        name: "helper".to_string(),
                        args: vec![],
                    })],
                }),
            ],
        };
        let compiled = compile(module).unwrap();
        let call_idx = compiled
            .program
            .instructions()
            .iter()
            .position(|i| i.op == Opcode::Call)
            .expect("the call to helper should have been emitted");
        assert_eq!(compiled.program.instructions()[call_idx + 1].op, Opcode::Pop);
    }

    #[test]
    fn multi_assign_into_a_calldata_parameter_is_rejected_not_a_panic() {
        let module = Module {
            tops: vec![
                Top::Func(FuncDef {
                    name: "helper".to_string(),
                    params: vec![],
                    returns: vec![Type::I64],
                    modifier: Modifier::Internal,
                    body: vec![Stmt::Return(vec![Expr::IntLit(1)])],
                }),
                Top::Func(FuncDef {
                    name: "main".to_string(),
                    params: vec![("a".to_string(), Type::I64)],
                    returns: vec![],
                    modifier: Modifier::External,
                    body: vec![Stmt::MultiAssign {
                        names: vec!["a".to_string()],
                        call: Expr::FuncCall {
                            name: "helper".to_string(),
                            args: vec![],
                        },
                    }],
                }),
            ],
        };
        let err = compile(module).unwrap_err();
        assert!(matches!(err, EmitError::TypeMismatch { .. }));
    }

    #[test]
    fn non_constant_top_level_initializer_is_rejected() {
        let module = Module {
            tops: vec![Top::Var(VarDef {
                name: "x".to_string(),
                ty: Type::I64,
                init: Some(Expr::VarRead("y".to_string())),
            })],
        };
        let err = compile(module).unwrap_err();
        assert!(matches!(err, EmitError::NonConstantGlobalInit { .. }));
    }

    #[test]
    fn map_with_void_value_type_is_rejected() {
        let module = Module {
            tops: vec![Top::Map(MapDef {
                name: "balances".to_string(),
                key_type: Type::Address,
                value_type: Type::Void,
            })],
        };
        let err = compile(module).unwrap_err();
        assert!(matches!(err, EmitError::InvalidMapType { .. }));
    }

    #[test]
    fn format_spec_parsing_skips_non_specifier_percent() {
        assert_eq!(parse_format_specs("no specifiers here"), vec![]);
        assert_eq!(
            parse_format_specs("%d and %s and %v and %x"),
            vec![FormatSpec::Int, FormatSpec::Str, FormatSpec::Hash, FormatSpec::Addr]
        );
    }

    #[rstest]
    #[case(BinOp::Add, Type::I64, Some((Opcode::Add, Type::I64)))]
    #[case(BinOp::Sub, Type::I64, Some((Opcode::Sub, Type::I64)))]
    #[case(BinOp::Mul, Type::I64, Some((Opcode::Mul, Type::I64)))]
    #[case(BinOp::Lt, Type::I64, Some((Opcode::Lt, Type::Bool)))]
    #[case(BinOp::Gt, Type::I64, Some((Opcode::Gt, Type::Bool)))]
    #[case(BinOp::And, Type::Bool, Some((Opcode::And, Type::Bool)))]
    #[case(BinOp::Or, Type::Bool, Some((Opcode::Or, Type::Bool)))]
    #[case(BinOp::Eq, Type::I64, Some((Opcode::Eq, Type::Bool)))]
    #[case(BinOp::Neq, Type::Bytes32, Some((Opcode::Neq, Type::Bool)))]
    #[case(BinOp::Eq, Type::Void, None)]
    #[case(BinOp::Add, Type::Bool, None)]
    #[case(BinOp::Lt, Type::Bytes32, None)]
    fn binop_opcode_matches_type_table(
        #[case] op: BinOp,
        #[case] ty: Type,
        #[case] expected: Option<(Opcode, Type)>,
    ) {
        assert_eq!(binop_opcode(op, ty), expected);
    }
}

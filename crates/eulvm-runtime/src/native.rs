use std::collections::HashMap;

use eulvm_asm::native::{NATIVE_WRITE, NATIVE_WRITE_F};
use eulvm_storage::Kv;

use crate::error::Fault;
use crate::Interpreter;

/// One host-implemented function, addressable from bytecode via
/// `NATIVE(id)`. Pops its own arguments off the interpreter's stack and
/// pushes nothing back — both built-in natives are print-style side
/// effects.
pub type NativeFn<K> = Box<dyn Fn(&mut Interpreter<'_, K>) -> Result<(), Fault> + Send + Sync>;

/// Open registry of natives, indexed by id. Two are built in
/// (`NativeWrite`, `NativeWriteF`); the registry is kept open rather than
/// hardcoded to a two-entry match so callers (tests, the CLI) can
/// register their own debug natives alongside them.
pub struct NativeTable<K> {
    fns: HashMap<u64, NativeFn<K>>,
}

impl<K: Kv> NativeTable<K> {
    /// An empty registry with no natives.
    pub fn empty() -> Self {
        NativeTable {
            fns: HashMap::new(),
        }
    }

    /// Register (or replace) the native at `id`.
    pub fn register(&mut self, id: u64, f: NativeFn<K>) {
        self.fns.insert(id, f);
    }

    /// Dispatch to the native registered at `id`, or
    /// [`Fault::UnknownNative`] if none is.
    pub fn dispatch(&self, id: u64, vm: &mut Interpreter<'_, K>) -> Result<(), Fault> {
        match self.fns.get(&id) {
            Some(f) => f(vm),
            None => Err(Fault::UnknownNative { id }),
        }
    }
}

impl<K: Kv> Default for NativeTable<K> {
    /// Registers the two built-in natives: [`NATIVE_WRITE`] and
    /// [`NATIVE_WRITE_F`].
    fn default() -> Self {
        let mut table = NativeTable::empty();
        table.register(NATIVE_WRITE, Box::new(native_write));
        table.register(NATIVE_WRITE_F, Box::new(native_write_f));
        table
    }
}

/// `NativeWrite`: pops `(size, addr)`, prints `memory[addr..addr+size]`
/// decoded as UTF-8 (lossily, for a debug native).
fn native_write<K: Kv>(vm: &mut Interpreter<'_, K>) -> Result<(), Fault> {
    let size = vm.pop()?.to_u64() as usize;
    let addr = vm.pop()?.to_u64() as usize;
    let bytes = vm.memory().load(addr, size)?;
    let text = String::from_utf8_lossy(bytes).into_owned();
    tracing::info!(target: "eulvm::native_write", "{text}");
    vm.emit_output(text);
    Ok(())
}

/// `NativeWriteF`: pops `(size, addr)` as a format string, then for each
/// of `%d`, `%s`, `%v`, `%x` in the format pops an int, string, hash, or
/// address argument respectively and formats it in.
fn native_write_f<K: Kv>(vm: &mut Interpreter<'_, K>) -> Result<(), Fault> {
    let size = vm.pop()?.to_u64() as usize;
    let addr = vm.pop()?.to_u64() as usize;
    let format = String::from_utf8_lossy(vm.memory().load(addr, size)?).into_owned();

    let mut out = String::with_capacity(format.len());
    let mut chars = format.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('d') => {
                let v = vm.pop()?;
                out.push_str(&v.to_u64().to_string());
            }
            Some('s') => {
                let addr = vm.pop()?.to_u64() as usize;
                let len = vm.pop()?.to_u64() as usize;
                let s = String::from_utf8_lossy(vm.memory().load(addr, len)?).into_owned();
                out.push_str(&s);
            }
            Some('v') => {
                let v = vm.pop()?;
                out.push_str(&hex::encode(v.to_be_bytes()));
            }
            Some('x') => {
                let v = vm.pop()?;
                // right-aligned 20-byte address, per the ABI's address encoding
                out.push_str(&hex::encode(&v.to_be_bytes()[12..]));
            }
            Some(other) => {
                out.push('%');
                out.push(other);
            }
            None => out.push('%'),
        }
    }

    tracing::info!(target: "eulvm::native_write_f", "{out}");
    vm.emit_output(out);
    Ok(())
}

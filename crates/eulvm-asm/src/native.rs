/// Ids of the two built-in natives. Registered by default in
/// `eulvm-runtime::native::NativeTable::default()`; the emitter only ever
/// emits `NATIVE` instructions with these operands for the `write`/
/// `writef` statements.
pub const NATIVE_WRITE: u64 = 0;

/// `NativeWriteF`: pops `(size, addr)` as a format string, then consumes
/// one stack argument per `%d`/`%s`/`%v`/`%x` specifier in the string.
pub const NATIVE_WRITE_F: u64 = 1;

use eulvm_types::Word;

/// The narrow read/write surface the VM interpreter needs from whatever
/// state it's running against.
///
/// [`crate::Slot`] implements this with speculative-execution semantics;
/// a bare [`StateKv`](crate::StateKv) can also implement it directly for
/// sequential (non-speculative) execution — useful in tests and for the
/// CLI's single-transaction `eule` command.
pub trait Kv {
    /// Read the current value for `key`, defaulting to `Word::ZERO` if
    /// never written.
    fn get(&mut self, key: Word) -> Word;

    /// Write `val` for `key`.
    fn set(&mut self, key: Word, val: Word);
}

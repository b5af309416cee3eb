use std::collections::HashMap;

use eulvm_types::Word;

use crate::kv::Kv;
use crate::tiers::StateKv;

/// A worker's private speculative-execution view of a shared
/// [`StateKv`].
///
/// `reads` remembers every value the slot has observed (used later to
/// validate against `merge_dirties`); `dirties` holds writes not yet
/// folded into the shared state. Neither is visible to other slots until
/// [`Slot::fold_dirties`] is called.
pub struct Slot<'s> {
    state: &'s StateKv,
    reads: HashMap<Word, Word>,
    dirties: HashMap<Word, Word>,
    reexec: bool,
}

impl<'s> Slot<'s> {
    /// Construct a fresh slot over `state`.
    pub fn new(state: &'s StateKv) -> Self {
        Slot {
            state,
            reads: HashMap::new(),
            dirties: HashMap::new(),
            reexec: false,
        }
    }

    /// Read `key`, following this lookup order:
    /// 1. if re-executing, prefer `merge_dirties`;
    /// 2. else prefer this slot's own `dirties`;
    /// 3. else prefer this slot's own `reads`;
    /// 4. else read through the shared state and record into `reads`.
    pub fn get(&mut self, key: Word) -> Word {
        if self.reexec {
            if let Some(val) = self.state.merge_dirty(key) {
                return val;
            }
        }
        if let Some(&val) = self.dirties.get(&key) {
            return val;
        }
        if let Some(&val) = self.reads.get(&key) {
            return val;
        }
        let val = self.state.get(key);
        self.reads.insert(key, val);
        val
    }

    /// Write `val` for `key` into this slot's local `dirties`. No read is
    /// recorded.
    pub fn set(&mut self, key: Word, val: Word) {
        self.dirties.insert(key, val);
    }

    /// True if none of this slot's recorded `reads` have since been
    /// overwritten in the shared `merge_dirties` dirtyfall.
    pub fn validate(&self) -> bool {
        !self.state.any_merge_dirty(self.reads.keys().copied())
    }

    /// Fold this slot's `dirties` into the shared state's dirtyfall —
    /// the commit half of a worker's turn in the priority chain.
    pub fn fold_dirties(&self) {
        self.state.fold_into_merge_dirties(self.dirties.clone());
    }

    /// Mark this slot for re-execution: subsequent `get` calls prefer the
    /// shared `merge_dirties` over local state, so the re-run observes
    /// writes merged by higher-priority workers.
    pub fn set_reexec(&mut self) {
        self.reexec = true;
    }

    /// True if this slot has been marked for re-execution.
    pub fn is_reexec(&self) -> bool {
        self.reexec
    }

    /// Clear local `reads`/`dirties` and the re-exec flag, discarding this
    /// slot's speculative work. Used before a losing transaction
    /// re-executes.
    pub fn revert(&mut self) {
        self.reads.clear();
        self.dirties.clear();
        self.reexec = false;
    }

    /// Clear local `reads`/`dirties` and the re-exec flag. Functionally
    /// identical to [`Slot::revert`] at this layer — the distinction
    /// (revert discards speculative work mid-window, reset prepares the
    /// slot for the *next* window) exists only in caller intent.
    pub fn reset(&mut self) {
        self.reads.clear();
        self.dirties.clear();
        self.reexec = false;
    }
}

impl Kv for Slot<'_> {
    fn get(&mut self, key: Word) -> Word {
        Slot::get(self, key)
    }

    fn set(&mut self, key: Word, val: Word) {
        Slot::set(self, key, val)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_does_not_affect_reads() {
        let state = StateKv::new();
        let mut slot = Slot::new(&state);
        slot.set(Word::from_u64(1), Word::from_u64(5));
        // A fresh slot re-reading the same key before folding dirties
        // still sees its own dirty write (case 2 of the lookup order).
        assert_eq!(slot.get(Word::from_u64(1)), Word::from_u64(5));
    }

    #[test]
    fn validate_fails_when_a_read_key_was_merged_by_another_worker() {
        let state = StateKv::new();
        let mut slot = Slot::new(&state);
        let _ = slot.get(Word::from_u64(1));
        assert!(slot.validate());

        state.fold_into_merge_dirties([(Word::from_u64(1), Word::from_u64(99))]);
        assert!(!slot.validate());
    }

    #[test]
    fn reexec_prefers_merge_dirties_over_local_reads() {
        let state = StateKv::new();
        let mut slot = Slot::new(&state);
        state.seed(Word::from_u64(1), Word::from_u64(1));
        let _ = slot.get(Word::from_u64(1)); // caches stale read = 1

        state.fold_into_merge_dirties([(Word::from_u64(1), Word::from_u64(7))]);
        slot.revert();
        slot.set_reexec();
        assert_eq!(slot.get(Word::from_u64(1)), Word::from_u64(7));
    }
}

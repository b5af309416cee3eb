use std::collections::HashMap;

use eulvm_types::Word;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

use crate::consts::{StorageConfig, DEFAULT_CACHE_CAPACITY};
use crate::kv::Kv;

/// The three-tier key/value store: a simulated persistent `backend`, a
/// bounded LRU `cache`, and a block-scoped `pending` overlay, plus the
/// `merge_dirties` dirtyfall shared by one window's workers.
///
/// `merge_dirties` and `pending` are behind a lock purely so the type can
/// be shared across worker threads — the window executor's priority
/// chain ensures there is never real contention on them, only the
/// formality Rust's aliasing rules require.
pub struct StateKv {
    backend: Mutex<HashMap<Word, Word>>,
    cache: Mutex<LruCache<Word, Word>>,
    pending: Mutex<HashMap<Word, Word>>,
    merge_dirties: Mutex<HashMap<Word, Word>>,
}

impl StateKv {
    /// Construct an empty store with the default cache capacity
    /// ([`DEFAULT_CACHE_CAPACITY`]).
    pub fn new() -> Self {
        Self::with_cache_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// Construct an empty store with an explicit cache capacity.
    pub fn with_cache_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        StateKv {
            backend: Mutex::new(HashMap::new()),
            cache: Mutex::new(LruCache::new(capacity)),
            pending: Mutex::new(HashMap::new()),
            merge_dirties: Mutex::new(HashMap::new()),
        }
    }

    /// Construct an empty store from a [`StorageConfig`] (only its
    /// `cache_capacity` field applies here).
    pub fn with_config(config: StorageConfig) -> Self {
        Self::with_cache_capacity(config.cache_capacity)
    }

    /// Read `key`: `pending` if present, else `cache`, else `backend`
    /// (defaulting to zero). Does not promote into the cache — only
    /// [`StateKv::commit`] populates it.
    pub fn get(&self, key: Word) -> Word {
        if let Some(&val) = self.pending.lock().get(&key) {
            return val;
        }
        if let Some(&val) = self.cache.lock().peek(&key) {
            return val;
        }
        self.backend.lock().get(&key).copied().unwrap_or(Word::ZERO)
    }

    /// Insert `key → val` directly into the persistent backend, bypassing
    /// `pending`. Used by tests and by the CLI to seed initial state.
    pub fn seed(&self, key: Word, val: Word) {
        self.backend.lock().insert(key, val);
    }

    /// Current contents of `merge_dirties` for `key`, if present. Used by
    /// [`crate::Slot::get`] when re-executing.
    pub(crate) fn merge_dirty(&self, key: Word) -> Option<Word> {
        self.merge_dirties.lock().get(&key).copied()
    }

    /// True if any key in `keys` has a pending write in `merge_dirties` —
    /// a worker's conflict-validation check against higher-priority
    /// predecessors.
    pub(crate) fn any_merge_dirty(&self, keys: impl Iterator<Item = Word>) -> bool {
        let dirties = self.merge_dirties.lock();
        keys.into_iter().any(|k| dirties.contains_key(&k))
    }

    /// Fold `writes` into `merge_dirties` — a worker's commit step within
    /// a window.
    pub(crate) fn fold_into_merge_dirties(&self, writes: impl IntoIterator<Item = (Word, Word)>) {
        self.merge_dirties.lock().extend(writes);
    }

    /// Promote the whole of `merge_dirties` into `pending` and clear the
    /// dirtyfall — the window executor's `finalize` step.
    pub(crate) fn finalize_window(&self) {
        let mut dirties = self.merge_dirties.lock();
        self.pending.lock().extend(dirties.drain());
    }

    /// Promote every `pending` entry into `cache` and `backend`, then
    /// clear `pending` and `merge_dirties` — the block-level commit.
    pub fn commit(&self) {
        let mut pending = self.pending.lock();
        let mut backend = self.backend.lock();
        let mut cache = self.cache.lock();
        for (key, val) in pending.drain() {
            cache.put(key, val);
            backend.insert(key, val);
        }
        drop(pending);
        drop(backend);
        drop(cache);
        self.merge_dirties.lock().clear();
    }

    /// Snapshot of the current `pending` overlay, for tests and tooling.
    pub fn pending_snapshot(&self) -> HashMap<Word, Word> {
        self.pending.lock().clone()
    }
}

impl Default for StateKv {
    fn default() -> Self {
        Self::new()
    }
}

impl Kv for StateKv {
    fn get(&mut self, key: Word) -> Word {
        StateKv::get(self, key)
    }

    fn set(&mut self, key: Word, val: Word) {
        self.pending.lock().insert(key, val);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_defaults_to_zero() {
        let kv = StateKv::new();
        assert_eq!(kv.get(Word::from_u64(1)), Word::ZERO);
    }

    #[test]
    fn seed_is_visible_through_get() {
        let kv = StateKv::new();
        kv.seed(Word::from_u64(1), Word::from_u64(42));
        assert_eq!(kv.get(Word::from_u64(1)), Word::from_u64(42));
    }

    #[test]
    fn commit_moves_pending_into_backend_and_cache() {
        let kv = StateKv::new();
        kv.fold_into_merge_dirties([(Word::from_u64(1), Word::from_u64(9))]);
        kv.finalize_window();
        assert!(kv.pending_snapshot().contains_key(&Word::from_u64(1)));
        kv.commit();
        assert!(kv.pending_snapshot().is_empty());
        assert_eq!(kv.get(Word::from_u64(1)), Word::from_u64(9));
    }

    #[quickcheck_macros::quickcheck]
    fn finalize_then_commit_keeps_the_last_write_per_key(writes: Vec<(u8, u64)>) -> bool {
        let kv = StateKv::new();
        let mut expected = HashMap::new();
        for &(key, val) in &writes {
            expected.insert(Word::from_u64(key as u64), Word::from_u64(val));
        }
        kv.fold_into_merge_dirties(
            writes
                .into_iter()
                .map(|(key, val)| (Word::from_u64(key as u64), Word::from_u64(val))),
        );
        kv.finalize_window();
        kv.commit();
        expected.into_iter().all(|(key, val)| kv.get(key) == val)
    }
}

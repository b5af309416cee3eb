use crossbeam_channel::{bounded, Receiver, Sender};

use crate::consts::{StorageConfig, DEFAULT_WINDOW_SIZE};
use crate::slot::Slot;
use crate::tiers::StateKv;

/// A fixed-size priority chain of workers that executes a window's worth
/// of transactions concurrently against a shared [`StateKv`].
///
/// Priority is the worker's position: index 0 is highest priority and
/// commits first; each lower-priority worker validates against the
/// dirtyfall left by every higher-priority worker before it, re-executing
/// at most once on conflict. The lowest-priority worker finalizes the
/// window by promoting the dirtyfall into `pending`.
///
/// There is one `crossbeam_channel` "done" signal per worker; a worker
/// waits on its immediate predecessor's signal before validating, which
/// is both the synchronization barrier and the total merge order — no
/// general-purpose lock is needed around `merge_dirties` itself (see
/// [`StateKv`]'s doc comment for why one is held anyway).
pub struct WindowExecutor {
    size: usize,
}

impl WindowExecutor {
    /// A window executor with the default size ([`DEFAULT_WINDOW_SIZE`]).
    pub fn new() -> Self {
        Self::with_size(DEFAULT_WINDOW_SIZE)
    }

    /// A window executor with an explicit worker count.
    pub fn with_size(size: usize) -> Self {
        assert!(size > 0, "window size must be positive");
        WindowExecutor { size }
    }

    /// A window executor sized from a [`StorageConfig`] (only its
    /// `window_size` field applies here).
    pub fn with_config(config: StorageConfig) -> Self {
        Self::with_size(config.window_size)
    }

    /// Number of workers in this window.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Run one window: `tasks[i]` is transaction `i`'s body, executed
    /// against its own [`Slot`] over `state`. Each task is run at most
    /// twice (the initial speculative attempt, and one re-execution on a
    /// validation conflict).
    ///
    /// Panics if `tasks.len() != self.size()`, matching the fixed-size
    /// contract of a window. A panic inside a task aborts the whole
    /// window — there is no cancellation or recovery at this layer.
    pub fn process<F>(&self, state: &StateKv, tasks: &[F])
    where
        F: Fn(&mut Slot) + Sync,
    {
        assert_eq!(
            tasks.len(),
            self.size,
            "window executor sized for {} workers, got {} transactions",
            self.size,
            tasks.len()
        );

        let channels: Vec<(Sender<()>, Receiver<()>)> =
            (0..self.size).map(|_| bounded(1)).collect();

        std::thread::scope(|scope| {
            for (i, task) in tasks.iter().enumerate() {
                let channels = &channels;
                scope.spawn(move || {
                    let mut slot = Slot::new(state);
                    task(&mut slot);

                    if i > 0 {
                        channels[i - 1]
                            .1
                            .recv()
                            .expect("predecessor worker's done channel closed unexpectedly");
                    }

                    if !slot.validate() {
                        tracing::debug!(worker = i, "read/write conflict, re-executing");
                        slot.revert();
                        slot.set_reexec();
                        task(&mut slot);
                    }

                    slot.fold_dirties();
                    channels[i]
                        .0
                        .send(())
                        .expect("this worker's done receiver was dropped");

                    if i == self.size - 1 {
                        state.finalize_window();
                        tracing::info!(window_size = self.size, "window finalized");
                    }
                });
            }
        });
    }
}

impl Default for WindowExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eulvm_types::Word;

    fn read_modify_write(read: Word, write: Word, delta: u64) -> impl Fn(&mut Slot) + Sync {
        move |slot: &mut Slot| {
            let current = slot.get(read);
            slot.set(write, current.wrapping_add(Word::from_u64(delta)));
        }
    }

    #[test]
    fn disjoint_transactions_all_commit_without_reexecution() {
        let state = StateKv::new();
        let k1 = Word::from_u64(1);
        let k2 = Word::from_u64(2);
        let k3 = Word::from_u64(3);

        let tasks = vec![
            read_modify_write(k1, k1, 1),
            read_modify_write(k2, k2, 2),
            read_modify_write(k3, k3, 3),
        ];

        WindowExecutor::with_size(3).process(&state, &tasks);

        let pending = state.pending_snapshot();
        assert_eq!(pending[&k1], Word::from_u64(1));
        assert_eq!(pending[&k2], Word::from_u64(2));
        assert_eq!(pending[&k3], Word::from_u64(3));
    }

    #[test]
    fn conflicting_read_observes_higher_priority_writer() {
        // tx0 (priority 0) writes K; tx1 (priority 1) reads K and writes
        // its own value derived from it; tx2 (priority 2) writes an
        // unrelated key K'. tx1 must observe tx0's write after
        // re-executing.
        let state = StateKv::new();
        let k = Word::from_u64(10);
        let k_unrelated = Word::from_u64(20);
        let observed = std::sync::Mutex::new(Word::ZERO);

        let tx0 = |slot: &mut Slot| {
            slot.set(k, Word::from_u64(100));
        };
        let tx1 = |slot: &mut Slot| {
            let val = slot.get(k);
            *observed.lock().unwrap() = val;
            slot.set(Word::from_u64(11), val);
        };
        let tx2 = |slot: &mut Slot| {
            slot.set(k_unrelated, Word::from_u64(200));
        };

        // trait objects so the three distinct closures share one slice type
        let tasks: Vec<Box<dyn Fn(&mut Slot) + Sync>> =
            vec![Box::new(tx0), Box::new(tx1), Box::new(tx2)];

        WindowExecutor::with_size(3).process(&state, &tasks);

        assert_eq!(*observed.lock().unwrap(), Word::from_u64(100));
        let pending = state.pending_snapshot();
        assert_eq!(pending[&k], Word::from_u64(100));
        assert_eq!(pending[&k_unrelated], Word::from_u64(200));
        assert_eq!(pending[&Word::from_u64(11)], Word::from_u64(100));
    }
}

//! Runs several windows of speculative execution back to back against one
//! [`StateKv`], the way a block builder would run successive batches of
//! transactions.

use eulvm_storage::{Slot, StateKv, WindowExecutor};
use eulvm_types::Word;

fn transfer(from: Word, to: Word, amount: u64) -> impl Fn(&mut Slot) + Sync {
    move |slot: &mut Slot| {
        let from_bal = slot.get(from);
        let to_bal = slot.get(to);
        slot.set(from, from_bal.wrapping_sub(Word::from_u64(amount)));
        slot.set(to, to_bal.wrapping_add(Word::from_u64(amount)));
    }
}

#[test]
fn two_windows_then_commit_persist_to_the_backend() {
    let state = StateKv::new();
    let alice = Word::from_u64(1);
    let bob = Word::from_u64(2);
    let carol = Word::from_u64(3);
    state.seed(alice, Word::from_u64(100));

    let executor = WindowExecutor::with_size(2);

    // Window 1: alice -> bob (30), bob -> carol (10). The second transfer
    // depends on the first's write, so it must re-execute once to observe
    // it rather than read a stale zero balance.
    executor.process(&state, &[transfer(alice, bob, 30), transfer(bob, carol, 10)]);

    assert_eq!(state.get(alice), Word::from_u64(70));
    assert_eq!(state.get(bob), Word::from_u64(20));
    assert_eq!(state.get(carol), Word::from_u64(10));

    // A read against `pending` sees window 1's effects even before commit.
    assert!(state.pending_snapshot().contains_key(&alice));

    // Window 2: carol -> alice (5), independent transaction on an
    // unrelated pair of keys.
    let dave = Word::from_u64(4);
    let erin = Word::from_u64(5);
    state.seed(dave, Word::from_u64(50));
    executor.process(&state, &[transfer(carol, alice, 5), transfer(dave, erin, 20)]);

    assert_eq!(state.get(alice), Word::from_u64(75));
    assert_eq!(state.get(carol), Word::from_u64(5));
    assert_eq!(state.get(dave), Word::from_u64(30));
    assert_eq!(state.get(erin), Word::from_u64(20));

    state.commit();
    assert!(state.pending_snapshot().is_empty());
    // Balances persist in the backend tier after commit.
    assert_eq!(state.get(alice), Word::from_u64(75));
    assert_eq!(state.get(erin), Word::from_u64(20));
}

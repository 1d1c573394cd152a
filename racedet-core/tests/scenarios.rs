//! End-to-end replays of the documented scenarios against the public
//! `ShadowStack` API, as opposed to the unit tests in `src/stack.rs`
//! which also exercise the private per-frame helpers directly.

use racedet_core::{Address, ReduceStrategy, ShadowStack};

fn addr(a: u64) -> Address {
    Address::from(a)
}

#[test]
fn no_race_round_trip_leaves_the_stack_balanced() {
    let mut s = ShadowStack::new_root();
    s.push_task();
    s.register_write(addr(0x100));
    s.detach(0);
    s.register_write(addr(0x200));
    assert!(s.task_exit().unwrap().unwrap().disjoint());
    s.push_continue(0);
    s.register_write(addr(0x300));
    assert!(s.enter_serial(0).disjoint());
    assert!(s.func_exit().unwrap().disjoint());
    assert_eq!(s.depth(), 1);
}

#[test]
fn sibling_strands_writing_the_same_address_race_at_the_second_join() {
    let mut s = ShadowStack::new_root();
    s.detach(0);
    s.register_write(addr(0x100));
    assert!(s.task_exit().unwrap().unwrap().disjoint());

    s.push_continue(0);
    s.detach(0);
    s.register_write(addr(0x100));
    let outcome = s.task_exit().unwrap().unwrap();
    assert!(!outcome.disjoint());
    assert_eq!(outcome.witness, vec![addr(0x100)]);

    s.enter_serial(0);
    assert_eq!(s.depth(), 1);
}

#[test]
fn stack_allocated_storage_is_erased_before_the_next_parallel_write() {
    let mut s = ShadowStack::new_root();
    s.push_task();
    s.record_alloca(addr(0x2000), 32);
    s.register_write(addr(0x2010));
    assert!(s.func_exit().unwrap().disjoint());

    s.detach(0);
    s.register_write(addr(0x2010));
    let outcome = s.task_exit().unwrap().unwrap();
    assert!(outcome.disjoint(), "a reused, erased stack slot must not race");
    s.enter_serial(0);
}

#[test]
fn migrating_a_worker_via_reduce_concatenates_its_frames() {
    let mut left = ShadowStack::identity();
    left.push_task();
    left.register_write(addr(0xC));

    let mut right = ShadowStack::identity();
    right.push_task();
    right.register_write(addr(0xD));

    let outcome = left.reduce(right, ReduceStrategy::Concatenate).unwrap();
    assert!(outcome.is_none(), "Concatenate defers checking to the next join");
    assert_eq!(left.depth(), 2);
    left.join().unwrap();
}

#[test]
fn softjoin_reduce_detects_a_race_between_two_fresh_peer_views() {
    let mut left = ShadowStack::identity();
    left.push_task();
    left.register_write(addr(0xB));

    let mut right = ShadowStack::identity();
    right.push_task();
    right.register_write(addr(0xB));

    let outcome = left
        .reduce(right, ReduceStrategy::SoftJoin)
        .unwrap()
        .unwrap();
    assert!(!outcome.disjoint());
    assert_eq!(outcome.witness, vec![addr(0xB)]);
    assert_eq!(left.depth(), 1);
}

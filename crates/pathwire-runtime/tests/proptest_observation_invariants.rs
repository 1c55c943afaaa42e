#![forbid(unsafe_code)]

//! Property-based invariant tests for path observation.
//!
//! 1. Under any sequence of writes and reassignments along an observed
//!    chain, the last delivered value equals the value currently at the
//!    path, and only objects on the live chain carry the observer.
//! 2. `"length"` observers fire exactly once per mutation that changed the
//!    array length.
//! 3. Observing the same path repeatedly never duplicates the observer or
//!    its deliveries.
//! 4. A burst of writes before a drain produces at most one delivery.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use pathwire_core::Scheduler;
use pathwire_runtime::reactive::{Obj, Value, metadata_of, observe};
use pathwire_runtime::{arr, obj};
use proptest::prelude::*;

fn drain() {
    Scheduler::current().drain().expect("drain succeeds");
}

fn child(obj: &Obj, key: &str) -> Option<Obj> {
    obj.get(key).as_object().cloned()
}

// ── Strategies ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum ChainOp {
    /// `root.a = { b: { value } }`
    ReplaceA(i32),
    /// `root.a.b = { value }`
    ReplaceB(i32),
    /// `root.a.b.value = value`
    SetValue(i32),
    /// `root.a = null`
    ClearA,
    /// Write into an object that was detached earlier.
    WriteStale(i32),
}

fn chain_op() -> impl Strategy<Value = ChainOp> {
    prop_oneof![
        (-5i32..5).prop_map(ChainOp::ReplaceA),
        (-5i32..5).prop_map(ChainOp::ReplaceB),
        (-5i32..5).prop_map(ChainOp::SetValue),
        Just(ChainOp::ClearA),
        (-5i32..5).prop_map(ChainOp::WriteStale),
    ]
}

#[derive(Debug, Clone, Copy)]
enum ArrayOp {
    Push(i32),
    Pop,
    Shift,
    Unshift(i32),
    Splice(usize, usize, usize),
    Sort,
    Reverse,
}

fn array_op() -> impl Strategy<Value = ArrayOp> {
    prop_oneof![
        (0i32..100).prop_map(ArrayOp::Push),
        Just(ArrayOp::Pop),
        Just(ArrayOp::Shift),
        (0i32..100).prop_map(ArrayOp::Unshift),
        (0usize..6, 0usize..4, 0usize..4).prop_map(|(s, d, i)| ArrayOp::Splice(s, d, i)),
        Just(ArrayOp::Sort),
        Just(ArrayOp::Reverse),
    ]
}

// ═════════════════════════════════════════════════════════════════════════
// 1. No stale observation under reassignment
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn delivered_value_tracks_live_chain(ops in proptest::collection::vec(chain_op(), 1..40)) {
        let root = obj! { "a" => obj! { "b" => obj! { "value" => 0 } } };
        let observer = observe(&root, "a.b.value").expect("observable");
        let last = Rc::new(RefCell::new(observer.value()));
        let sink = Rc::clone(&last);
        let _sub = observer.subscribe_lazy(move |v| *sink.borrow_mut() = v.clone());
        let mut stale: Vec<Obj> = Vec::new();

        for op in ops {
            match op {
                ChainOp::ReplaceA(v) => {
                    if let Some(old) = child(&root, "a") {
                        stale.push(old);
                    }
                    root.set("a", obj! { "b" => obj! { "value" => v } });
                }
                ChainOp::ReplaceB(v) => {
                    if let Some(a) = child(&root, "a") {
                        if let Some(old) = child(&a, "b") {
                            stale.push(old);
                        }
                        a.set("b", obj! { "value" => v });
                    }
                }
                ChainOp::SetValue(v) => {
                    if let Some(b) = child(&root, "a").and_then(|a| child(&a, "b")) {
                        b.set("value", v);
                    }
                }
                ChainOp::ClearA => {
                    if let Some(old) = child(&root, "a") {
                        stale.push(old);
                    }
                    root.set("a", Value::Null);
                }
                ChainOp::WriteStale(v) => {
                    if let Some(old) = stale.last() {
                        old.set("b", obj! { "value" => v });
                        old.set("value", v);
                    }
                }
            }
            drain();
            prop_assert_eq!(last.borrow().clone(), observer.value());
        }

        for old in &stale {
            if let Some(a) = child(&root, "a") {
                if a.ptr_eq(old) {
                    continue;
                }
                if child(&a, "b").is_some_and(|b| b.ptr_eq(old)) {
                    continue;
                }
            }
            prop_assert_eq!(metadata_of(old).subject_count("b"), 0);
            prop_assert_eq!(metadata_of(old).subject_count("value"), 0);
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 2. Array length notifications
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn length_notifies_iff_length_changed(
        initial in proptest::collection::vec(0i32..100, 0..6),
        ops in proptest::collection::vec(array_op(), 1..30),
    ) {
        let list = Obj::array(initial);
        let observer = observe(&list, "length").expect("observable");
        let calls = Rc::new(Cell::new(0usize));
        let counter = Rc::clone(&calls);
        let _sub = observer.subscribe_lazy(move |_| counter.set(counter.get() + 1));

        let mut expected = 0usize;
        for op in ops {
            let before = list.array_len();
            match op {
                ArrayOp::Push(v) => {
                    list.push(v);
                }
                ArrayOp::Pop => {
                    list.pop();
                }
                ArrayOp::Shift => {
                    list.shift();
                }
                ArrayOp::Unshift(v) => {
                    list.unshift(v);
                }
                ArrayOp::Splice(start, delete, insert) => {
                    list.splice(start, delete, vec![Value::from(7); insert]);
                }
                ArrayOp::Sort => list.sort(),
                ArrayOp::Reverse => list.reverse(),
            }
            if list.array_len() != before {
                expected += 1;
            }
            drain();
            prop_assert_eq!(calls.get(), expected);
        }
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 3. Observer deduplication
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn repeated_observation_is_deduplicated(repeats in 1usize..8, writes in 1usize..8) {
        let root = obj! { "a" => obj! { "b" => 0 } };
        let first = observe(&root, "a.b").expect("observable");
        for _ in 0..repeats {
            let again = observe(&root, ["a", "b"]).expect("observable");
            prop_assert!(Rc::ptr_eq(&first, &again));
        }
        prop_assert_eq!(metadata_of(&root).observer_count(), 1);

        let calls = Rc::new(Cell::new(0usize));
        let counter = Rc::clone(&calls);
        let _sub = first.subscribe_lazy(move |_| counter.set(counter.get() + 1));
        let a = child(&root, "a").expect("object");
        for i in 0..writes {
            a.set("b", i + 1);
            drain();
        }
        prop_assert_eq!(calls.get(), writes);
        prop_assert_eq!(metadata_of(&a).subject_count("b"), 1);
    }
}

// ═════════════════════════════════════════════════════════════════════════
// 4. Burst coalescing
// ═════════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn bursts_deliver_once(values in proptest::collection::vec(-50i32..50, 1..20)) {
        let root = obj! { "value" => 1000 };
        let observer = observe(&root, "value").expect("observable");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _sub = observer.subscribe_lazy(move |v| sink.borrow_mut().push(v.clone()));

        for v in &values {
            root.set("value", *v);
        }
        drain();

        let delivered = seen.borrow();
        prop_assert_eq!(delivered.len(), 1);
        prop_assert_eq!(delivered[0].clone(), Value::from(*values.last().expect("non-empty")));
    }
}

#[test]
fn empty_array_macro_is_observable() {
    let list = arr![];
    assert!(observe(&list, "length").is_ok());
}

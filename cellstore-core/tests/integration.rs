//! Integration Tests for Stores
//!
//! These tests verify that base fields, derived fields, actions and
//! subscriptions work together correctly through the public API.

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::json;

use cellstore_core::{
    bridge, create_store, Definition, FieldKind, ForeignDefinition, Partial, Snapshot,
    StateView, Store, StoreApi, StoreError, StoreOptions, TargetPolicy,
};

fn counter(calls: &Arc<AtomicI32>) -> impl Fn() + Send + Sync + 'static {
    let calls = calls.clone();
    move || {
        calls.fetch_add(1, Ordering::SeqCst);
    }
}

fn sum_store() -> Store<i64> {
    Definition::new()
        .value("a", 1_i64)
        .value("b", 2_i64)
        .derived("sum", |s| Ok(s.get("a")? + s.get("b")?))
        .action_with_arity("update_values", 2, |_, args| {
            Ok(Some(Partial::new().set("a", args[0]).set("b", args[1])))
        })
        .build()
        .unwrap()
}

/// A derived field recomputes once per change, no matter how often it is read.
#[test]
fn derived_field_recomputes_once_per_change() {
    let store = Definition::new()
        .value("base", 0_i64)
        .derived("double", |s| Ok(s.get("base")? * 2))
        .action("increment", |view, _| {
            view.update("base", |b| b + 1)?;
            Ok(None)
        })
        .build()
        .unwrap();

    assert_eq!(store.read("double").unwrap(), 0);
    assert_eq!(store.compute_count("double").unwrap(), 1);

    store.invoke("increment", &[]).unwrap();
    assert_eq!(store.read("double").unwrap(), 2);
    assert_eq!(store.compute_count("double").unwrap(), 2);

    assert_eq!(store.read("double").unwrap(), 2);
    assert_eq!(store.compute_count("double").unwrap(), 2);
}

/// Changing two inputs in one action costs one recomputation and one notification.
#[test]
fn multi_field_action_is_one_batch() {
    let store = sum_store();
    let calls = Arc::new(AtomicI32::new(0));
    let _sub = store.subscribe("sum", counter(&calls)).unwrap();
    assert_eq!(store.compute_count("sum").unwrap(), 1);

    store.invoke("update_values", &[3, 4]).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.read("sum").unwrap(), 7);
    assert_eq!(store.compute_count("sum").unwrap(), 2);
}

/// Reading without changes reuses the cache.
#[test]
fn repeated_reads_are_memoized() {
    let store = sum_store();
    for _ in 0..10 {
        assert_eq!(store.read("sum").unwrap(), 3);
    }
    assert_eq!(store.compute_count("sum").unwrap(), 1);
}

/// A write only invalidates fields that read the written field.
#[test]
fn unrelated_derived_fields_are_not_recomputed() {
    let store = Definition::new()
        .value("x", 1_i64)
        .value("y", 10_i64)
        .derived("from_x", |s| Ok(s.get("x")? + 1))
        .derived("from_y", |s| Ok(s.get("y")? + 1))
        .build()
        .unwrap();

    let x_calls = Arc::new(AtomicI32::new(0));
    let y_calls = Arc::new(AtomicI32::new(0));
    let _sx = store.subscribe("from_x", counter(&x_calls)).unwrap();
    let _sy = store.subscribe("from_y", counter(&y_calls)).unwrap();

    store.write("x", 5).unwrap();

    assert_eq!(store.read("from_y").unwrap(), 11);
    assert_eq!(store.compute_count("from_y").unwrap(), 1);
    assert_eq!(store.read("from_x").unwrap(), 6);
    assert_eq!(store.compute_count("from_x").unwrap(), 2);
    assert_eq!(x_calls.load(Ordering::SeqCst), 1);
    assert_eq!(y_calls.load(Ordering::SeqCst), 0);
}

/// Dependencies are whatever the last evaluation actually read.
#[test]
fn untaken_branch_is_not_a_dependency() {
    let store = Definition::new()
        .value("x", 0_i64)
        .value("y", 7_i64)
        .derived("a", |s| {
            if s.get("x")? > 0 {
                s.get("y")
            } else {
                Ok(0)
            }
        })
        .build()
        .unwrap();

    let calls = Arc::new(AtomicI32::new(0));
    let _sub = store.subscribe("a", counter(&calls)).unwrap();
    assert_eq!(store.read("a").unwrap(), 0);

    store.write("y", 8).unwrap();
    assert_eq!(store.read("a").unwrap(), 0);
    assert_eq!(store.compute_count("a").unwrap(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    store.write("x", 1).unwrap();
    assert_eq!(store.read("a").unwrap(), 8);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // Now the branch is taken, so y is tracked.
    store.write("y", 9).unwrap();
    assert_eq!(store.read("a").unwrap(), 9);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

/// Writing the current value is not a change.
#[test]
fn equal_writes_are_ignored() {
    let store = sum_store();
    let calls = Arc::new(AtomicI32::new(0));
    let _sub = store.subscribe("sum", counter(&calls)).unwrap();

    store.invoke("update_values", &[1, 2]).unwrap();
    store.write("a", 1).unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.version("a").unwrap(), 0);
    assert_eq!(store.read("sum").unwrap(), 3);
    assert_eq!(store.compute_count("sum").unwrap(), 1);
}

/// A derived field that recomputes to the same value does not invalidate its readers.
#[test]
fn unchanged_intermediate_keeps_outer_cache() {
    let store = Definition::new()
        .value("n", 1_i64)
        .derived("parity", |s| Ok(s.get("n")? % 2))
        .derived("label", |s| Ok(s.get("parity")? * 100))
        .build()
        .unwrap();

    assert_eq!(store.read("label").unwrap(), 100);
    store.write("n", 3).unwrap();

    assert_eq!(store.read("label").unwrap(), 100);
    assert_eq!(store.compute_count("parity").unwrap(), 2);
    assert_eq!(store.compute_count("label").unwrap(), 1);

    store.write("n", 4).unwrap();
    assert_eq!(store.read("label").unwrap(), 0);
    assert_eq!(store.compute_count("label").unwrap(), 2);
}

/// Two paths from one base field to one subscriber still notify once.
#[test]
fn diamond_notifies_once_per_batch() {
    let store = Definition::new()
        .value("x", 1_i64)
        .derived("left", |s| Ok(s.get("x")? + 1))
        .derived("right", |s| Ok(s.get("x")? * 2))
        .derived("joined", |s| Ok(s.get("left")? + s.get("right")?))
        .build()
        .unwrap();

    let calls = Arc::new(AtomicI32::new(0));
    let _sub = store.subscribe("joined", counter(&calls)).unwrap();

    store.write("x", 2).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.read("joined").unwrap(), 7);
    assert_eq!(store.compute_count("joined").unwrap(), 2);
}

/// Each level reads both cells of the level below: 2^depth paths to the base.
fn diamond_ladder(depth: usize) -> Store<i64> {
    let mut definition = Definition::new().value("a0", 1_i64).value("b0", 2_i64);
    for i in 1..=depth {
        let (a, b) = (format!("a{}", i - 1), format!("b{}", i - 1));
        let (a2, b2) = (a.clone(), b.clone());
        definition = definition
            .derived(format!("a{i}"), move |s| Ok((s.get(&a)? + s.get(&b)?) % 1_000))
            .derived(format!("b{i}"), move |s| Ok((s.get(&a2)? * s.get(&b2)?) % 1_000));
    }
    definition.build().unwrap()
}

/// Reads through a deep diamond cost time linear in its size, not in its paths.
#[test]
fn diamond_ladder_reads_stay_linear() {
    let depth = 30;
    let top = format!("a{depth}");
    let store = diamond_ladder(depth);
    let started = Instant::now();

    let first = store.read(&top).unwrap();
    for _ in 0..100 {
        assert_eq!(store.read(&top).unwrap(), first);
    }
    for i in 1..=depth {
        assert_eq!(store.compute_count(&format!("a{i}")).unwrap(), 1);
        assert_eq!(store.compute_count(&format!("b{i}")).unwrap(), 1);
    }

    store.write("a0", 3).unwrap();
    let second = store.read(&top).unwrap();
    for _ in 0..100 {
        assert_eq!(store.read(&top).unwrap(), second);
    }
    assert_eq!(store.compute_count("a1").unwrap(), 2);
    assert_eq!(store.compute_count("b1").unwrap(), 2);
    for i in 2..=depth {
        assert!(store.compute_count(&format!("a{i}")).unwrap() <= 2);
    }

    assert!(
        started.elapsed() < Duration::from_secs(5),
        "reads took {:?}",
        started.elapsed()
    );
}

/// Inside an action, base and derived reads agree once a write is staged.
#[test]
fn action_sees_one_consistent_state() {
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let seen_clone = seen.clone();

    let store = Definition::new()
        .value("a", 1_i64)
        .derived("double", |s| Ok(s.get("a")? * 2))
        .action_with_arity("set_and_report", 1, move |view, args| {
            view.set("a", args[0])?;
            seen_clone.lock().push((view.get("a")?, view.get("double")?));
            Ok(None)
        })
        .build()
        .unwrap();

    assert_eq!(store.read("double").unwrap(), 2);
    store.invoke("set_and_report", &[5]).unwrap();

    assert_eq!(*seen.lock(), vec![(5, 10)]);
    assert_eq!(store.read("double").unwrap(), 10);
}

/// Mutually recursive getters fail with a cycle error and leave the rest usable.
#[test]
fn cycles_are_reported() {
    let store = Definition::new()
        .value("ok", 1_i64)
        .derived("a", |s| s.get("b"))
        .derived("b", |s| s.get("a"))
        .derived("fine", |s| Ok(s.get("ok")? + 1))
        .build()
        .unwrap();

    let err = store.read("a").unwrap_err();
    assert!(err.is_cycle());
    match err {
        StoreError::CyclicDependency { field, path } => {
            assert_eq!(field, "a");
            assert_eq!(path, vec!["a", "b", "a"]);
        }
        other => panic!("unexpected error: {other}"),
    }

    assert!(store.read("b").unwrap_err().is_cycle());
    assert_eq!(store.read("fine").unwrap(), 2);
    assert_eq!(store.read("ok").unwrap(), 1);
}

/// A failing action applies nothing, even after staging writes.
#[test]
fn failing_action_leaves_state_unchanged() {
    let store = Definition::new()
        .value("balance", 10_i64)
        .value("log", 0_i64)
        .action_with_arity("withdraw", 1, |view, args| {
            view.update("log", |n| n + 1)?;
            let balance = view.get("balance")? - args[0];
            if balance < 0 {
                return Err(StoreError::user("insufficient funds"));
            }
            view.set("balance", balance)?;
            Ok(None)
        })
        .build()
        .unwrap();

    let calls = Arc::new(AtomicI32::new(0));
    let _sub = store.subscribe("log", counter(&calls)).unwrap();

    let err = store.invoke("withdraw", &[25]).unwrap_err();
    assert_eq!(err.to_string(), "insufficient funds");
    assert_eq!(store.read("balance").unwrap(), 10);
    assert_eq!(store.read("log").unwrap(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    store.invoke("withdraw", &[4]).unwrap();
    assert_eq!(store.read("balance").unwrap(), 6);
    assert_eq!(store.read("log").unwrap(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn arity_is_checked() {
    let store = sum_store();
    let err = store.invoke("update_values", &[1]).unwrap_err();
    assert!(matches!(
        err,
        StoreError::ArityMismatch { expected: 2, actual: 1, .. }
    ));
    assert_eq!(store.read("sum").unwrap(), 3);
}

/// Actions may not target derived fields, actions, or undeclared keys.
#[test]
fn invalid_targets_reject_the_batch() {
    let store = Definition::new()
        .value("a", 1_i64)
        .derived("twice", |s| Ok(s.get("a")? * 2))
        .action("bad", |_, _| {
            Ok(Some(Partial::new().set("a", 5).set("twice", 100)))
        })
        .action("typo", |_, _| Ok(Some(Partial::new().set("aa", 5))))
        .build()
        .unwrap();

    let err = store.invoke("bad", &[]).unwrap_err();
    assert!(matches!(
        err,
        StoreError::InvalidActionTarget { ref origin, ref key } if origin == "bad" && key == "twice"
    ));
    assert!(store.invoke("typo", &[]).is_err());
    assert_eq!(store.read("a").unwrap(), 1);
    assert_eq!(store.read("twice").unwrap(), 2);
}

#[test]
fn ignore_policy_drops_invalid_targets() {
    let options = StoreOptions::named("lenient").with_target_policy(TargetPolicy::Ignore);
    let store = Definition::new()
        .with_options(options)
        .value("a", 1_i64)
        .derived("twice", |s| Ok(s.get("a")? * 2))
        .action("bad", |view, _| {
            view.set("twice", 100)?;
            Ok(Some(Partial::new().set("a", 5).set("missing", 1)))
        })
        .build()
        .unwrap();

    store.invoke("bad", &[]).unwrap();
    assert_eq!(store.read("a").unwrap(), 5);
    assert_eq!(store.read("twice").unwrap(), 10);
}

/// Keys returned by an action override the same keys set through the view.
#[test]
fn returned_partial_wins_over_staged_writes() {
    let store = Definition::new()
        .value("x", 0_i64)
        .value("y", 0_i64)
        .action("both", |view, _| {
            view.set("x", 1)?;
            view.set("y", 1)?;
            Ok(Some(Partial::new().set("x", 2)))
        })
        .build()
        .unwrap();

    store.invoke("both", &[]).unwrap();
    assert_eq!(store.read("x").unwrap(), 2);
    assert_eq!(store.read("y").unwrap(), 1);
}

/// Getter errors propagate and the previous cache survives.
#[test]
fn getter_errors_propagate() {
    let store = Definition::new()
        .value("divisor", 2_i64)
        .derived("quotient", |s| {
            let divisor = s.get("divisor")?;
            if divisor == 0 {
                return Err(StoreError::user("division by zero"));
            }
            Ok(100 / divisor)
        })
        .build()
        .unwrap();

    assert_eq!(store.read("quotient").unwrap(), 50);
    store.write("divisor", 0).unwrap();
    assert_eq!(
        store.read("quotient").unwrap_err().to_string(),
        "division by zero"
    );
    store.write("divisor", 4).unwrap();
    assert_eq!(store.read("quotient").unwrap(), 25);
}

/// Dynamically typed stores work over `serde_json::Value`.
#[test]
fn json_store_round_trips_snapshots() {
    let store: Store = create_store(
        Definition::new()
            .value("items", json!(["apple"]))
            .value("discount", json!(0.5))
            .derived("count", |s| {
                let items: Vec<String> = s.get_as("items")?;
                Ok(json!(items.len()))
            })
            .action("add", |view, args| {
                let mut items: Vec<String> = view.get_as("items")?;
                for arg in args {
                    items.push(arg.as_str().unwrap_or_default().to_string());
                }
                view.set("items", json!(items))?;
                Ok(None)
            }),
    )
    .unwrap();

    let saved = store.snapshot().to_json().unwrap();
    store.invoke("add", &[json!("pear"), json!("plum")]).unwrap();
    assert_eq!(store.read("count").unwrap(), json!(3));

    let snapshot: Snapshot<serde_json::Value> =
        Snapshot::from_json(&saved.to_string()).unwrap();
    store.restore(snapshot).unwrap();
    assert_eq!(store.read("count").unwrap(), json!(1));
    assert_eq!(store.read("discount").unwrap(), json!(0.5));
}

#[test]
fn handles_expose_fields_and_actions() {
    let store = sum_store();
    let a = store.field("a").unwrap();
    let sum = store.field("sum").unwrap();
    let update = store.action("update_values").unwrap();

    assert_eq!(sum.kind(), FieldKind::Derived);
    assert!(!sum.is_writable());
    assert!(sum.set(10).is_err());

    a.set(10).unwrap();
    assert_eq!(sum.get().unwrap(), 12);

    update.call(&[0, 0]).unwrap();
    assert_eq!(sum.get().unwrap(), 0);
    assert_eq!(update.arity(), Some(2));
    assert!(store.field("update_values").is_err());
}

#[test]
fn bridged_store_gains_derived_behaviour() {
    let store = bridge(|api: StoreApi<i64>| {
        ForeignDefinition::new()
            .value("a", 1_i64)
            .value("b", 2_i64)
            .action("update_values", move |args| {
                api.set(Partial::new().set("a", args[0]).set("b", args[1]))
            })
    })
    .unwrap();

    let calls = Arc::new(AtomicI32::new(0));
    let _sub = store.subscribe("a", counter(&calls)).unwrap();

    store.invoke("update_values", &[5, 6]).unwrap();
    assert_eq!(store.read("a").unwrap(), 5);
    assert_eq!(store.read("b").unwrap(), 6);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn store_is_shared_across_threads() {
    let store = sum_store();

    let handles: Vec<_> = (0..4_i64)
        .map(|i| {
            let store = store.clone();
            thread::spawn(move || {
                for _ in 0..100 {
                    let sum = store.read("sum").unwrap();
                    assert!(sum >= 3);
                }
                store.write("a", i + 1).unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let a = store.read("a").unwrap();
    assert_eq!(store.read("sum").unwrap(), a + 2);
}

use holder_rx::*;
use test_log::test;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, Mutex};

#[test]
fn dropped_derived_holder_is_pruned() {
    let source = Holder::with_value(1);
    let before = source.followers();
    {
        let derived = source.map(|value| value + 1);
        assert_eq!(derived.get(), 2);
        assert_eq!(source.followers(), before + 1);
    }
    // pruning happens lazily, on the next publish
    assert_eq!(source.followers(), before + 1);
    source.set(2).unwrap();
    source.set(3).unwrap();
    assert_eq!(source.followers(), before);
}

#[test]
fn derived_holder_keeps_its_sources_alive() {
    let (anchor, derived) = {
        let source = Holder::with_value(1);
        (source.anchor(), source.mult_value(3))
    };
    assert!(anchor.is_alive());
    assert_eq!(derived.get(), 3);
    drop(derived);
    assert!(!anchor.is_alive());
}

#[test]
fn chain_of_intermediate_holders() {
    let source = Holder::with_value(1);
    let chained = source.mult_value(2).mult_value(2).mult_value(2).mult_value(2);
    assert_eq!(chained.get(), 16);
    source.set(3).unwrap();
    assert_eq!(chained.get(), 48);

    drop(chained);
    source.set(4).unwrap();
    assert_eq!(source.followers(), 0);
}

#[test]
fn follow_without_reference_keeps_derived_holder() {
    let source = Holder::with_value(1);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen2 = seen.clone();
    source.map(|value| value * 10).follow(move |value| seen2.lock().unwrap().push(*value));
    source.set(2).unwrap();
    source.set(3).unwrap();
    assert_eq!(&*seen.lock().unwrap(), &vec![10, 20, 30]);
    assert_eq!(source.followers(), 1);
}

#[test]
fn unfollow_releases_derived_holder() {
    let source = Holder::with_value(1);
    let count = Arc::new(AtomicI32::new(0));
    let count2 = count.clone();
    let doubled = source.mult_value(2);
    let id = doubled.follow(move |_| {
        count2.fetch_add(1, Ordering::SeqCst);
    });
    let anchor = doubled.anchor();
    assert!(doubled.unfollow(id));
    drop(doubled);
    assert!(!anchor.is_alive());

    source.set(2).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(source.followers(), 0);
}

#[test]
fn follow_while_anchor_is_alive() {
    let source = Holder::with_value(1);
    let owner = Arc::new("owner");
    let count = Arc::new(AtomicI32::new(0));
    let count2 = count.clone();
    source.follow_while(
        move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        },
        [Anchor::of(&owner)],
    );
    source.set(2).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 2);

    drop(owner);
    source.set(3).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 2);
    assert_eq!(source.followers(), 0);
}

#[test]
fn follow_while_any_anchor_is_alive() {
    let source = Holder::with_value(1);
    let first = Holder::with_value(());
    let second = Holder::with_value(());
    let count = Arc::new(AtomicI32::new(0));
    let count2 = count.clone();
    source.follow_while(
        move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        },
        [first.anchor(), second.anchor()],
    );
    drop(first);
    source.set(2).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 2);
    drop(second);
    source.set(3).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 2);
}

#[test]
fn double_negation_is_identity() {
    let flag = Holder::with_value(false);
    for _ in 0..3 {
        assert!(Holder::ptr_eq(&flag.not().not(), &flag));
    }
    let negated = flag.not();
    assert!(Holder::ptr_eq(&negated.not().not(), &negated));
    assert!(negated.get());
}

#[test]
fn negation_is_not_kept_by_its_source() {
    let flag = Holder::with_value(true);
    let anchor = flag.not().anchor();
    assert!(!anchor.is_alive());
    flag.set(false).unwrap();
    assert_eq!(flag.followers(), 0);
}

#[test]
fn dropped_unpack_releases_tracked_holder() {
    let inner = Holder::with_value(1);
    let outer = Holder::with_value(());
    {
        let tracked = inner.clone();
        let unpacked = outer.unpack(move |_| tracked.clone());
        assert_eq!(unpacked.get(), 1);
        assert_eq!(inner.followers(), 1);
    }
    inner.set(2).unwrap();
    assert_eq!(inner.followers(), 0);
}

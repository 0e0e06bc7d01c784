use holder_rx::*;
use test_log::test;
use std::sync::atomic::{AtomicI32, Ordering};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[test]
fn test_holder() {
    let side_effect = Arc::new(AtomicI32::new(1));

    let holder = Holder::with_value(1);
    let doubled = holder.mult_value(2);
    let side_effect2 = side_effect.clone();
    doubled.follow(move |value| {
        side_effect2.fetch_add(*value, Ordering::SeqCst);
    });
    assert_eq!(holder.get(), 1);
    assert_eq!(doubled.get(), 2);
    assert_eq!(side_effect.load(Ordering::SeqCst), 3);

    // propagation is synchronous: everything is up to date once set returns
    holder.set(2).unwrap();
    assert_eq!(holder.get(), 2);
    assert_eq!(doubled.get(), 4);
    assert_eq!(side_effect.load(Ordering::SeqCst), 7);

    holder.set(4).unwrap();
    assert_eq!(doubled.get(), 8);
    assert_eq!(side_effect.load(Ordering::SeqCst), 15);
}

#[test]
fn test_follow_replays_only_latest() {
    let holder = Holder::new();
    for value in 1..=3 {
        holder.set(value).unwrap();
    }
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen2 = seen.clone();
    holder.follow(move |value| seen2.lock().unwrap().push(*value));
    assert_eq!(&*seen.lock().unwrap(), &vec![3]);

    holder.set(4).unwrap();
    holder.set(5).unwrap();
    assert_eq!(&*seen.lock().unwrap(), &vec![3, 4, 5]);
}

#[test]
fn test_followers_run_in_registration_order() {
    let holder = Holder::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    for name in ["first", "second", "third"] {
        let order = order.clone();
        holder.follow(move |value: &i32| order.lock().unwrap().push(format!("{}:{}", name, value)));
    }
    holder.set(1).unwrap();
    assert_eq!(&*order.lock().unwrap(), &vec!["first:1", "second:1", "third:1"]);
}

#[test]
fn test_unfollow() {
    let holder = Holder::with_value(0);
    let count = Arc::new(AtomicI32::new(0));
    let count2 = count.clone();
    let id = holder.follow(move |_| {
        count2.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(holder.followers(), 1);
    holder.set(1).unwrap();
    assert!(holder.unfollow(id));
    assert!(!holder.unfollow(id));
    holder.set(2).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 2);
    assert_eq!(holder.followers(), 0);
}

#[test]
fn test_multiple_inputs_outputs() {
    let rx = Holder::with_value(1);
    let rx2 = Holder::with_value(2);
    let rx3 = ListHolder::with_items(vec![3, 4]);
    {
        let crx = rx.combine(&rx2, |a, b| vec![*a * 10, *b * 10]);
        let crx2 = rx
            .combine(rx3.as_holder(), |a, rest| {
                let mut vec = vec![*a];
                vec.extend(rest.iter().copied());
                vec
            })
            .combine(&crx, |vec, tail| {
                let mut vec = vec.clone();
                vec.extend(tail.iter().copied());
                vec
            });
        let first = crx.map(|vec| vec[0] * 10);

        assert_eq!(crx.get(), vec![10, 20]);
        assert_eq!(crx2.get(), vec![1, 3, 4, 10, 20]);
        assert_eq!(first.get(), 100);

        rx.set(5).unwrap();
        rx2.set(6).unwrap();
        rx3.set(vec![7, 8, 9]).unwrap();

        assert_eq!(crx.get(), vec![50, 60]);
        assert_eq!(crx2.get(), vec![5, 7, 8, 9, 50, 60]);
        assert_eq!(first.get(), 500);
    }
}

#[test]
fn test_chain() {
    let rx = Holder::with_value(vec![1, 2, 3]);
    let crx = rx.map(|vec| vec[0] * 2);
    let crx2 = crx.combine(&rx, |first, vec| *first + vec[1] * 10);
    let crx3 = crx2.map(|value| value.to_string());
    assert_eq!(crx.get(), 2);
    assert_eq!(crx2.get(), 22);
    assert_eq!(crx3.get(), "22");
    rx.set(vec![2, 3, 4]).unwrap();
    assert_eq!(crx.get(), 4);
    assert_eq!(crx2.get(), 34);
    assert_eq!(crx3.get(), "34");
    rx.set(vec![3, 4, 5]).unwrap();
    assert_eq!(crx.get(), 6);
    assert_eq!(crx2.get(), 46);
    assert_eq!(crx3.get(), "46");
}

#[test]
fn stream_like() {
    let stream = Arc::new(Mutex::new(Vec::new()));
    let stream2 = stream.clone();
    let input1 = vec![1, 2, 3];
    let input2 = vec![0.5, 0.25, 0.75];

    let var1 = Holder::with_value(0);
    let var2 = Holder::with_value(0.0);
    let crx = var1.combine(&var2, |a, b| *a as f64 + *b);
    crx.follow(move |value| stream2.lock().unwrap().push(*value));

    assert_eq!(&*stream.lock().unwrap(), &vec![0.0]);
    for (a, b) in input1.iter().zip(input2.iter()) {
        var1.set(*a).unwrap();
        var2.set(*b).unwrap();
    }
    // every intermediate state is observed, not only the settled ones
    assert_eq!(&*stream.lock().unwrap(), &vec![0.0, 1.0, 1.5, 2.5, 2.25, 3.25, 3.75]);
}

#[test]
fn test_numbers() {
    let twenty = Holder::with_value(20.0);
    let four = Holder::with_value(4.0);
    assert_eq!(twenty.add(&four).get(), 24.0);
    assert_eq!(twenty.add_value(4.0).get(), 24.0);
    assert_eq!(twenty.sub(&four).get(), 16.0);
    assert_eq!(twenty.sub_value(4.0).get(), 16.0);
    assert_eq!(twenty.mult(&four).get(), 80.0);
    assert_eq!(twenty.mult_value(4.0).get(), 80.0);
    assert_eq!(twenty.div(&four).get(), 5.0);
    assert_eq!(twenty.div_value(4.0).get(), 5.0);

    let half = Holder::with_value(2.5);
    assert_eq!(half.ceil().get(), 3.0);
    assert_eq!(half.floor().get(), 2.0);

    assert!(twenty.gt(&four).get());
    assert!(!twenty.lt(&four).get());
    assert!(four.lt_value(5.0).get());
    let ratio_above_four = twenty.compare_with(&four, |a, b| a / b > 4.0);
    assert!(ratio_above_four.get());
    four.set(5.0).unwrap();
    assert!(!ratio_above_four.get());

    let source = Holder::with_value(1);
    let chained = source.mult_value(2).mult_value(2).mult_value(2).mult_value(2);
    assert_eq!(chained.get(), 16);
    source.set(2).unwrap();
    assert_eq!(chained.get(), 32);
}

#[test]
fn test_booleans() {
    let yes = Holder::with_value(true);
    let no = yes.not();
    assert!(!no.get());
    assert!(Holder::ptr_eq(&yes.not(), &no));
    assert!(Holder::ptr_eq(&no.not(), &yes));

    assert!(!yes.and(&no).get());
    assert!(yes.or(&no).get());
    assert!(yes.xor(&no).get());
    assert!(yes.and_value(true).get());
    assert!(!no.or_value(false).get());
    assert!(!yes.xor_value(true).get());

    yes.set(false).unwrap();
    assert!(no.get());
}

#[test]
fn test_when_and_test() {
    let value = Holder::with_value(3);
    let even = value.test(|value| value % 2 == 0);
    let sign = value.when(|value| *value >= 0, |_| "positive", |_| "negative");
    assert!(!even.get());
    assert_eq!(sign.get(), "positive");
    value.set(-4).unwrap();
    assert!(even.get());
    assert_eq!(sign.get(), "negative");
}

#[test]
fn test_unpack() {
    let first = Holder::with_value("a".to_string());
    let second = Holder::with_value("b".to_string());
    let selector = Holder::with_value(0usize);
    let sources = vec![first.clone(), second.clone()];
    let unpacked = selector.unpack(move |index| sources[*index].clone());
    assert_eq!(unpacked.get(), "a");
    assert_eq!(first.followers(), 1);

    first.set("aa".to_string()).unwrap();
    assert_eq!(unpacked.get(), "aa");

    selector.set(1).unwrap();
    assert_eq!(unpacked.get(), "b");
    assert_eq!(first.followers(), 0);
    assert_eq!(second.followers(), 1);

    // the previously tracked holder no longer drives the result
    first.set("aaa".to_string()).unwrap();
    assert_eq!(unpacked.get(), "b");
    second.set("bb".to_string()).unwrap();
    assert_eq!(unpacked.get(), "bb");
}

#[test]
fn test_select() {
    let condition = Holder::with_value(true);
    let on_true = Holder::with_value(1);
    let on_false = Holder::with_value(2);
    let selected = condition.select(&on_true, &on_false);
    assert_eq!(selected.get(), 1);
    condition.set(false).unwrap();
    assert_eq!(selected.get(), 2);
    on_false.set(3).unwrap();
    assert_eq!(selected.get(), 3);
    on_true.set(4).unwrap();
    assert_eq!(selected.get(), 3);
}

#[test]
fn test_with_default() {
    let source = Holder::new();
    let defaulted = source.with_default(5);
    assert_eq!(defaulted.get(), 5);
    assert_eq!(source.generation(), Generation::Absent);
    source.set(7).unwrap();
    assert_eq!(defaulted.get(), 7);
}

#[test]
fn test_not_null() {
    let holder: Holder<Option<i32>> = Holder::not_null();
    let seen = Arc::new(AtomicI32::new(0));
    let seen2 = seen.clone();
    holder.follow(move |_| {
        seen2.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(holder.set(None), Err(HolderError::InvalidValue { holder: holder.id() }));
    assert!(!holder.has_value());
    assert_eq!(seen.load(Ordering::SeqCst), 0);

    holder.set(Some(1)).unwrap();
    assert_eq!(holder.get(), Some(1));
    assert_eq!(holder.set(None), Err(HolderError::InvalidValue { holder: holder.id() }));
    assert_eq!(holder.get(), Some(1));
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[test]
fn test_builder() {
    let holder = Holder::builder().name("answer").initial(42).build().unwrap();
    assert_eq!(holder.name(), Some("answer"));
    assert_eq!(holder.get(), 42);

    let refused = Holder::<Option<u8>>::builder().not_null().initial(None).build();
    assert!(matches!(refused, Err(HolderError::InvalidValue { .. })));
}

#[test]
fn test_get_timeout() {
    let holder: Holder<i32> = Holder::new();
    assert_eq!(holder.try_get(), None);
    let waited = Duration::from_millis(20);
    assert_eq!(holder.get_timeout(waited), Err(HolderError::Timeout { holder: holder.id(), waited }));
    holder.set(1).unwrap();
    assert_eq!(holder.get_timeout(waited), Ok(1));
    assert_eq!(holder.with(|value| value + 1), 2);
}

#[test]
fn test_peek_and_publish() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen2 = seen.clone();
    let holder = Holder::new().peek(move |value: &String| seen2.lock().unwrap().push(value.clone()));
    let publisher: &dyn Publish<String> = &holder;
    publisher.publish("fetched".to_string()).unwrap();
    assert_eq!(&*seen.lock().unwrap(), &vec!["fetched".to_string()]);
}

#[test]
fn test_panicking_map_leaves_holder_usable() {
    let holder = Holder::with_value(1);
    let before = Arc::new(Mutex::new(Vec::new()));
    let after = Arc::new(Mutex::new(Vec::new()));
    let before2 = before.clone();
    holder.follow(move |value| before2.lock().unwrap().push(*value));
    let checked = holder.map(|value| {
        assert_ne!(*value, 13, "unlucky");
        value * 2
    });
    let after2 = after.clone();
    holder.follow(move |value| after2.lock().unwrap().push(*value));

    assert!(catch_unwind(AssertUnwindSafe(|| holder.set(13))).is_err());
    // the value is stored, and followers notified before the failing one keep their effects
    assert_eq!(holder.get(), 13);
    assert_eq!(&*before.lock().unwrap(), &vec![1, 13]);
    assert_eq!(&*after.lock().unwrap(), &vec![1]);
    assert_eq!(checked.get(), 2);

    holder.set(4).unwrap();
    assert_eq!(checked.get(), 8);
    assert_eq!(&*before.lock().unwrap(), &vec![1, 13, 4]);
    assert_eq!(&*after.lock().unwrap(), &vec![1, 4]);
}

#[test]
fn test_panicking_combine_leaves_holder_usable() {
    let a = Holder::with_value(12);
    let b = Holder::with_value(3);
    let quotient = a.combine(&b, |a, b| {
        assert_ne!(*b, 0, "division by zero");
        a / b
    });
    assert_eq!(quotient.get(), 4);

    assert!(catch_unwind(AssertUnwindSafe(|| b.set(0))).is_err());
    assert_eq!(b.get(), 0);
    assert_eq!(quotient.get(), 4);

    b.set(2).unwrap();
    assert_eq!(quotient.get(), 6);
    a.set(20).unwrap();
    assert_eq!(quotient.get(), 10);
}

#[test]
fn test_panicking_filter_resyncs_with_its_source() {
    let list = ListHolder::with_items(vec![1, 2]);
    let filtered = list.filter(|value| {
        assert_ne!(*value, 13, "unlucky");
        value % 2 == 1 || *value == 2
    });
    assert_eq!(filtered.get(), vec![1, 2]);

    assert!(catch_unwind(AssertUnwindSafe(|| list.push(13))).is_err());
    assert_eq!(list.get(), vec![1, 2, 13]);
    assert_eq!(filtered.get(), vec![1, 2]);

    // the failing element is tested again on every change until it is gone
    assert!(catch_unwind(AssertUnwindSafe(|| list.push(5))).is_err());
    assert_eq!(list.remove_at(2), Some(13));
    assert_eq!(list.get(), vec![1, 2, 5]);
    assert_eq!(filtered.get(), vec![1, 2, 5]);

    list.push(7);
    list.push(4);
    assert_eq!(list.remove_at(0), Some(1));
    assert_eq!(filtered.get(), vec![2, 5, 7]);
}

#[test]
fn test_follower_setting_its_own_holder() {
    let holder = Holder::with_value(0);
    let bumper = holder.clone();
    holder.follow(move |value| {
        if *value == 1 {
            bumper.set(2).unwrap();
        }
    });
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen2 = seen.clone();
    holder.follow(move |value| seen2.lock().unwrap().push(*value));
    let doubled = holder.mult_value(2);

    holder.set(1).unwrap();
    assert_eq!(holder.get(), 2);
    // later followers never see the superseded value after the newer one
    assert_eq!(&*seen.lock().unwrap(), &vec![0, 2]);
    assert_eq!(doubled.get(), 4);
}

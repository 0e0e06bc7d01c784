use std::sync::Arc;
use parking_lot::Mutex;
use crate::holder::{Holdable, Holder};
use crate::lifecycle::KeepAlive;
use crate::uid::FollowerId;

/// Runs `on_value` for every value of `source`, for as long as `target` is alive.
///
/// `source` only keeps a weak handle on `target`: once `target` is dropped, the follower is
/// pruned on `source`'s next publish.
pub(crate) fn follow_for<S: Holdable, U: Holdable>(
    source: &Holder<S>,
    target: &Holder<U>,
    on_value: impl Fn(&Holder<U>, &S) + Send + Sync + 'static,
) -> FollowerId {
    let weak = Arc::downgrade(&target.inner);
    source.inner.follow(Arc::new(move |value: &S| {
        if let Some(inner) = weak.upgrade() {
            on_value(&Holder::from_inner(inner), value);
        }
    }), KeepAlive::While(vec![target.anchor()]))
}

/// Makes `target` mirror `compute` applied to `source`. `target` keeps `source` alive.
pub(crate) fn derive_into<S: Holdable, U: Holdable>(
    source: &Holder<S>,
    target: &Holder<U>,
    compute: impl Fn(&S) -> U + Send + Sync + 'static,
) {
    target.inner.add_upstream(source.inner.clone());
    follow_for(source, target, move |target, value| target.emit(compute(value)));
}

/// Makes `target` mirror `compute` applied to the latest values of `a` and `b`, once both have one.
///
/// Each source is read on its own, not under a joint lock, so a result may pair values from two
/// different instants when both sources change at once. The cache and the publish happen under
/// `target`'s lock, so the last published result always uses the last values seen.
pub(crate) fn combine_into<A: Holdable, B: Holdable, U: Holdable>(
    a: &Holder<A>,
    b: &Holder<B>,
    target: &Holder<U>,
    compute: impl Fn(&A, &B) -> U + Send + Sync + 'static,
) {
    target.inner.add_upstream(a.inner.clone());
    target.inner.add_upstream(b.inner.clone());
    let latest: Arc<Mutex<(Option<A>, Option<B>)>> = Arc::new(Mutex::new((None, None)));
    let compute = Arc::new(compute);

    let (latest_a, compute_a) = (latest.clone(), compute.clone());
    follow_for(a, target, move |target, value| {
        target.inner.exclusive(|| {
            let pair = {
                let mut latest = latest_a.lock();
                latest.0 = Some(value.clone());
                latest.1.clone()
            };
            if let Some(other) = pair {
                target.emit(compute_a(value, &other));
            }
        })
    });
    follow_for(b, target, move |target, value| {
        target.inner.exclusive(|| {
            let pair = {
                let mut latest = latest.lock();
                latest.1 = Some(value.clone());
                latest.0.clone()
            };
            if let Some(other) = pair {
                target.emit(compute(&other, value));
            }
        })
    });
}

/// Like [combine_into] over any number of sources of the same type.
pub(crate) fn combine_all_into<S: Holdable, U: Holdable>(
    sources: &[Holder<S>],
    target: &Holder<U>,
    compute: impl Fn(&[S]) -> U + Send + Sync + 'static,
) {
    let latest: Arc<Mutex<Vec<Option<S>>>> = Arc::new(Mutex::new(vec![None; sources.len()]));
    let compute = Arc::new(compute);
    for (index, source) in sources.iter().enumerate() {
        target.inner.add_upstream(source.inner.clone());
        let (latest, compute) = (latest.clone(), compute.clone());
        follow_for(source, target, move |target, value| {
            target.inner.exclusive(|| {
                let complete = {
                    let mut latest = latest.lock();
                    latest[index] = Some(value.clone());
                    latest.iter().cloned().collect::<Option<Vec<S>>>()
                };
                if let Some(values) = complete {
                    target.emit(compute(&values));
                }
            })
        });
    }
}

/// The inner holder an unpacked holder currently tracks.
struct Unpacked<U> {
    epoch: u64,
    tracked: Option<(Holder<U>, FollowerId)>,
}

impl<T: Holdable> Holder<T> {
    /// Derives a holder containing `f` applied to this holder's value, updated on every change.
    pub fn map<U: Holdable>(&self, f: impl Fn(&T) -> U + Send + Sync + 'static) -> Holder<U> {
        let mapped = Holder::new();
        derive_into(self, &mapped, f);
        mapped
    }

    /// Derives a boolean holder, `true` while the value matches `predicate`.
    pub fn test(&self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Holder<bool> {
        self.map(predicate)
    }

    /// Derives a holder which contains `default` until this holder receives its value.
    pub fn with_default(&self, default: T) -> Holder<T> {
        let defaulted = Holder::with_value(default);
        derive_into(self, &defaulted, T::clone);
        defaulted
    }

    /// Derives a holder from this one and `other`, computed once both have a value.
    pub fn combine<O: Holdable, U: Holdable>(&self, other: &Holder<O>, f: impl Fn(&T, &O) -> U + Send + Sync + 'static) -> Holder<U> {
        let combined = Holder::new();
        combine_into(self, other, &combined, f);
        combined
    }

    /// Derives a holder which applies `if_true` or `if_false` depending on `predicate`,
    /// re-evaluated on every value.
    pub fn when<U: Holdable>(
        &self,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
        if_true: impl Fn(&T) -> U + Send + Sync + 'static,
        if_false: impl Fn(&T) -> U + Send + Sync + 'static,
    ) -> Holder<U> {
        self.map(move |value| if predicate(value) { if_true(value) } else { if_false(value) })
    }

    /// Flattens one level of holders: the result tracks whichever holder `f` returns for the
    /// current value, and switches to the new one whenever this holder changes.
    ///
    /// Values published by a previously tracked holder are ignored once it has been replaced.
    pub fn unpack<U: Holdable>(&self, f: impl Fn(&T) -> Holder<U> + Send + Sync + 'static) -> Holder<U> {
        let unpacked = Holder::new();
        unpacked.inner.add_upstream(self.inner.clone());
        let current = Arc::new(Mutex::new(Unpacked::<U> {
            epoch: 0,
            tracked: None,
        }));
        follow_for(self, &unpacked, move |target, value| {
            let next = f(value);
            let (epoch, previous) = target.inner.exclusive(|| {
                let mut current = current.lock();
                current.epoch += 1;
                (current.epoch, current.tracked.take())
            });
            if let Some((previous, id)) = previous {
                previous.unfollow(id);
            }
            // weak: `current` owns the tracked holder, whose follower must not own `current` back
            let weak_current = Arc::downgrade(&current);
            let id = follow_for(&next, target, move |target, value| {
                target.inner.exclusive(|| {
                    let is_current = weak_current.upgrade().is_some_and(|current| {
                        let current = current.lock();
                        current.epoch == epoch
                    });
                    if is_current {
                        target.emit(value.clone());
                    }
                })
            });
            let mut current = current.lock();
            if current.epoch == epoch {
                current.tracked = Some((next, id));
            }
        });
        unpacked
    }
}

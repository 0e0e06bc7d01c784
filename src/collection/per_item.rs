use std::sync::{Arc, Weak};
use parking_lot::Mutex;
use crate::collection::{Collection, CollectionHolder};
use crate::derive::follow_for;
use crate::holder::{Holdable, Holder};
use crate::uid::FollowerId;

/// The per-element holders a derivation currently follows.
struct Watch<I, W> {
    /// Bumped on every source change. Followers of older element holders are stale.
    epoch: u64,
    /// Set while the element holders of a new epoch are being followed, so their replays do not
    /// each trigger a recompute.
    settling: bool,
    items: Vec<I>,
    watched: Vec<Holder<W>>,
    subscriptions: Vec<(Holder<W>, FollowerId)>,
}

/// Makes `target` a function of the source's items and of one holder per item.
///
/// Whenever the source changes, each item is mapped to a holder with `watch`, the holders of the
/// previous items are unfollowed and the new ones followed. `compute` then runs on the items and
/// the latest value of each item's holder (`None` while it has none), both on the source change
/// and whenever any of those holders changes.
pub(crate) fn watch_items<C, W, U>(
    source: &CollectionHolder<C>,
    target: &Holder<U>,
    watch: impl Fn(&C::Item) -> Holder<W> + Send + Sync + 'static,
    compute: impl Fn(&[C::Item], &[Option<W>]) -> U + Send + Sync + 'static,
) where
    C: Collection,
    W: Holdable,
    U: Holdable,
{
    target.inner.add_upstream(source.holder.inner.clone());
    let state = Arc::new(Mutex::new(Watch {
        epoch: 0,
        settling: false,
        items: Vec::new(),
        watched: Vec::new(),
        subscriptions: Vec::new(),
    }));
    let compute = Arc::new(compute);
    follow_for(&source.holder, target, move |target, collection| {
        let items: Vec<C::Item> = collection.items().collect();
        let watched: Vec<Holder<W>> = items.iter().map(&watch).collect();
        let (epoch, stale) = target.inner.exclusive(|| {
            let mut state = state.lock();
            state.epoch += 1;
            state.settling = true;
            state.items = items;
            state.watched = watched.clone();
            (state.epoch, std::mem::take(&mut state.subscriptions))
        });
        for (holder, id) in stale {
            holder.unfollow(id);
        }

        // weak: `state` owns the element holders, whose followers must not own `state` back
        let weak = Arc::downgrade(&state);
        let subscriptions = watched
            .into_iter()
            .map(|holder| {
                let (weak, compute) = (weak.clone(), compute.clone());
                let id = follow_for(&holder, target, move |target, _| recompute(target, &weak, epoch, &*compute));
                (holder, id)
            })
            .collect();
        {
            let mut state = state.lock();
            state.subscriptions = subscriptions;
            state.settling = false;
        }
        recompute(target, &weak, epoch, &*compute);
    });
}

fn recompute<I, W, U, F>(target: &Holder<U>, state: &Weak<Mutex<Watch<I, W>>>, epoch: u64, compute: &F)
where
    W: Holdable,
    U: Holdable,
    F: Fn(&[I], &[Option<W>]) -> U,
{
    let Some(state) = state.upgrade() else {
        return;
    };
    target.inner.exclusive(|| {
        let computed = {
            let state = state.lock();
            if state.epoch != epoch || state.settling {
                return;
            }
            let values: Vec<Option<W>> = state.watched.iter().map(Holder::try_get).collect();
            compute(&state.items, &values)
        };
        target.emit(computed);
    })
}

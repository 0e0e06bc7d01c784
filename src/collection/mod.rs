//! Holders whose payload is a whole collection.
//!
//! A [CollectionHolder] is a [Holder] of a list, set or map: followers still receive the whole
//! collection on every change. It also reports fine-grained changes to *incremental* followers,
//! which first receive the current contents as one `Initial` change, then every later insertion,
//! removal or bulk replacement, without gap nor duplicate.
//!
//! Derivations (`filter`, `map_items`, `to_map`...) rebuild their whole result from the latest
//! source contents on each change.

use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::hash::Hash;
use std::ops::Deref;
use std::sync::Arc;
use indexmap::IndexSet;
use parking_lot::Mutex;
use crate::derive::derive_into;
use crate::error::Result;
use crate::holder::{Holdable, Holder, Publish, ReplaceHook, ReplaceSink};
use crate::lifecycle::{Anchor, Callback, FollowerTable, KeepAlive};
use crate::uid::FollowerId;

pub(crate) mod list;
pub(crate) mod map;
mod ops;
mod per_item;
pub(crate) mod set;

pub use list::{ListChange, ListHolder};
pub use map::{MapChange, MapHolder};
pub use set::{SetChange, SetHolder};

/// A container a [CollectionHolder] can hold.
pub trait Collection: Holdable + Default {
    /// What the collection yields when iterated: an element, or a key-value pair for maps.
    type Item: Holdable;
    /// What incremental followers receive.
    type Change: Holdable;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clones of the items, in iteration order.
    fn items(&self) -> impl Iterator<Item = Self::Item> + '_;

    fn from_items(items: impl IntoIterator<Item = Self::Item>) -> Self;

    /// The change replayed to an incremental follower registered on a holder which has a value.
    fn initial_change(&self) -> Self::Change;

    /// The change reported when the whole collection is replaced by `set`.
    fn replaced_change(previous: Option<&Self>, current: &Self) -> Self::Change;

    /// Builds the holder returned by [CollectionHolder::filter]. The default rebuilds the whole
    /// result on each change.
    #[doc(hidden)]
    fn derive_filter(source: &CollectionHolder<Self>, predicate: Arc<dyn Fn(&Self::Item) -> bool + Send + Sync>) -> CollectionHolder<Self> {
        let filtered = CollectionHolder::new();
        derive_into(&source.holder, &filtered.holder, move |collection: &Self| {
            Self::from_items(collection.items().filter(|item| predicate(item)))
        });
        filtered
    }
}

/// A [Holder] of a collection, which also reports fine-grained changes.
///
/// Derefs to the underlying [Holder], so `get`, `set`, `follow`, `map`... are all available.
pub struct CollectionHolder<C: Collection> {
    pub(crate) holder: Holder<C>,
    listeners: Arc<ChangeListeners<C>>,
}

/// Incremental followers of one collection holder. Installed as the holder's replace hook, so that
/// any whole-value publish also reaches them.
struct ChangeListeners<C: Collection> {
    table: Mutex<FollowerTable<C::Change>>,
}

impl<C: Collection> ChangeListeners<C> {
    fn new() -> Self {
        ChangeListeners {
            table: Mutex::new(FollowerTable::new()),
        }
    }

    /// The listeners to notify of the change about to be published. Taken before the value is
    /// stored, so that a listener registered by a follower meanwhile, which is replayed the new
    /// contents, does not get the change a second time.
    fn snapshot(&self) -> Vec<Callback<C::Change>> {
        let mut table = self.table.lock();
        table.sweep();
        table.snapshot()
    }
}

impl<C: Collection> ReplaceSink<C> for ChangeListeners<C> {
    fn prepare(&self) -> Option<ReplaceHook<C>> {
        let callbacks = self.snapshot();
        if callbacks.is_empty() {
            return None;
        }
        Some(Box::new(move |previous: Option<&C>, current: &C| {
            let change = C::replaced_change(previous, current);
            for callback in &callbacks {
                callback(&change);
            }
        }))
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl<C: Collection> CollectionHolder<C> {
    /// Creates an empty holder: it has no collection at all until the first `set`.
    pub fn new() -> Self {
        CollectionHolder::from(Holder::new())
    }

    pub fn with_value(value: C) -> Self {
        CollectionHolder::from(Holder::with_value(value))
    }

    pub fn with_items(items: impl IntoIterator<Item = C::Item>) -> Self {
        CollectionHolder::with_value(C::from_items(items))
    }

    pub fn as_holder(&self) -> &Holder<C> {
        &self.holder
    }

    /// Calls `f` with the current contents as one `Initial` change, if the collection is not
    /// empty, then with every later change. Kept until [CollectionHolder::unfollow_incremental].
    pub fn follow_incremental(&self, f: impl Fn(&C::Change) + Send + Sync + 'static) -> FollowerId {
        let id = self.subscribe_changes(Arc::new(f), KeepAlive::Always, false);
        self.holder.inner.retain_self();
        id
    }

    /// Like [CollectionHolder::follow_incremental], dropped once every anchor is gone.
    pub fn follow_incremental_while(&self, f: impl Fn(&C::Change) + Send + Sync + 'static, anchors: impl IntoIterator<Item = Anchor>) -> FollowerId {
        let keep_alive = KeepAlive::from_anchors(anchors.into_iter().collect());
        let always = keep_alive.is_always();
        let id = self.subscribe_changes(Arc::new(f), keep_alive, false);
        if always {
            self.holder.inner.retain_self();
        }
        id
    }

    /// Removes an incremental follower. Returns `false` if it was not registered (anymore).
    pub fn unfollow_incremental(&self, id: FollowerId) -> bool {
        let removed = self.holder.inner.exclusive(|| self.listeners.table.lock().remove(id));
        match removed {
            None => false,
            Some(keep_alive) => {
                if keep_alive.is_always() {
                    self.holder.inner.release_self();
                }
                true
            }
        }
    }

    /// Number of registered incremental followers, including those not yet pruned.
    pub fn incremental_followers(&self) -> usize {
        self.listeners.table.lock().len()
    }

    /// Registration and replay happen under the notify lock, so no change is missed or seen twice.
    fn subscribe_changes(&self, callback: Callback<C::Change>, keep_alive: KeepAlive, replay_empty: bool) -> FollowerId {
        self.holder.inner.exclusive(|| {
            let id = self.listeners.table.lock().insert(callback.clone(), keep_alive);
            if let Some(current) = self.holder.inner.latest() {
                if replay_empty || !current.is_empty() {
                    callback(&current.initial_change());
                }
            }
            id
        })
    }

    /// Runs `on_change` for every change, as long as `target` is alive. Unlike
    /// [CollectionHolder::follow_incremental], an empty collection is replayed too.
    pub(crate) fn follow_changes_for<U: Holdable>(
        &self,
        target: &Holder<U>,
        on_change: impl Fn(&Holder<U>, &C::Change) + Send + Sync + 'static,
    ) -> FollowerId {
        let weak = Arc::downgrade(&target.inner);
        let callback: Callback<C::Change> = Arc::new(move |change: &C::Change| {
            if let Some(inner) = weak.upgrade() {
                on_change(&Holder::from_inner(inner), change);
            }
        });
        self.subscribe_changes(callback, KeepAlive::While(vec![target.anchor()]), true)
    }

    /// Edits a copy of the current collection (an empty one if there is none yet) and publishes it
    /// with the changes `edit` reports. Nothing is published if the holder already had a value and
    /// `edit` reports no change.
    pub(crate) fn modify<R>(&self, edit: impl FnOnce(&mut C) -> (R, Vec<C::Change>)) -> R {
        self.holder.inner.exclusive(|| {
            let latest = self.holder.inner.latest();
            let had_value = latest.is_some();
            let mut value = latest.map(|value| (*value).clone()).unwrap_or_default();
            let (result, changes) = edit(&mut value);
            if had_value && changes.is_empty() {
                return result;
            }
            let callbacks = self.listeners.snapshot();
            self.holder.inner.commit(value, move |_, _| {
                for change in &changes {
                    for callback in &callbacks {
                        callback(change);
                    }
                }
            });
            result
        })
    }
}

impl<T: Holdable> Holder<T> {
    /// Derives a list holder from the items `f` returns for each value.
    pub fn to_list<V: Holdable, I: IntoIterator<Item = V>>(&self, f: impl Fn(&T) -> I + Send + Sync + 'static) -> ListHolder<V> {
        let list = ListHolder::new();
        derive_into(self, &list.holder, move |value| f(value).into_iter().collect());
        list
    }

    /// Derives a set holder from the items `f` returns for each value.
    pub fn to_set<V: Holdable + Hash + Eq, I: IntoIterator<Item = V>>(&self, f: impl Fn(&T) -> I + Send + Sync + 'static) -> SetHolder<V> {
        let set = SetHolder::new();
        derive_into(self, &set.holder, move |value| f(value).into_iter().collect::<IndexSet<V>>());
        set
    }
}

impl<C: Collection> From<Holder<C>> for CollectionHolder<C> {
    /// Wraps a holder, sharing incremental followers with any other wrapper of it.
    fn from(holder: Holder<C>) -> Self {
        let installed = holder.inner.install_sink(Arc::new(ChangeListeners::<C>::new())).clone();
        let listeners = installed
            .into_any()
            .downcast::<ChangeListeners<C>>()
            .expect("a collection holder only ever carries its change listeners as replace hook");
        CollectionHolder { holder, listeners }
    }
}

impl<C: Collection> Deref for CollectionHolder<C> {
    type Target = Holder<C>;

    fn deref(&self) -> &Holder<C> {
        &self.holder
    }
}

impl<C: Collection> Clone for CollectionHolder<C> {
    fn clone(&self) -> Self {
        CollectionHolder {
            holder: self.holder.clone(),
            listeners: self.listeners.clone(),
        }
    }
}

impl<C: Collection> Default for CollectionHolder<C> {
    fn default() -> Self {
        CollectionHolder::new()
    }
}

impl<C: Collection> Publish<C> for CollectionHolder<C> {
    fn publish(&self, value: C) -> Result<()> {
        self.holder.set(value)
    }
}

impl<C: Collection + Debug> Debug for CollectionHolder<C> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionHolder")
            .field("holder", &self.holder)
            .field("incremental_followers", &self.incremental_followers())
            .finish()
    }
}

//! Keeps the propagation graph from growing when derived holders are abandoned.
//!
//! A source never owns the holders derived from it. Each follower it stores is tagged with the
//! [Anchor]s whose liveness justifies it; once every anchor of a follower is gone, the follower is
//! dropped on the source's next publish. Nothing is pruned eagerly.

use std::any::Any;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Weak};
use indexmap::IndexMap;
use crate::uid::FollowerId;

pub(crate) type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Weak handle on an object which keeps a follower registered for as long as it is alive.
///
/// Get one from a holder with `anchor()`, or from any `Arc` with [Anchor::of].
#[derive(Clone)]
pub struct Anchor(Weak<dyn Any + Send + Sync>);

/// Whether a follower survives the next sweep.
pub(crate) enum KeepAlive {
    /// Registered without anchors: only `unfollow` removes it.
    Always,
    /// Survives while at least one anchor is alive.
    While(Vec<Anchor>),
}

struct Follower<T> {
    callback: Callback<T>,
    keep_alive: KeepAlive,
}

/// Followers of one holder, in registration order.
pub(crate) struct FollowerTable<T> {
    entries: IndexMap<FollowerId, Follower<T>>,
}

impl Anchor {
    pub fn of<A: Any + Send + Sync>(target: &Arc<A>) -> Anchor {
        let weak: Weak<A> = Arc::downgrade(target);
        Anchor(weak)
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl Debug for Anchor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Anchor").field(&self.is_alive()).finish()
    }
}

impl KeepAlive {
    pub(crate) fn from_anchors(anchors: Vec<Anchor>) -> KeepAlive {
        if anchors.is_empty() {
            KeepAlive::Always
        } else {
            KeepAlive::While(anchors)
        }
    }

    pub(crate) fn is_always(&self) -> bool {
        matches!(self, KeepAlive::Always)
    }

    fn is_alive(&self) -> bool {
        match self {
            KeepAlive::Always => true,
            KeepAlive::While(anchors) => anchors.iter().any(Anchor::is_alive),
        }
    }
}

impl<T> FollowerTable<T> {
    pub(crate) fn new() -> Self {
        FollowerTable {
            entries: IndexMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, callback: Callback<T>, keep_alive: KeepAlive) -> FollowerId {
        let id = FollowerId::next();
        self.entries.insert(id, Follower { callback, keep_alive });
        id
    }

    /// Removes a follower, keeping the order of the others. Returns how it was kept alive.
    pub(crate) fn remove(&mut self, id: FollowerId) -> Option<KeepAlive> {
        self.entries.shift_remove(&id).map(|follower| follower.keep_alive)
    }

    /// Drops every follower whose anchors are all gone, returning how many were dropped.
    pub(crate) fn sweep(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, follower| follower.keep_alive.is_alive());
        before - self.entries.len()
    }

    /// The callbacks to notify, in registration order.
    pub(crate) fn snapshot(&self) -> Vec<Callback<T>> {
        self.entries.values().map(|follower| follower.callback.clone()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

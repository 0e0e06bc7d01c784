use std::hash::Hash;
use indexmap::IndexSet;
use crate::collection::{Collection, CollectionHolder};
use crate::holder::Holdable;
use crate::numbers::BoolHolder;

/// A holder of a set, iterated in insertion order.
pub type SetHolder<T> = CollectionHolder<IndexSet<T>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetChange<T> {
    /// The whole contents, sent once to a new incremental follower.
    Initial(Vec<T>),
    Added(Vec<T>),
    Removed(Vec<T>),
    /// The whole set was replaced by `set`.
    Replaced { previous: Vec<T>, current: Vec<T> },
}

impl<T: Holdable + Hash + Eq> Collection for IndexSet<T> {
    type Item = T;
    type Change = SetChange<T>;

    fn len(&self) -> usize {
        IndexSet::len(self)
    }

    fn items(&self) -> impl Iterator<Item = T> + '_ {
        self.iter().cloned()
    }

    fn from_items(items: impl IntoIterator<Item = T>) -> Self {
        items.into_iter().collect()
    }

    fn initial_change(&self) -> SetChange<T> {
        SetChange::Initial(self.iter().cloned().collect())
    }

    fn replaced_change(previous: Option<&Self>, current: &Self) -> SetChange<T> {
        SetChange::Replaced {
            previous: previous.map(|previous| previous.iter().cloned().collect()).unwrap_or_default(),
            current: current.iter().cloned().collect(),
        }
    }
}

impl<T: Holdable + Hash + Eq> SetHolder<T> {
    /// Adds `item`. Returns `false`, and notifies nobody, if it was already there.
    pub fn insert(&self, item: T) -> bool {
        self.modify(|set| {
            if set.insert(item.clone()) {
                (true, vec![SetChange::Added(vec![item])])
            } else {
                (false, Vec::new())
            }
        })
    }

    pub fn extend(&self, items: impl IntoIterator<Item = T>) {
        let items: Vec<T> = items.into_iter().collect();
        self.modify(|set| {
            let added: Vec<T> = items.into_iter().filter(|item| set.insert(item.clone())).collect();
            if added.is_empty() {
                ((), Vec::new())
            } else {
                ((), vec![SetChange::Added(added)])
            }
        })
    }

    /// Removes `item`, keeping the order of the others. Returns whether it was there.
    pub fn remove(&self, item: &T) -> bool {
        self.modify(|set| match set.shift_take(item) {
            Some(removed) => (true, vec![SetChange::Removed(vec![removed])]),
            None => (false, Vec::new()),
        })
    }

    pub fn clear(&self) {
        self.modify(|set| {
            if set.is_empty() {
                return ((), Vec::new());
            }
            let removed = std::mem::take(set).into_iter().collect();
            ((), vec![SetChange::Removed(removed)])
        })
    }

    /// `true` while the set contains `item`.
    pub fn contains(&self, item: T) -> BoolHolder {
        self.holder.test(move |set| set.contains(&item))
    }
}

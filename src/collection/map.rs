use std::hash::Hash;
use indexmap::{IndexMap, IndexSet};
use crate::collection::{Collection, CollectionHolder, ListHolder, SetHolder};
use crate::derive::{combine_all_into, combine_into, derive_into};
use crate::holder::{Holdable, Holder};
use crate::numbers::BoolHolder;

/// A holder of a key-unique map, iterated in key insertion order.
pub type MapHolder<K, V> = CollectionHolder<IndexMap<K, V>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapChange<K, V> {
    /// The whole contents, sent once to a new incremental follower.
    Initial(Vec<(K, V)>),
    /// `key` now maps to `value`, and mapped to `previous` before.
    Put { key: K, previous: Option<V>, value: V },
    Removed { key: K, value: V },
    /// The whole map was replaced by `set`.
    Replaced { previous: Vec<(K, V)>, current: Vec<(K, V)> },
}

impl<K: Holdable + Hash + Eq, V: Holdable> Collection for IndexMap<K, V> {
    type Item = (K, V);
    type Change = MapChange<K, V>;

    fn len(&self) -> usize {
        IndexMap::len(self)
    }

    fn items(&self) -> impl Iterator<Item = (K, V)> + '_ {
        self.iter().map(|(key, value)| (key.clone(), value.clone()))
    }

    /// Later items win over earlier ones with the same key.
    fn from_items(items: impl IntoIterator<Item = (K, V)>) -> Self {
        items.into_iter().collect()
    }

    fn initial_change(&self) -> MapChange<K, V> {
        MapChange::Initial(self.items().collect())
    }

    fn replaced_change(previous: Option<&Self>, current: &Self) -> MapChange<K, V> {
        MapChange::Replaced {
            previous: previous.map(|previous| previous.items().collect()).unwrap_or_default(),
            current: current.items().collect(),
        }
    }
}

impl<K: Holdable + Hash + Eq, V: Holdable> MapHolder<K, V> {
    /// Maps `key` to `value`, returning the value it replaced.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.modify(|map| {
            let previous = map.insert(key.clone(), value.clone());
            let change = MapChange::Put {
                key,
                previous: previous.clone(),
                value,
            };
            (previous, vec![change])
        })
    }

    /// Removes `key`, keeping the order of the other entries. Returns the value it mapped to.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.modify(|map| match map.shift_remove_entry(key) {
            Some((key, value)) => (Some(value.clone()), vec![MapChange::Removed { key, value }]),
            None => (None, Vec::new()),
        })
    }

    pub fn clear(&self) {
        self.modify(|map| {
            let changes = std::mem::take(map)
                .into_iter()
                .map(|(key, value)| MapChange::Removed { key, value })
                .collect();
            ((), changes)
        })
    }

    /// The value at `key`, or `default` while there is none.
    pub fn at(&self, key: K, default: V) -> Holder<V> {
        self.holder.map(move |map| map.get(&key).cloned().unwrap_or_else(|| default.clone()))
    }

    /// The value at whichever key `key` holds, or `default` while there is none.
    pub fn at_holder(&self, key: &Holder<K>, default: V) -> Holder<V> {
        self.holder.combine(key, move |map, key| map.get(key).cloned().unwrap_or_else(|| default.clone()))
    }

    pub fn contains_key(&self, key: K) -> BoolHolder {
        self.holder.test(move |map| map.contains_key(&key))
    }

    pub fn keys(&self) -> SetHolder<K> {
        let keys = SetHolder::new();
        derive_into(&self.holder, &keys.holder, |map: &IndexMap<K, V>| map.keys().cloned().collect::<IndexSet<K>>());
        keys
    }

    pub fn values(&self) -> ListHolder<V> {
        let values = ListHolder::new();
        derive_into(&self.holder, &values.holder, |map: &IndexMap<K, V>| map.values().cloned().collect());
        values
    }

    pub fn entries(&self) -> ListHolder<(K, V)> {
        let entries = ListHolder::new();
        derive_into(&self.holder, &entries.holder, |map: &IndexMap<K, V>| map.items().collect());
        entries
    }

    /// This map overlaid with each of `others` in turn: on a shared key, the last map wins.
    pub fn merge(&self, others: &[MapHolder<K, V>]) -> MapHolder<K, V> {
        let sources: Vec<Holder<IndexMap<K, V>>> = std::iter::once(self.holder.clone())
            .chain(others.iter().map(|other| other.holder.clone()))
            .collect();
        let merged = MapHolder::new();
        combine_all_into(&sources, &merged.holder, |maps| {
            maps.iter().flat_map(|map| map.items()).collect::<IndexMap<K, V>>()
        });
        merged
    }

    pub fn map_values<U: Holdable>(&self, f: impl Fn(&V) -> U + Send + Sync + 'static) -> MapHolder<K, U> {
        let mapped = MapHolder::new();
        derive_into(&self.holder, &mapped.holder, move |map: &IndexMap<K, V>| {
            map.iter().map(|(key, value)| (key.clone(), f(value))).collect::<IndexMap<K, U>>()
        });
        mapped
    }

    pub fn filter_keys_by(&self, predicate: impl Fn(&K) -> bool + Send + Sync + 'static) -> MapHolder<K, V> {
        self.filter(move |(key, _)| predicate(key))
    }

    pub fn filter_values(&self, predicate: impl Fn(&V) -> bool + Send + Sync + 'static) -> MapHolder<K, V> {
        self.filter(move |(_, value)| predicate(value))
    }

    /// The entries whose key is in `allowed`, once both have a value.
    pub fn filter_keys(&self, allowed: &SetHolder<K>) -> MapHolder<K, V> {
        let filtered = MapHolder::new();
        combine_into(&self.holder, &allowed.holder, &filtered.holder, |map: &IndexMap<K, V>, allowed: &IndexSet<K>| {
            map.iter()
                .filter(|(key, _)| allowed.contains(*key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect::<IndexMap<K, V>>()
        });
        filtered
    }
}

use std::cmp::Ordering;
use std::hash::Hash;
use std::sync::Arc;
use indexmap::map::Entry;
use indexmap::{IndexMap, IndexSet};
use crate::collection::per_item::watch_items;
use crate::collection::{Collection, CollectionHolder, ListHolder, MapHolder, SetHolder};
use crate::derive::{combine_into, derive_into};
use crate::holder::{Holdable, Holder};
use crate::numbers::BoolHolder;

const SIZE: &str = "size";
const IS_EMPTY: &str = "is_empty";

impl<C: Collection> CollectionHolder<C> {
    /// A snapshot of the current collection, blocking until the first one arrived.
    pub fn copy(&self) -> C {
        self.holder.get()
    }

    /// Blocks until the first value, then calls `f` with each item of the current collection.
    pub fn apply(&self, mut f: impl FnMut(&C::Item)) {
        self.holder.with(|collection| {
            for item in collection.items() {
                f(&item);
            }
        })
    }

    /// Number of items, cached in this holder.
    pub fn size(&self) -> Holder<usize> {
        self.holder.memo(SIZE, || self.holder.map(|collection: &C| collection.len()))
    }

    /// Whether there are no items, cached in this holder.
    pub fn is_empty(&self) -> BoolHolder {
        self.holder.memo(IS_EMPTY, || self.holder.map(|collection: &C| collection.is_empty()))
    }

    /// The items matching `predicate`.
    pub fn filter(&self, predicate: impl Fn(&C::Item) -> bool + Send + Sync + 'static) -> Self {
        C::derive_filter(self, Arc::new(predicate))
    }

    /// The items whose own holder, given by `condition`, currently holds `true`.
    ///
    /// Follows one condition holder per item, so an item enters or leaves the result when its
    /// condition flips, even if the collection itself does not change. An item whose condition has
    /// no value yet is left out.
    pub fn filter_when(&self, condition: impl Fn(&C::Item) -> BoolHolder + Send + Sync + 'static) -> Self {
        let filtered = CollectionHolder::new();
        watch_items(self, &filtered.holder, condition, |items: &[C::Item], conditions: &[Option<bool>]| {
            C::from_items(
                items
                    .iter()
                    .zip(conditions)
                    .filter(|(_, condition)| **condition == Some(true))
                    .map(|(item, _)| item.clone()),
            )
        });
        filtered
    }

    pub fn map_items<U: Holdable>(&self, f: impl Fn(&C::Item) -> U + Send + Sync + 'static) -> ListHolder<U> {
        let mapped = ListHolder::new();
        derive_into(&self.holder, &mapped.holder, move |collection: &C| collection.items().map(|item| f(&item)).collect());
        mapped
    }

    /// Maps each item to an entry. On a key collision the later item wins.
    pub fn to_map<K, V>(
        &self,
        key: impl Fn(&C::Item) -> K + Send + Sync + 'static,
        value: impl Fn(&C::Item) -> V + Send + Sync + 'static,
    ) -> MapHolder<K, V>
    where
        K: Holdable + Hash + Eq,
        V: Holdable,
    {
        self.to_map_merging(key, value, |_, later| later.clone())
    }

    /// Maps each item to an entry. On a key collision, `collision` gets the value already mapped
    /// and the one of the later item, and returns the value to keep.
    pub fn to_map_merging<K, V>(
        &self,
        key: impl Fn(&C::Item) -> K + Send + Sync + 'static,
        value: impl Fn(&C::Item) -> V + Send + Sync + 'static,
        collision: impl Fn(&V, &V) -> V + Send + Sync + 'static,
    ) -> MapHolder<K, V>
    where
        K: Holdable + Hash + Eq,
        V: Holdable,
    {
        let mapped = MapHolder::new();
        derive_into(&self.holder, &mapped.holder, move |collection: &C| {
            let mut map = IndexMap::with_capacity(collection.len());
            for item in collection.items() {
                let value = value(&item);
                match map.entry(key(&item)) {
                    Entry::Occupied(mut entry) => {
                        let merged = collision(entry.get(), &value);
                        entry.insert(merged);
                    }
                    Entry::Vacant(entry) => {
                        entry.insert(value);
                    }
                }
            }
            map
        });
        mapped
    }

    /// Maps each item to itself, keyed by `key`. On a key collision the later item wins.
    pub fn index_by<K: Holdable + Hash + Eq>(&self, key: impl Fn(&C::Item) -> K + Send + Sync + 'static) -> MapHolder<K, C::Item> {
        self.to_map(key, <C::Item as Clone>::clone)
    }

    /// Folds the mapped items with `joiner`, starting from `neutral`.
    ///
    /// Holds `neutral` until the collection receives its first value, so an empty result does not
    /// tell whether there was data: check this holder's source `generation` for that.
    pub fn reduce<V: Holdable>(
        &self,
        mapper: impl Fn(&C::Item) -> V + Send + Sync + 'static,
        joiner: impl Fn(V, V) -> V + Send + Sync + 'static,
        neutral: V,
    ) -> Holder<V> {
        let reduced = Holder::with_value(neutral.clone());
        derive_into(&self.holder, &reduced, move |collection: &C| {
            collection.items().map(|item| mapper(&item)).fold(neutral.clone(), &joiner)
        });
        reduced
    }

    /// Folds the items themselves, see [CollectionHolder::reduce].
    pub fn reduce_items(&self, joiner: impl Fn(C::Item, C::Item) -> C::Item + Send + Sync + 'static, neutral: C::Item) -> Holder<C::Item> {
        self.reduce(<C::Item as Clone>::clone, joiner, neutral)
    }

    /// Computes `f` on the whole collection. Has no value until the collection has one.
    pub fn reduce_with<V: Holdable>(&self, f: impl Fn(&C) -> V + Send + Sync + 'static) -> Holder<V> {
        self.holder.map(f)
    }

    /// The items without duplicates, in first-seen order.
    pub fn distinct(&self) -> SetHolder<C::Item>
    where
        C::Item: Hash + Eq,
    {
        let distinct = SetHolder::new();
        derive_into(&self.holder, &distinct.holder, |collection: &C| collection.items().collect::<IndexSet<C::Item>>());
        distinct
    }

    /// The items sorted by `compare`. The sort is stable.
    pub fn sorted(&self, compare: impl Fn(&C::Item, &C::Item) -> Ordering + Send + Sync + 'static) -> ListHolder<C::Item> {
        let sorted = ListHolder::new();
        derive_into(&self.holder, &sorted.holder, move |collection: &C| {
            let mut items: Vec<C::Item> = collection.items().collect();
            items.sort_by(&compare);
            items
        });
        sorted
    }

    /// `f` applied to every pair of an item of this collection and one of `right`: for each item
    /// of this collection in order, all the items of `right` in order.
    pub fn prod_list<R: Collection, O: Holdable>(
        &self,
        right: &CollectionHolder<R>,
        f: impl Fn(&C::Item, &R::Item) -> O + Send + Sync + 'static,
    ) -> ListHolder<O> {
        let product = ListHolder::new();
        combine_into(&self.holder, &right.holder, &product.holder, move |left: &C, right: &R| {
            let right: Vec<R::Item> = right.items().collect();
            let mut product = Vec::with_capacity(left.len() * right.len());
            for l in left.items() {
                for r in &right {
                    product.push(f(&l, r));
                }
            }
            product
        });
        product
    }

    /// The concatenation of the collections `f` returns for each item, in order.
    ///
    /// Follows each item's collection, so the result changes when any of them does. A collection
    /// which has no value yet contributes nothing.
    pub fn flatten<S: Collection>(&self, f: impl Fn(&C::Item) -> CollectionHolder<S> + Send + Sync + 'static) -> ListHolder<S::Item> {
        let flat = ListHolder::new();
        watch_items(self, &flat.holder, move |item| f(item).holder, |_: &[C::Item], parts: &[Option<S>]| {
            parts.iter().flatten().flat_map(|part| part.items()).collect()
        });
        flat
    }
}

use std::cmp::Ordering;
use std::sync::Arc;
use parking_lot::Mutex;
use crate::collection::{Collection, CollectionHolder};
use crate::derive::{combine_all_into, derive_into};
use crate::holder::{Holdable, Holder};

const REVERSE: &str = "reverse";

/// A holder of an ordered sequence.
pub type ListHolder<T> = CollectionHolder<Vec<T>>;

/// A fine-grained change of a [ListHolder]. Indices are positions in the list as it was right
/// before the change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListChange<T> {
    /// The whole contents, sent once to a new incremental follower.
    Initial(Vec<T>),
    Inserted { index: usize, items: Vec<T> },
    Removed { index: usize, items: Vec<T> },
    /// The element now at `i` was at `permutation[i]`.
    Reordered { permutation: Vec<usize> },
    /// The whole list was replaced by `set`.
    Replaced { previous: Vec<T>, current: Vec<T> },
}

impl<T: Holdable> Collection for Vec<T> {
    type Item = T;
    type Change = ListChange<T>;

    fn len(&self) -> usize {
        Vec::len(self)
    }

    fn items(&self) -> impl Iterator<Item = T> + '_ {
        self.iter().cloned()
    }

    fn from_items(items: impl IntoIterator<Item = T>) -> Self {
        items.into_iter().collect()
    }

    fn initial_change(&self) -> ListChange<T> {
        ListChange::Initial(self.clone())
    }

    fn replaced_change(previous: Option<&Self>, current: &Self) -> ListChange<T> {
        ListChange::Replaced {
            previous: previous.cloned().unwrap_or_default(),
            current: current.clone(),
        }
    }

    fn derive_filter(source: &ListHolder<T>, predicate: Arc<dyn Fn(&T) -> bool + Send + Sync>) -> ListHolder<T> {
        filter_members(source, predicate)
    }
}

/// A mirror of the filtered list, and whether each of its elements passed the predicate.
struct Members<T> {
    items: Vec<T>,
    /// `None` until tested. The mirror is edited before any test, so a panicking predicate leaves
    /// it in step with the source, and the untested elements are tested on the next change.
    kept: Vec<Option<bool>>,
}

/// Filters a list, testing each element once when it enters the list rather than on every change.
fn filter_members<T: Holdable>(source: &ListHolder<T>, predicate: Arc<dyn Fn(&T) -> bool + Send + Sync>) -> ListHolder<T> {
    let filtered = ListHolder::new();
    filtered.holder.inner.add_upstream(source.holder.inner.clone());
    let members = Arc::new(Mutex::new(Members {
        items: Vec::new(),
        kept: Vec::new(),
    }));
    source.follow_changes_for(&filtered.holder, move |target, change| {
        target.inner.exclusive(|| {
            let result = {
                let mut members = members.lock();
                let Members { items, kept } = &mut *members;
                match change {
                    ListChange::Initial(current) | ListChange::Replaced { current, .. } => {
                        *kept = vec![None; current.len()];
                        *items = current.clone();
                    }
                    ListChange::Inserted { index, items: inserted } => {
                        kept.splice(*index..*index, std::iter::repeat(None).take(inserted.len()));
                        items.splice(*index..*index, inserted.iter().cloned());
                    }
                    ListChange::Removed { index, items: removed } => {
                        kept.drain(*index..*index + removed.len());
                        items.drain(*index..*index + removed.len());
                    }
                    ListChange::Reordered { permutation } => {
                        let reordered_kept = permutation.iter().map(|&old| kept[old]).collect();
                        let reordered_items = permutation.iter().map(|&old| items[old].clone()).collect();
                        *kept = reordered_kept;
                        *items = reordered_items;
                    }
                }
                for (item, kept) in items.iter().zip(kept.iter_mut()) {
                    if kept.is_none() {
                        *kept = Some(predicate(item));
                    }
                }
                items.iter().zip(kept.iter()).filter(|(_, kept)| **kept == Some(true)).map(|(item, _)| item.clone()).collect::<Vec<T>>()
            };
            target.emit(result);
        })
    });
    filtered
}

impl<T: Holdable> ListHolder<T> {
    pub fn push(&self, item: T) {
        self.modify(|list| {
            let index = list.len();
            list.push(item.clone());
            ((), vec![ListChange::Inserted { index, items: vec![item] }])
        })
    }

    pub fn extend(&self, items: impl IntoIterator<Item = T>) {
        let items: Vec<T> = items.into_iter().collect();
        self.modify(|list| {
            if items.is_empty() {
                return ((), Vec::new());
            }
            let index = list.len();
            list.extend(items.iter().cloned());
            ((), vec![ListChange::Inserted { index, items }])
        })
    }

    /// Inserts `item` at `index`, shifting later elements.
    ///
    /// Panics if `index` is greater than the length, like [Vec::insert].
    pub fn insert(&self, index: usize, item: T) {
        self.modify(|list| {
            list.insert(index, item.clone());
            ((), vec![ListChange::Inserted { index, items: vec![item] }])
        })
    }

    /// Removes and returns the element at `index`, or `None` if it is out of bounds.
    pub fn remove_at(&self, index: usize) -> Option<T> {
        self.modify(|list| {
            if index >= list.len() {
                return (None, Vec::new());
            }
            let removed = list.remove(index);
            (Some(removed.clone()), vec![ListChange::Removed { index, items: vec![removed] }])
        })
    }

    /// Keeps only the elements matching `keep`, reporting one removal per dropped element.
    pub fn retain(&self, mut keep: impl FnMut(&T) -> bool) {
        self.modify(|list| {
            let mut changes = Vec::new();
            let mut index = 0;
            while index < list.len() {
                if keep(&list[index]) {
                    index += 1;
                } else {
                    let removed = list.remove(index);
                    changes.push(ListChange::Removed { index, items: vec![removed] });
                }
            }
            ((), changes)
        })
    }

    pub fn clear(&self) {
        self.modify(|list| {
            if list.is_empty() {
                return ((), Vec::new());
            }
            let items = std::mem::take(list);
            ((), vec![ListChange::Removed { index: 0, items }])
        })
    }

    /// Sorts the list in place, stable.
    pub fn sort_by(&self, compare: impl Fn(&T, &T) -> Ordering) {
        self.modify(|list| {
            let mut permutation: Vec<usize> = (0..list.len()).collect();
            permutation.sort_by(|&a, &b| compare(&list[a], &list[b]));
            if permutation.iter().enumerate().all(|(index, &old)| index == old) {
                return ((), Vec::new());
            }
            *list = permutation.iter().map(|&old| list[old].clone()).collect();
            ((), vec![ListChange::Reordered { permutation }])
        })
    }

    /// Blocks until the first value, then calls `f` with each index and element.
    pub fn apply_indexed(&self, mut f: impl FnMut(usize, &T)) {
        self.holder.with(|list| {
            for (index, item) in list.iter().enumerate() {
                f(index, item);
            }
        })
    }

    /// The list in reverse order. Cached: reversing the result returns this holder.
    pub fn reverse(&self) -> ListHolder<T> {
        let reversed = self.holder.memo(REVERSE, || {
            let reversed = ListHolder::new();
            derive_into(&self.holder, &reversed.holder, |list: &Vec<T>| list.iter().rev().cloned().collect());
            reversed.holder.memo_link(REVERSE, &self.holder);
            reversed.holder
        });
        ListHolder::from(reversed)
    }

    /// This list followed by each of `others`, once all of them have a value.
    pub fn concat(&self, others: &[ListHolder<T>]) -> ListHolder<T> {
        let sources: Vec<Holder<Vec<T>>> = std::iter::once(self.holder.clone())
            .chain(others.iter().map(|other| other.holder.clone()))
            .collect();
        let concatenated = ListHolder::new();
        combine_all_into(&sources, &concatenated.holder, |lists| lists.concat());
        concatenated
    }
}

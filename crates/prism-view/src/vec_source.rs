//! Observable in-memory source collection.
//!
//! `VecSource<T>` is the reference implementation of the source capability
//! traits: an ordered vector that supports random access, mutation, and
//! granular change notification. Views built over it patch incrementally
//! instead of recomputing from scratch.
//!
//! # Example
//!
//! ```
//! use prism_view::VecSource;
//!
//! let source = VecSource::new(vec![1, 3, 5]);
//! source.push(7);
//! assert_eq!(source.len(), 4);
//! assert_eq!(source.item_at_index(3), Some(7));
//! ```

use parking_lot::RwLock;

use prism_view_core::Signal;

use crate::item::ViewItem;
use crate::source::{
    ChangeNotifying, CollectionSource, Indexable, ListMutable, SourceChange,
};

/// An ordered, observable, mutable in-memory collection.
///
/// Implements every optional source capability except server paging.
pub struct VecSource<T> {
    items: RwLock<Vec<T>>,
    changes: Signal<SourceChange<T>>,
    read_only: bool,
}

impl<T: ViewItem> Default for VecSource<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T: ViewItem> VecSource<T> {
    /// Creates a source holding `items`.
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items: RwLock::new(items),
            changes: Signal::new(),
            read_only: false,
        }
    }

    /// Creates a read-only source: reads and notifications work, mutation
    /// through the view is refused.
    pub fn read_only(items: Vec<T>) -> Self {
        Self {
            items: RwLock::new(items),
            changes: Signal::new(),
            read_only: true,
        }
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    /// Returns `true` if the source holds no items.
    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    /// Returns a clone of the item at `index`.
    pub fn item_at_index(&self, index: usize) -> Option<T> {
        self.items.read().get(index).cloned()
    }

    /// Appends an item, raising an `Insert` change.
    pub fn push(&self, item: T) {
        let index = {
            let mut items = self.items.write();
            items.push(item.clone());
            items.len() - 1
        };
        self.changes.emit(SourceChange::Insert { index, item });
    }

    /// Inserts an item at `index`, raising an `Insert` change.
    ///
    /// # Panics
    ///
    /// Panics if `index > len()`.
    pub fn insert(&self, index: usize, item: T) {
        self.items.write().insert(index, item.clone());
        self.changes.emit(SourceChange::Insert { index, item });
    }

    /// Removes the item at `index`, raising a `Remove` change.
    pub fn remove(&self, index: usize) -> Option<T> {
        let removed = {
            let mut items = self.items.write();
            if index >= items.len() {
                return None;
            }
            items.remove(index)
        };
        self.changes.emit(SourceChange::Remove {
            index,
            item: removed.clone(),
        });
        Some(removed)
    }

    /// Replaces the item at `index`, raising a `Replace` change.
    pub fn replace(&self, index: usize, item: T) -> Option<T> {
        let old = {
            let mut items = self.items.write();
            let slot = items.get_mut(index)?;
            std::mem::replace(slot, item.clone())
        };
        self.changes.emit(SourceChange::Replace {
            index,
            old: old.clone(),
            new: item,
        });
        Some(old)
    }

    /// Moves the item at `from` to `to`, raising a `Move` change.
    pub fn move_item(&self, from: usize, to: usize) -> bool {
        let item = {
            let mut items = self.items.write();
            if from >= items.len() || to >= items.len() {
                return false;
            }
            let item = items.remove(from);
            items.insert(to, item.clone());
            item
        };
        self.changes.emit(SourceChange::Move { from, to, item });
        true
    }

    /// Replaces the whole contents, raising a `Reset`.
    pub fn set_items(&self, items: Vec<T>) {
        *self.items.write() = items;
        self.changes.emit(SourceChange::Reset);
    }

    /// Removes all items, raising a `Reset`.
    pub fn clear(&self) {
        self.items.write().clear();
        self.changes.emit(SourceChange::Reset);
    }

    /// Re-reads an item by value and applies `f` to it in place, raising a
    /// `Replace` change describing the mutation.
    ///
    /// Returns `false` if the item is not present.
    pub fn update<F>(&self, item: &T, f: F) -> bool
    where
        F: FnOnce(&mut T),
    {
        let (index, old, new) = {
            let mut items = self.items.write();
            let Some(index) = items.iter().position(|other| other == item) else {
                return false;
            };
            let old = items[index].clone();
            f(&mut items[index]);
            (index, old, items[index].clone())
        };
        self.changes.emit(SourceChange::Replace { index, old, new });
        true
    }
}

impl<T: ViewItem> CollectionSource<T> for VecSource<T> {
    fn len(&self) -> usize {
        VecSource::len(self)
    }

    fn snapshot(&self) -> Vec<T> {
        self.items.read().clone()
    }

    fn as_indexable(&self) -> Option<&dyn Indexable<T>> {
        Some(self)
    }

    fn as_notifying(&self) -> Option<&dyn ChangeNotifying<T>> {
        Some(self)
    }

    fn as_list_mutable(&self) -> Option<&dyn ListMutable<T>> {
        Some(self)
    }
}

impl<T: ViewItem> Indexable<T> for VecSource<T> {
    fn item_at(&self, index: usize) -> Option<T> {
        self.item_at_index(index)
    }

    fn index_of(&self, item: &T) -> Option<usize> {
        self.items.read().iter().position(|other| other == item)
    }
}

impl<T: ViewItem> ChangeNotifying<T> for VecSource<T> {
    fn changes(&self) -> &Signal<SourceChange<T>> {
        &self.changes
    }
}

impl<T: ViewItem> ListMutable<T> for VecSource<T> {
    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn push(&self, item: T) {
        VecSource::push(self, item);
    }

    fn insert(&self, index: usize, item: T) {
        VecSource::insert(self, index, item);
    }

    fn remove_at(&self, index: usize) -> Option<T> {
        self.remove(index)
    }

    fn replace_at(&self, index: usize, item: T) -> Option<T> {
        self.replace(index, item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn mutations_raise_granular_changes() {
        let source = VecSource::new(vec![1, 2, 3]);
        let log = Arc::new(Mutex::new(Vec::new()));

        let recv = log.clone();
        source.changes.connect(move |change: &SourceChange<i32>| {
            recv.lock().push(change.clone());
        });

        source.push(4);
        source.remove(0);
        source.replace(0, 20);
        source.clear();

        let log = log.lock();
        assert_eq!(log[0], SourceChange::Insert { index: 3, item: 4 });
        assert_eq!(log[1], SourceChange::Remove { index: 0, item: 1 });
        assert_eq!(
            log[2],
            SourceChange::Replace {
                index: 0,
                old: 2,
                new: 20
            }
        );
        assert_eq!(log[3], SourceChange::Reset);
    }

    #[test]
    fn update_raises_replace_with_old_and_new() {
        let source = VecSource::new(vec![10, 20]);
        let log = Arc::new(Mutex::new(Vec::new()));

        let recv = log.clone();
        source.changes.connect(move |change: &SourceChange<i32>| {
            recv.lock().push(change.clone());
        });

        assert!(source.update(&20, |n| *n = 25));
        assert!(!source.update(&99, |n| *n = 0));

        assert_eq!(
            log.lock()[0],
            SourceChange::Replace {
                index: 1,
                old: 20,
                new: 25
            }
        );
    }

    #[test]
    fn read_only_source_refuses_view_mutation() {
        let source = VecSource::read_only(vec![1]);
        assert!(ListMutable::is_read_only(&source));
    }

    #[test]
    fn move_item_reorders() {
        let source = VecSource::new(vec![1, 2, 3]);
        assert!(source.move_item(0, 2));
        assert_eq!(source.snapshot(), vec![2, 3, 1]);
        assert!(!source.move_item(5, 0));
    }
}

//! Filter engine.
//!
//! A single optional unary predicate selects the candidate items of the
//! view. With no predicate set every item passes.

use std::sync::Arc;

use crate::item::ViewItem;

/// Type alias for a filter predicate.
///
/// Returns `true` if the item should be included in the view.
pub type FilterFn<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// The view's predicate slot.
pub(crate) struct FilterState<T> {
    predicate: Option<FilterFn<T>>,
}

impl<T: ViewItem> FilterState<T> {
    pub(crate) fn new() -> Self {
        Self { predicate: None }
    }

    pub(crate) fn set(&mut self, predicate: Option<FilterFn<T>>) {
        self.predicate = predicate;
    }

    pub(crate) fn is_active(&self) -> bool {
        self.predicate.is_some()
    }

    /// Returns `true` when no predicate is set or the predicate accepts.
    pub(crate) fn passes(&self, item: &T) -> bool {
        match &self.predicate {
            Some(predicate) => predicate(item),
            None => true,
        }
    }

    /// Applies the predicate to an ordered sequence, preserving order.
    pub(crate) fn apply(&self, items: &[T]) -> Vec<T> {
        match &self.predicate {
            Some(predicate) => items
                .iter()
                .filter(|item| predicate(item))
                .cloned()
                .collect(),
            None => items.to_vec(),
        }
    }
}

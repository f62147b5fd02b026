//! Currency (current item) state.
//!
//! The current position is page-relative and ranges over `[-1, count]`:
//! -1 is before-first, `count` is after-last, and anything in between
//! points at an item on the current page. The position and the cached
//! current item move together.

use crate::item::ViewItem;

/// Outcome of re-synchronizing currency after a structural change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resync {
    /// Item and position both still valid.
    Unchanged,
    /// Same item, shifted position; no changing/changed events are due,
    /// only a position property notification.
    Shifted,
    /// The current item left the page; currency degenerated to the nearest
    /// surviving index and full events are due.
    Moved,
}

/// The view's currency slot.
pub(crate) struct CurrencyState<T> {
    position: isize,
    item: Option<T>,
}

impl<T: ViewItem> CurrencyState<T> {
    pub(crate) fn new() -> Self {
        Self {
            position: -1,
            item: None,
        }
    }

    pub(crate) fn position(&self) -> isize {
        self.position
    }

    pub(crate) fn item(&self) -> Option<T> {
        self.item.clone()
    }

    pub(crate) fn is_before_first(&self) -> bool {
        self.position < 0
    }

    pub(crate) fn is_after_last(&self, count: usize) -> bool {
        count > 0 && self.position >= count as isize
    }

    /// Sets currency explicitly (a deliberate currency move).
    pub(crate) fn set(&mut self, position: isize, item: Option<T>) {
        self.position = position;
        self.item = item;
    }

    /// Re-synchronizes currency against the new page contents after a
    /// structural change.
    ///
    /// If the current item is still on the page only the position is
    /// corrected. If it left, currency degenerates to the nearest
    /// still-valid prior index (or before-first on an empty page).
    pub(crate) fn resync(&mut self, page_items: &[T]) -> Resync {
        let count = page_items.len() as isize;
        match self.item.clone() {
            Some(current) => {
                if let Some(found) = page_items.iter().position(|other| *other == current) {
                    let found = found as isize;
                    if found == self.position {
                        Resync::Unchanged
                    } else {
                        self.position = found;
                        Resync::Shifted
                    }
                } else {
                    self.position = self.position.min(count - 1).max(-1);
                    self.item = if self.position >= 0 {
                        page_items.get(self.position as usize).cloned()
                    } else {
                        None
                    };
                    Resync::Moved
                }
            }
            None => {
                // Before-first stays put; after-last clamps to the new
                // count.
                if self.position > count {
                    self.position = count;
                    Resync::Moved
                } else {
                    Resync::Unchanged
                }
            }
        }
    }
}

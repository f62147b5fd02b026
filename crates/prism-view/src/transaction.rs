//! Add and edit transactions.
//!
//! At most one transaction is open per view. While one is open, refresh,
//! configuration changes, page moves, and further transactions are
//! rejected; the commit or cancel that closes it re-evaluates the item's
//! placement through the full pipeline.

use crate::item::ViewItem;

/// The view's single pending transaction, if any.
pub(crate) enum Transaction<T> {
    /// An `add_new` in progress: the item is already in the source but
    /// provisionally placed at the end of the current page.
    Add {
        /// The provisional item.
        item: T,
        /// Its current flat position in the view sequence.
        position: usize,
    },
    /// An `edit_item` in progress.
    Edit {
        /// The item under edit.
        item: T,
        /// Pre-edit copy, held when the item has no edit protocol of its
        /// own. `None` when the item manages its own rollback.
        original: Option<T>,
        /// Whether the item's begin/end/cancel protocol is in use.
        uses_protocol: bool,
    },
}

impl<T: ViewItem> Transaction<T> {
    /// Transaction name used in rejection errors.
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Transaction::Add { .. } => "AddNew",
            Transaction::Edit { .. } => "EditItem",
        }
    }

    pub(crate) fn is_add(&self) -> bool {
        matches!(self, Transaction::Add { .. })
    }

    pub(crate) fn is_edit(&self) -> bool {
        matches!(self, Transaction::Edit { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_match_the_blocking_operation() {
        let add = Transaction::Add {
            item: 0i32,
            position: 0,
        };
        assert_eq!(add.name(), "AddNew");
        assert!(add.is_add());

        let edit = Transaction::Edit {
            item: 0i32,
            original: Some(0),
            uses_protocol: false,
        };
        assert_eq!(edit.name(), "EditItem");
        assert!(edit.is_edit());
    }
}

//! Error types for the view engine.
//!
//! Every error is a rejected operation: the engine's state is valid and
//! unchanged after any `Err` return. Callers can avoid errors on the common
//! path by checking the capability flags (`can_add_new`, `can_remove`,
//! `can_cancel_edit`, `can_sort`, `can_filter`, `can_group`) first.

use thiserror::Error;

/// Errors surfaced by [`crate::CollectionView`] operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ViewError {
    /// A configuration, navigation, or refresh operation was attempted while
    /// an add or edit transaction is active.
    #[error("cannot {operation} while the pending {pending} transaction is active")]
    TransactionPending {
        /// The operation that was rejected.
        operation: &'static str,
        /// The transaction blocking it (`"AddNew"` or `"EditItem"`).
        pending: &'static str,
    },

    /// A refresh-affecting operation was attempted inside a deferred-refresh
    /// scope.
    #[error("cannot {operation} while refresh is deferred")]
    RefreshDeferred {
        /// The operation that was rejected.
        operation: &'static str,
    },

    /// `cancel_edit` was called but no rollback mechanism is available.
    #[error("the pending edit cannot be canceled: no rollback mechanism is available")]
    CancelNotSupported,

    /// The new-item placeholder was passed to `edit_item`.
    #[error("the new-item placeholder cannot be edited")]
    EditPlaceholder,

    /// The new-item placeholder was passed to a remove operation.
    #[error("the new-item placeholder cannot be removed")]
    RemovePlaceholder,

    /// `edit_item` was given an item that is not in the view.
    #[error("the item passed to edit_item is not in the view")]
    ItemNotInView,

    /// A currency position outside `[-1, count]` was requested.
    #[error("{parameter} must be between {min} and {max}, got {value}")]
    PositionOutOfRange {
        /// Name of the offending parameter.
        parameter: &'static str,
        /// The rejected value.
        value: isize,
        /// Smallest accepted value.
        min: isize,
        /// Largest accepted value.
        max: isize,
    },

    /// An indexed read outside `[0, count)` was requested.
    #[error("{parameter} {index} is out of range for a view of {len} items")]
    IndexOutOfRange {
        /// Name of the offending parameter.
        parameter: &'static str,
        /// The rejected index.
        index: usize,
        /// Number of items currently in the view.
        len: usize,
    },

    /// The source collection does not support the requested operation.
    #[error("{operation} is not supported by the source collection")]
    NotSupported {
        /// The unsupported operation.
        operation: &'static str,
    },

    /// An empty culture tag was assigned.
    #[error("the culture tag must not be empty")]
    EmptyCulture,
}

/// Result type for view operations.
pub type ViewResult<T> = Result<T, ViewError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_blocked_and_blocking_operations() {
        let err = ViewError::TransactionPending {
            operation: "set_filter",
            pending: "AddNew",
        };
        let text = err.to_string();
        assert!(text.contains("set_filter"));
        assert!(text.contains("AddNew"));
    }

    #[test]
    fn out_of_range_names_the_parameter() {
        let err = ViewError::PositionOutOfRange {
            parameter: "position",
            value: 7,
            min: -1,
            max: 3,
        };
        assert!(err.to_string().contains("position"));
        assert!(err.to_string().contains('7'));
    }
}

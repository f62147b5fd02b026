//! View notification surface.
//!
//! Every outward-facing event of a view is a [`Signal`] on
//! [`ViewSignals`]. Internally, mutating operations collect [`Note`]s
//! under the state lock and dispatch them afterwards through a
//! single-flight queue, so re-entrant mutation from inside a handler
//! coalesces into the in-flight dispatch pass instead of recursing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use prism_view_core::Signal;

use crate::group::GroupChange;
use crate::item::ViewItem;

/// A collection change observed through the view, in page-relative
/// coordinates.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionChange<T> {
    /// The visible page changed wholesale; re-read the view.
    Reset,
    /// `item` appeared at page-relative `index`.
    Add {
        /// Page-relative position of the new item.
        index: usize,
        /// The added item.
        item: T,
    },
    /// The item at page-relative `index` left the page.
    Remove {
        /// Page-relative position the item occupied.
        index: usize,
        /// The removed item.
        item: T,
    },
    /// The item at page-relative `index` was replaced in place.
    Replace {
        /// Page-relative position of the replacement.
        index: usize,
        /// The item that was replaced.
        old: T,
        /// The replacement.
        new: T,
    },
}

/// A view property whose value changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewProperty {
    Count,
    ItemCount,
    IsEmpty,
    Culture,
    Filter,
    SortDescriptions,
    GroupDescriptions,
    CurrentItem,
    CurrentPosition,
    IsCurrentBeforeFirst,
    IsCurrentAfterLast,
    PageSize,
    PageIndex,
    IsPageChanging,
    IsAddingNew,
    IsEditingItem,
    CanAddNew,
    CanRemove,
    CanCancelEdit,
}

/// Argument of the pre-move currency event.
///
/// Deliberate currency moves are cancelable: any handler may call
/// [`cancel`](Self::cancel) and the move is abandoned. Currency moves
/// forced by structural changes are announced but not cancelable.
#[derive(Clone)]
pub struct CurrentChanging {
    cancelable: bool,
    canceled: Arc<AtomicBool>,
}

impl CurrentChanging {
    pub(crate) fn new(cancelable: bool) -> Self {
        Self {
            cancelable,
            canceled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether this move can be canceled.
    pub fn is_cancelable(&self) -> bool {
        self.cancelable
    }

    /// Requests cancellation. Returns `false` (and does nothing) when the
    /// move is not cancelable.
    pub fn cancel(&self) -> bool {
        if self.cancelable {
            self.canceled.store(true, Ordering::SeqCst);
            true
        } else {
            false
        }
    }

    pub(crate) fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for CurrentChanging {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CurrentChanging")
            .field("cancelable", &self.cancelable)
            .field("canceled", &self.is_canceled())
            .finish()
    }
}

/// The signals a view exposes.
pub struct ViewSignals<T> {
    /// Page-relative collection changes.
    pub collection_changed: Signal<CollectionChange<T>>,
    /// Scalar view property changes.
    pub property_changed: Signal<ViewProperty>,
    /// Pre-move currency announcement; cancelable for deliberate moves.
    pub current_changing: Signal<CurrentChanging>,
    /// Post-move currency notification carrying the new current item.
    pub current_changed: Signal<Option<T>>,
    /// The page index changed; carries the new index.
    pub page_changed: Signal<isize>,
    /// Structural and count changes on the group tree.
    pub group_changed: Signal<GroupChange>,
}

impl<T: ViewItem> ViewSignals<T> {
    pub(crate) fn new() -> Self {
        Self {
            collection_changed: Signal::new(),
            property_changed: Signal::new(),
            current_changing: Signal::new(),
            current_changed: Signal::new(),
            page_changed: Signal::new(),
            group_changed: Signal::new(),
        }
    }
}

/// A queued notification, produced under the state lock and emitted after
/// it is released.
pub(crate) enum Note<T> {
    Collection(CollectionChange<T>),
    Property(ViewProperty),
    /// Non-cancelable announcement of a structural currency move.
    CurrentChanging,
    CurrentChanged(Option<T>),
    PageChanged(isize),
    Group(GroupChange),
}

impl<T: ViewItem> ViewSignals<T> {
    pub(crate) fn dispatch(&self, note: Note<T>) {
        match note {
            Note::Collection(change) => self.collection_changed.emit(change),
            Note::Property(property) => self.property_changed.emit(property),
            Note::CurrentChanging => {
                self.current_changing.emit(CurrentChanging::new(false));
            }
            Note::CurrentChanged(item) => self.current_changed.emit(item),
            Note::PageChanged(index) => self.page_changed.emit(index),
            Note::Group(change) => self.group_changed.emit(change),
        }
    }
}

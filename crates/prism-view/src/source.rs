//! Source collection contract and adapter.
//!
//! The engine never owns the underlying data; it observes, reads, and
//! mutates a caller-supplied collection through [`CollectionSource`] and a
//! set of optional capability traits, composed rather than inherited:
//!
//! - [`Indexable`] - random access by position
//! - [`ChangeNotifying`] - granular change notification
//! - [`ListMutable`] - append / remove / replace
//! - [`ServerPageable`] - source-driven, asynchronous paging
//!
//! [`SourceAdapter`] probes each capability once and exposes a uniform
//! reduced interface to the rest of the engine.

use std::sync::Arc;

use prism_view_core::Signal;

use crate::item::ViewItem;

/// A granular change raised by an observable source collection.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceChange<T> {
    /// The collection changed wholesale; re-enumerate.
    Reset,
    /// `item` was inserted at `index`.
    Insert {
        /// Position of the new item.
        index: usize,
        /// The inserted item.
        item: T,
    },
    /// The item at `index` was removed.
    Remove {
        /// Position the item was removed from.
        index: usize,
        /// The removed item.
        item: T,
    },
    /// The item at `index` was replaced.
    Replace {
        /// Position of the replacement.
        index: usize,
        /// The previous item.
        old: T,
        /// The new item.
        new: T,
    },
    /// An item moved from `from` to `to`.
    Move {
        /// Previous position.
        from: usize,
        /// New position.
        to: usize,
        /// The moved item.
        item: T,
    },
}

/// A page request issued to a server-paging source.
///
/// Tokens increase monotonically per view; a response carrying a stale token
/// is discarded (the request was superseded).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// The requested page index.
    pub page_index: usize,
    /// Request token, echoed back in [`PageReady`].
    pub token: u64,
}

/// A fulfilled page delivered by a server-paging source.
#[derive(Debug, Clone, PartialEq)]
pub struct PageReady<T> {
    /// Token of the request being answered.
    pub token: u64,
    /// The page that was loaded.
    pub page_index: usize,
    /// Items of the loaded page.
    pub items: Vec<T>,
    /// Logical total item count reported by the server.
    pub item_count: usize,
}

/// The base contract every source collection provides: enumeration plus
/// capability probes.
///
/// Each `as_*` probe returns `None` by default; concrete sources override
/// the probes for the capabilities they implement.
pub trait CollectionSource<T>: Send + Sync {
    /// Number of items currently in the source.
    fn len(&self) -> usize;

    /// Returns `true` if the source holds no items.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enumerates the source into an owned, ordered vector.
    fn snapshot(&self) -> Vec<T>;

    /// Random access capability, if supported.
    fn as_indexable(&self) -> Option<&dyn Indexable<T>> {
        None
    }

    /// Change notification capability, if supported.
    fn as_notifying(&self) -> Option<&dyn ChangeNotifying<T>> {
        None
    }

    /// List mutation capability, if supported.
    fn as_list_mutable(&self) -> Option<&dyn ListMutable<T>> {
        None
    }

    /// Server-side paging capability, if supported.
    fn as_server_pageable(&self) -> Option<&dyn ServerPageable<T>> {
        None
    }
}

/// Random access by position.
pub trait Indexable<T> {
    /// Returns the item at `index`, or `None` past the end.
    fn item_at(&self, index: usize) -> Option<T>;

    /// Returns the position of `item`, or `None` if absent.
    fn index_of(&self, item: &T) -> Option<usize>;
}

/// Granular change notification.
pub trait ChangeNotifying<T> {
    /// The change stream. One signal per structural change; `Reset` when the
    /// collection changed wholesale.
    fn changes(&self) -> &Signal<SourceChange<T>>;
}

/// Collection-level add/remove/replace.
pub trait ListMutable<T> {
    /// Whether mutation is currently refused (fixed-size or read-only).
    fn is_read_only(&self) -> bool {
        false
    }

    /// Appends an item at the end.
    fn push(&self, item: T);

    /// Inserts an item at `index`.
    fn insert(&self, index: usize, item: T);

    /// Removes and returns the item at `index`, or `None` past the end.
    fn remove_at(&self, index: usize) -> Option<T>;

    /// Replaces the item at `index`, returning the previous one.
    fn replace_at(&self, index: usize, item: T) -> Option<T>;
}

/// Source-driven paging: the source, not the engine, decides page contents
/// and confirms page changes asynchronously.
pub trait ServerPageable<T> {
    /// Whether the source currently accepts page changes.
    fn can_change_page(&self) -> bool;

    /// The source's page size.
    fn page_size(&self) -> usize;

    /// Logical total item count, which may exceed locally available data.
    fn item_count(&self) -> usize;

    /// The page the source starts on.
    fn start_page_index(&self) -> isize;

    /// Requests a page. Completion arrives on [`page_ready`](Self::page_ready).
    fn request_page(&self, request: PageRequest);

    /// Acknowledgment stream for fulfilled page requests.
    fn page_ready(&self) -> &Signal<PageReady<T>>;
}

/// Wraps the caller-supplied collection and exposes the uniform reduced
/// interface used by the rest of the engine.
pub struct SourceAdapter<T> {
    source: Arc<dyn CollectionSource<T>>,
}

impl<T: ViewItem> SourceAdapter<T> {
    /// Wraps a source collection.
    pub fn new(source: Arc<dyn CollectionSource<T>>) -> Self {
        Self { source }
    }

    /// The wrapped source.
    pub fn source(&self) -> &Arc<dyn CollectionSource<T>> {
        &self.source
    }

    /// Number of items in the source.
    pub fn len(&self) -> usize {
        self.source.len()
    }

    /// Returns `true` if the source holds no items.
    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    /// Returns the item at `index`, using indexed access when available and
    /// falling back to enumeration otherwise.
    pub fn item_at(&self, index: usize) -> Option<T> {
        match self.source.as_indexable() {
            Some(indexable) => indexable.item_at(index),
            None => self.source.snapshot().into_iter().nth(index),
        }
    }

    /// Returns the position of `item` in the source.
    pub fn index_of(&self, item: &T) -> Option<usize> {
        match self.source.as_indexable() {
            Some(indexable) => indexable.index_of(item),
            None => self.source.snapshot().iter().position(|other| other == item),
        }
    }

    /// Returns `true` if the source contains `item`.
    pub fn contains(&self, item: &T) -> bool {
        self.index_of(item).is_some()
    }

    /// Whether the source raises change notifications.
    pub fn supports_change_notification(&self) -> bool {
        self.source.as_notifying().is_some()
    }

    /// Whether the source supports random access.
    pub fn supports_indexing(&self) -> bool {
        self.source.as_indexable().is_some()
    }

    /// Whether the source supports add/remove and is not read-only.
    pub fn supports_add_remove(&self) -> bool {
        self.source
            .as_list_mutable()
            .is_some_and(|mutable| !mutable.is_read_only())
    }

    /// Whether items can be replaced in place.
    pub fn supports_replace(&self) -> bool {
        self.supports_add_remove()
    }

    /// Whether the source drives its own paging.
    pub fn supports_server_paging(&self) -> bool {
        self.source.as_server_pageable().is_some()
    }

    /// The change-notification capability, if present.
    pub fn notifying(&self) -> Option<&dyn ChangeNotifying<T>> {
        self.source.as_notifying()
    }

    /// The server-paging capability, if present.
    pub fn server_pageable(&self) -> Option<&dyn ServerPageable<T>> {
        self.source.as_server_pageable()
    }

    /// Appends to the source. Returns `false` when mutation is unsupported.
    pub fn push(&self, item: T) -> bool {
        match self.source.as_list_mutable() {
            Some(mutable) if !mutable.is_read_only() => {
                mutable.push(item);
                true
            }
            _ => false,
        }
    }

    /// Removes the item at `index` from the source.
    pub fn remove_at(&self, index: usize) -> Option<T> {
        match self.source.as_list_mutable() {
            Some(mutable) if !mutable.is_read_only() => mutable.remove_at(index),
            _ => None,
        }
    }

    /// Replaces the item at `index` in the source.
    pub fn replace_at(&self, index: usize, item: T) -> Option<T> {
        match self.source.as_list_mutable() {
            Some(mutable) if !mutable.is_read_only() => mutable.replace_at(index, item),
            _ => None,
        }
    }
}

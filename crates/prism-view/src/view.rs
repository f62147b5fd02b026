//! The collection view engine.
//!
//! [`CollectionView`] presents a caller-supplied source collection through
//! a fixed transformation pipeline: snapshot, filter, sort, group, page.
//! The flattened result is windowed by the pager; all indices and the
//! current position are relative to the visible page.
//!
//! Mutating operations collect their notifications under the state lock
//! and emit them afterwards through a single-flight queue, so a handler
//! that mutates the view re-enters cleanly: its notifications coalesce
//! into the in-flight dispatch pass.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use prism_view::{CollectionView, SortDescription, VecSource};
//!
//! let source = Arc::new(VecSource::new(vec![3, 1, 2]));
//! let view = CollectionView::new(source);
//!
//! view.set_sort_descriptions(vec![SortDescription::ascending("value", |n: &i32| {
//!     (*n).into()
//! })])
//! .unwrap();
//!
//! assert_eq!(view.items(), vec![1, 2, 3]);
//! assert_eq!(view.current_item(), Some(1));
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::currency::{CurrencyState, Resync};
use crate::descriptions::{GroupDescription, SortDescription};
use crate::error::{ViewError, ViewResult};
use crate::filter::{FilterFn, FilterState};
use crate::group::{GroupChange, GroupTree, GroupView};
use crate::item::ViewItem;
use crate::notify::{CollectionChange, CurrentChanging, Note, ViewProperty, ViewSignals};
use crate::pager::PageState;
use crate::snapshot::Snapshot;
use crate::sort::SortState;
use crate::source::{CollectionSource, PageReady, PageRequest, SourceAdapter, SourceChange};
use crate::transaction::Transaction;

/// State behind the view's lock.
struct Inner<T: ViewItem> {
    snapshot: Snapshot<T>,
    filter: FilterState<T>,
    sort: SortState<T>,
    group_descriptions: Vec<GroupDescription<T>>,
    tree: Option<GroupTree<T>>,
    /// Flattened post-pipeline sequence the pager windows.
    view_seq: Vec<T>,
    pager: PageState,
    currency: CurrencyState<T>,
    transaction: Option<Transaction<T>>,
    defer_depth: usize,
    defer_dirty: bool,
    /// Notifications produced by configuration changes inside a deferral
    /// scope, replayed at scope exit ahead of the single recompute burst.
    deferred_notes: Vec<Note<T>>,
    culture: String,
    data_sorted: bool,
    data_in_group_order: bool,
}

/// Converts a position in the group tree's flattened order into a view
/// sequence index. They differ by one slot while a provisional `add_new`
/// item (which is never in the tree) sits at or before the position.
fn tree_flat_to_view<T: ViewItem>(transaction: &Option<Transaction<T>>, flat: usize) -> usize {
    match transaction {
        Some(Transaction::Add { position, .. }) if *position <= flat => flat + 1,
        _ => flat,
    }
}

/// A filterable, sortable, groupable, pageable view over a source
/// collection, with currency tracking and add/edit transactions.
///
/// Views are shared handles: construction returns an `Arc` so signal
/// subscriptions can hold weak references back to the view.
pub struct CollectionView<T: ViewItem> {
    adapter: SourceAdapter<T>,
    signals: ViewSignals<T>,
    inner: Mutex<Inner<T>>,
    queued: Mutex<VecDeque<Note<T>>>,
    emitting: AtomicBool,
    /// Set while the view itself mutates the source, so its own change
    /// notifications are not processed a second time.
    self_mutating: AtomicBool,
}

impl<T: ViewItem> CollectionView<T> {
    /// Creates a view over `source`.
    ///
    /// The initial pipeline pass runs immediately and currency lands on
    /// the first visible item (or before-first when the view is empty).
    pub fn new(source: Arc<dyn CollectionSource<T>>) -> Arc<Self> {
        Self::with_data_shape(source, false, false)
    }

    /// Creates a view with declared source data shape.
    ///
    /// `data_sorted` promises the source data already arrives in sort
    /// description order, so refreshes skip the sort pass.
    /// `data_in_group_order` promises it arrives ordered by the group key
    /// sequence, enabling the single-pass group build (only used while no
    /// sort is active, since sorting restores a known order anyway).
    pub fn with_data_shape(
        source: Arc<dyn CollectionSource<T>>,
        data_sorted: bool,
        data_in_group_order: bool,
    ) -> Arc<Self> {
        let adapter = SourceAdapter::new(source);
        let mut pager = PageState::new();
        if let Some(pageable) = adapter.server_pageable() {
            pager.configure_server(
                pageable.page_size(),
                pageable.item_count(),
                pageable.start_page_index(),
            );
        }

        let view = Arc::new(Self {
            adapter,
            signals: ViewSignals::new(),
            inner: Mutex::new(Inner {
                snapshot: Snapshot::new(),
                filter: FilterState::new(),
                sort: SortState::new(),
                group_descriptions: Vec::new(),
                tree: None,
                view_seq: Vec::new(),
                pager,
                currency: CurrencyState::new(),
                transaction: None,
                defer_depth: 0,
                defer_dirty: false,
                deferred_notes: Vec::new(),
                culture: "en-US".to_string(),
                data_sorted,
                data_in_group_order,
            }),
            queued: Mutex::new(VecDeque::new()),
            emitting: AtomicBool::new(false),
            self_mutating: AtomicBool::new(false),
        });

        // Initial pass. Nothing is subscribed yet, so the notes are
        // discarded rather than dispatched.
        {
            let mut inner = view.inner.lock();
            let mut notes = Vec::new();
            view.recompute(&mut inner, &mut notes);
            let window = inner.pager.window(inner.view_seq.len());
            if !window.is_empty() {
                let first = inner.view_seq[window.start].clone();
                inner.currency.set(0, Some(first));
            }
        }

        if let Some(notifying) = view.adapter.notifying() {
            let weak = Arc::downgrade(&view);
            notifying.changes().connect(move |change| {
                if let Some(view) = weak.upgrade() {
                    view.on_source_changed(change);
                }
            });
        }
        if let Some(pageable) = view.adapter.server_pageable() {
            let weak = Arc::downgrade(&view);
            pageable.page_ready().connect(move |response| {
                if let Some(view) = weak.upgrade() {
                    view.on_page_ready(response);
                }
            });
        }

        view
    }

    /// The view's notification surface.
    pub fn signals(&self) -> &ViewSignals<T> {
        &self.signals
    }

    // ----- reads ---------------------------------------------------------

    /// Number of items on the current page.
    pub fn count(&self) -> usize {
        let inner = self.inner.lock();
        inner.pager.window(inner.view_seq.len()).len()
    }

    /// Returns `true` when the current page holds no items.
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Logical item count across all pages (after filtering).
    pub fn item_count(&self) -> usize {
        self.inner.lock().pager.item_count()
    }

    /// Returns the item at page-relative `index`.
    pub fn item_at(&self, index: usize) -> ViewResult<T> {
        let inner = self.inner.lock();
        if inner.defer_depth > 0 {
            return Err(ViewError::RefreshDeferred { operation: "item_at" });
        }
        let window = inner.pager.window(inner.view_seq.len());
        if index >= window.len() {
            return Err(ViewError::IndexOutOfRange {
                parameter: "index",
                index,
                len: window.len(),
            });
        }
        Ok(inner.view_seq[window.start + index].clone())
    }

    /// Page-relative position of `item`, or `None` if it is not on the
    /// current page.
    pub fn index_of(&self, item: &T) -> Option<usize> {
        let inner = self.inner.lock();
        let window = inner.pager.window(inner.view_seq.len());
        inner.view_seq[window].iter().position(|other| other == item)
    }

    /// Whether `item` is on the current page.
    pub fn contains(&self, item: &T) -> bool {
        self.index_of(item).is_some()
    }

    /// The current page's items, in view order.
    pub fn items(&self) -> Vec<T> {
        let inner = self.inner.lock();
        let window = inner.pager.window(inner.view_seq.len());
        inner.view_seq[window].to_vec()
    }

    /// Iterates the current page's items.
    pub fn iter(&self) -> std::vec::IntoIter<T> {
        self.items().into_iter()
    }

    /// The top-level groups, or `None` while grouping is inactive.
    pub fn groups(&self) -> Option<Vec<GroupView<T>>> {
        self.inner.lock().tree.as_ref().map(|tree| tree.to_views())
    }

    /// Whether `item` passes the current filter.
    pub fn passes_filter(&self, item: &T) -> bool {
        self.inner.lock().filter.passes(item)
    }

    /// Whether a filter predicate is set.
    pub fn has_filter(&self) -> bool {
        self.inner.lock().filter.is_active()
    }

    /// The active culture tag (BCP-47).
    pub fn culture(&self) -> String {
        self.inner.lock().culture.clone()
    }

    /// Views always support filtering.
    pub fn can_filter(&self) -> bool {
        true
    }

    /// Views always support sorting.
    pub fn can_sort(&self) -> bool {
        true
    }

    /// Views always support grouping.
    pub fn can_group(&self) -> bool {
        true
    }

    // ----- configuration -------------------------------------------------

    /// Sets the filter predicate and recomputes.
    pub fn set_filter<F>(&self, predicate: F) -> ViewResult<()>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let predicate: FilterFn<T> = Arc::new(predicate);
        self.apply_config("set_filter", move |inner| {
            inner.filter.set(Some(predicate));
            vec![Note::Property(ViewProperty::Filter)]
        })
    }

    /// Clears the filter predicate and recomputes.
    pub fn clear_filter(&self) -> ViewResult<()> {
        self.apply_config("clear_filter", |inner| {
            inner.filter.set(None);
            vec![Note::Property(ViewProperty::Filter)]
        })
    }

    /// The active sort descriptions.
    pub fn sort_descriptions(&self) -> Vec<SortDescription<T>> {
        self.inner.lock().sort.descriptions().to_vec()
    }

    /// Replaces the sort description chain and recomputes.
    pub fn set_sort_descriptions(&self, descriptions: Vec<SortDescription<T>>) -> ViewResult<()> {
        self.apply_config("set_sort_descriptions", move |inner| {
            inner.sort.set(descriptions);
            vec![Note::Property(ViewProperty::SortDescriptions)]
        })
    }

    /// Appends a sort description and recomputes.
    pub fn add_sort_description(&self, description: SortDescription<T>) -> ViewResult<()> {
        self.apply_config("add_sort_description", move |inner| {
            inner.sort.push(description);
            vec![Note::Property(ViewProperty::SortDescriptions)]
        })
    }

    /// Removes the sort description at `index` and recomputes.
    pub fn remove_sort_description(&self, index: usize) -> ViewResult<()> {
        let len = self.inner.lock().sort.descriptions().len();
        if index >= len {
            return Err(ViewError::IndexOutOfRange {
                parameter: "index",
                index,
                len,
            });
        }
        self.apply_config("remove_sort_description", move |inner| {
            inner.sort.remove(index);
            vec![Note::Property(ViewProperty::SortDescriptions)]
        })
    }

    /// Clears the sort description chain and recomputes.
    pub fn clear_sort_descriptions(&self) -> ViewResult<()> {
        self.apply_config("clear_sort_descriptions", |inner| {
            inner.sort.clear();
            vec![Note::Property(ViewProperty::SortDescriptions)]
        })
    }

    /// The active group descriptions.
    pub fn group_descriptions(&self) -> Vec<GroupDescription<T>> {
        self.inner.lock().group_descriptions.clone()
    }

    /// Replaces the group description chain and recomputes.
    pub fn set_group_descriptions(
        &self,
        descriptions: Vec<GroupDescription<T>>,
    ) -> ViewResult<()> {
        self.apply_config("set_group_descriptions", move |inner| {
            inner.group_descriptions = descriptions;
            vec![
                Note::Property(ViewProperty::GroupDescriptions),
                Note::Group(GroupChange::Reset),
            ]
        })
    }

    /// Appends a group description and recomputes.
    pub fn add_group_description(&self, description: GroupDescription<T>) -> ViewResult<()> {
        self.apply_config("add_group_description", move |inner| {
            inner.group_descriptions.push(description);
            vec![
                Note::Property(ViewProperty::GroupDescriptions),
                Note::Group(GroupChange::Reset),
            ]
        })
    }

    /// Clears the group description chain and recomputes.
    pub fn clear_group_descriptions(&self) -> ViewResult<()> {
        self.apply_config("clear_group_descriptions", |inner| {
            inner.group_descriptions.clear();
            vec![
                Note::Property(ViewProperty::GroupDescriptions),
                Note::Group(GroupChange::Reset),
            ]
        })
    }

    /// Sets the culture tag used by key comparisons and recomputes.
    ///
    /// The tag must be a non-empty BCP-47 identifier.
    pub fn set_culture(&self, culture: &str) -> ViewResult<()> {
        if culture.is_empty() {
            return Err(ViewError::EmptyCulture);
        }
        let culture = culture.to_string();
        self.apply_config("set_culture", move |inner| {
            inner.culture = culture;
            vec![Note::Property(ViewProperty::Culture)]
        })
    }

    /// Re-runs the full pipeline from the source.
    pub fn refresh(&self) -> ViewResult<()> {
        self.mutate(|view, inner, notes| {
            view.guard_mutation(inner, "refresh")?;
            inner.snapshot.invalidate();
            view.recompute(inner, notes);
            Ok(())
        })
    }

    /// Opens a deferred-refresh scope.
    ///
    /// While at least one [`RefreshDeferral`] is alive, configuration
    /// changes accumulate without recomputing; dropping the last guard
    /// runs one recompute and one notification burst. Scopes nest.
    pub fn defer_refresh(self: &Arc<Self>) -> ViewResult<RefreshDeferral<T>> {
        let mut inner = self.inner.lock();
        if let Some(transaction) = &inner.transaction {
            return Err(ViewError::TransactionPending {
                operation: "defer_refresh",
                pending: transaction.name(),
            });
        }
        inner.defer_depth += 1;
        Ok(RefreshDeferral {
            view: Arc::clone(self),
        })
    }

    // ----- currency ------------------------------------------------------

    /// The current item, if the current position points at one.
    pub fn current_item(&self) -> Option<T> {
        self.inner.lock().currency.item()
    }

    /// The page-relative current position, in `[-1, count]`.
    pub fn current_position(&self) -> isize {
        self.inner.lock().currency.position()
    }

    /// Whether currency is before the first item.
    pub fn is_current_before_first(&self) -> bool {
        self.inner.lock().currency.is_before_first()
    }

    /// Whether currency is past the last item.
    pub fn is_current_after_last(&self) -> bool {
        let inner = self.inner.lock();
        let count = inner.pager.window(inner.view_seq.len()).len();
        inner.currency.is_after_last(count)
    }

    /// Moves currency to a page-relative position in `[-1, count]`.
    ///
    /// Returns `Ok(true)` when currency ends on an item. Positions outside
    /// the legal range are an error.
    pub fn move_current_to_position(&self, position: isize) -> ViewResult<bool> {
        let count = {
            let inner = self.inner.lock();
            if inner.defer_depth > 0 {
                return Err(ViewError::RefreshDeferred {
                    operation: "move_current_to_position",
                });
            }
            inner.pager.window(inner.view_seq.len()).len() as isize
        };
        if position < -1 || position > count {
            return Err(ViewError::PositionOutOfRange {
                parameter: "position",
                value: position,
                min: -1,
                max: count,
            });
        }
        if count == 0 {
            // An empty page has no after-last state; currency stays
            // before-first.
            self.move_current_core(-1);
            return Ok(false);
        }
        Ok(self.move_current_core(position))
    }

    /// Moves currency to `item` on the current page.
    ///
    /// When the item is not on the page, currency moves before-first and
    /// `Ok(false)` is returned.
    pub fn move_current_to(&self, item: &T) -> ViewResult<bool> {
        let found = {
            let inner = self.inner.lock();
            if inner.defer_depth > 0 {
                return Err(ViewError::RefreshDeferred {
                    operation: "move_current_to",
                });
            }
            let window = inner.pager.window(inner.view_seq.len());
            inner.view_seq[window].iter().position(|other| other == item)
        };
        match found {
            Some(position) => Ok(self.move_current_core(position as isize)),
            None => {
                self.move_current_core(-1);
                Ok(false)
            }
        }
    }

    /// Moves currency to the first item of the page.
    pub fn move_current_to_first(&self) -> ViewResult<bool> {
        let count = self.guarded_page_len("move_current_to_first")?;
        if count == 0 {
            self.move_current_core(-1);
            return Ok(false);
        }
        Ok(self.move_current_core(0))
    }

    /// Moves currency to the last item of the page.
    pub fn move_current_to_last(&self) -> ViewResult<bool> {
        let count = self.guarded_page_len("move_current_to_last")?;
        if count == 0 {
            self.move_current_core(-1);
            return Ok(false);
        }
        Ok(self.move_current_core(count as isize - 1))
    }

    /// Moves currency one position forward; lands after-last at the end.
    pub fn move_current_to_next(&self) -> ViewResult<bool> {
        let count = self.guarded_page_len("move_current_to_next")? as isize;
        if count == 0 {
            self.move_current_core(-1);
            return Ok(false);
        }
        let target = (self.current_position() + 1).min(count);
        Ok(self.move_current_core(target))
    }

    /// Moves currency one position back; lands before-first at the start.
    pub fn move_current_to_previous(&self) -> ViewResult<bool> {
        let count = self.guarded_page_len("move_current_to_previous")?;
        if count == 0 {
            self.move_current_core(-1);
            return Ok(false);
        }
        let target = (self.current_position() - 1).max(-1);
        Ok(self.move_current_core(target))
    }

    // ----- paging --------------------------------------------------------

    /// The page size; zero means paging is disabled.
    pub fn page_size(&self) -> usize {
        self.inner.lock().pager.page_size()
    }

    /// The current page index, or -1 while no page is established.
    pub fn page_index(&self) -> isize {
        self.inner.lock().pager.page_index()
    }

    /// Total pages at the current size and count.
    pub fn page_count(&self) -> usize {
        self.inner.lock().pager.page_count()
    }

    /// Whether a server page move is awaiting confirmation.
    pub fn is_page_changing(&self) -> bool {
        self.inner.lock().pager.is_page_changing()
    }

    /// Whether page moves are currently possible.
    pub fn can_change_page(&self) -> bool {
        let inner = self.inner.lock();
        if inner.pager.is_server() {
            !inner.pager.is_page_changing()
                && self
                    .adapter
                    .server_pageable()
                    .is_some_and(|pageable| pageable.can_change_page())
        } else {
            inner.pager.page_size() > 0
        }
    }

    /// Changes the page size and recomputes.
    ///
    /// Enabling or resizing paging re-anchors on the first page when items
    /// exist; size zero disables paging.
    pub fn set_page_size(&self, page_size: usize) -> ViewResult<()> {
        self.apply_config("set_page_size", move |inner| {
            inner.pager.set_page_size(page_size);
            vec![
                Note::Property(ViewProperty::PageSize),
                Note::Property(ViewProperty::PageIndex),
                Note::PageChanged(inner.pager.page_index()),
            ]
        })
    }

    /// Moves to `page_index`.
    ///
    /// Returns `Ok(false)` without effect when the target does not exist,
    /// paging is disabled, a server move is already in flight, or the view
    /// is already on the target page. Server-paged moves return `Ok(true)`
    /// once the request is issued; the index is finalized when the source
    /// confirms.
    pub fn move_to_page(&self, page_index: isize) -> ViewResult<bool> {
        enum Decision {
            Refused,
            Local,
            Server(u64, usize),
        }

        let decision = {
            let mut inner = self.inner.lock();
            self.guard_mutation(&inner, "move_to_page")?;
            if inner.pager.is_page_changing()
                || page_index == inner.pager.page_index()
                || !inner.pager.is_valid_target(page_index)
            {
                Decision::Refused
            } else if inner.pager.is_server() {
                match self.adapter.server_pageable() {
                    Some(pageable) if pageable.can_change_page() => {
                        let token = inner.pager.begin_server_move();
                        Decision::Server(token, page_index as usize)
                    }
                    _ => Decision::Refused,
                }
            } else {
                Decision::Local
            }
        };

        match decision {
            Decision::Refused => Ok(false),
            Decision::Server(token, target) => {
                self.dispatch(vec![Note::Property(ViewProperty::IsPageChanging)]);
                tracing::debug!(
                    target: "prism_view::pager",
                    page = target,
                    token,
                    "requesting server page"
                );
                if let Some(pageable) = self.adapter.server_pageable() {
                    pageable.request_page(PageRequest {
                        page_index: target,
                        token,
                    });
                }
                Ok(true)
            }
            Decision::Local => {
                self.mutate(|view, inner, notes| {
                    let old_count = inner.pager.window(inner.view_seq.len()).len();
                    let old_item_count = inner.pager.item_count();
                    inner.pager.set_page_index(page_index);
                    notes.push(Note::Property(ViewProperty::PageIndex));
                    notes.push(Note::PageChanged(page_index));
                    notes.push(Note::Collection(CollectionChange::Reset));
                    view.push_count_notes(inner, notes, old_count, old_item_count);
                    view.resync_currency(inner, notes);
                });
                Ok(true)
            }
        }
    }

    /// Moves to the first page.
    pub fn move_to_first_page(&self) -> ViewResult<bool> {
        self.move_to_page(0)
    }

    /// Moves to the previous page.
    pub fn move_to_previous_page(&self) -> ViewResult<bool> {
        let current = self.page_index();
        self.move_to_page(current - 1)
    }

    /// Moves to the next page.
    pub fn move_to_next_page(&self) -> ViewResult<bool> {
        let current = self.page_index();
        self.move_to_page(current + 1)
    }

    /// Moves to the last page.
    pub fn move_to_last_page(&self) -> ViewResult<bool> {
        let target = self.page_count() as isize - 1;
        if target < 0 {
            return Ok(false);
        }
        self.move_to_page(target)
    }

    // ----- transactions --------------------------------------------------

    /// Whether an `add_new` transaction is open.
    pub fn is_adding_new(&self) -> bool {
        self.inner
            .lock()
            .transaction
            .as_ref()
            .is_some_and(|transaction| transaction.is_add())
    }

    /// Whether an `edit_item` transaction is open.
    pub fn is_editing_item(&self) -> bool {
        self.inner
            .lock()
            .transaction
            .as_ref()
            .is_some_and(|transaction| transaction.is_edit())
    }

    /// The provisional item of the open `add_new` transaction.
    pub fn current_add_item(&self) -> Option<T> {
        match &self.inner.lock().transaction {
            Some(Transaction::Add { item, .. }) => Some(item.clone()),
            _ => None,
        }
    }

    /// The item of the open `edit_item` transaction.
    pub fn current_edit_item(&self) -> Option<T> {
        match &self.inner.lock().transaction {
            Some(Transaction::Edit { item, .. }) => Some(item.clone()),
            _ => None,
        }
    }

    /// Whether `add_new` would currently succeed.
    pub fn can_add_new(&self) -> bool {
        self.inner.lock().transaction.is_none()
            && self.adapter.supports_add_remove()
            && T::create_new().is_some()
    }

    /// Whether `remove` would currently succeed.
    pub fn can_remove(&self) -> bool {
        self.inner.lock().transaction.is_none() && self.adapter.supports_add_remove()
    }

    /// Whether the open edit transaction could be rolled back.
    pub fn can_cancel_edit(&self) -> bool {
        match &self.inner.lock().transaction {
            Some(Transaction::Edit {
                item,
                original,
                uses_protocol,
            }) => {
                *uses_protocol
                    || (original.is_some()
                        && (item.supports_restore() || self.adapter.supports_replace()))
            }
            _ => false,
        }
    }

    /// Opens an add transaction: a blank item is appended to the source
    /// and provisionally placed at the end of the current page, exempt
    /// from filter, sort, and group placement until committed. Currency
    /// moves to the provisional item.
    pub fn add_new(&self) -> ViewResult<T> {
        {
            let inner = self.inner.lock();
            self.guard_mutation(&inner, "add_new")?;
        }
        if !self.adapter.supports_add_remove() {
            return Err(ViewError::NotSupported {
                operation: "add_new",
            });
        }
        let Some(item) = T::create_new() else {
            return Err(ViewError::NotSupported {
                operation: "add_new",
            });
        };

        self.mutate_source(|| {
            self.adapter.push(item.clone());
        });

        self.mutate(|view, inner, notes| {
            let source_index = view.adapter.len().saturating_sub(1);
            inner.snapshot.apply(&SourceChange::Insert {
                index: source_index,
                item: item.clone(),
            });

            // Provisional placement: the last slot of the current page,
            // displacing the page's last item when the page is full.
            let window = inner.pager.window(inner.view_seq.len());
            let page_size = inner.pager.page_size();
            let flat = if page_size > 0 && window.len() == page_size {
                window.end - 1
            } else {
                window.end
            };
            view.splice_insert(inner, notes, flat, item.clone());

            if item.has_edit_protocol() {
                item.begin_edit();
            }
            inner.transaction = Some(Transaction::Add {
                item: item.clone(),
                position: flat,
            });

            let window = inner.pager.window(inner.view_seq.len());
            inner
                .currency
                .set((flat - window.start) as isize, Some(item.clone()));
            notes.push(Note::CurrentChanging);
            self.push_currency_notes(notes);
            notes.push(Note::CurrentChanged(Some(item.clone())));
            notes.push(Note::Property(ViewProperty::IsAddingNew));
            notes.push(Note::Property(ViewProperty::CanAddNew));
            notes.push(Note::Property(ViewProperty::CanRemove));
        });

        tracing::debug!(target: "prism_view::transaction", "add_new opened");
        Ok(item)
    }

    /// Commits the open add transaction: the item takes its real pipeline
    /// placement (or leaves the view if the filter rejects it).
    ///
    /// A no-op when no add transaction is open.
    pub fn commit_new(&self) -> ViewResult<()> {
        self.mutate(|view, inner, notes| {
            if matches!(&inner.transaction, Some(Transaction::Edit { .. })) {
                return Err(ViewError::TransactionPending {
                    operation: "commit_new",
                    pending: "EditItem",
                });
            }
            let Some(Transaction::Add { item, position }) = inner.transaction.take() else {
                return Ok(());
            };
            if item.has_edit_protocol() {
                item.end_edit();
            }

            let flat = if inner.view_seq.get(position) == Some(&item) {
                Some(position)
            } else {
                inner.view_seq.iter().position(|other| *other == item)
            };
            if let Some(flat) = flat {
                view.splice_remove(inner, notes, flat);
            }
            if inner.filter.passes(&item) {
                let source_index = inner.snapshot.index_of(&view.adapter, &item);
                view.incremental_insert(inner, notes, &item, source_index);
            }
            view.resync_currency(inner, notes);
            notes.push(Note::Property(ViewProperty::IsAddingNew));
            notes.push(Note::Property(ViewProperty::CanAddNew));
            notes.push(Note::Property(ViewProperty::CanRemove));
            tracing::debug!(target: "prism_view::transaction", "add_new committed");
            Ok(())
        })
    }

    /// Cancels the open add transaction: the provisional item is removed
    /// from the view and from the source.
    ///
    /// A no-op when no add transaction is open.
    pub fn cancel_new(&self) -> ViewResult<()> {
        let item = self.mutate(|view, inner, notes| {
            if matches!(&inner.transaction, Some(Transaction::Edit { .. })) {
                return Err(ViewError::TransactionPending {
                    operation: "cancel_new",
                    pending: "EditItem",
                });
            }
            let Some(Transaction::Add { item, position }) = inner.transaction.take() else {
                return Ok(None);
            };

            let flat = if inner.view_seq.get(position) == Some(&item) {
                Some(position)
            } else {
                inner.view_seq.iter().position(|other| *other == item)
            };
            if let Some(flat) = flat {
                view.splice_remove(inner, notes, flat);
            }
            view.resync_currency(inner, notes);
            notes.push(Note::Property(ViewProperty::IsAddingNew));
            notes.push(Note::Property(ViewProperty::CanAddNew));
            notes.push(Note::Property(ViewProperty::CanRemove));
            Ok(Some(item))
        })?;

        let Some(item) = item else {
            return Ok(());
        };
        if item.has_edit_protocol() {
            item.cancel_edit();
        }
        if let Some(index) = self.adapter.index_of(&item) {
            self.mutate_source(|| {
                self.adapter.remove_at(index);
            });
            self.mutate(|_view, inner, _notes| {
                inner.snapshot.apply(&SourceChange::Remove {
                    index,
                    item: item.clone(),
                });
            });
        }
        tracing::debug!(target: "prism_view::transaction", "add_new canceled");
        Ok(())
    }

    /// Opens an edit transaction on `item`.
    ///
    /// Items carrying their own edit protocol get `begin_edit`; otherwise
    /// the view captures a pre-edit copy for rollback.
    pub fn edit_item(&self, item: &T) -> ViewResult<()> {
        self.mutate(|view, inner, notes| {
            if item.is_placeholder() {
                return Err(ViewError::EditPlaceholder);
            }
            view.guard_mutation(inner, "edit_item")?;
            if !inner.snapshot.contains(&view.adapter, item) {
                return Err(ViewError::ItemNotInView);
            }

            let uses_protocol = item.has_edit_protocol();
            let original = if uses_protocol {
                item.begin_edit();
                None
            } else {
                Some(item.clone())
            };
            inner.transaction = Some(Transaction::Edit {
                item: item.clone(),
                original,
                uses_protocol,
            });
            notes.push(Note::Property(ViewProperty::IsEditingItem));
            notes.push(Note::Property(ViewProperty::CanCancelEdit));
            notes.push(Note::Property(ViewProperty::CanAddNew));
            notes.push(Note::Property(ViewProperty::CanRemove));
            Ok(())
        })
    }

    /// Commits the open edit transaction and re-evaluates the item's
    /// placement: it may move under the active sort, change groups, or
    /// leave the view if the filter now rejects it.
    ///
    /// A no-op when no edit transaction is open.
    pub fn commit_edit(&self) -> ViewResult<()> {
        self.mutate(|view, inner, notes| {
            if matches!(&inner.transaction, Some(Transaction::Add { .. })) {
                return Err(ViewError::TransactionPending {
                    operation: "commit_edit",
                    pending: "AddNew",
                });
            }
            let Some(Transaction::Edit {
                item,
                uses_protocol,
                ..
            }) = inner.transaction.take()
            else {
                return Ok(());
            };
            if uses_protocol {
                item.end_edit();
            }

            if view.incremental_remove(inner, notes, &item) && inner.filter.passes(&item) {
                let source_index = inner.snapshot.index_of(&view.adapter, &item);
                view.incremental_insert(inner, notes, &item, source_index);
            }
            view.resync_currency(inner, notes);
            notes.push(Note::Property(ViewProperty::IsEditingItem));
            notes.push(Note::Property(ViewProperty::CanCancelEdit));
            notes.push(Note::Property(ViewProperty::CanAddNew));
            notes.push(Note::Property(ViewProperty::CanRemove));
            tracing::debug!(target: "prism_view::transaction", "edit committed");
            Ok(())
        })
    }

    /// Cancels the open edit transaction, rolling the item back through
    /// its own protocol, an in-place restore, or a source-level replace.
    ///
    /// Fails with [`ViewError::CancelNotSupported`] (leaving the
    /// transaction open) when no rollback mechanism is available. A no-op
    /// when no edit transaction is open.
    pub fn cancel_edit(&self) -> ViewResult<()> {
        enum Rollback<T> {
            Protocol(T),
            Restore(T, T),
            Replace(T, T),
        }

        let rollback = self.mutate(|view, inner, notes| {
            if matches!(&inner.transaction, Some(Transaction::Add { .. })) {
                return Err(ViewError::TransactionPending {
                    operation: "cancel_edit",
                    pending: "AddNew",
                });
            }
            let Some(Transaction::Edit {
                item,
                original,
                uses_protocol,
            }) = inner.transaction.take()
            else {
                return Ok(None);
            };

            let rollback = if uses_protocol {
                Rollback::Protocol(item)
            } else {
                match original {
                    Some(original) if item.supports_restore() => {
                        Rollback::Restore(item, original)
                    }
                    Some(original) if view.adapter.supports_replace() => {
                        Rollback::Replace(item, original)
                    }
                    original => {
                        // No rollback path: the transaction stays open.
                        inner.transaction = Some(Transaction::Edit {
                            item,
                            original,
                            uses_protocol,
                        });
                        return Err(ViewError::CancelNotSupported);
                    }
                }
            };
            notes.push(Note::Property(ViewProperty::IsEditingItem));
            notes.push(Note::Property(ViewProperty::CanCancelEdit));
            notes.push(Note::Property(ViewProperty::CanAddNew));
            notes.push(Note::Property(ViewProperty::CanRemove));
            Ok(Some(rollback))
        })?;

        match rollback {
            None => Ok(()),
            Some(Rollback::Protocol(item)) => {
                item.cancel_edit();
                Ok(())
            }
            Some(Rollback::Restore(item, original)) => {
                item.restore_from(&original);
                Ok(())
            }
            Some(Rollback::Replace(item, original)) => {
                if let Some(index) = self.adapter.index_of(&item) {
                    self.mutate_source(|| {
                        self.adapter.replace_at(index, original.clone());
                    });
                    self.mutate(|view, inner, notes| {
                        inner.snapshot.apply(&SourceChange::Replace {
                            index,
                            old: item.clone(),
                            new: original.clone(),
                        });
                        let source_index = inner.snapshot.index_of(&view.adapter, &original);
                        view.incremental_replace(inner, notes, &item, &original, source_index);
                        view.resync_currency(inner, notes);
                    });
                }
                Ok(())
            }
        }
    }

    /// Removes `item` from the source (and so from the view).
    ///
    /// Removing an item absent from the source is a no-op.
    pub fn remove(&self, item: &T) -> ViewResult<()> {
        if item.is_placeholder() {
            return Err(ViewError::RemovePlaceholder);
        }
        {
            let inner = self.inner.lock();
            self.guard_mutation(&inner, "remove")?;
        }
        if !self.adapter.supports_add_remove() {
            return Err(ViewError::NotSupported {
                operation: "remove",
            });
        }
        let Some(index) = self.adapter.index_of(item) else {
            return Ok(());
        };

        self.mutate_source(|| {
            self.adapter.remove_at(index);
        });
        self.mutate(|view, inner, notes| {
            inner.snapshot.apply(&SourceChange::Remove {
                index,
                item: item.clone(),
            });
            view.incremental_remove(inner, notes, item);
            view.resync_currency(inner, notes);
        });
        Ok(())
    }

    /// Removes the item at page-relative `index`.
    pub fn remove_at(&self, index: usize) -> ViewResult<()> {
        let item = {
            let inner = self.inner.lock();
            let window = inner.pager.window(inner.view_seq.len());
            if index >= window.len() {
                return Err(ViewError::IndexOutOfRange {
                    parameter: "index",
                    index,
                    len: window.len(),
                });
            }
            inner.view_seq[window.start + index].clone()
        };
        self.remove(&item)
    }

    // ----- internals -----------------------------------------------------

    /// Rejects the operation while a transaction is open or refresh is
    /// deferred.
    fn guard_mutation(&self, inner: &Inner<T>, operation: &'static str) -> ViewResult<()> {
        if let Some(transaction) = &inner.transaction {
            return Err(ViewError::TransactionPending {
                operation,
                pending: transaction.name(),
            });
        }
        if inner.defer_depth > 0 {
            return Err(ViewError::RefreshDeferred { operation });
        }
        Ok(())
    }

    fn guarded_page_len(&self, operation: &'static str) -> ViewResult<usize> {
        let inner = self.inner.lock();
        if inner.defer_depth > 0 {
            return Err(ViewError::RefreshDeferred { operation });
        }
        Ok(inner.pager.window(inner.view_seq.len()).len())
    }

    /// Runs `f` under the state lock, then dispatches the notifications it
    /// collected.
    fn mutate<R>(&self, f: impl FnOnce(&Self, &mut Inner<T>, &mut Vec<Note<T>>) -> R) -> R {
        let (result, notes) = {
            let mut inner = self.inner.lock();
            let mut notes = Vec::new();
            let result = f(self, &mut inner, &mut notes);
            (result, notes)
        };
        self.dispatch(notes);
        result
    }

    /// Runs a source mutation issued by the view itself, muting the echo
    /// of its own change notification.
    fn mutate_source(&self, f: impl FnOnce()) {
        self.self_mutating.store(true, Ordering::SeqCst);
        f();
        self.self_mutating.store(false, Ordering::SeqCst);
    }

    /// Single-flight notification dispatch. Notes queued while a dispatch
    /// pass is running (re-entrant mutation from a handler) are drained by
    /// the pass already in flight.
    fn dispatch(&self, notes: Vec<Note<T>>) {
        if !notes.is_empty() {
            self.queued.lock().extend(notes);
        }
        if self.emitting.swap(true, Ordering::SeqCst) {
            return;
        }
        loop {
            let next = self.queued.lock().pop_front();
            match next {
                Some(note) => self.signals.dispatch(note),
                None => {
                    self.emitting.store(false, Ordering::SeqCst);
                    if self.queued.lock().is_empty() {
                        break;
                    }
                    // Raced with a producer: reclaim the pass if nobody
                    // else has.
                    if self.emitting.swap(true, Ordering::SeqCst) {
                        break;
                    }
                }
            }
        }
    }

    /// Transaction-guarded configuration change. Applies immediately and
    /// recomputes, or accumulates inside an open deferral scope.
    fn apply_config(
        &self,
        operation: &'static str,
        configure: impl FnOnce(&mut Inner<T>) -> Vec<Note<T>>,
    ) -> ViewResult<()> {
        self.mutate(|view, inner, notes| {
            if let Some(transaction) = &inner.transaction {
                return Err(ViewError::TransactionPending {
                    operation,
                    pending: transaction.name(),
                });
            }
            let extra = configure(inner);
            if inner.defer_depth > 0 {
                inner.defer_dirty = true;
                inner.deferred_notes.extend(extra);
            } else {
                notes.extend(extra);
                view.recompute(inner, notes);
            }
            Ok(())
        })
    }

    /// Full pipeline pass: snapshot, filter, sort, group, page, currency.
    fn recompute(&self, inner: &mut Inner<T>, notes: &mut Vec<Note<T>>) {
        let old_count = inner.pager.window(inner.view_seq.len()).len();
        let old_item_count = inner.pager.item_count();

        let needs_copy = inner.sort.is_active() || !inner.group_descriptions.is_empty();
        inner.snapshot.ensure(&self.adapter, needs_copy);
        let base = inner.snapshot.to_vec(&self.adapter);
        let mut sequence = inner.filter.apply(&base);
        if !inner.data_sorted {
            inner.sort.apply(&mut sequence);
        }

        if inner.group_descriptions.is_empty() {
            inner.tree = None;
            inner.view_seq = sequence;
        } else {
            let ordered = inner.data_in_group_order && !inner.sort.is_active();
            let tree = GroupTree::build(&inner.group_descriptions, &sequence, ordered);
            inner.view_seq = tree.flatten();
            inner.tree = Some(tree);
        }

        let logical = if inner.pager.is_server() {
            self.adapter
                .server_pageable()
                .map_or(inner.view_seq.len(), |pageable| pageable.item_count())
        } else {
            inner.view_seq.len()
        };
        inner.pager.set_item_count(logical);
        if inner.pager.ensure_in_range() {
            notes.push(Note::Property(ViewProperty::PageIndex));
            notes.push(Note::PageChanged(inner.pager.page_index()));
        }

        notes.push(Note::Collection(CollectionChange::Reset));
        self.push_count_notes(inner, notes, old_count, old_item_count);
        self.resync_currency(inner, notes);
        tracing::debug!(
            target: "prism_view::refresh",
            items = inner.view_seq.len(),
            page = inner.pager.page_index(),
            "view recomputed"
        );
    }

    fn push_count_notes(
        &self,
        inner: &Inner<T>,
        notes: &mut Vec<Note<T>>,
        old_count: usize,
        old_item_count: usize,
    ) {
        let count = inner.pager.window(inner.view_seq.len()).len();
        if count != old_count {
            notes.push(Note::Property(ViewProperty::Count));
        }
        if inner.pager.item_count() != old_item_count {
            notes.push(Note::Property(ViewProperty::ItemCount));
        }
        if (count == 0) != (old_count == 0) {
            notes.push(Note::Property(ViewProperty::IsEmpty));
        }
    }

    fn push_currency_notes(&self, notes: &mut Vec<Note<T>>) {
        notes.push(Note::Property(ViewProperty::CurrentPosition));
        notes.push(Note::Property(ViewProperty::CurrentItem));
        notes.push(Note::Property(ViewProperty::IsCurrentBeforeFirst));
        notes.push(Note::Property(ViewProperty::IsCurrentAfterLast));
    }

    /// Re-synchronizes currency after a structural change.
    ///
    /// If the current item survived on the page, only its position is
    /// corrected (silently, bar a position property note). If it left, the
    /// degenerate move announces itself with non-cancelable changing and
    /// changed events.
    fn resync_currency(&self, inner: &mut Inner<T>, notes: &mut Vec<Note<T>>) {
        let window = inner.pager.window(inner.view_seq.len());
        let page: Vec<T> = inner.view_seq[window].to_vec();
        match inner.currency.resync(&page) {
            Resync::Unchanged => {}
            Resync::Shifted => {
                notes.push(Note::Property(ViewProperty::CurrentPosition));
            }
            Resync::Moved => {
                notes.push(Note::CurrentChanging);
                self.push_currency_notes(notes);
                notes.push(Note::CurrentChanged(inner.currency.item()));
            }
        }
    }

    /// Deliberate (cancelable) currency move to a page-relative position.
    /// Returns whether currency ends on an item.
    fn move_current_core(&self, target: isize) -> bool {
        let (old_position, count, item) = {
            let inner = self.inner.lock();
            let window = inner.pager.window(inner.view_seq.len());
            let count = window.len() as isize;
            let item = if target >= 0 && target < count {
                inner.view_seq.get(window.start + target as usize).cloned()
            } else {
                None
            };
            (inner.currency.position(), count, item)
        };

        if target == old_position {
            return target >= 0 && target < count;
        }

        let args = CurrentChanging::new(true);
        self.signals.current_changing.emit(args.clone());
        if args.is_canceled() {
            tracing::debug!(target: "prism_view::currency", target, "currency move canceled");
            return old_position >= 0 && old_position < count;
        }

        {
            let mut inner = self.inner.lock();
            inner.currency.set(target, item.clone());
        }
        let mut notes = Vec::new();
        self.push_currency_notes(&mut notes);
        notes.push(Note::CurrentChanged(item));
        self.dispatch(notes);

        target >= 0 && target < count
    }

    /// Inserts `item` into the live view at its pipeline placement.
    /// `source_index` (the item's position in the patched snapshot) is
    /// used to preserve source order when no sort or grouping is active.
    fn incremental_insert(
        &self,
        inner: &mut Inner<T>,
        notes: &mut Vec<Note<T>>,
        item: &T,
        source_index: Option<usize>,
    ) {
        if !inner.filter.passes(item) {
            return;
        }

        let grouped = match inner.tree.as_mut() {
            Some(tree) => Some(tree.insert(&inner.group_descriptions, &inner.sort, item)),
            None => None,
        };
        let flat = match grouped {
            Some((tree_flat, group_changes)) => {
                notes.extend(group_changes.into_iter().map(Note::Group));
                tree_flat_to_view(&inner.transaction, tree_flat)
            }
            None if inner.sort.is_active() => inner.sort.insertion_index(&inner.view_seq, item),
            None => match source_index {
                Some(index) => self
                    .filtered_prefix_len(inner, index)
                    .min(inner.view_seq.len()),
                None => inner.view_seq.len(),
            },
        };
        self.splice_insert(inner, notes, flat, item.clone());
    }

    /// Removes `item` from the live view. Returns `false` if it was not
    /// present (filtered out, or never in the view).
    fn incremental_remove(
        &self,
        inner: &mut Inner<T>,
        notes: &mut Vec<Note<T>>,
        item: &T,
    ) -> bool {
        let grouped = match inner.tree.as_mut() {
            Some(tree) => Some(tree.remove(item)),
            None => None,
        };
        let flat = match grouped {
            Some(Some((tree_flat, group_changes))) => {
                notes.extend(group_changes.into_iter().map(Note::Group));
                Some(tree_flat_to_view(&inner.transaction, tree_flat))
            }
            Some(None) => None,
            None => inner.view_seq.iter().position(|other| other == item),
        };
        match flat {
            Some(flat) => {
                self.splice_remove(inner, notes, flat);
                true
            }
            None => false,
        }
    }

    /// Replaces `old` with `new` in the live view. When neither item moves
    /// (no sort or grouping, both pass the filter) this is an in-place swap
    /// reported as a single `Replace`; otherwise it degrades to a removal
    /// and a re-insertion at the new pipeline placement.
    fn incremental_replace(
        &self,
        inner: &mut Inner<T>,
        notes: &mut Vec<Note<T>>,
        old: &T,
        new: &T,
        source_index: Option<usize>,
    ) {
        let in_place = inner.tree.is_none()
            && !inner.sort.is_active()
            && inner.filter.passes(old)
            && inner.filter.passes(new);
        if in_place {
            if let Some(flat) = inner.view_seq.iter().position(|other| other == old) {
                inner.view_seq[flat] = new.clone();
                let window = inner.pager.window(inner.view_seq.len());
                if flat < window.start {
                    notes.push(Note::Collection(CollectionChange::Reset));
                } else if flat < window.end {
                    notes.push(Note::Collection(CollectionChange::Replace {
                        index: flat - window.start,
                        old: old.clone(),
                        new: new.clone(),
                    }));
                }
                return;
            }
        }
        self.incremental_remove(inner, notes, old);
        self.incremental_insert(inner, notes, new, source_index);
    }

    /// Number of snapshot items before `source_index` that pass the
    /// filter: the item's position in the unsorted, ungrouped view.
    fn filtered_prefix_len(&self, inner: &Inner<T>, source_index: usize) -> usize {
        let mut position = 0;
        for index in 0..source_index {
            if let Some(existing) = inner.snapshot.item_at(&self.adapter, index) {
                if inner.filter.passes(&existing) {
                    position += 1;
                }
            }
        }
        position
    }

    /// Inserts into the view sequence at `flat`, maintaining the pager and
    /// translating the change into page-relative notifications.
    fn splice_insert(&self, inner: &mut Inner<T>, notes: &mut Vec<Note<T>>, flat: usize, item: T) {
        let old_window = inner.pager.window(inner.view_seq.len());
        let old_item_count = inner.pager.item_count();

        inner.view_seq.insert(flat, item.clone());
        if let Some(Transaction::Add { position, .. }) = &mut inner.transaction {
            if flat <= *position {
                *position += 1;
            }
        }
        if !inner.pager.is_server() {
            inner.pager.set_item_count(inner.view_seq.len());
        }
        let moved = inner.pager.ensure_in_range();
        let new_window = inner.pager.window(inner.view_seq.len());

        if moved {
            notes.push(Note::Property(ViewProperty::PageIndex));
            notes.push(Note::PageChanged(inner.pager.page_index()));
            notes.push(Note::Collection(CollectionChange::Reset));
        } else if flat < old_window.start {
            // Everything on the page shifted.
            notes.push(Note::Collection(CollectionChange::Reset));
        } else if flat < new_window.end {
            let page_size = inner.pager.page_size();
            if page_size > 0 && old_window.len() == page_size {
                // The page was full: its last item slid off.
                let pushed_out = inner.view_seq[new_window.end].clone();
                notes.push(Note::Collection(CollectionChange::Remove {
                    index: page_size - 1,
                    item: pushed_out,
                }));
            }
            notes.push(Note::Collection(CollectionChange::Add {
                index: flat - new_window.start,
                item,
            }));
        }
        self.push_count_notes(inner, notes, old_window.len(), old_item_count);
    }

    /// Removes from the view sequence at `flat`, maintaining the pager and
    /// translating the change into page-relative notifications.
    fn splice_remove(&self, inner: &mut Inner<T>, notes: &mut Vec<Note<T>>, flat: usize) -> T {
        let old_window = inner.pager.window(inner.view_seq.len());
        let old_item_count = inner.pager.item_count();

        let item = inner.view_seq.remove(flat);
        if let Some(Transaction::Add { position, .. }) = &mut inner.transaction {
            if flat < *position {
                *position -= 1;
            }
        }
        if !inner.pager.is_server() {
            inner.pager.set_item_count(inner.view_seq.len());
        }
        let moved = inner.pager.ensure_in_range();
        let new_window = inner.pager.window(inner.view_seq.len());

        if moved {
            notes.push(Note::Property(ViewProperty::PageIndex));
            notes.push(Note::PageChanged(inner.pager.page_index()));
            notes.push(Note::Collection(CollectionChange::Reset));
        } else if flat < old_window.start {
            notes.push(Note::Collection(CollectionChange::Reset));
        } else if flat < old_window.end {
            notes.push(Note::Collection(CollectionChange::Remove {
                index: flat - old_window.start,
                item: item.clone(),
            }));
            let page_size = inner.pager.page_size();
            if page_size > 0 && new_window.len() == page_size {
                // Still full after the removal: the next page's first item
                // slid in.
                let slid_in = inner.view_seq[new_window.end - 1].clone();
                notes.push(Note::Collection(CollectionChange::Add {
                    index: page_size - 1,
                    item: slid_in,
                }));
            }
        }
        self.push_count_notes(inner, notes, old_window.len(), old_item_count);
        item
    }

    /// Source change handler.
    fn on_source_changed(&self, change: &SourceChange<T>) {
        if self.self_mutating.load(Ordering::SeqCst) {
            return;
        }
        self.mutate(|view, inner, notes| {
            if inner.defer_depth > 0 {
                inner.snapshot.apply(change);
                inner.defer_dirty = true;
                return;
            }
            inner.snapshot.apply(change);
            match change {
                // Wholesale or order-only changes recompute.
                SourceChange::Reset | SourceChange::Move { .. } => view.recompute(inner, notes),
                SourceChange::Insert { index, item } => {
                    view.incremental_insert(inner, notes, item, Some(*index));
                    view.resync_currency(inner, notes);
                }
                SourceChange::Remove { item, .. } => {
                    view.incremental_remove(inner, notes, item);
                    view.resync_currency(inner, notes);
                }
                SourceChange::Replace { index, old, new } => {
                    view.incremental_replace(inner, notes, old, new, Some(*index));
                    view.resync_currency(inner, notes);
                }
            }
        });
    }

    /// Server page response handler.
    fn on_page_ready(&self, response: &PageReady<T>) {
        self.mutate(|view, inner, notes| {
            if !inner.pager.complete_server_move(response.token) {
                return;
            }
            inner.pager.set_item_count(response.item_count);
            inner.pager.set_page_index(response.page_index as isize);
            inner.snapshot.invalidate();
            if inner.defer_depth > 0 {
                // Finalize the pager bookkeeping now, but hold the
                // notifications and the recompute for the scope's release.
                let index = inner.pager.page_index();
                inner
                    .deferred_notes
                    .push(Note::Property(ViewProperty::IsPageChanging));
                inner.deferred_notes.push(Note::Property(ViewProperty::PageIndex));
                inner.deferred_notes.push(Note::PageChanged(index));
                inner.defer_dirty = true;
                return;
            }
            notes.push(Note::Property(ViewProperty::IsPageChanging));
            notes.push(Note::Property(ViewProperty::PageIndex));
            notes.push(Note::PageChanged(inner.pager.page_index()));
            view.recompute(inner, notes);
        });
    }
}

/// RAII guard of a deferred-refresh scope.
///
/// Dropping the last live guard of a view runs the accumulated recompute
/// (if any configuration changed) and one notification burst.
#[must_use = "refresh stays deferred until the guard is dropped"]
pub struct RefreshDeferral<T: ViewItem> {
    view: Arc<CollectionView<T>>,
}

impl<T: ViewItem> Drop for RefreshDeferral<T> {
    fn drop(&mut self) {
        let notes = {
            let mut inner = self.view.inner.lock();
            inner.defer_depth -= 1;
            if inner.defer_depth == 0 && inner.defer_dirty {
                inner.defer_dirty = false;
                let mut notes = std::mem::take(&mut inner.deferred_notes);
                self.view.recompute(&mut inner, &mut notes);
                notes
            } else {
                Vec::new()
            }
        };
        self.view.dispatch(notes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vec_source::VecSource;
    use static_assertions::assert_impl_all;

    assert_impl_all!(CollectionView<i32>: Send, Sync);
    assert_impl_all!(RefreshDeferral<String>: Send);

    fn view_over(items: Vec<i32>) -> (Arc<VecSource<i32>>, Arc<CollectionView<i32>>) {
        let source = Arc::new(VecSource::new(items));
        let view = CollectionView::new(source.clone() as Arc<dyn CollectionSource<i32>>);
        (source, view)
    }

    #[test]
    fn new_view_exposes_source_order_and_first_currency() {
        let (_source, view) = view_over(vec![3, 1, 2]);
        assert_eq!(view.items(), vec![3, 1, 2]);
        assert_eq!(view.count(), 3);
        assert_eq!(view.item_count(), 3);
        assert_eq!(view.current_position(), 0);
        assert_eq!(view.current_item(), Some(3));
    }

    #[test]
    fn empty_view_starts_before_first() {
        let (_source, view) = view_over(vec![]);
        assert!(view.is_empty());
        assert_eq!(view.current_position(), -1);
        assert!(view.is_current_before_first());
        assert!(!view.is_current_after_last());
    }

    #[test]
    fn empty_view_currency_cannot_leave_before_first() {
        let (_source, view) = view_over(vec![]);
        assert!(!view.move_current_to_next().unwrap());
        assert!(!view.move_current_to_previous().unwrap());
        assert!(!view.move_current_to_position(0).unwrap());
        assert_eq!(view.current_position(), -1);
        assert!(view.is_current_before_first());
        assert!(!view.is_current_after_last());
    }

    #[test]
    fn filter_and_sort_compose() {
        let (_source, view) = view_over(vec![5, 2, 9, 4, 7]);
        view.set_filter(|n: &i32| *n > 3).unwrap();
        view.set_sort_descriptions(vec![SortDescription::descending("value", |n: &i32| {
            (*n).into()
        })])
        .unwrap();

        assert_eq!(view.items(), vec![9, 7, 5, 4]);
        assert_eq!(view.item_count(), 4);
        assert!(view.passes_filter(&8));
        assert!(!view.passes_filter(&1));
    }

    #[test]
    fn source_insert_lands_at_sorted_position() {
        let (source, view) = view_over(vec![1, 5, 9]);
        view.set_sort_descriptions(vec![SortDescription::ascending("value", |n: &i32| {
            (*n).into()
        })])
        .unwrap();

        source.push(4);
        assert_eq!(view.items(), vec![1, 4, 5, 9]);
    }

    #[test]
    fn source_remove_updates_view_and_currency() {
        let (source, view) = view_over(vec![10, 20, 30]);
        view.move_current_to_position(1).unwrap();

        source.remove(1); // removes 20, the current item
        assert_eq!(view.items(), vec![10, 30]);
        // Currency degenerates to the nearest surviving index.
        assert_eq!(view.current_position(), 1);
        assert_eq!(view.current_item(), Some(30));
    }

    #[test]
    fn source_replace_swaps_in_place_without_transforms() {
        use parking_lot::Mutex as PMutex;

        let (source, view) = view_over(vec![1, 2, 3]);
        let log = Arc::new(PMutex::new(Vec::new()));
        let recv = log.clone();
        view.signals().collection_changed.connect(move |change| {
            recv.lock().push(change.clone());
        });

        source.replace(1, 7);
        assert_eq!(view.items(), vec![1, 7, 3]);
        assert_eq!(
            log.lock().as_slice(),
            &[CollectionChange::Replace {
                index: 1,
                old: 2,
                new: 7
            }]
        );
    }

    #[test]
    fn source_replace_relocates_under_sort() {
        let (source, view) = view_over(vec![1, 5, 9]);
        view.set_sort_descriptions(vec![SortDescription::ascending("value", |n: &i32| {
            (*n).into()
        })])
        .unwrap();

        source.replace(0, 7); // 1 becomes 7, which sorts between 5 and 9
        assert_eq!(view.items(), vec![5, 7, 9]);
    }

    #[test]
    fn item_at_checks_bounds() {
        let (_source, view) = view_over(vec![1, 2]);
        assert_eq!(view.item_at(1).unwrap(), 2);
        assert_eq!(
            view.item_at(5),
            Err(ViewError::IndexOutOfRange {
                parameter: "index",
                index: 5,
                len: 2
            })
        );
    }

    #[test]
    fn currency_move_can_be_canceled() {
        let (_source, view) = view_over(vec![1, 2, 3]);
        view.signals().current_changing.connect(|args| {
            args.cancel();
        });

        assert!(view.move_current_to_position(2).unwrap());
        // The move was vetoed; currency stayed on the first item.
        assert_eq!(view.current_position(), 0);
        assert_eq!(view.current_item(), Some(1));
    }

    #[test]
    fn position_out_of_range_is_rejected() {
        let (_source, view) = view_over(vec![1, 2]);
        assert_eq!(
            view.move_current_to_position(3),
            Err(ViewError::PositionOutOfRange {
                parameter: "position",
                value: 3,
                min: -1,
                max: 2
            })
        );
        // count itself is legal: after-last.
        assert!(!view.move_current_to_position(2).unwrap());
        assert!(view.is_current_after_last());
    }

    #[test]
    fn config_rejected_during_transaction() {
        let (_source, view) = view_over(vec![1, 2]);
        view.edit_item(&1).unwrap();

        assert_eq!(
            view.set_filter(|_: &i32| true),
            Err(ViewError::TransactionPending {
                operation: "set_filter",
                pending: "EditItem"
            })
        );
        assert_eq!(
            view.refresh(),
            Err(ViewError::TransactionPending {
                operation: "refresh",
                pending: "EditItem"
            })
        );
        view.commit_edit().unwrap();
        assert!(view.refresh().is_ok());
    }

    #[test]
    fn add_new_appends_and_moves_currency() {
        let (source, view) = view_over(vec![1, 2]);
        let added = view.add_new().unwrap();

        assert_eq!(added, 0);
        assert!(view.is_adding_new());
        assert_eq!(view.current_add_item(), Some(0));
        assert_eq!(view.items(), vec![1, 2, 0]);
        assert_eq!(view.current_item(), Some(0));
        assert_eq!(source.len(), 3);

        view.commit_new().unwrap();
        assert!(!view.is_adding_new());
        assert_eq!(view.items(), vec![1, 2, 0]);
    }

    #[test]
    fn cancel_new_rolls_back_source_and_view() {
        let (source, view) = view_over(vec![1, 2]);
        view.add_new().unwrap();
        view.cancel_new().unwrap();

        assert_eq!(view.items(), vec![1, 2]);
        assert_eq!(source.len(), 2);
        assert!(!view.is_adding_new());
    }

    #[test]
    fn provisional_add_is_exempt_from_sort_until_commit() {
        let (_source, view) = view_over(vec![5, 9]);
        view.set_sort_descriptions(vec![SortDescription::ascending("value", |n: &i32| {
            (*n).into()
        })])
        .unwrap();

        view.add_new().unwrap();
        // Provisional zero sits at the end despite the ascending sort.
        assert_eq!(view.items(), vec![5, 9, 0]);

        view.commit_new().unwrap();
        assert_eq!(view.items(), vec![0, 5, 9]);
    }

    #[test]
    fn commit_new_drops_item_rejected_by_filter() {
        let (source, view) = view_over(vec![5, 9]);
        view.set_filter(|n: &i32| *n > 3).unwrap();

        view.add_new().unwrap();
        assert_eq!(view.items(), vec![5, 9, 0]);
        view.commit_new().unwrap();

        // The committed zero fails the filter: gone from the view, kept in
        // the source.
        assert_eq!(view.items(), vec![5, 9]);
        assert_eq!(source.len(), 3);
        assert_eq!(view.item_count(), 2);
    }

    #[test]
    fn second_transaction_is_rejected() {
        let (_source, view) = view_over(vec![1]);
        view.add_new().unwrap();
        assert_eq!(
            view.add_new(),
            Err(ViewError::TransactionPending {
                operation: "add_new",
                pending: "AddNew"
            })
        );
        assert_eq!(
            view.edit_item(&1),
            Err(ViewError::TransactionPending {
                operation: "edit_item",
                pending: "AddNew"
            })
        );
        view.cancel_new().unwrap();
    }

    #[test]
    fn commit_new_without_transaction_is_a_no_op() {
        let (_source, view) = view_over(vec![1]);
        view.commit_new().unwrap();
        view.cancel_new().unwrap();
        view.commit_edit().unwrap();
        assert_eq!(view.items(), vec![1]);
    }

    #[test]
    fn cancel_edit_restores_via_source_replace() {
        let (source, view) = view_over(vec![10, 20]);
        view.edit_item(&20).unwrap();
        assert!(view.can_cancel_edit());
        view.cancel_edit().unwrap();

        assert_eq!(source.snapshot(), vec![10, 20]);
        assert!(!view.is_editing_item());
    }

    #[test]
    fn edit_item_not_in_view_is_rejected() {
        let (_source, view) = view_over(vec![1]);
        assert_eq!(view.edit_item(&99), Err(ViewError::ItemNotInView));
    }

    #[test]
    fn remove_at_respects_page_coordinates() {
        let (source, view) = view_over(vec![1, 2, 3, 4, 5]);
        view.set_page_size(2).unwrap();
        view.move_to_page(1).unwrap();

        // Page 1 shows [3, 4]; index 0 is item 3.
        view.remove_at(0).unwrap();
        assert_eq!(source.snapshot(), vec![1, 2, 4, 5]);
        assert_eq!(view.items(), vec![4, 5]);
    }

    #[test]
    fn remove_is_refused_for_read_only_source() {
        let source = Arc::new(VecSource::read_only(vec![1, 2]));
        let view = CollectionView::new(source as Arc<dyn CollectionSource<i32>>);
        assert!(!view.can_remove());
        assert_eq!(
            view.remove(&1),
            Err(ViewError::NotSupported {
                operation: "remove"
            })
        );
    }

    #[test]
    fn deferral_batches_into_one_reset() {
        use parking_lot::Mutex as PMutex;

        let (_source, view) = view_over(vec![4, 1, 3, 2]);
        let resets = Arc::new(PMutex::new(0usize));
        let recv = resets.clone();
        view.signals().collection_changed.connect(move |change| {
            if matches!(change, CollectionChange::Reset) {
                *recv.lock() += 1;
            }
        });

        {
            let _defer = view.defer_refresh().unwrap();
            view.set_filter(|n: &i32| *n > 1).unwrap();
            view.set_sort_descriptions(vec![SortDescription::ascending("value", |n: &i32| {
                (*n).into()
            })])
            .unwrap();
            view.set_page_size(2).unwrap();
            assert_eq!(*resets.lock(), 0);
        }

        assert_eq!(*resets.lock(), 1);
        assert_eq!(view.items(), vec![2, 3]);
    }

    #[test]
    fn nested_deferrals_release_on_last_drop() {
        let (_source, view) = view_over(vec![2, 1]);
        let outer = view.defer_refresh().unwrap();
        let inner = view.defer_refresh().unwrap();
        view.set_sort_descriptions(vec![SortDescription::ascending("value", |n: &i32| {
            (*n).into()
        })])
        .unwrap();

        drop(inner);
        // Still deferred: reads of items are stale but item_at refuses.
        assert_eq!(
            view.item_at(0),
            Err(ViewError::RefreshDeferred {
                operation: "item_at"
            })
        );
        drop(outer);
        assert_eq!(view.items(), vec![1, 2]);
    }

    #[test]
    fn refresh_rejected_while_deferred() {
        let (_source, view) = view_over(vec![1]);
        let _defer = view.defer_refresh().unwrap();
        assert_eq!(
            view.refresh(),
            Err(ViewError::RefreshDeferred {
                operation: "refresh"
            })
        );
        assert_eq!(
            view.add_new().unwrap_err(),
            ViewError::RefreshDeferred {
                operation: "add_new"
            }
        );
    }

    #[test]
    fn empty_culture_is_rejected() {
        let (_source, view) = view_over(vec![1]);
        assert_eq!(view.set_culture(""), Err(ViewError::EmptyCulture));
        view.set_culture("de-DE").unwrap();
        assert_eq!(view.culture(), "de-DE");
    }

    #[test]
    fn reentrant_mutation_from_handler_coalesces() {
        let (source, view) = view_over(vec![1, 2, 3]);
        let weak = Arc::downgrade(&view);
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();
        view.signals().collection_changed.connect(move |_change| {
            if let Some(view) = weak.upgrade() {
                if !flag.swap(true, Ordering::SeqCst) {
                    // Mutate the view from inside its own notification.
                    view.refresh().unwrap();
                }
            }
        });

        source.push(4);
        assert!(fired.load(Ordering::SeqCst));
        assert_eq!(view.items(), vec![1, 2, 3, 4]);
    }
}

//! Working copy of source items.
//!
//! The snapshot is the ordered item table the pipeline reads from. When the
//! source supports indexed access and change notification, and no active
//! transformation needs an independent reorderable copy, the snapshot
//! aliases the source directly and reads pass through the adapter. The
//! moment sorting or grouping is active the snapshot switches to an owned
//! copy, patched incrementally on granular source changes and rebuilt
//! wholesale on reset.

use crate::item::ViewItem;
use crate::source::{SourceAdapter, SourceChange};

/// How the snapshot currently holds its items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Reads pass through the source adapter; no copy held.
    Aliased,
    /// An independent owned copy.
    Copied,
}

/// The engine's working ordered copy of source items (or an alias of the
/// source when safe).
pub(crate) struct Snapshot<T> {
    items: Vec<T>,
    mode: Mode,
    valid: bool,
}

impl<T: ViewItem> Snapshot<T> {
    pub(crate) fn new() -> Self {
        Self {
            items: Vec::new(),
            mode: Mode::Copied,
            valid: false,
        }
    }

    /// Marks the snapshot stale; the next [`ensure`](Self::ensure) rebuilds.
    pub(crate) fn invalidate(&mut self) {
        self.valid = false;
    }

    /// Whether the snapshot currently aliases the source.
    pub(crate) fn is_aliased(&self) -> bool {
        self.mode == Mode::Aliased
    }

    /// Validates or rebuilds the snapshot.
    ///
    /// `needs_copy` is true when a transformation (sort, group) requires an
    /// independent reorderable copy. Aliasing is only used when the source
    /// supports both indexed access and change notification; without change
    /// notification the engine could not tell when the alias went stale.
    pub(crate) fn ensure(&mut self, adapter: &SourceAdapter<T>, needs_copy: bool) {
        let can_alias = !needs_copy
            && adapter.supports_indexing()
            && adapter.supports_change_notification();

        if self.valid && (self.mode == Mode::Aliased) == can_alias {
            return;
        }

        if can_alias {
            self.items.clear();
            self.mode = Mode::Aliased;
        } else {
            self.items = adapter.source().snapshot();
            self.mode = Mode::Copied;
        }
        self.valid = true;
    }

    /// Applies a granular source change.
    ///
    /// Patches the owned copy in place; a `Reset` (or any patch while
    /// aliasing, which needs no copy maintenance) just revalidates or
    /// invalidates as appropriate.
    pub(crate) fn apply(&mut self, change: &SourceChange<T>) {
        if matches!(change, SourceChange::Reset) {
            self.invalidate();
            return;
        }
        if self.mode == Mode::Aliased || !self.valid {
            return;
        }
        match change {
            SourceChange::Insert { index, item } => {
                if *index <= self.items.len() {
                    self.items.insert(*index, item.clone());
                } else {
                    self.invalidate();
                }
            }
            SourceChange::Remove { index, .. } => {
                if *index < self.items.len() {
                    self.items.remove(*index);
                } else {
                    self.invalidate();
                }
            }
            SourceChange::Replace { index, new, .. } => {
                if let Some(slot) = self.items.get_mut(*index) {
                    *slot = new.clone();
                } else {
                    self.invalidate();
                }
            }
            SourceChange::Move { from, to, .. } => {
                if *from < self.items.len() && *to < self.items.len() {
                    let item = self.items.remove(*from);
                    self.items.insert(*to, item);
                } else {
                    self.invalidate();
                }
            }
            SourceChange::Reset => unreachable!(),
        }
    }

    pub(crate) fn len(&self, adapter: &SourceAdapter<T>) -> usize {
        match self.mode {
            Mode::Aliased => adapter.len(),
            Mode::Copied => self.items.len(),
        }
    }

    pub(crate) fn item_at(&self, adapter: &SourceAdapter<T>, index: usize) -> Option<T> {
        match self.mode {
            Mode::Aliased => adapter.item_at(index),
            Mode::Copied => self.items.get(index).cloned(),
        }
    }

    pub(crate) fn index_of(&self, adapter: &SourceAdapter<T>, item: &T) -> Option<usize> {
        match self.mode {
            Mode::Aliased => adapter.index_of(item),
            Mode::Copied => self.items.iter().position(|other| other == item),
        }
    }

    pub(crate) fn contains(&self, adapter: &SourceAdapter<T>, item: &T) -> bool {
        self.index_of(adapter, item).is_some()
    }

    /// The full ordered contents, cloned for the pipeline.
    pub(crate) fn to_vec(&self, adapter: &SourceAdapter<T>) -> Vec<T> {
        match self.mode {
            Mode::Aliased => adapter.source().snapshot(),
            Mode::Copied => self.items.clone(),
        }
    }
}

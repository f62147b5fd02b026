//! Paging state.
//!
//! Paging is a window over the flattened view sequence. In local mode the
//! engine slices the sequence itself; in server mode the source owns page
//! contents and confirms page changes asynchronously, identified by
//! monotonically increasing request tokens so stale responses can be
//! discarded.
//!
//! `page_index` is -1 while paging is disabled (`page_size == 0`) or no
//! page has been established yet (paging enabled over an empty view).

use std::ops::Range;

/// Pager bookkeeping for one view.
pub(crate) struct PageState {
    page_size: usize,
    page_index: isize,
    item_count: usize,
    server: bool,
    page_changing: bool,
    token: u64,
}

impl PageState {
    pub(crate) fn new() -> Self {
        Self {
            page_size: 0,
            page_index: -1,
            item_count: 0,
            server: false,
            page_changing: false,
            token: 0,
        }
    }

    /// Switches to server mode with the source's paging parameters.
    pub(crate) fn configure_server(
        &mut self,
        page_size: usize,
        item_count: usize,
        start_page_index: isize,
    ) {
        self.server = true;
        self.page_size = page_size;
        self.item_count = item_count;
        self.page_index = start_page_index;
    }

    pub(crate) fn is_server(&self) -> bool {
        self.server
    }

    pub(crate) fn page_size(&self) -> usize {
        self.page_size
    }

    pub(crate) fn page_index(&self) -> isize {
        self.page_index
    }

    /// Logical item count across all pages.
    pub(crate) fn item_count(&self) -> usize {
        self.item_count
    }

    pub(crate) fn is_page_changing(&self) -> bool {
        self.page_changing
    }

    pub(crate) fn set_item_count(&mut self, item_count: usize) {
        self.item_count = item_count;
    }

    pub(crate) fn set_page_index(&mut self, page_index: isize) {
        self.page_index = page_index;
    }

    /// Changes the page size. Enabling or resizing paging re-anchors the
    /// window on the first page when items exist; size zero disables paging
    /// and clears the page index.
    pub(crate) fn set_page_size(&mut self, page_size: usize) {
        self.page_size = page_size;
        self.page_index = if page_size == 0 {
            -1
        } else if self.item_count > 0 {
            0
        } else {
            -1
        };
    }

    /// Total pages at the current size and count. Zero when paging is
    /// disabled or the view is empty.
    pub(crate) fn page_count(&self) -> usize {
        if self.page_size == 0 || self.item_count == 0 {
            0
        } else {
            self.item_count.div_ceil(self.page_size)
        }
    }

    /// Whether `target` names an existing page.
    pub(crate) fn is_valid_target(&self, target: isize) -> bool {
        target >= 0 && (target as usize) < self.page_count()
    }

    /// The current window into a flattened local sequence of `local_len`
    /// items.
    ///
    /// In server mode the local sequence already is the fetched page, so
    /// the window covers it (clamped to the page size). Unpaged views
    /// window the whole sequence.
    pub(crate) fn window(&self, local_len: usize) -> Range<usize> {
        if self.page_size == 0 {
            return 0..local_len;
        }
        if self.server {
            return 0..local_len.min(self.page_size);
        }
        if self.page_index < 0 {
            return 0..0;
        }
        let start = (self.page_index as usize * self.page_size).min(local_len);
        let end = (start + self.page_size).min(local_len);
        start..end
    }

    /// Clamps the page index back into range after the item count changed.
    ///
    /// Establishes page zero when paging is enabled and items appeared,
    /// slides back to the last page when the current one vanished, and
    /// drops to -1 when the view emptied. Returns `true` when the index
    /// moved.
    pub(crate) fn ensure_in_range(&mut self) -> bool {
        let previous = self.page_index;
        if self.page_size == 0 {
            self.page_index = -1;
        } else if self.item_count == 0 {
            self.page_index = -1;
        } else {
            let last = (self.page_count() - 1) as isize;
            if self.page_index < 0 {
                self.page_index = 0;
            } else if self.page_index > last {
                self.page_index = last;
            }
        }
        self.page_index != previous
    }

    /// Starts a server page move, returning the request token.
    pub(crate) fn begin_server_move(&mut self) -> u64 {
        self.token += 1;
        self.page_changing = true;
        self.token
    }

    /// Completes a server page move. Returns `false` for a stale token
    /// (the request was superseded); the response must then be discarded.
    pub(crate) fn complete_server_move(&mut self, token: u64) -> bool {
        if token != self.token {
            tracing::debug!(
                target: "prism_view::pager",
                token,
                current = self.token,
                "discarding stale page response"
            );
            return false;
        }
        self.page_changing = false;
        true
    }
}

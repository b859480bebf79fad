//! Pagination over prefix scans.
//!
//! A scan first collects every key under a prefix that passes the filter,
//! then optionally narrows the sorted key list to one page before values are
//! decoded.

use std::ops::Range;

/// A page request for [`Store::scan`](crate::Store::scan).
///
/// A `size` of zero disables paging: every matching entry is visited in the
/// store's native order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Page {
    /// Zero-based page index
    pub index: usize,
    /// Number of entries per page, zero for everything
    pub size: usize,
}

impl Page {
    /// Creates a page request.
    pub const fn new(index: usize, size: usize) -> Self {
        Self { index, size }
    }

    /// Requests every matching entry, unsorted.
    pub const fn all() -> Self {
        Self { index: 0, size: 0 }
    }

    /// Returns true if this request windows the result.
    pub const fn is_paged(&self) -> bool {
        self.size != 0
    }
}

/// Computes the slice of `len` sorted keys covered by `page`.
///
/// A start past the end (or one that overflows) falls back to the first
/// page. The end is clamped to `len`.
pub fn page_window(len: usize, page: Page) -> Range<usize> {
    if !page.is_paged() {
        return 0..len;
    }

    let begin = match page.index.checked_mul(page.size) {
        Some(begin) if begin <= len => begin,
        _ => 0,
    };

    let end = match begin.checked_add(page.size) {
        Some(end) if end <= len => end,
        _ => len,
    };

    begin..end
}

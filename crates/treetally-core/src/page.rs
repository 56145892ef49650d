//! Page windows for paginated list views.

use std::ops::Range;

use serde::{Deserialize, Serialize};

/// One page of a list of `total_records` items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageWindow {
    /// 1-based page number, clamped into range.
    pub page_number: u64,
    /// Items per page, at least 1.
    pub page_size: u64,
    /// Index of the first item on the page.
    pub offset: u64,
    /// Total number of items in the list.
    pub total_records: u64,
    /// Number of pages; 0 when the list is empty.
    pub total_pages: u64,
}

impl PageWindow {
    /// Compute the window for a page.
    ///
    /// Out-of-range page numbers clamp to the first or last page. A page size
    /// of 0 is treated as 1. An empty list yields page 1 with no items and
    /// `total_pages == 0`.
    pub fn for_page(total_records: u64, page_size: u64, page_number: u64) -> Self {
        let page_size = page_size.max(1);
        let total_pages = total_records.div_ceil(page_size);
        let page_number = page_number.clamp(1, total_pages.max(1));

        Self {
            page_number,
            page_size,
            offset: (page_number - 1) * page_size,
            total_records,
            total_pages,
        }
    }

    /// Number of items on this page.
    pub fn limit(&self) -> u64 {
        self.page_size
            .min(self.total_records.saturating_sub(self.offset))
    }

    /// Item index range covered by this page.
    pub fn range(&self) -> Range<u64> {
        self.offset..self.offset + self.limit()
    }

    /// Check whether the window holds no items.
    pub fn is_empty(&self) -> bool {
        self.limit() == 0
    }

    /// Check whether a later page exists.
    pub fn has_next(&self) -> bool {
        self.page_number < self.total_pages
    }

    /// Check whether an earlier page exists.
    pub fn has_previous(&self) -> bool {
        self.page_number > 1
    }

    /// Borrow this page's items from a fully materialized list.
    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let start = (self.offset as usize).min(items.len());
        let end = (start + self.limit() as usize).min(items.len());
        &items[start..end]
    }
}

/// A page of items with its window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub window: PageWindow,
    pub items: Vec<T>,
}

impl<T> Page<T> {
    /// Build a page from a fully materialized list.
    pub fn from_items(items: &[T], page_size: u64, page_number: u64) -> Self
    where
        T: Clone,
    {
        let window = PageWindow::for_page(items.len() as u64, page_size, page_number);
        Self {
            items: window.slice(items).to_vec(),
            window,
        }
    }
}

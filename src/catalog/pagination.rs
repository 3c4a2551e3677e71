//! Pagination window over the product collection
//!
//! The window only knows a page index and a page size. It does not care
//! whether the collection came from an unfiltered or a filtered fetch.

use crate::core::config::PaginationConfig;
use crate::core::error::{CatalogError, Result};
use serde::{Deserialize, Serialize};

/// Position of the visible page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCursor {
    pub page_index: usize,
    pub page_size: usize,
}

impl PageCursor {
    pub fn new(page_index: usize, page_size: usize) -> Result<Self> {
        if page_size == 0 {
            return Err(CatalogError::Validation("Page size must be greater than 0".to_string()));
        }
        Ok(Self {
            page_index,
            page_size,
        })
    }

    /// Index of the first item on this page, saturating on overflow
    pub fn offset(&self) -> usize {
        self.page_index.saturating_mul(self.page_size)
    }
}

/// Contiguous page of `items` selected by `cursor`.
///
/// Out-of-range pages yield an empty slice.
pub fn visible_slice<T>(items: &[T], cursor: PageCursor) -> &[T] {
    let start = cursor.offset();
    if start >= items.len() {
        return &[];
    }
    let end = start.saturating_add(cursor.page_size).min(items.len());
    &items[start..end]
}

/// Number of pages needed to show `len` items (at least one)
pub fn page_count(len: usize, page_size: usize) -> usize {
    if page_size == 0 || len == 0 {
        return 1;
    }
    (len + page_size - 1) / page_size
}

/// Cursor plus the set of page sizes the user may choose from
#[derive(Debug, Clone)]
pub struct PaginationWindow {
    allowed_sizes: Vec<usize>,
    cursor: PageCursor,
}

impl PaginationWindow {
    pub fn new(config: &PaginationConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| CatalogError::Configuration(e.to_string()))?;

        let mut allowed_sizes = config.allowed_page_sizes.clone();
        allowed_sizes.sort_unstable();
        allowed_sizes.dedup();

        Ok(Self {
            allowed_sizes,
            cursor: PageCursor::new(0, config.default_page_size)?,
        })
    }

    pub fn cursor(&self) -> PageCursor {
        self.cursor
    }

    pub fn allowed_sizes(&self) -> &[usize] {
        &self.allowed_sizes
    }

    pub fn visible<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        visible_slice(items, self.cursor)
    }

    pub fn page_count(&self, len: usize) -> usize {
        page_count(len, self.cursor.page_size)
    }

    /// Switch page size; always returns to the first page
    pub fn on_page_size_change(&mut self, new_size: usize) -> Result<PageCursor> {
        if !self.allowed_sizes.contains(&new_size) {
            return Err(CatalogError::Validation(format!(
                "Page size {} is not one of {:?}",
                new_size, self.allowed_sizes
            )));
        }
        self.cursor = PageCursor::new(0, new_size)?;
        Ok(self.cursor)
    }

    /// Jump to a page. The index is not clamped; see [`Self::clamp`].
    pub fn set_page(&mut self, page_index: usize) -> PageCursor {
        self.cursor.page_index = page_index;
        self.cursor
    }

    pub fn next_page(&mut self, len: usize) -> PageCursor {
        let last = self.page_count(len) - 1;
        self.cursor.page_index = (self.cursor.page_index + 1).min(last);
        self.cursor
    }

    pub fn previous_page(&mut self) -> PageCursor {
        self.cursor.page_index = self.cursor.page_index.saturating_sub(1);
        self.cursor
    }

    /// Pull the page index back onto the last page after the collection shrank
    pub fn clamp(&mut self, len: usize) -> PageCursor {
        let last = self.page_count(len) - 1;
        if self.cursor.page_index > last {
            self.cursor.page_index = last;
        }
        self.cursor
    }

    /// Back to the first page, keeping the page size
    pub fn reset(&mut self) -> PageCursor {
        self.cursor.page_index = 0;
        self.cursor
    }
}

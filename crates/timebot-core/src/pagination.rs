//! Page arithmetic for paged listings.

/// Default number of rows per page.
pub const DEFAULT_PER_PAGE: usize = 10;

/// A resolved page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// 1-based page number.
    pub current: usize,
    pub total_pages: usize,
    pub per_page: usize,
}

impl Page {
    /// Builds a page cursor, or `None` if `page` is not a valid page.
    pub fn new(page: usize, total_count: usize, per_page: usize) -> Option<Self> {
        let total_pages = total_pages(total_count, per_page);
        valid_page(page, total_pages).then_some(Self {
            current: page,
            total_pages,
            per_page,
        })
    }

    /// Rows to skip before this page.
    pub fn offset(&self) -> usize {
        offset(self.current, self.per_page)
    }

    pub fn has_prev(&self) -> bool {
        self.current > 1
    }

    pub fn has_next(&self) -> bool {
        self.current < self.total_pages
    }
}

/// `ceil(total_count / per_page)`. A zero page size yields zero pages.
pub fn total_pages(total_count: usize, per_page: usize) -> usize {
    if per_page == 0 {
        return 0;
    }
    total_count.div_ceil(per_page)
}

/// Rows to skip to reach `page` (1-based).
pub fn offset(page: usize, per_page: usize) -> usize {
    page.saturating_sub(1) * per_page
}

/// Whether `page` lies in `1..=total_pages`.
pub fn valid_page(page: usize, total_pages: usize) -> bool {
    (1..=total_pages).contains(&page)
}

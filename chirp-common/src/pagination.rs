//! Page-number pagination over a listing of known size.
//!
//! Requests never fail: a missing, non-numeric or too small page number is
//! treated as the first page and anything past the end as the last page.

use std::num::IntErrorKind;

pub const PAGE_SIZE: u64 = 10;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct Page {
    /// 1-based.
    pub number: u64,
    pub total_pages: u64,
    pub page_size: u64,
}

impl Page {
    #[must_use]
    pub fn resolve(requested: Option<&str>, total_items: u64, page_size: u64) -> Self {
        let page_size = page_size.max(1);
        let total_pages = total_items.div_ceil(page_size).max(1);

        let number = match requested.map(|page| page.trim().parse::<i64>()) {
            Some(Ok(page)) if page >= 1 => page.cast_unsigned().min(total_pages),
            Some(Err(err)) if *err.kind() == IntErrorKind::PosOverflow => total_pages,
            _ => 1,
        };

        Self {
            number,
            total_pages,
            page_size,
        }
    }

    #[must_use]
    pub fn offset(self) -> u64 {
        (self.number - 1) * self.page_size
    }

    #[must_use]
    pub fn limit(self) -> u64 {
        self.page_size
    }
}

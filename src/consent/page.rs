use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: usize = 25;
pub const MAX_PAGE_SIZE: usize = 1000;

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub number: usize,
    pub size: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            number: 1,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Pagination {
    /// Build a pagination from raw query values. Missing or zero values fall
    /// back to the defaults; sizes above `MAX_PAGE_SIZE` are refused.
    pub fn new(number: Option<usize>, size: Option<usize>) -> Option<Self> {
        let size = match size {
            Some(s) if s > MAX_PAGE_SIZE => return None,
            Some(s) if s > 0 => s,
            _ => DEFAULT_PAGE_SIZE,
        };
        let number = number.filter(|n| *n > 0).unwrap_or(1);
        Some(Self { number, size })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub records: Vec<T>,
    pub number: usize,
    pub size: usize,
    pub total_records: usize,
    pub total_pages: usize,
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        self.number < self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }
}

/// Slice one page out of `records`. A page past the end is empty.
///
/// Zero page numbers and sizes are read as 1.
pub fn paginate<T: Clone>(records: &[T], pagination: Pagination) -> Page<T> {
    let number = pagination.number.max(1);
    let size = pagination.size.max(1);
    let total_records = records.len();
    let total_pages = total_records.div_ceil(size);
    let start = (number - 1).saturating_mul(size);
    let page_records = records.iter().skip(start).take(size).cloned().collect();

    Page {
        records: page_records,
        number,
        size,
        total_records,
        total_pages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_defaults_and_limits() {
        assert_eq!(Pagination::new(None, None), Some(Pagination::default()));
        assert_eq!(
            Pagination::new(Some(0), Some(0)),
            Some(Pagination { number: 1, size: 25 })
        );
        assert_eq!(
            Pagination::new(Some(3), Some(1000)),
            Some(Pagination { number: 3, size: 1000 })
        );
        assert_eq!(Pagination::new(Some(1), Some(1001)), None);
    }

    #[test]
    fn test_paginate_slices_in_order() {
        let records: Vec<u32> = (1..=7).collect();

        let first = paginate(&records, Pagination { number: 1, size: 3 });
        assert_eq!(first.records, vec![1, 2, 3]);
        assert_eq!(first.total_pages, 3);
        assert_eq!(first.total_records, 7);
        assert!(first.has_next());
        assert!(!first.has_previous());

        let last = paginate(&records, Pagination { number: 3, size: 3 });
        assert_eq!(last.records, vec![7]);
        assert!(!last.has_next());

        let beyond = paginate(&records, Pagination { number: 9, size: 3 });
        assert!(beyond.records.is_empty());
    }

    #[test]
    fn test_paginate_empty() {
        let page = paginate::<u32>(&[], Pagination::default());
        assert!(page.records.is_empty());
        assert_eq!(page.total_pages, 0);
        assert!(!page.has_next());
    }

    #[test]
    fn test_paginate_reads_zero_as_one() {
        let records = [1, 2, 3];

        let page = paginate(&records, Pagination { number: 1, size: 0 });
        assert_eq!(page.records, vec![1]);
        assert_eq!(page.size, 1);
        assert_eq!(page.total_pages, 3);

        let page = paginate(&records, Pagination { number: 0, size: 2 });
        assert_eq!(page.records, vec![1, 2]);
        assert_eq!(page.number, 1);
        assert!(!page.has_previous());
    }
}

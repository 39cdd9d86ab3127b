//! Page arithmetic for list endpoints.

use serde::Serialize;

/// A resolved page of a result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageInfo {
    pub number: i64,
    pub num_pages: i64,
    pub per_page: i64,
    pub total: i64,
    pub has_next: bool,
    pub has_previous: bool,
}

impl PageInfo {
    /// Resolve a raw `page` parameter against `total` items.
    ///
    /// A missing or non-integer page resolves to the first page; a page
    /// outside `1..=num_pages` resolves to the last page. An empty result set
    /// still has one (empty) page.
    pub fn resolve(raw: Option<&str>, total: i64, per_page: i64) -> Self {
        let per_page = per_page.max(1);
        let total = total.max(0);
        let num_pages = ((total + per_page - 1) / per_page).max(1);

        let number = match raw.map(str::trim).map(str::parse::<i64>) {
            None | Some(Err(_)) => 1,
            Some(Ok(n)) if (1..=num_pages).contains(&n) => n,
            Some(Ok(_)) => num_pages,
        };

        Self {
            number,
            num_pages,
            per_page,
            total,
            has_next: number < num_pages,
            has_previous: number > 1,
        }
    }

    pub fn offset(&self) -> i64 {
        (self.number - 1) * self.per_page
    }

    pub fn limit(&self) -> i64 {
        self.per_page
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_page_by_default() {
        let page = PageInfo::resolve(None, 25, 10);
        assert_eq!(page.number, 1);
        assert_eq!(page.num_pages, 3);
        assert_eq!(page.offset(), 0);
        assert!(page.has_next);
        assert!(!page.has_previous);
    }

    #[test]
    fn test_non_integer_page_is_first() {
        assert_eq!(PageInfo::resolve(Some("abc"), 25, 10).number, 1);
        assert_eq!(PageInfo::resolve(Some(""), 25, 10).number, 1);
    }

    #[test]
    fn test_out_of_range_page_is_last() {
        let page = PageInfo::resolve(Some("99"), 25, 10);
        assert_eq!(page.number, 3);
        assert_eq!(page.offset(), 20);
        assert!(!page.has_next);
        assert!(page.has_previous);

        assert_eq!(PageInfo::resolve(Some("0"), 25, 10).number, 3);
        assert_eq!(PageInfo::resolve(Some("-2"), 25, 10).number, 3);
    }

    #[test]
    fn test_empty_result_has_one_page() {
        let page = PageInfo::resolve(Some("4"), 0, 10);
        assert_eq!(page.number, 1);
        assert_eq!(page.num_pages, 1);
        assert!(!page.has_next);
        assert!(!page.has_previous);
    }

    #[test]
    fn test_exact_multiple() {
        let page = PageInfo::resolve(Some(" 2 "), 20, 10);
        assert_eq!(page.num_pages, 2);
        assert_eq!(page.number, 2);
        assert!(!page.has_next);
    }
}

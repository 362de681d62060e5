use std::collections::BTreeMap;

use shared::protocol::{PageRequest, SortOrder, DEFAULT_PAGE_SIZE, FILTER_ALL, MAX_PAGE_SIZE};

/// State behind a collection view: which page to show, how large it is,
/// the free-text search, the sort column, and any dropdown filters.
///
/// Every change that alters which rows qualify (search, sort, filters,
/// page size) snaps back to page 1; only explicit page navigation keeps
/// the rest of the state untouched. Filter values are stored verbatim so
/// a dropdown can keep displaying its sentinel, but [`ListQuery::request`]
/// strips anything that means "no filter" before it reaches a data source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    page: u32,
    limit: u32,
    search: String,
    sort_by: Option<String>,
    sort_order: SortOrder,
    filters: BTreeMap<String, String>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
            search: String::new(),
            sort_by: None,
            sort_order: SortOrder::Asc,
            filters: BTreeMap::new(),
        }
    }
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// The raw search text, exposed immediately for the input's display.
    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn sort_by(&self) -> Option<&str> {
        self.sort_by.as_deref()
    }

    pub fn sort_order(&self) -> SortOrder {
        self.sort_order
    }

    /// The stored filter value, sentinel included.
    pub fn filter(&self, key: &str) -> Option<&str> {
        self.filters.get(key).map(String::as_str)
    }

    pub fn set_search(&mut self, text: impl Into<String>) {
        self.search = text.into();
        self.page = 1;
    }

    /// Clicking the same column header flips the direction; a different
    /// column starts ascending.
    pub fn toggle_sort(&mut self, field: &str) {
        if self.sort_by.as_deref() == Some(field) {
            self.sort_order = self.sort_order.toggled();
        } else {
            self.sort_by = Some(field.to_string());
            self.sort_order = SortOrder::Asc;
        }
        self.page = 1;
    }

    pub fn set_filter(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.filters.insert(key.into(), value.into());
        self.page = 1;
    }

    /// No bounds check against the total page count: navigation widgets
    /// are expected to not offer out-of-range pages, and an out-of-range
    /// request simply yields a short or empty page.
    pub fn set_page(&mut self, page: u32) {
        self.page = page.max(1);
    }

    pub fn set_limit(&mut self, limit: u32) {
        self.limit = limit.clamp(1, MAX_PAGE_SIZE);
        self.page = 1;
    }

    /// Derives the normalized request a data source consumes: empty search
    /// becomes absent, and filters holding [`FILTER_ALL`] or an empty
    /// string are dropped entirely.
    pub fn request(&self) -> PageRequest {
        PageRequest {
            page: self.page,
            limit: self.limit,
            search: if self.search.is_empty() {
                None
            } else {
                Some(self.search.clone())
            },
            sort_by: self.sort_by.clone().filter(|field| !field.is_empty()),
            sort_order: self.sort_order,
            filters: self
                .filters
                .iter()
                .filter(|(_, value)| !value.is_empty() && value.as_str() != FILTER_ALL)
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        }
    }

    pub fn query_pairs(&self) -> Vec<(String, String)> {
        self.request().to_query_pairs()
    }
}

#[cfg(test)]
#[path = "tests/list_query_tests.rs"]
mod tests;

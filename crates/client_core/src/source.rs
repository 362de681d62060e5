use std::{cmp::Ordering, marker::PhantomData};

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use shared::protocol::{PageRequest, PageResult};

use crate::PortalClient;

/// The one contract a list view needs from its data source: hand over a
/// normalized request, get back one page plus paging metadata. Implemented
/// by the HTTP client and by the in-process mock, so views and tests run
/// against the same shape.
#[async_trait]
pub trait PageSource<T> {
    async fn fetch_page(&self, request: &PageRequest) -> Result<PageResult<T>>;
}

/// Row behavior the in-memory source needs: free-text matching, filter
/// matching by key, and field-wise comparison for sorting. The needle
/// arrives lowercased.
pub trait Record: Clone {
    fn matches_search(&self, needle: &str) -> bool;

    fn matches_filter(&self, _key: &str, _value: &str) -> bool {
        true
    }

    fn compare_by(&self, _field: &str, _other: &Self) -> Ordering {
        Ordering::Equal
    }
}

/// In-process backend over a plain vector: filter, search, sort, then
/// slice, with the same pagination math a remote source reports.
pub struct MemorySource<T> {
    rows: Vec<T>,
}

impl<T> MemorySource<T> {
    pub fn new(rows: Vec<T>) -> Self {
        Self { rows }
    }
}

#[async_trait]
impl<T: Record + Send + Sync> PageSource<T> for MemorySource<T> {
    async fn fetch_page(&self, request: &PageRequest) -> Result<PageResult<T>> {
        let needle = request.search.as_deref().map(str::to_lowercase);
        let mut rows: Vec<T> = self
            .rows
            .iter()
            .filter(|row| {
                request
                    .filters
                    .iter()
                    .all(|(key, value)| row.matches_filter(key, value))
            })
            .filter(|row| {
                needle
                    .as_deref()
                    .map_or(true, |needle| row.matches_search(needle))
            })
            .cloned()
            .collect();
        if let Some(field) = request.sort_by.as_deref() {
            rows.sort_by(|a, b| {
                let ordering = a.compare_by(field, b);
                match request.sort_order {
                    shared::protocol::SortOrder::Asc => ordering,
                    shared::protocol::SortOrder::Desc => ordering.reverse(),
                }
            });
        }
        let total = rows.len() as u64;
        let items = rows
            .into_iter()
            .skip(request.offset().max(0) as usize)
            .take(request.limit as usize)
            .collect();
        Ok(PageResult::new(items, request.page, request.limit, total))
    }
}

/// A list endpoint viewed through the [`PageSource`] contract.
pub struct RemoteSource<'a, T> {
    client: &'a PortalClient,
    path: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T> RemoteSource<'a, T> {
    pub fn new(client: &'a PortalClient, path: &'static str) -> Self {
        Self {
            client,
            path,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: DeserializeOwned + Send + Sync> PageSource<T> for RemoteSource<'_, T> {
    async fn fetch_page(&self, request: &PageRequest) -> Result<PageResult<T>> {
        self.client.fetch_page_request(self.path, request).await
    }
}

#[cfg(test)]
#[path = "tests/source_tests.rs"]
mod tests;

//! Relational store boundary.

use fedsearch_core::constraints::Constraints;
use fedsearch_core::hit::{SearchResult, SortBy};
use fedsearch_core::id::FolderId;

use crate::error::Result;

/// Row window for a paged relational query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }
}

/// Cached per-folder totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FolderCount {
    pub items: u64,
    pub conversations: u64,
}

pub trait RelationalStore: Send + Sync {
    /// Rows matching `constraints` in `sort` order; ties break on ascending item id.
    fn search(
        &self,
        constraints: &Constraints,
        sort: SortBy,
        page: Option<Page>,
        include_deleted: bool,
    ) -> Result<Vec<SearchResult>>;

    fn count_results(&self, constraints: &Constraints, include_deleted: bool) -> Result<u64>;

    /// `None` when the folder is unknown to the store.
    fn folder_count(&self, folder: FolderId) -> Result<Option<FolderCount>>;
}

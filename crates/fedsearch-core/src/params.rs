//! Per-request search inputs.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::SearchConfig;
use crate::hit::{ItemType, SortBy};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
    pub sort: SortBy,
    pub offset: usize,
    pub limit: usize,
    /// Result types requested; every relational leaf is narrowed to these.
    pub types: BTreeSet<ItemType>,
    pub include_deleted: bool,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            sort: SortBy::DateDesc,
            offset: 0,
            limit: 100,
            types: BTreeSet::from([ItemType::Message]),
            include_deleted: false,
        }
    }
}

impl SearchParams {
    pub fn with_sort(mut self, sort: SortBy) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_types<I: IntoIterator<Item = ItemType>>(mut self, types: I) -> Self {
        self.types = types.into_iter().collect();
        self
    }

    /// Expected number of hits the caller will pull, used as the initial chunk size.
    pub fn chunk_hint(&self, cfg: &SearchConfig) -> usize {
        self.offset
            .saturating_add(self.limit)
            .clamp(1, cfg.max_top_level_chunk)
    }

    pub fn wants_calendar(&self) -> bool {
        self.types.iter().any(|t| t.is_calendar())
    }
}

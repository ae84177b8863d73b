use std::collections::BTreeSet;
use std::sync::Arc;

use fedsearch_core::config::SearchConfig;
use fedsearch_core::hit::{ItemType, SortBy};
use fedsearch_core::params::SearchParams;
use fedsearch_store::MailboxHandle;

/// Per-execution inputs threaded through `begin`.
#[derive(Debug, Clone)]
pub struct SearchContext {
    pub mailbox: Arc<MailboxHandle>,
    pub config: Arc<SearchConfig>,
    pub sort: SortBy,
    /// Initial chunk size requested by the parent.
    pub chunk_size: usize,
    pub types: BTreeSet<ItemType>,
    pub include_deleted: bool,
}

impl SearchContext {
    pub fn new(mailbox: Arc<MailboxHandle>, config: Arc<SearchConfig>, params: &SearchParams) -> Self {
        Self {
            chunk_size: params.chunk_hint(&config),
            mailbox,
            config,
            sort: params.sort,
            types: params.types.clone(),
            include_deleted: params.include_deleted,
        }
    }

    pub fn with_chunk_size(&self, chunk_size: usize) -> Arc<SearchContext> {
        Arc::new(SearchContext {
            chunk_size,
            ..self.clone()
        })
    }
}

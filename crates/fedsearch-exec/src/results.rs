//! Scoped result stream over an executing operation tree.

use fedsearch_core::hit::Hit;
use fedsearch_core::manifest::{now_ms, SearchManifest};
use fedsearch_operators::{Operation, SeenHits};
use tracing::debug;

use crate::metrics::emit_span;
use crate::runtime::ExecError;

/// Pulls hits lazily and applies offset/limit.
///
/// Union branches are not guaranteed disjoint, so identities already
/// returned are remembered (bounded LRU) when deduplication is enabled.
pub struct SearchResults {
    root: Option<Operation>,
    seen: Option<SeenHits>,
    manifest: SearchManifest,
    offset: usize,
    limit: usize,
    skipped: usize,
    returned: u64,
    duplicates: u64,
}

impl SearchResults {
    pub(crate) fn new(
        root: Operation,
        manifest: SearchManifest,
        offset: usize,
        limit: usize,
        seen: Option<SeenHits>,
    ) -> Self {
        Self {
            root: Some(root),
            seen,
            manifest,
            offset,
            limit,
            skipped: 0,
            returned: 0,
            duplicates: 0,
        }
    }

    pub fn manifest(&self) -> &SearchManifest {
        &self.manifest
    }

    pub fn is_released(&self) -> bool {
        self.root.is_none()
    }

    fn root(&mut self) -> Result<&mut Operation, ExecError> {
        self.root.as_mut().ok_or(ExecError::Released)
    }

    /// Next hit after offset, dedup and limit. On error the tree is released.
    pub fn next_hit(&mut self) -> Result<Option<Hit>, ExecError> {
        match self.advance() {
            Ok(hit) => Ok(hit),
            Err(e) => {
                self.release();
                Err(e)
            }
        }
    }

    fn advance(&mut self) -> Result<Option<Hit>, ExecError> {
        if self.returned >= self.limit as u64 {
            self.root()?;
            return Ok(None);
        }
        loop {
            let Some(hit) = self.root()?.get_next()? else {
                return Ok(None);
            };
            if let Some(seen) = self.seen.as_mut() {
                if !seen.insert(hit.id()) {
                    self.duplicates += 1;
                    continue;
                }
            }
            if self.skipped < self.offset {
                self.skipped += 1;
                continue;
            }
            self.returned += 1;
            return Ok(Some(hit));
        }
    }

    /// Rewind to the first hit.
    pub fn reset(&mut self) -> Result<(), ExecError> {
        self.root()?.reset_iterator()?;
        if let Some(seen) = self.seen.as_mut() {
            seen.clear();
        }
        self.skipped = 0;
        self.returned = 0;
        self.duplicates = 0;
        Ok(())
    }

    /// Approximate total number of matching hits, before offset and limit.
    pub fn estimate_result_size(&mut self) -> Result<u64, ExecError> {
        Ok(self.root()?.estimate_result_size()?)
    }

    pub fn execute_modes(&self) -> Vec<String> {
        self.root.as_ref().map(Operation::execute_modes).unwrap_or_default()
    }

    /// Drain the remaining hits.
    pub fn collect_hits(&mut self) -> Result<Vec<Hit>, ExecError> {
        let mut out = Vec::new();
        while let Some(hit) = self.next_hit()? {
            out.push(hit);
        }
        Ok(out)
    }

    /// Release the tree and return the finished manifest.
    pub fn close(mut self) -> SearchManifest {
        let modes = self.execute_modes();
        self.release();
        let manifest = self.manifest.clone().finish(now_ms(), self.returned, modes);
        emit_span(
            "search_finished",
            &[
                ("manifest", manifest.id.0.to_string()),
                ("plan_hash", manifest.plan_hash.to_hex()),
                ("hits", manifest.hits_returned.to_string()),
                ("duplicates", self.duplicates.to_string()),
                ("elapsed_ms", manifest.elapsed_ms().to_string()),
            ],
        );
        manifest
    }

    fn release(&mut self) {
        if let Some(mut root) = self.root.take() {
            root.done_with_search_results();
            debug!(returned = self.returned, duplicates = self.duplicates, "released search results");
        }
    }
}

impl Iterator for SearchResults {
    type Item = Result<Hit, ExecError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.root.is_none() {
            return None;
        }
        self.next_hit().transpose()
    }
}

impl Drop for SearchResults {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use fedsearch_core::config::SearchConfig;
    use fedsearch_core::hash::hash_query_string;
    use fedsearch_core::id::FolderId;
    use fedsearch_core::params::SearchParams;
    use fedsearch_operators::{RelationalLeaf, SearchContext};
    use fedsearch_store::memory::{MemoryMailbox, StoredItem};

    fn begun(limit: usize) -> SearchResults {
        let mbox = MemoryMailbox::new((1..=4).map(|i| StoredItem::message(i, 2).date(i as i64)).collect());
        let mut leaf = RelationalLeaf::new();
        leaf.leaf_mut().add_in_folder(FolderId::new(2), true);
        let mut root = Operation::Relational(leaf);
        let params = SearchParams {
            limit,
            ..SearchParams::default()
        };
        let ctx = Arc::new(SearchContext::new(mbox.handle.clone(), Arc::new(SearchConfig::default()), &params));
        root.begin(&ctx).unwrap();
        let manifest = SearchManifest::new(hash_query_string(&root.to_query_string()), now_ms());
        SearchResults::new(root, manifest, 0, limit, None)
    }

    #[test]
    fn test_iterator_stops_at_limit() {
        let results = begun(3);
        let ids: Vec<String> = results.map(|r| r.unwrap().to_string()).collect();
        assert_eq!(ids, vec!["4", "3", "2"]);
    }

    #[test]
    fn test_close_releases() {
        let mut results = begun(10);
        assert!(results.next_hit().unwrap().is_some());
        let manifest = results.close();
        assert_eq!(manifest.hits_returned, 1);
        assert!(manifest.finished_ms >= manifest.started_ms);
    }

    #[test]
    fn test_release_is_terminal() {
        let mut results = begun(10);
        results.release();
        assert!(results.is_released());
        assert!(matches!(results.next_hit(), Err(ExecError::Released)));
        assert!(results.next().is_none());
    }
}

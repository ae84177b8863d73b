//! Runtime: compile clauses, begin the local plan, and return a scoped stream.
//!
//! - Remote branches are compiled but not executed here.
//! - The plan hash is taken over the optimized local plan's query string, so
//!   equal plans hash equally across runs.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use fedsearch_core::clause::Clause;
use fedsearch_core::config::SearchConfig;
use fedsearch_core::hash::hash_query_string;
use fedsearch_core::manifest::{now_ms, SearchManifest};
use fedsearch_core::params::SearchParams;
use fedsearch_operators::{OpError, SearchContext, SeenHits};
use fedsearch_planner::{parse_yaml_clauses, CompiledQuery, PlanError, QueryPlanner};
use fedsearch_store::{MailboxHandle, PermissionResolver};

use crate::results::SearchResults;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("planning: {0}")]
    Plan(#[from] PlanError),
    #[error("operator exec: {0}")]
    Operator(#[from] OpError),
    #[error(transparent)]
    Config(#[from] fedsearch_core::error::Error),
    #[error("search results already released")]
    Released,
}

/// Engine owns the configuration and the mailbox it searches.
pub struct Engine {
    cfg: Arc<SearchConfig>,
    mailbox: Arc<MailboxHandle>,
}

impl Engine {
    pub fn new(cfg: SearchConfig, mailbox: Arc<MailboxHandle>) -> Self {
        Self {
            cfg: Arc::new(cfg),
            mailbox,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.cfg
    }

    pub fn compile(
        &self,
        clauses: &[Clause],
        params: &SearchParams,
        resolver: &dyn PermissionResolver,
    ) -> Result<CompiledQuery, ExecError> {
        Ok(QueryPlanner::new(params.clone()).compile(clauses, resolver)?)
    }

    /// Begin the local plan of `query` in the order the planner settled on.
    /// The returned stream must be drained, closed, or dropped; each of those
    /// releases the store cursors.
    pub fn execute(&self, query: &CompiledQuery, params: &SearchParams) -> Result<SearchResults, ExecError> {
        self.cfg.validate()?;
        let params = &params.clone().with_sort(query.sort);
        let mut root = query.local_or_empty();
        let plan = root.to_query_string();
        let plan_hash = hash_query_string(&plan);
        let ctx = Arc::new(SearchContext::new(self.mailbox.clone(), self.cfg.clone(), params));
        debug!(%plan, chunk = ctx.chunk_size, sort = %params.sort, "begin search");

        if let Err(e) = root.begin(&ctx) {
            root.done_with_search_results();
            return Err(e.into());
        }
        if !query.remote.is_empty() {
            info!(accounts = query.remote.len(), "remote branches left to the fan-out");
        }
        let seen = self
            .cfg
            .dedupe_results
            .then(|| SeenHits::new(self.cfg.seen_hits_capacity));
        Ok(SearchResults::new(
            root,
            SearchManifest::new(plan_hash, now_ms()),
            params.offset,
            params.limit,
            seen,
        ))
    }

    pub fn search(
        &self,
        clauses: &[Clause],
        params: &SearchParams,
        resolver: &dyn PermissionResolver,
    ) -> Result<SearchResults, ExecError> {
        let query = self.compile(clauses, params, resolver)?;
        self.execute(&query, params)
    }

    pub fn search_yaml(
        &self,
        yaml_src: &str,
        params: &SearchParams,
        resolver: &dyn PermissionResolver,
    ) -> Result<SearchResults, ExecError> {
        let clauses = parse_yaml_clauses(yaml_src)?;
        self.search(&clauses, params, resolver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedsearch_core::clause::Predicate;
    use fedsearch_core::hit::SortBy;
    use fedsearch_core::id::FolderId;
    use fedsearch_store::memory::{MemoryMailbox, StoredItem};
    use fedsearch_store::StaticPermissions;

    fn mailbox() -> MemoryMailbox {
        MemoryMailbox::new(
            (1..=10)
                .map(|i| {
                    let item = StoredItem::message(i, if i <= 6 { 2 } else { 3 })
                        .date(i as i64)
                        .body(if i % 2 == 0 { "even note" } else { "odd note" });
                    if i % 3 == 0 {
                        item.tag("x")
                    } else {
                        item
                    }
                })
                .collect(),
        )
    }

    fn ids(results: &mut SearchResults) -> Vec<String> {
        results
            .collect_hits()
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    #[test]
    fn test_search_applies_offset_and_limit() {
        let mbox = mailbox();
        let engine = Engine::new(SearchConfig::default(), mbox.handle.clone());
        let params = SearchParams {
            offset: 1,
            limit: 2,
            ..SearchParams::default()
        };
        let mut results = engine
            .search(&[Clause::Predicate(Predicate::in_folder(2))], &params, &StaticPermissions::owner())
            .unwrap();
        assert_eq!(ids(&mut results), vec!["5", "4"]);
        let manifest = results.close();
        assert_eq!(manifest.hits_returned, 2);
        assert_eq!(manifest.execute_modes, vec!["NO_LUCENE"]);
        assert_eq!(manifest.plan_hash.to_hex().len(), 64);
    }

    #[test]
    fn test_overlapping_branches_deduplicated() {
        let mbox = mailbox();
        let engine = Engine::new(SearchConfig::default(), mbox.handle.clone());
        let clauses = [
            Clause::Predicate(Predicate::in_folder(3)),
            Clause::or(),
            Clause::Predicate(Predicate::tag("x")),
        ];
        let params = SearchParams::default().with_sort(SortBy::DateAsc);
        let mut results = engine.search(&clauses, &params, &StaticPermissions::owner()).unwrap();
        assert_eq!(ids(&mut results), vec!["3", "6", "7", "8", "9", "10"]);

        // the folder and tag branches merge into one leaf, so no stream dedup is needed
        let cfg = SearchConfig {
            dedupe_results: false,
            ..SearchConfig::default()
        };
        let engine = Engine::new(cfg, mbox.handle.clone());
        let mut results = engine.search(&clauses, &params, &StaticPermissions::owner()).unwrap();
        assert_eq!(ids(&mut results), vec!["3", "6", "7", "8", "9", "10"]);
    }

    #[test]
    fn test_overlapping_branches_unique_with_tiny_seen_cache() {
        let mbox = mailbox();
        let cfg = SearchConfig {
            seen_hits_capacity: 2,
            ..SearchConfig::default()
        };
        let engine = Engine::new(cfg, mbox.handle.clone());
        let clauses = [
            Clause::Predicate(Predicate::in_folder(3)),
            Clause::or(),
            Clause::Predicate(Predicate::tag("x")),
        ];
        let params = SearchParams::default().with_sort(SortBy::None);
        let mut results = engine.search(&clauses, &params, &StaticPermissions::owner()).unwrap();
        let mut got = ids(&mut results);
        got.sort_by_key(|id| id.parse::<u64>().unwrap());
        assert_eq!(got, vec!["3", "6", "7", "8", "9", "10"]);
    }

    #[test]
    fn test_relevance_with_relational_branch_runs_by_date() {
        let mbox = mailbox();
        let engine = Engine::new(SearchConfig::default(), mbox.handle.clone());
        let clauses = [
            Clause::Predicate(Predicate::text("even")),
            Clause::or(),
            Clause::Predicate(Predicate::in_folder(3)),
        ];
        let params = SearchParams::default().with_sort(SortBy::Relevance);
        let mut results = engine.search(&clauses, &params, &StaticPermissions::owner()).unwrap();
        assert_eq!(ids(&mut results), vec!["10", "9", "8", "7", "6", "4", "2"]);
    }

    #[test]
    fn test_text_search_releases_cursors() {
        let mbox = mailbox();
        let engine = Engine::new(SearchConfig::default(), mbox.handle.clone());
        let yaml = "clauses:\n  - { op: text, query: even }\n  - { op: in, folder: 2 }\n";
        let mut results = engine
            .search_yaml(yaml, &SearchParams::default(), &StaticPermissions::owner())
            .unwrap();
        assert_eq!(results.next().map(|r| r.unwrap().to_string()).as_deref(), Some("6"));
        assert!(mbox.text.stats().cursors_opened > 0);
        drop(results);
        assert_eq!(mbox.text.stats().open_cursors, 0);
    }

    #[test]
    fn test_reset_replays_and_estimates() {
        let mbox = mailbox();
        let engine = Engine::new(SearchConfig::default(), mbox.handle.clone());
        let perms = StaticPermissions::default().with_visible([FolderId::new(3)]);
        let mut results = engine
            .search(&[Clause::Predicate(Predicate::tag("x"))], &SearchParams::default(), &perms)
            .unwrap();
        assert_eq!(ids(&mut results), vec!["9"]);
        results.reset().unwrap();
        assert_eq!(results.estimate_result_size().unwrap(), 1);
        assert_eq!(ids(&mut results), vec!["9"]);
    }

    #[test]
    fn test_empty_query_is_plan_error() {
        let mbox = mailbox();
        let engine = Engine::new(SearchConfig::default(), mbox.handle.clone());
        let err = engine
            .search(&[], &SearchParams::default(), &StaticPermissions::owner())
            .err()
            .unwrap();
        assert!(matches!(err, ExecError::Plan(PlanError::InvalidClause(_))));
    }

    #[test]
    fn test_invalid_config_rejected_before_begin() {
        let mbox = mailbox();
        let cfg = SearchConfig {
            chunk_size: 0,
            ..SearchConfig::default()
        };
        let engine = Engine::new(cfg, mbox.handle.clone());
        let err = engine
            .search(&[Clause::Predicate(Predicate::in_folder(2))], &SearchParams::default(), &StaticPermissions::owner())
            .err()
            .unwrap();
        assert!(matches!(err, ExecError::Config(_)));
        assert_eq!(mbox.relational.stats().searches, 0);
    }
}

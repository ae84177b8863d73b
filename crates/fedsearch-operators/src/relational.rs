//! Relational leaf: a constraint set, optionally joined with a text leaf.
//!
//! The execution mode is decided once, on the first chunk fetch. Every chunk
//! fetch runs under the mailbox lock; a chunk shorter than requested marks
//! the end of the stream, and chunk sizes double up to the configured ceiling.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use fedsearch_core::constraints::{ConstraintLeaf, Constraints};
use fedsearch_core::hit::{Hit, ItemType, SearchResult, SortBy, TextDoc};
use fedsearch_core::id::{FolderId, IndexId};
use fedsearch_core::target::{QueryTarget, QueryTargets};
use fedsearch_store::Page;
use tracing::{debug, trace};

use crate::context::SearchContext;
use crate::error::{OpError, Result};
use crate::operation::{Combined, Operation};
use crate::policy::{DbFirstPolicy, ExecuteMode, ModeDecision, ModeProbe};
use crate::seen::SeenHits;
use crate::text::TextLeaf;

pub struct RelationalLeaf {
    constraints: Constraints,
    target: QueryTarget,
    text: Option<TextLeaf>,
    exec: Option<LeafExec>,
}

struct LeafExec {
    ctx: Arc<SearchContext>,
    /// Constraints as executed: types restricted, plus mode-specific injections.
    work: Constraints,
    sole_folder: Option<FolderId>,
    decision: Option<ModeDecision>,
    initial_chunk: usize,
    hits_per_chunk: usize,
    rows_offset: usize,
    end_of_rows: bool,
    pending: VecDeque<Hit>,
    seen: SeenHits,
    consumed: bool,
    count: Option<u64>,
}

impl LeafExec {
    fn grow(&mut self) {
        self.hits_per_chunk = (self.hits_per_chunk * 2).min(self.ctx.config.max_hits_per_chunk.max(1));
    }

    fn restart(&mut self) {
        self.hits_per_chunk = self.initial_chunk;
        self.rows_offset = 0;
        self.end_of_rows = false;
        self.pending.clear();
        self.seen.clear();
        self.consumed = false;
    }

    fn admit(&mut self, hit: Hit) {
        if self.seen.insert(hit.id()) {
            self.pending.push_back(hit);
        }
    }

    /// One hit per matched part for part-capable items, otherwise one per row.
    fn push_row(&mut self, row: &SearchResult, docs: Option<&[TextDoc]>) {
        let ctx = self.ctx.clone();
        let materializer = &ctx.mailbox.materializer;
        match docs {
            Some(docs) if !docs.is_empty() && row.kind.allows_part_hits() => {
                for doc in docs {
                    if let Some(hit) = materializer.materialize(row, Some(doc), ctx.sort) {
                        self.admit(hit);
                    }
                }
            }
            Some(docs) => {
                let doc = docs
                    .iter()
                    .find(|d| d.part.is_none())
                    .or_else(|| docs.first());
                if let Some(mut hit) = materializer.materialize(row, doc, ctx.sort) {
                    hit.part = None;
                    self.admit(hit);
                }
            }
            None => {
                if let Some(hit) = materializer.materialize(row, None, ctx.sort) {
                    self.admit(hit);
                }
            }
        }
    }
}

impl RelationalLeaf {
    /// Unconstrained leaf: matches every item.
    pub fn new() -> Self {
        Self::from_constraints(Constraints::all(), QueryTarget::Unspecified)
    }

    pub fn from_constraints(constraints: Constraints, target: QueryTarget) -> Self {
        Self {
            constraints,
            target,
            text: None,
            exec: None,
        }
    }

    pub fn with_target(mut self, target: QueryTarget) -> Self {
        self.target = target;
        self
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    pub fn constraints_mut(&mut self) -> &mut Constraints {
        &mut self.constraints
    }

    /// The leaf that top-level conjuncts fold into.
    pub fn leaf_mut(&mut self) -> &mut ConstraintLeaf {
        self.constraints.top_leaf_mut()
    }

    pub fn target(&self) -> &QueryTarget {
        &self.target
    }

    pub fn text(&self) -> Option<&TextLeaf> {
        self.text.as_ref()
    }

    pub(crate) fn text_mut(&mut self) -> Option<&mut TextLeaf> {
        self.text.as_mut()
    }

    /// AND a text leaf into this one; an existing text leaf absorbs the new query.
    pub fn attach_text(&mut self, text: TextLeaf) {
        match self.text.as_mut() {
            Some(existing) => {
                existing.add_anded_clause(text.query().clone());
                if text.has_spam_trash_setting() {
                    existing.force_spam_trash_setting();
                }
            }
            None => self.text = Some(text),
        }
    }

    pub fn query_targets(&self) -> QueryTargets {
        QueryTargets::from([self.target.clone()])
    }

    pub fn has_no_results(&self) -> bool {
        self.constraints.has_no_results()
    }

    pub fn has_all_results(&self) -> bool {
        self.text.is_none()
            && match &self.constraints {
                Constraints::Leaf(l) => is_unconstrained(l),
                _ => false,
            }
    }

    pub fn has_spam_trash_setting(&self) -> bool {
        self.constraints.has_spam_trash_setting()
            || self.text.as_ref().is_some_and(TextLeaf::has_spam_trash_setting)
    }

    pub fn begin(&mut self, ctx: &Arc<SearchContext>) -> Result<()> {
        let max = ctx.config.max_hits_per_chunk.max(1);
        // the caller's hint never grows the first chunk past the configured size
        let mut chunk = ctx.chunk_size.min(ctx.config.chunk_size).clamp(1, max);
        if let Some(text) = self.text.as_mut() {
            chunk = (chunk * 2).min(max);
            text.bind(ctx);
        }
        let mut work = self.constraints.clone();
        work.restrict_types(&ctx.types);
        self.exec = Some(LeafExec {
            ctx: ctx.clone(),
            work,
            sole_folder: self.constraints.sole_folder(),
            decision: None,
            initial_chunk: chunk,
            hits_per_chunk: chunk,
            rows_offset: 0,
            end_of_rows: false,
            pending: VecDeque::new(),
            seen: SeenHits::new(ctx.config.seen_hits_capacity),
            consumed: false,
            count: None,
        });
        Ok(())
    }

    fn exec(&mut self) -> Result<&mut LeafExec> {
        self.exec
            .as_mut()
            .ok_or_else(|| OpError::State("relational leaf used before begin".into()))
    }

    pub fn peek_next(&mut self) -> Result<Option<Hit>> {
        self.fill()?;
        Ok(self.exec()?.pending.front().cloned())
    }

    pub fn get_next(&mut self) -> Result<Option<Hit>> {
        self.fill()?;
        let exec = self.exec()?;
        let hit = exec.pending.pop_front();
        if hit.is_some() {
            exec.consumed = true;
        }
        Ok(hit)
    }

    pub fn reset_iterator(&mut self) -> Result<()> {
        let Some(exec) = self.exec.as_mut() else {
            return Ok(());
        };
        if !exec.consumed {
            return Ok(());
        }
        exec.restart();
        if let Some(text) = self.text.as_mut() {
            text.rewind();
        }
        Ok(())
    }

    pub fn done_with_search_results(&mut self) {
        self.exec = None;
        if let Some(text) = self.text.as_mut() {
            text.release();
        }
    }

    pub fn decision(&self) -> Option<ModeDecision> {
        self.exec.as_ref().and_then(|e| e.decision)
    }

    pub(crate) fn execute_modes(&self, out: &mut Vec<String>) {
        if let Some(d) = self.decision() {
            out.push(d.mode.to_string());
        }
    }

    /// Folder count for single-folder leaves, otherwise a cached COUNT query;
    /// capped by the text estimate when text is attached.
    pub fn estimate_result_size(&mut self) -> Result<u64> {
        if self.constraints.has_no_results() {
            return Ok(0);
        }
        let RelationalLeaf {
            constraints,
            text,
            exec,
            ..
        } = self;
        let exec = exec
            .as_mut()
            .ok_or_else(|| OpError::State("relational leaf estimated before begin".into()))?;
        let ctx = exec.ctx.clone();
        let _guard = ctx.mailbox.lock()?;
        let mut basis = constraints.clone();
        basis.restrict_types(&ctx.types);
        let rows = relational_estimate(&basis, exec.sole_folder, &ctx, &mut exec.count)?;
        match text.as_mut() {
            Some(t) => Ok(rows.min(t.estimated_hits()?)),
            None => Ok(rows),
        }
    }

    fn fill(&mut self) -> Result<()> {
        let RelationalLeaf { text, exec, .. } = self;
        let exec = exec
            .as_mut()
            .ok_or_else(|| OpError::State("relational leaf used before begin".into()))?;
        while exec.pending.is_empty() && !exec.end_of_rows {
            fetch_chunk(exec, text)?;
        }
        Ok(())
    }

    pub(crate) fn combine(self, other: RelationalLeaf, union: bool) -> Combined {
        if union {
            let target = match union_target(&self.target, &other.target) {
                Some(target) if self.text.is_none() && other.text.is_none() => target,
                _ => return Combined::NotCombinable(Operation::Relational(self), Operation::Relational(other)),
            };
            if absorbs(&self, &other) {
                return Combined::Merged(Operation::Relational(self.with_target(target)));
            }
            if absorbs(&other, &self) {
                return Combined::Merged(Operation::Relational(other.with_target(target)));
            }
            let constraints = self.constraints.or(other.constraints);
            return Combined::Merged(Operation::Relational(RelationalLeaf::from_constraints(
                constraints,
                target,
            )));
        }

        if !self.target.is_compatible(&other.target) {
            debug!(lhs = %self, rhs = %other, "AND of incompatible targets");
            return Combined::Merged(Operation::NoResults);
        }
        let target = if self.target.is_explicit() {
            self.target
        } else {
            other.target
        };
        let mut merged = RelationalLeaf::from_constraints(self.constraints.and(other.constraints), target);
        merged.text = self.text;
        if let Some(t) = other.text {
            merged.attach_text(t);
        }
        Combined::Merged(Operation::Relational(merged))
    }
}

impl Default for RelationalLeaf {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for RelationalLeaf {
    fn clone(&self) -> Self {
        Self {
            constraints: self.constraints.clone(),
            target: self.target.clone(),
            text: self.text.clone(),
            exec: None,
        }
    }
}

impl fmt::Display for RelationalLeaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DB[")?;
        if self.target.is_explicit() {
            write!(f, "{}: ", self.target)?;
        }
        write!(f, "{}]", self.constraints)?;
        if let Some(text) = &self.text {
            write!(f, " {text}")?;
        }
        Ok(())
    }
}

fn is_unconstrained(leaf: &ConstraintLeaf) -> bool {
    *leaf
        == ConstraintLeaf {
            spam_trash_setting: leaf.spam_trash_setting,
            ..ConstraintLeaf::default()
        }
}

/// Target of an OR of two leaves, if they can share one.
///
/// An unspecified leaf runs against the local mailbox, so it merges with a
/// local leaf but never with a remote one.
fn union_target(lhs: &QueryTarget, rhs: &QueryTarget) -> Option<QueryTarget> {
    match (lhs, rhs) {
        _ if lhs == rhs => Some(lhs.clone()),
        (QueryTarget::Unspecified, QueryTarget::Local) | (QueryTarget::Local, QueryTarget::Unspecified) => {
            Some(QueryTarget::Local)
        }
        _ => None,
    }
}

/// `all` OR `other` == `all`, unless `all` would drop a trash/spam opt-in of `other`.
fn absorbs(all: &RelationalLeaf, other: &RelationalLeaf) -> bool {
    all.has_all_results()
        && (all.constraints.has_spam_trash_setting() || !other.constraints.has_spam_trash_setting())
}

fn relational_estimate(
    basis: &Constraints,
    sole_folder: Option<FolderId>,
    ctx: &SearchContext,
    cache: &mut Option<u64>,
) -> Result<u64> {
    if let Some(n) = *cache {
        return Ok(n);
    }
    let store = &ctx.mailbox.relational;
    let folder_count = match sole_folder {
        Some(folder) => store.folder_count(folder)?,
        None => None,
    };
    let n = match folder_count {
        Some(fc) if ctx.types.len() == 1 && ctx.types.contains(&ItemType::Conversation) => fc.conversations,
        Some(fc) => fc.items,
        None => store.count_results(basis, ctx.include_deleted)?,
    };
    *cache = Some(n);
    Ok(n)
}

struct LeafProbe<'a> {
    work: &'a Constraints,
    sole_folder: Option<FolderId>,
    text: &'a mut TextLeaf,
    ctx: &'a SearchContext,
    count: &'a mut Option<u64>,
}

impl ModeProbe for LeafProbe<'_> {
    fn has_explicit_ids(&self) -> bool {
        self.work.has_explicit_ids()
    }

    fn text_prefers_db_first(&mut self) -> Result<bool> {
        self.text.should_execute_db_first()
    }

    fn constraints_prefer_db_first(&self) -> bool {
        self.work.try_db_first()
    }

    fn estimated_text_hits(&mut self) -> Result<u64> {
        self.text.estimated_hits()
    }

    fn estimated_rows(&mut self) -> Result<u64> {
        relational_estimate(self.work, self.sole_folder, self.ctx, self.count)
    }
}

fn decide(exec: &mut LeafExec, text: &mut Option<TextLeaf>) -> Result<ModeDecision> {
    if exec.work.has_no_results() {
        return Ok(ModeDecision::new(ExecuteMode::NoResults));
    }
    let Some(text) = text.as_mut() else {
        return Ok(ModeDecision::new(ExecuteMode::NoLucene));
    };
    let ctx = exec.ctx.clone();
    let policy = DbFirstPolicy::new(&ctx.config.db_first_signals, ctx.config.small_search_threshold);
    let mut probe = LeafProbe {
        work: &exec.work,
        sole_folder: exec.sole_folder,
        text,
        ctx: &ctx,
        count: &mut exec.count,
    };
    let decision = policy.choose(&mut probe)?;
    if decision.mode == ExecuteMode::DbFirst {
        exec.work.top_leaf_mut().has_index_id = Some(true);
    }
    Ok(decision)
}

fn fetch_chunk(exec: &mut LeafExec, text: &mut Option<TextLeaf>) -> Result<()> {
    let ctx = exec.ctx.clone();
    let _guard = ctx.mailbox.lock()?;

    let decision = match exec.decision {
        Some(d) => d,
        None => {
            let d = decide(exec, text)?;
            debug!(mode = %d.mode, reason = ?d.reason, query = %exec.work, "execute mode");
            exec.decision = Some(d);
            d
        }
    };

    match (decision.mode, text.as_mut()) {
        (ExecuteMode::NoResults, _) => {
            exec.end_of_rows = true;
            Ok(())
        }
        (ExecuteMode::NoLucene, _) => fetch_no_lucene(exec, &ctx),
        (ExecuteMode::DbFirst, Some(t)) => fetch_db_first(exec, t, &ctx),
        (ExecuteMode::LuceneFirst, Some(t)) => fetch_lucene_first(exec, t, &ctx),
        (mode, None) => Err(OpError::State(format!("{mode} without a text leaf"))),
    }
}

fn fetch_no_lucene(exec: &mut LeafExec, ctx: &SearchContext) -> Result<()> {
    let limit = exec.hits_per_chunk;
    let rows = ctx.mailbox.relational.search(
        &exec.work,
        ctx.sort,
        Some(Page::new(exec.rows_offset, limit)),
        ctx.include_deleted,
    )?;
    trace!(offset = exec.rows_offset, limit, rows = rows.len(), "NO_LUCENE chunk");
    if rows.len() < limit {
        exec.end_of_rows = true;
    }
    exec.rows_offset += rows.len();
    exec.grow();
    for row in &rows {
        exec.push_row(row, None);
    }
    Ok(())
}

/// Relational candidates first; keep the rows the text index confirms, in
/// relational order. Repeats until a batch yields hits or rows run out.
fn fetch_db_first(exec: &mut LeafExec, text: &mut TextLeaf, ctx: &SearchContext) -> Result<()> {
    let text_chunk = ctx.config.max_hits_per_chunk.max(1) * ctx.config.text_chunk_multiplier.max(1);
    loop {
        let limit = exec.hits_per_chunk;
        let rows = ctx.mailbox.relational.search(
            &exec.work,
            ctx.sort,
            Some(Page::new(exec.rows_offset, limit)),
            ctx.include_deleted,
        )?;
        if rows.len() < limit {
            exec.end_of_rows = true;
        }
        exec.rows_offset += rows.len();
        exec.grow();

        let candidates: BTreeSet<IndexId> = rows.iter().filter_map(|r| r.index_id).collect();
        trace!(rows = rows.len(), candidates = candidates.len(), "DB_FIRST candidates");
        if !candidates.is_empty() {
            let confirmed = confirm_candidates(text, &candidates, text_chunk)?;
            for row in &rows {
                if let Some(docs) = row.index_id.and_then(|id| confirmed.get(&id)) {
                    exec.push_row(row, Some(docs));
                }
            }
        }
        if !exec.pending.is_empty() || exec.end_of_rows {
            return Ok(());
        }
    }
}

fn confirm_candidates(
    text: &mut TextLeaf,
    candidates: &BTreeSet<IndexId>,
    chunk: usize,
) -> Result<HashMap<IndexId, Vec<TextDoc>>> {
    let result = candidates
        .iter()
        .try_for_each(|id| text.add_filter_clause(*id))
        .and_then(|()| drain_filtered(text, candidates, chunk));
    text.clear_filter_clause();
    result
}

fn drain_filtered(
    text: &mut TextLeaf,
    candidates: &BTreeSet<IndexId>,
    chunk: usize,
) -> Result<HashMap<IndexId, Vec<TextDoc>>> {
    let mut confirmed: HashMap<IndexId, Vec<TextDoc>> = HashMap::new();
    loop {
        let batch = text.next_chunk(chunk)?;
        let short = batch.len() < chunk;
        if let Some(stray) = batch.ids().iter().find(|id| !candidates.contains(id)) {
            return Err(OpError::Inconsistent(format!(
                "index id {stray} is not among {} DB_FIRST candidates",
                candidates.len()
            )));
        }
        for (id, docs) in batch.into_docs() {
            confirmed.entry(id).or_default().extend(docs);
        }
        if short {
            return Ok(confirmed);
        }
    }
}

/// Text chunk first, then every matching row for exactly those index ids.
/// No pagination: the driving id set changes every chunk.
fn fetch_lucene_first(exec: &mut LeafExec, text: &mut TextLeaf, ctx: &SearchContext) -> Result<()> {
    let batch = ctx.config.in_clause_batch_size.min(exec.hits_per_chunk).max(1);
    let chunk = text.next_chunk(batch)?;
    if chunk.len() < batch {
        exec.end_of_rows = true;
    }
    exec.grow();
    if chunk.is_empty() {
        return Ok(());
    }

    let order: Vec<IndexId> = chunk.ids().to_vec();
    exec.work.top_leaf_mut().index_ids = order.iter().copied().collect();
    let mut rows = ctx
        .mailbox
        .relational
        .search(&exec.work, ctx.sort, None, ctx.include_deleted)?;
    if ctx.sort == SortBy::Relevance {
        let rank: HashMap<IndexId, usize> = order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        rows.sort_by_key(|r| r.index_id.and_then(|id| rank.get(&id).copied()).unwrap_or(usize::MAX));
    }
    trace!(ids = order.len(), rows = rows.len(), "LUCENE_FIRST chunk");

    let docs = chunk.into_docs();
    for row in &rows {
        let matched = row.index_id.and_then(|id| docs.get(&id)).map(Vec::as_slice);
        exec.push_row(row, matched);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedsearch_core::config::{DbFirstSignal, SearchConfig};
    use fedsearch_core::id::ItemId;
    use fedsearch_core::params::SearchParams;
    use fedsearch_core::text::TextQuery;
    use fedsearch_store::memory::{MailboxFixture, MemoryMailbox, StoredItem};
    use fedsearch_store::{MailboxHandle, StoreError, TextChunk, TextCursor, TextIndex};

    fn ctx(mailbox: Arc<MailboxHandle>, chunk: usize, sort: SortBy) -> Arc<SearchContext> {
        let params = SearchParams {
            limit: chunk,
            ..SearchParams::default()
        }
        .with_sort(sort);
        Arc::new(SearchContext::new(mailbox, Arc::new(SearchConfig::default()), &params))
    }

    fn drain(op: &mut RelationalLeaf) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(hit) = op.get_next().unwrap() {
            out.push(hit.to_string());
        }
        out
    }

    fn inbox(n: u64) -> MemoryMailbox {
        MemoryMailbox::new(
            (1..=n)
                .map(|i| StoredItem::message(i, 2).date(i as i64).body(format!("note {i}")))
                .collect(),
        )
    }

    #[test]
    fn test_no_lucene_pages_in_order() {
        let mbox = inbox(7);
        let mut leaf = RelationalLeaf::new();
        leaf.leaf_mut().add_in_folder(FolderId::new(2), true);
        leaf.begin(&ctx(mbox.handle.clone(), 2, SortBy::DateDesc)).unwrap();

        assert_eq!(leaf.peek_next().unwrap().map(|h| h.item_id), Some(ItemId::new(7)));
        assert_eq!(leaf.peek_next().unwrap().map(|h| h.item_id), Some(ItemId::new(7)));
        assert_eq!(drain(&mut leaf), vec!["7", "6", "5", "4", "3", "2", "1"]);
        assert_eq!(leaf.decision().unwrap().mode, ExecuteMode::NoLucene);
        // chunks of 2, 4, then a short chunk of 8 ends the stream
        assert_eq!(mbox.relational.stats().searches, 3);
        assert_eq!(mbox.text.stats().cursors_opened, 0);
    }

    #[test]
    fn test_configured_chunk_size_seeds_doubling() {
        let searches_for = |chunk_size: usize| {
            let mbox = inbox(50);
            let cfg = SearchConfig {
                chunk_size,
                ..SearchConfig::default()
            };
            let ctx = Arc::new(SearchContext::new(
                mbox.handle.clone(),
                Arc::new(cfg),
                &SearchParams::default(),
            ));
            let mut leaf = RelationalLeaf::new();
            leaf.leaf_mut().add_in_folder(FolderId::new(2), true);
            leaf.begin(&ctx).unwrap();
            assert_eq!(drain(&mut leaf).len(), 50);
            mbox.relational.stats().searches
        };
        // 1 + 2 + 4 + 8 + 16 full chunks, then 19 of 32
        assert_eq!(searches_for(1), 6);
        assert_eq!(searches_for(100), 1);
    }

    #[test]
    fn test_reset_replays_stream() {
        let mbox = inbox(3);
        let mut leaf = RelationalLeaf::new();
        leaf.begin(&ctx(mbox.handle.clone(), 10, SortBy::DateAsc)).unwrap();
        leaf.reset_iterator().unwrap();
        let first = drain(&mut leaf);
        leaf.reset_iterator().unwrap();
        assert_eq!(drain(&mut leaf), first);
        assert_eq!(first, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_lucene_first_emits_part_hits_once() {
        let mbox = MemoryMailbox::new(
            vec![
                StoredItem::message(1, 2)
                    .date(10)
                    .body("hello")
                    .attachment("2", "hello again"),
                StoredItem::message(2, 2).date(20).body("bye"),
                StoredItem::new(3, ItemType::Contact, 2)
                    .date(30)
                    .body("hello")
                    .attachment("1", "hello"),
            ]
            .into_iter()
            .collect(),
        );
        let mut leaf = RelationalLeaf::new();
        leaf.attach_text(TextLeaf::new(TextQuery::term("hello")));
        let c = ctx(mbox.handle.clone(), 10, SortBy::DateDesc);
        let c = Arc::new(SearchContext {
            types: [ItemType::Message, ItemType::Contact].into(),
            config: Arc::new(SearchConfig {
                db_first_signals: vec![],
                ..SearchConfig::default()
            }),
            ..(*c).clone()
        });
        leaf.begin(&c).unwrap();
        assert_eq!(drain(&mut leaf), vec!["3", "1", "1-2"]);
        assert_eq!(leaf.decision().unwrap().mode, ExecuteMode::LuceneFirst);
        leaf.done_with_search_results();
        assert_eq!(mbox.text.stats().open_cursors, 0);
    }

    #[test]
    fn test_db_first_filters_text_search() {
        let mut fixture: MailboxFixture = (1..=50)
            .map(|i| StoredItem::message(i, 5).date(i as i64).body("hello world"))
            .collect();
        for i in 51..=53 {
            fixture.insert(StoredItem::message(i, 2).date(i as i64).body(if i == 52 { "bye" } else { "hello" }));
        }
        let mbox = MemoryMailbox::new(fixture);
        let mut leaf = RelationalLeaf::new();
        leaf.leaf_mut().add_in_folder(FolderId::new(2), true);
        leaf.attach_text(TextLeaf::new(TextQuery::term("hello")));
        let c = ctx(mbox.handle.clone(), 10, SortBy::DateDesc);
        let c = Arc::new(SearchContext {
            config: Arc::new(SearchConfig {
                small_search_threshold: 10,
                ..SearchConfig::default()
            }),
            ..(*c).clone()
        });
        leaf.begin(&c).unwrap();
        assert_eq!(drain(&mut leaf), vec!["53", "51"]);
        let d = leaf.decision().unwrap();
        assert_eq!(d.mode, ExecuteMode::DbFirst);
        // "hello" is in more than 80% of documents
        assert_eq!(d.reason, Some(DbFirstSignal::TextSelectivity));
        let stats = mbox.text.stats();
        assert_eq!(stats.unfiltered_searches, 0);
        assert_eq!(stats.filter_clauses_added, 3);
    }

    struct StrayIndex;
    struct StrayCursor;

    impl TextIndex for StrayIndex {
        fn open_cursor(&self, _: &TextQuery, _: SortBy) -> fedsearch_store::Result<Box<dyn TextCursor>> {
            Ok(Box::new(StrayCursor))
        }
        fn num_docs(&self) -> u64 {
            1
        }
    }

    impl TextCursor for StrayCursor {
        fn next_chunk(&mut self, _max: usize) -> fedsearch_store::Result<TextChunk> {
            let mut c = TextChunk::new();
            c.push(TextDoc {
                index_id: IndexId::new(999),
                part: None,
                score: 1,
            });
            Ok(c)
        }
        fn add_filter_clause(&mut self, _: IndexId) {}
        fn clear_filter_clause(&mut self) {}
        fn should_execute_db_first(&self) -> bool {
            false
        }
        fn estimated_hits(&self) -> u64 {
            1
        }
        fn rewind(&mut self) {}
    }

    #[test]
    fn test_db_first_rejects_unknown_index_ids() {
        let mbox = inbox(3);
        let handle = Arc::new(MailboxHandle::new(mbox.relational.clone(), Arc::new(StrayIndex)));
        let mut leaf = RelationalLeaf::new();
        leaf.leaf_mut()
            .add_item_ids(&[ItemId::new(1), ItemId::new(2)].into(), true);
        leaf.attach_text(TextLeaf::new(TextQuery::term("x")));
        leaf.begin(&ctx(handle, 10, SortBy::DateDesc)).unwrap();
        let err = leaf.peek_next().unwrap_err();
        assert!(matches!(err, OpError::Inconsistent(_)), "{err}");
    }

    #[test]
    fn test_contradiction_never_contacts_store() {
        let mbox = inbox(3);
        let mut leaf = RelationalLeaf::new();
        leaf.leaf_mut().add_tag("x", true);
        leaf.leaf_mut().add_tag("x", false);
        leaf.begin(&ctx(mbox.handle.clone(), 10, SortBy::DateDesc)).unwrap();
        assert!(leaf.get_next().unwrap().is_none());
        assert_eq!(leaf.decision().unwrap().mode, ExecuteMode::NoResults);
        assert_eq!(mbox.relational.stats().searches, 0);
        assert_eq!(leaf.estimate_result_size().unwrap(), 0);
    }

    #[test]
    fn test_store_errors_propagate() {
        let err: OpError = StoreError::Unavailable("down".into()).into();
        assert!(err.to_string().contains("down"));
    }
}

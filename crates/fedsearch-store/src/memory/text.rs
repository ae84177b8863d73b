use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use fedsearch_core::hit::{SortBy, SortKey, TextDoc};
use fedsearch_core::id::{IndexId, ItemId};
use fedsearch_core::text::{TextQuery, DEFAULT_FIELD, PRIVATE_FIELD, PRIVATE_TERM};
use tracing::trace;

use super::fixture::MailboxFixture;
use crate::error::Result;
use crate::text::{TextChunk, TextCursor, TextIndex};

/// A term that occurs in more than this share of all documents makes
/// post-filtering relational rows cheaper than streaming the text hits.
const DB_FIRST_TERM_CUTOFF: f64 = 0.8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TextIndexStats {
    pub cursors_opened: u64,
    pub open_cursors: u64,
    pub unfiltered_searches: u64,
    pub filtered_searches: u64,
    pub filter_clauses_added: u64,
    pub chunks_fetched: u64,
}

#[derive(Default)]
struct Counters {
    cursors_opened: AtomicU64,
    open_cursors: AtomicU64,
    unfiltered_searches: AtomicU64,
    filtered_searches: AtomicU64,
    filter_clauses_added: AtomicU64,
    chunks_fetched: AtomicU64,
}

struct IndexedDoc {
    part: Option<String>,
    terms: HashSet<String>,
}

struct Inner {
    fixture: Arc<MailboxFixture>,
    by_index: BTreeMap<IndexId, ItemId>,
    docs: BTreeMap<IndexId, Vec<IndexedDoc>>,
    /// term key -> index ids of items holding it in any document
    postings: HashMap<String, BTreeSet<IndexId>>,
    counters: Counters,
}

/// Inverted index over the fixture's item parts.
///
/// Each part is its own document; the top-level document also carries the
/// subject, sender, and the private-item marker.
pub struct MemoryTextIndex {
    inner: Arc<Inner>,
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

impl MemoryTextIndex {
    pub fn new(fixture: Arc<MailboxFixture>) -> Self {
        let mut by_index = BTreeMap::new();
        let mut docs: BTreeMap<IndexId, Vec<IndexedDoc>> = BTreeMap::new();
        let mut postings: HashMap<String, BTreeSet<IndexId>> = HashMap::new();

        for item in fixture.items() {
            let Some(index_id) = item.index_id else {
                continue;
            };
            by_index.insert(index_id, item.id);

            let mut top = IndexedDoc {
                part: None,
                terms: HashSet::new(),
            };
            top.terms
                .extend(tokens(&item.subject).map(|t| format!("subject:{t}")));
            top.terms
                .extend(tokens(&item.sender).map(|t| format!("from:{t}")));
            if item.private {
                top.terms.insert(format!("{PRIVATE_FIELD}:{PRIVATE_TERM}"));
            }
            let mut item_docs = Vec::new();
            for part in &item.parts {
                let content = tokens(&part.text).map(|t| format!("{DEFAULT_FIELD}:{t}"));
                match &part.name {
                    None => top.terms.extend(content),
                    Some(name) => item_docs.push(IndexedDoc {
                        part: Some(name.clone()),
                        terms: content.collect(),
                    }),
                }
            }
            item_docs.insert(0, top);

            for doc in &item_docs {
                for term in &doc.terms {
                    postings.entry(term.clone()).or_default().insert(index_id);
                }
            }
            docs.insert(index_id, item_docs);
        }

        Self {
            inner: Arc::new(Inner {
                fixture,
                by_index,
                docs,
                postings,
                counters: Counters::default(),
            }),
        }
    }

    pub fn stats(&self) -> TextIndexStats {
        let c = &self.inner.counters;
        TextIndexStats {
            cursors_opened: c.cursors_opened.load(Ordering::Relaxed),
            open_cursors: c.open_cursors.load(Ordering::Relaxed),
            unfiltered_searches: c.unfiltered_searches.load(Ordering::Relaxed),
            filtered_searches: c.filtered_searches.load(Ordering::Relaxed),
            filter_clauses_added: c.filter_clauses_added.load(Ordering::Relaxed),
            chunks_fetched: c.chunks_fetched.load(Ordering::Relaxed),
        }
    }
}

impl TextIndex for MemoryTextIndex {
    fn open_cursor(&self, query: &TextQuery, sort: SortBy) -> Result<Box<dyn TextCursor>> {
        let c = &self.inner.counters;
        c.cursors_opened.fetch_add(1, Ordering::Relaxed);
        c.open_cursors.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MemoryTextCursor {
            inner: self.inner.clone(),
            query: query.clone(),
            sort,
            filter: BTreeSet::new(),
            results: None,
            pos: 0,
        }))
    }

    fn num_docs(&self) -> u64 {
        self.inner.by_index.len() as u64
    }
}

struct MemoryTextCursor {
    inner: Arc<Inner>,
    query: TextQuery,
    sort: SortBy,
    filter: BTreeSet<IndexId>,
    results: Option<Vec<(IndexId, Vec<TextDoc>)>>,
    pos: usize,
}

impl MemoryTextCursor {
    fn run_search(&self) -> Vec<(IndexId, Vec<TextDoc>)> {
        let counters = &self.inner.counters;
        let candidates: Box<dyn Iterator<Item = (&IndexId, &Vec<IndexedDoc>)> + '_> =
            if self.filter.is_empty() {
                counters.unfiltered_searches.fetch_add(1, Ordering::Relaxed);
                Box::new(self.inner.docs.iter())
            } else {
                counters.filtered_searches.fetch_add(1, Ordering::Relaxed);
                Box::new(
                    self.filter
                        .iter()
                        .filter_map(|id| self.inner.docs.get_key_value(id)),
                )
            };

        let positive: Vec<String> = self.query.positive_terms().iter().map(|t| t.key()).collect();
        let top_level_only = self.query.is_negative_only();

        let mut keyed: Vec<(SortKey, IndexId, Vec<TextDoc>)> = Vec::new();
        for (&index_id, item_docs) in candidates {
            let matched: Vec<TextDoc> = item_docs
                .iter()
                .filter(|d| !top_level_only || d.part.is_none())
                .filter(|d| self.query.matches(&|t| d.terms.contains(&t.key())))
                .map(|d| TextDoc {
                    index_id,
                    part: d.part.clone(),
                    score: positive.iter().filter(|k| d.terms.contains(*k)).count().max(1) as u32,
                })
                .collect();
            if matched.is_empty() {
                continue;
            }
            let key = match self.sort {
                SortBy::Relevance => {
                    SortKey::Int(matched.iter().map(|d| i64::from(d.score)).max().unwrap_or(0))
                }
                sort => self
                    .inner
                    .by_index
                    .get(&index_id)
                    .and_then(|id| self.inner.fixture.get(*id))
                    .map(|item| item.sort_key(sort))
                    .unwrap_or(SortKey::None),
            };
            keyed.push((key, index_id, matched));
        }
        keyed.sort_by(|a, b| self.sort.compare_keys(&a.0, &b.0).then(a.1.cmp(&b.1)));
        trace!(query = ?self.query, filtered = !self.filter.is_empty(), hits = keyed.len(), "memory text search");
        keyed.into_iter().map(|(_, id, docs)| (id, docs)).collect()
    }

    fn restart(&mut self) {
        self.results = None;
        self.pos = 0;
    }

    fn estimate(&self, q: &TextQuery) -> u64 {
        let total = self.inner.by_index.len() as u64;
        match q {
            TextQuery::Term(t) => self
                .inner
                .postings
                .get(&t.key())
                .map_or(0, |ids| ids.len() as u64),
            TextQuery::Not(_) => total,
            TextQuery::And(cs) => cs.iter().map(|c| self.estimate(c)).min().unwrap_or(total),
            TextQuery::Or(cs) => cs.iter().map(|c| self.estimate(c)).sum::<u64>().min(total),
        }
    }
}

impl TextCursor for MemoryTextCursor {
    fn next_chunk(&mut self, max: usize) -> Result<TextChunk> {
        if self.results.is_none() {
            self.results = Some(self.run_search());
        }
        self.inner
            .counters
            .chunks_fetched
            .fetch_add(1, Ordering::Relaxed);
        let mut chunk = TextChunk::new();
        if let Some(results) = &self.results {
            let end = (self.pos + max).min(results.len());
            for (_, docs) in &results[self.pos..end] {
                for d in docs {
                    chunk.push(d.clone());
                }
            }
            self.pos = end;
        }
        Ok(chunk)
    }

    fn add_filter_clause(&mut self, id: IndexId) {
        self.inner
            .counters
            .filter_clauses_added
            .fetch_add(1, Ordering::Relaxed);
        self.filter.insert(id);
        self.restart();
    }

    fn clear_filter_clause(&mut self) {
        self.filter.clear();
        self.restart();
    }

    fn should_execute_db_first(&self) -> bool {
        let TextQuery::Term(t) = &self.query else {
            return false;
        };
        let total = self.inner.by_index.len() as f64;
        let freq = self.inner.postings.get(&t.key()).map_or(0, BTreeSet::len) as f64;
        total > 0.0 && freq > DB_FIRST_TERM_CUTOFF * total
    }

    fn estimated_hits(&self) -> u64 {
        self.estimate(&self.query)
    }

    fn rewind(&mut self) {
        self.pos = 0;
    }
}

impl Drop for MemoryTextCursor {
    fn drop(&mut self) {
        self.inner
            .counters
            .open_cursors
            .fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::StoredItem;

    fn index() -> MemoryTextIndex {
        let fixture: MailboxFixture = vec![
            StoredItem::message(1, 2).date(10).body("hello world"),
            StoredItem::message(2, 2)
                .date(30)
                .body("nothing here")
                .attachment("2", "hello attachment"),
            StoredItem::message(3, 2).date(20).body("hello again").private(),
            StoredItem::message(4, 2).date(5).body("bye").unindexed(),
        ]
        .into_iter()
        .collect();
        MemoryTextIndex::new(Arc::new(fixture))
    }

    fn drain(cursor: &mut dyn TextCursor, max: usize) -> Vec<u64> {
        let mut out = Vec::new();
        loop {
            let chunk = cursor.next_chunk(max).unwrap();
            if chunk.is_empty() {
                return out;
            }
            out.extend(chunk.ids().iter().map(|id| id.get()));
        }
    }

    #[test]
    fn test_term_search_in_sort_order() {
        let idx = index();
        let mut c = idx
            .open_cursor(&TextQuery::term("hello"), SortBy::DateDesc)
            .unwrap();
        assert_eq!(drain(c.as_mut(), 2), vec![2, 3, 1]);
        c.rewind();
        let first = c.next_chunk(1).unwrap();
        assert_eq!(first.docs(IndexId::new(2)).unwrap()[0].part.as_deref(), Some("2"));
        assert_eq!(idx.stats().unfiltered_searches, 1);
    }

    #[test]
    fn test_filter_restricts_and_restarts() {
        let idx = index();
        let mut c = idx
            .open_cursor(&TextQuery::term("hello"), SortBy::DateAsc)
            .unwrap();
        c.add_filter_clause(IndexId::new(3));
        c.add_filter_clause(IndexId::new(4));
        assert_eq!(drain(c.as_mut(), 10), vec![3]);
        let stats = idx.stats();
        assert_eq!(stats.filtered_searches, 1);
        assert_eq!(stats.unfiltered_searches, 0);
        assert_eq!(stats.filter_clauses_added, 2);
    }

    #[test]
    fn test_private_exclusion_and_negative_queries() {
        let idx = index();
        let q = TextQuery::term("hello").and(TextQuery::private_exclusion());
        let mut c = idx.open_cursor(&q, SortBy::DateAsc).unwrap();
        assert_eq!(drain(c.as_mut(), 10), vec![1, 2]);

        let mut c = idx
            .open_cursor(&TextQuery::term("hello").negate(), SortBy::DateAsc)
            .unwrap();
        let chunk = c.next_chunk(10).unwrap();
        // attachment parts never satisfy a purely negative query
        assert_eq!(chunk.ids(), &[IndexId::new(2)]);
        assert_eq!(chunk.docs(IndexId::new(2)).unwrap()[0].part, None);
    }

    #[test]
    fn test_estimates_and_cursor_accounting() {
        let idx = index();
        {
            let c = idx
                .open_cursor(&TextQuery::term("hello"), SortBy::DateAsc)
                .unwrap();
            assert_eq!(c.estimated_hits(), 3);
            assert!(c.should_execute_db_first());
            assert_eq!(idx.stats().open_cursors, 1);
        }
        let stats = idx.stats();
        assert_eq!(stats.open_cursors, 0);
        assert_eq!(stats.cursors_opened, 1);
        assert_eq!(stats.unfiltered_searches, 0);
    }
}

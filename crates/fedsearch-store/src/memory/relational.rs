use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use fedsearch_core::constraints::{ConstraintLeaf, Constraints, RangeField};
use fedsearch_core::hit::{SearchResult, SortBy};
use fedsearch_core::id::FolderId;
use tracing::trace;

use super::fixture::{MailboxFixture, StoredItem};
use crate::error::{Result, StoreError};
use crate::relational::{FolderCount, Page, RelationalStore};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelationalStats {
    pub searches: u64,
    pub counts: u64,
    pub rows_returned: u64,
}

/// Evaluates constraint trees directly against the fixture.
///
/// Remote-account constraints never match: the local store cannot see other mailboxes.
pub struct MemoryRelationalStore {
    fixture: Arc<MailboxFixture>,
    searches: AtomicU64,
    counts: AtomicU64,
    rows_returned: AtomicU64,
}

impl MemoryRelationalStore {
    pub fn new(fixture: Arc<MailboxFixture>) -> Self {
        Self {
            fixture,
            searches: AtomicU64::new(0),
            counts: AtomicU64::new(0),
            rows_returned: AtomicU64::new(0),
        }
    }

    pub fn stats(&self) -> RelationalStats {
        RelationalStats {
            searches: self.searches.load(Ordering::Relaxed),
            counts: self.counts.load(Ordering::Relaxed),
            rows_returned: self.rows_returned.load(Ordering::Relaxed),
        }
    }

    fn matching<'a>(
        &'a self,
        constraints: &'a Constraints,
        include_deleted: bool,
    ) -> impl Iterator<Item = &'a StoredItem> + 'a {
        self.fixture
            .items()
            .filter(move |item| (include_deleted || !item.deleted) && matches(constraints, item))
    }
}

fn matches(c: &Constraints, item: &StoredItem) -> bool {
    match c {
        Constraints::Leaf(leaf) => leaf_matches(leaf, item),
        Constraints::And(cs) => cs.iter().all(|c| matches(c, item)),
        Constraints::Or(cs) => cs.iter().any(|c| matches(c, item)),
    }
}

fn leaf_matches(leaf: &ConstraintLeaf, item: &StoredItem) -> bool {
    if leaf.no_results
        || !leaf.remote_folders.is_empty()
        || !leaf.remote_item_ids.is_empty()
        || leaf.remote_conv_id.is_some()
    {
        return false;
    }
    if !leaf.tags.is_subset(&item.tags) || !leaf.exclude_tags.is_disjoint(&item.tags) {
        return false;
    }
    if !included(&leaf.folders, &leaf.exclude_folders, &item.folder) {
        return false;
    }
    if let Some(conv) = leaf.conv_id {
        if item.conversation != Some(conv) {
            return false;
        }
    }
    if item
        .conversation
        .is_some_and(|c| leaf.exclude_conv_ids.contains(&c))
    {
        return false;
    }
    if !included(&leaf.item_ids, &leaf.exclude_item_ids, &item.id) {
        return false;
    }
    if !leaf.index_ids.is_empty()
        && !item.index_id.is_some_and(|id| leaf.index_ids.contains(&id))
    {
        return false;
    }
    if leaf
        .has_index_id
        .is_some_and(|want| want != item.index_id.is_some())
    {
        return false;
    }
    if !included(&leaf.types, &leaf.exclude_types, &item.kind) {
        return false;
    }
    leaf.ranges.iter().all(|r| {
        let v = match r.field {
            RangeField::Date => item.date,
            RangeField::Size => item.size,
        };
        r.matches(v)
    })
}

fn included<T: Ord>(include: &BTreeSet<T>, exclude: &BTreeSet<T>, v: &T) -> bool {
    (include.is_empty() || include.contains(v)) && !exclude.contains(v)
}

impl RelationalStore for MemoryRelationalStore {
    fn search(
        &self,
        constraints: &Constraints,
        sort: SortBy,
        page: Option<Page>,
        include_deleted: bool,
    ) -> Result<Vec<SearchResult>> {
        if let Some(p) = page {
            if p.limit == 0 {
                return Err(StoreError::Invalid("page limit must be positive".into()));
            }
        }
        self.searches.fetch_add(1, Ordering::Relaxed);

        let mut rows: Vec<SearchResult> = self
            .matching(constraints, include_deleted)
            .map(|item| SearchResult {
                item_id: item.id,
                index_id: item.index_id,
                kind: item.kind,
                sort_key: item.sort_key(sort),
            })
            .collect();
        rows.sort_by(|a, b| {
            sort.compare_keys(&a.sort_key, &b.sort_key)
                .then(a.item_id.cmp(&b.item_id))
        });

        let rows: Vec<SearchResult> = match page {
            Some(p) => rows.into_iter().skip(p.offset).take(p.limit).collect(),
            None => rows,
        };
        self.rows_returned
            .fetch_add(rows.len() as u64, Ordering::Relaxed);
        trace!(query = %constraints, rows = rows.len(), "memory relational search");
        Ok(rows)
    }

    fn count_results(&self, constraints: &Constraints, include_deleted: bool) -> Result<u64> {
        self.counts.fetch_add(1, Ordering::Relaxed);
        Ok(self.matching(constraints, include_deleted).count() as u64)
    }

    fn folder_count(&self, folder: FolderId) -> Result<Option<FolderCount>> {
        let mut count = FolderCount::default();
        let mut convs = BTreeSet::new();
        let mut seen = false;
        for item in self.fixture.items().filter(|i| i.folder == folder) {
            seen = true;
            if item.deleted {
                continue;
            }
            count.items += 1;
            convs.insert(item.conversation.unwrap_or(item.id));
        }
        count.conversations = convs.len() as u64;
        Ok(seen.then_some(count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedsearch_core::clause::Range;
    use fedsearch_core::id::ItemId;

    use crate::memory::StoredItem;

    fn store() -> MemoryRelationalStore {
        let fixture: MailboxFixture = vec![
            StoredItem::message(1, 2).date(30).tag("x"),
            StoredItem::message(2, 2).date(10),
            StoredItem::message(3, 5).date(20).tag("x"),
            StoredItem::message(4, 2).date(40).deleted(),
        ]
        .into_iter()
        .collect();
        MemoryRelationalStore::new(Arc::new(fixture))
    }

    fn ids(rows: &[SearchResult]) -> Vec<u64> {
        rows.iter().map(|r| r.item_id.get()).collect()
    }

    #[test]
    fn test_search_sorts_and_pages() {
        let s = store();
        let all = Constraints::all();
        let rows = s.search(&all, SortBy::DateDesc, None, false).unwrap();
        assert_eq!(ids(&rows), vec![1, 3, 2]);
        let rows = s
            .search(&all, SortBy::DateAsc, Some(Page::new(1, 1)), false)
            .unwrap();
        assert_eq!(ids(&rows), vec![3]);
        let rows = s.search(&all, SortBy::DateDesc, None, true).unwrap();
        assert_eq!(ids(&rows), vec![4, 1, 3, 2]);
    }

    #[test]
    fn test_leaf_filters() {
        let s = store();
        let mut leaf = ConstraintLeaf::default();
        leaf.add_in_folder(FolderId::new(2), true);
        leaf.add_tag("x", true);
        let rows = s
            .search(&Constraints::Leaf(leaf), SortBy::None, None, false)
            .unwrap();
        assert_eq!(ids(&rows), vec![1]);

        let mut leaf = ConstraintLeaf::default();
        leaf.add_range(RangeField::Date, Range::between(15, 35), true);
        leaf.add_item_ids(&BTreeSet::from([ItemId::new(3)]), false);
        let rows = s
            .search(&Constraints::Leaf(leaf), SortBy::None, None, false)
            .unwrap();
        assert_eq!(ids(&rows), vec![1]);
        assert_eq!(s.stats().searches, 2);
    }

    #[test]
    fn test_folder_count_skips_deleted() {
        let s = store();
        let c = s.folder_count(FolderId::new(2)).unwrap().unwrap();
        assert_eq!(c.items, 2);
        assert!(s.folder_count(FolderId::new(99)).unwrap().is_none());
    }
}

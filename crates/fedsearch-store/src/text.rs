//! Text index boundary.

use std::collections::BTreeMap;

use fedsearch_core::hit::{SortBy, TextDoc};
use fedsearch_core::id::IndexId;
use fedsearch_core::text::TextQuery;

use crate::error::Result;

/// One chunk of text results: matched documents grouped by index id, in cursor order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextChunk {
    docs: BTreeMap<IndexId, Vec<TextDoc>>,
    order: Vec<IndexId>,
}

impl TextChunk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, doc: TextDoc) {
        let id = doc.index_id;
        let entry = self.docs.entry(id).or_insert_with(|| {
            self.order.push(id);
            Vec::new()
        });
        entry.push(doc);
    }

    /// Number of distinct index ids.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn ids(&self) -> &[IndexId] {
        &self.order
    }

    pub fn docs(&self, id: IndexId) -> Option<&[TextDoc]> {
        self.docs.get(&id).map(Vec::as_slice)
    }

    pub fn contains(&self, id: IndexId) -> bool {
        self.docs.contains_key(&id)
    }

    pub fn into_docs(self) -> BTreeMap<IndexId, Vec<TextDoc>> {
        self.docs
    }
}

pub trait TextIndex: Send + Sync {
    fn open_cursor(&self, query: &TextQuery, sort: SortBy) -> Result<Box<dyn TextCursor>>;

    /// Number of indexed top-level items.
    fn num_docs(&self) -> u64;
}

/// Stateful stream over one text query.
///
/// Filter clauses restrict the next search to the given index ids; adding or
/// clearing one restarts the stream.
pub trait TextCursor: Send {
    /// Up to `max` distinct index ids with all their matched documents.
    fn next_chunk(&mut self, max: usize) -> Result<TextChunk>;

    fn add_filter_clause(&mut self, id: IndexId);

    fn clear_filter_clause(&mut self);

    /// The query alone matches most of the index.
    fn should_execute_db_first(&self) -> bool;

    /// Cheap upper-bound estimate of matching items; never runs the search.
    fn estimated_hits(&self) -> u64;

    /// Restart the stream from its first chunk.
    fn rewind(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_groups_by_index_id() {
        let mut c = TextChunk::new();
        for (id, part) in [(7, None), (3, None), (7, Some("2"))] {
            c.push(TextDoc {
                index_id: IndexId::new(id),
                part: part.map(str::to_string),
                score: 1,
            });
        }
        assert_eq!(c.len(), 2);
        assert_eq!(c.ids(), &[IndexId::new(7), IndexId::new(3)]);
        assert_eq!(c.docs(IndexId::new(7)).map(<[TextDoc]>::len), Some(2));
    }
}

use fedsearch_core::hit::{Hit, SearchResult, SortBy, SortKey, TextDoc};

/// Builds hits from relational rows. Returning `None` drops the row
/// (e.g. the item could not be loaded).
pub trait HitMaterializer: Send + Sync {
    fn materialize(&self, row: &SearchResult, doc: Option<&TextDoc>, sort: SortBy) -> Option<Hit>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RowMaterializer;

impl HitMaterializer for RowMaterializer {
    fn materialize(&self, row: &SearchResult, doc: Option<&TextDoc>, sort: SortBy) -> Option<Hit> {
        let sort_key = match (sort, doc) {
            (SortBy::Relevance, Some(d)) => SortKey::Int(i64::from(d.score)),
            _ => row.sort_key.clone(),
        };
        let mut hit = Hit::new(row.item_id, row.kind, sort_key);
        hit.part = doc.and_then(|d| d.part.clone());
        Some(hit)
    }
}

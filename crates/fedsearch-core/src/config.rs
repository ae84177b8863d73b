//! Search tunables shared by the planner and the operators.

use serde::{Deserialize, Serialize};

/// Signals consulted, in order, when a text-bearing relational leaf picks its mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DbFirstSignal {
    /// The constraints name explicit items or a conversation.
    ExplicitIds,
    /// The text store reports the query matches most of the index.
    TextSelectivity,
    /// The constraints hint at few candidates, or their row estimate beats the text estimate.
    ConstraintSelectivity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Rows fetched per relational chunk before doubling.
    pub chunk_size: usize,

    /// Upper bound for any chunk fetched from either store.
    pub max_hits_per_chunk: usize,

    /// Text chunk multiplier applied while draining a DB_FIRST filter.
    pub text_chunk_multiplier: usize,

    /// Capacity of the per-leaf "already returned" LRU.
    pub seen_hits_capacity: usize,

    /// Upper bound on index ids pushed into one LUCENE_FIRST relational query.
    pub in_clause_batch_size: usize,

    /// Relational estimates at or below this count favor DB_FIRST.
    pub small_search_threshold: u64,

    /// Cap for the chunk hint derived from offset + limit.
    pub max_top_level_chunk: usize,

    /// Signals the DB_FIRST policy evaluates, in order.
    pub db_first_signals: Vec<DbFirstSignal>,

    /// Drop duplicate hits from the top-level stream.
    pub dedupe_results: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            max_hits_per_chunk: 2000,
            text_chunk_multiplier: 3,
            seen_hits_capacity: 2048,
            in_clause_batch_size: 1000,
            small_search_threshold: 1000,
            max_top_level_chunk: 1000,
            db_first_signals: vec![
                DbFirstSignal::ExplicitIds,
                DbFirstSignal::TextSelectivity,
                DbFirstSignal::ConstraintSelectivity,
            ],
            dedupe_results: true,
        }
    }
}

impl SearchConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `FEDSEARCH_CHUNK_SIZE`: initial relational chunk size
    /// - `FEDSEARCH_MAX_HITS_PER_CHUNK`: chunk upper bound
    /// - `FEDSEARCH_TEXT_CHUNK_MULTIPLIER`: DB_FIRST text drain multiplier
    /// - `FEDSEARCH_SEEN_HITS_CAPACITY`: dedup LRU capacity
    /// - `FEDSEARCH_IN_CLAUSE_BATCH_SIZE`: LUCENE_FIRST batch bound
    /// - `FEDSEARCH_SMALL_SEARCH_THRESHOLD`: DB_FIRST row threshold
    /// - `FEDSEARCH_MAX_TOP_LEVEL_CHUNK`: cap on the offset + limit chunk hint
    /// - `FEDSEARCH_DEDUPE_RESULTS`: `true`/`false`
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("FEDSEARCH_CHUNK_SIZE") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.chunk_size = v;
            }
        }

        if let Ok(s) = std::env::var("FEDSEARCH_MAX_HITS_PER_CHUNK") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.max_hits_per_chunk = v;
            }
        }

        if let Ok(s) = std::env::var("FEDSEARCH_TEXT_CHUNK_MULTIPLIER") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.text_chunk_multiplier = v;
            }
        }

        if let Ok(s) = std::env::var("FEDSEARCH_SEEN_HITS_CAPACITY") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.seen_hits_capacity = v;
            }
        }

        if let Ok(s) = std::env::var("FEDSEARCH_IN_CLAUSE_BATCH_SIZE") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.in_clause_batch_size = v;
            }
        }

        if let Ok(s) = std::env::var("FEDSEARCH_SMALL_SEARCH_THRESHOLD") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.small_search_threshold = v;
            }
        }

        if let Ok(s) = std::env::var("FEDSEARCH_MAX_TOP_LEVEL_CHUNK") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.max_top_level_chunk = v;
            }
        }

        if let Ok(s) = std::env::var("FEDSEARCH_DEDUPE_RESULTS") {
            if let Ok(v) = s.parse::<bool>() {
                cfg.dedupe_results = v;
            }
        }

        cfg
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if self.chunk_size == 0 || self.max_hits_per_chunk == 0 {
            return Err(crate::error::Error::Config(
                "chunk sizes must be positive".into(),
            ));
        }
        if self.chunk_size > self.max_hits_per_chunk {
            return Err(crate::error::Error::Config(format!(
                "chunk_size {} exceeds max_hits_per_chunk {}",
                self.chunk_size, self.max_hits_per_chunk
            )));
        }
        if self.seen_hits_capacity == 0 || self.in_clause_batch_size == 0 {
            return Err(crate::error::Error::Config(
                "seen_hits_capacity and in_clause_batch_size must be positive".into(),
            ));
        }
        if self.text_chunk_multiplier == 0 || self.max_top_level_chunk == 0 {
            return Err(crate::error::Error::Config(
                "text_chunk_multiplier and max_top_level_chunk must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let cfg = SearchConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.db_first_signals[0], DbFirstSignal::ExplicitIds);
    }

    #[test]
    fn test_oversized_chunk_rejected() {
        let cfg = SearchConfig {
            chunk_size: 5000,
            ..SearchConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_from_env_reads_chunk_knobs() {
        std::env::set_var("FEDSEARCH_TEXT_CHUNK_MULTIPLIER", "5");
        std::env::set_var("FEDSEARCH_MAX_TOP_LEVEL_CHUNK", "250");
        let cfg = SearchConfig::from_env();
        std::env::remove_var("FEDSEARCH_TEXT_CHUNK_MULTIPLIER");
        std::env::remove_var("FEDSEARCH_MAX_TOP_LEVEL_CHUNK");
        assert_eq!(cfg.text_chunk_multiplier, 5);
        assert_eq!(cfg.max_top_level_chunk, 250);
        assert!(cfg.validate().is_ok());
    }
}

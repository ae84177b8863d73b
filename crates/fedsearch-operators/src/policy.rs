//! Execution-mode selection for relational leaves with attached text.

use std::fmt;

use fedsearch_core::config::DbFirstSignal;
use tracing::debug;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecuteMode {
    /// Constraints are contradictory; no store is contacted.
    NoResults,
    /// No text clause; paged relational fetch only.
    NoLucene,
    /// Relational candidates first, confirmed by a filtered text search.
    DbFirst,
    /// Text chunks first, joined to relational rows by index id.
    LuceneFirst,
}

impl fmt::Display for ExecuteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecuteMode::NoResults => "NO_RESULTS",
            ExecuteMode::NoLucene => "NO_LUCENE",
            ExecuteMode::DbFirst => "DB_FIRST",
            ExecuteMode::LuceneFirst => "LUCENE_FIRST",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeDecision {
    pub mode: ExecuteMode,
    /// Signal that selected DB_FIRST, if any.
    pub reason: Option<DbFirstSignal>,
}

impl ModeDecision {
    pub fn new(mode: ExecuteMode) -> Self {
        Self { mode, reason: None }
    }
}

/// Inputs the policy may consult. Methods are only called when their signal is reached.
pub trait ModeProbe {
    fn has_explicit_ids(&self) -> bool;

    fn text_prefers_db_first(&mut self) -> Result<bool>;

    /// Constraint-side hint (conversation id, unread tag).
    fn constraints_prefer_db_first(&self) -> bool;

    fn estimated_text_hits(&mut self) -> Result<u64>;

    fn estimated_rows(&mut self) -> Result<u64>;
}

/// Ordered DB_FIRST signals; the first one that fires wins, otherwise LUCENE_FIRST.
#[derive(Debug, Clone)]
pub struct DbFirstPolicy<'a> {
    signals: &'a [DbFirstSignal],
    small_search_threshold: u64,
}

impl<'a> DbFirstPolicy<'a> {
    pub fn new(signals: &'a [DbFirstSignal], small_search_threshold: u64) -> Self {
        Self {
            signals,
            small_search_threshold,
        }
    }

    pub fn choose(&self, probe: &mut dyn ModeProbe) -> Result<ModeDecision> {
        for &signal in self.signals {
            let fired = match signal {
                DbFirstSignal::ExplicitIds => probe.has_explicit_ids(),
                DbFirstSignal::TextSelectivity => probe.text_prefers_db_first()?,
                DbFirstSignal::ConstraintSelectivity => {
                    probe.constraints_prefer_db_first() || self.rows_beat_text(probe)?
                }
            };
            if fired {
                debug!(?signal, "chose DB_FIRST");
                return Ok(ModeDecision {
                    mode: ExecuteMode::DbFirst,
                    reason: Some(signal),
                });
            }
        }
        Ok(ModeDecision::new(ExecuteMode::LuceneFirst))
    }

    fn rows_beat_text(&self, probe: &mut dyn ModeProbe) -> Result<bool> {
        let text = probe.estimated_text_hits()?;
        if text <= self.small_search_threshold {
            return Ok(false);
        }
        Ok(probe.estimated_rows()? < text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Probe {
        explicit: bool,
        text_hint: bool,
        constraint_hint: bool,
        text_hits: u64,
        rows: u64,
        asked: Vec<&'static str>,
    }

    impl ModeProbe for Probe {
        fn has_explicit_ids(&self) -> bool {
            self.explicit
        }
        fn text_prefers_db_first(&mut self) -> Result<bool> {
            self.asked.push("text_hint");
            Ok(self.text_hint)
        }
        fn constraints_prefer_db_first(&self) -> bool {
            self.constraint_hint
        }
        fn estimated_text_hits(&mut self) -> Result<u64> {
            self.asked.push("text_hits");
            Ok(self.text_hits)
        }
        fn estimated_rows(&mut self) -> Result<u64> {
            self.asked.push("rows");
            Ok(self.rows)
        }
    }

    fn all_signals() -> Vec<DbFirstSignal> {
        vec![
            DbFirstSignal::ExplicitIds,
            DbFirstSignal::TextSelectivity,
            DbFirstSignal::ConstraintSelectivity,
        ]
    }

    #[test]
    fn test_explicit_ids_short_circuit() {
        let signals = all_signals();
        let policy = DbFirstPolicy::new(&signals, 1000);
        let mut p = Probe {
            explicit: true,
            ..Probe::default()
        };
        let d = policy.choose(&mut p).unwrap();
        assert_eq!(d.mode, ExecuteMode::DbFirst);
        assert_eq!(d.reason, Some(DbFirstSignal::ExplicitIds));
        assert!(p.asked.is_empty());
    }

    #[test]
    fn test_small_relational_side_wins() {
        let signals = all_signals();
        let policy = DbFirstPolicy::new(&signals, 1000);
        let mut p = Probe {
            text_hits: 500_000,
            rows: 80,
            ..Probe::default()
        };
        let d = policy.choose(&mut p).unwrap();
        assert_eq!(d.reason, Some(DbFirstSignal::ConstraintSelectivity));
        assert_eq!(p.asked, vec!["text_hint", "text_hits", "rows"]);
    }

    #[test]
    fn test_small_text_side_skips_count() {
        let signals = all_signals();
        let policy = DbFirstPolicy::new(&signals, 1000);
        let mut p = Probe {
            text_hits: 20,
            rows: 5,
            ..Probe::default()
        };
        assert_eq!(policy.choose(&mut p).unwrap().mode, ExecuteMode::LuceneFirst);
        assert!(!p.asked.contains(&"rows"));
    }

    #[test]
    fn test_signal_order_is_configurable() {
        let signals = vec![DbFirstSignal::TextSelectivity];
        let policy = DbFirstPolicy::new(&signals, 1000);
        let mut p = Probe {
            explicit: true,
            ..Probe::default()
        };
        assert_eq!(policy.choose(&mut p).unwrap().mode, ExecuteMode::LuceneFirst);
    }
}

//! Text leaf: the boundary to the full-text cursor.
//!
//! Usually attached to a relational leaf, which drives it in one of the
//! dual-source modes. A text leaf left standalone after optimization runs
//! through an unconstrained relational driver so hits are materialized the
//! same way.

use std::fmt;
use std::sync::Arc;

use fedsearch_core::hit::Hit;
use fedsearch_core::id::IndexId;
use fedsearch_core::text::TextQuery;
use fedsearch_store::{TextChunk, TextCursor};

use crate::context::SearchContext;
use crate::error::{OpError, Result};
use crate::operation::{Combined, Operation};
use crate::relational::RelationalLeaf;

pub struct TextLeaf {
    query: TextQuery,
    spam_trash_setting: bool,
    cursor: Option<Box<dyn TextCursor>>,
    ctx: Option<Arc<SearchContext>>,
    driver: Option<Box<RelationalLeaf>>,
}

impl TextLeaf {
    pub fn new(query: TextQuery) -> Self {
        Self {
            query,
            spam_trash_setting: false,
            cursor: None,
            ctx: None,
            driver: None,
        }
    }

    pub fn query(&self) -> &TextQuery {
        &self.query
    }

    pub fn add_anded_clause(&mut self, clause: TextQuery) {
        let q = std::mem::replace(&mut self.query, TextQuery::And(Vec::new()));
        self.query = q.and(clause);
    }

    pub fn has_spam_trash_setting(&self) -> bool {
        self.spam_trash_setting
    }

    pub fn force_spam_trash_setting(&mut self) {
        self.spam_trash_setting = true;
    }

    pub(crate) fn bind(&mut self, ctx: &Arc<SearchContext>) {
        self.ctx = Some(ctx.clone());
    }

    fn cursor(&mut self) -> Result<&mut dyn TextCursor> {
        if self.cursor.is_none() {
            let ctx = self
                .ctx
                .as_ref()
                .ok_or_else(|| OpError::State("text leaf used before begin".into()))?;
            self.cursor = Some(ctx.mailbox.text.open_cursor(&self.query, ctx.sort)?);
        }
        let c = self
            .cursor
            .as_deref_mut()
            .ok_or_else(|| OpError::State("text cursor unavailable".into()))?;
        Ok(c)
    }

    pub(crate) fn next_chunk(&mut self, max: usize) -> Result<TextChunk> {
        Ok(self.cursor()?.next_chunk(max)?)
    }

    pub(crate) fn add_filter_clause(&mut self, id: IndexId) -> Result<()> {
        self.cursor()?.add_filter_clause(id);
        Ok(())
    }

    pub(crate) fn clear_filter_clause(&mut self) {
        if let Some(c) = self.cursor.as_deref_mut() {
            c.clear_filter_clause();
        }
    }

    pub(crate) fn should_execute_db_first(&mut self) -> Result<bool> {
        Ok(self.cursor()?.should_execute_db_first())
    }

    pub(crate) fn estimated_hits(&mut self) -> Result<u64> {
        Ok(self.cursor()?.estimated_hits())
    }

    pub(crate) fn rewind(&mut self) {
        if let Some(c) = self.cursor.as_deref_mut() {
            c.rewind();
        }
    }

    pub(crate) fn release(&mut self) {
        self.cursor = None;
        if let Some(mut driver) = self.driver.take() {
            driver.done_with_search_results();
        }
    }

    pub(crate) fn begin(&mut self, ctx: &Arc<SearchContext>) -> Result<()> {
        let mut driver = RelationalLeaf::new();
        if self.spam_trash_setting {
            driver.constraints_mut().force_spam_trash_setting();
        }
        driver.attach_text(self.clone());
        let driver = self.driver.insert(Box::new(driver));
        driver.begin(ctx)
    }

    fn driver(&mut self) -> Result<&mut RelationalLeaf> {
        self.driver
            .as_deref_mut()
            .ok_or_else(|| OpError::State("text leaf iterated before begin".into()))
    }

    pub(crate) fn peek_next(&mut self) -> Result<Option<Hit>> {
        self.driver()?.peek_next()
    }

    pub(crate) fn get_next(&mut self) -> Result<Option<Hit>> {
        self.driver()?.get_next()
    }

    pub(crate) fn reset_iterator(&mut self) -> Result<()> {
        self.driver()?.reset_iterator()
    }

    pub(crate) fn estimate_result_size(&mut self) -> Result<u64> {
        if let Some(driver) = self.driver.as_deref_mut() {
            return driver.estimate_result_size();
        }
        self.estimated_hits()
    }

    pub(crate) fn execute_modes(&self, out: &mut Vec<String>) {
        if let Some(driver) = self.driver.as_deref() {
            driver.execute_modes(out);
        }
    }

    /// Text leaves always merge, under AND and OR alike.
    pub(crate) fn combine(self, other: TextLeaf, union: bool) -> Combined {
        let (query, spam_trash_setting) = if union {
            (
                self.query.or(other.query),
                self.spam_trash_setting && other.spam_trash_setting,
            )
        } else {
            (
                self.query.and(other.query),
                self.spam_trash_setting || other.spam_trash_setting,
            )
        };
        Combined::Merged(Operation::Text(TextLeaf {
            spam_trash_setting,
            ..TextLeaf::new(query)
        }))
    }
}

impl Clone for TextLeaf {
    fn clone(&self) -> Self {
        Self {
            spam_trash_setting: self.spam_trash_setting,
            ..TextLeaf::new(self.query.clone())
        }
    }
}

impl fmt::Display for TextLeaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TEXT({})", self.query)
    }
}

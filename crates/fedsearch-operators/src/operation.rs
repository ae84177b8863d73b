//! The operation contract shared by every node of a query tree.
//!
//! Lifecycle: build -> `optimize` -> `begin` -> (`peek_next` | `get_next` |
//! `reset_iterator`)* -> `done_with_search_results`. The release call must
//! run on every exit path; executors wrap the root in a guard that does so.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use fedsearch_core::hit::Hit;
use fedsearch_core::id::FolderId;
use fedsearch_core::target::{QueryTarget, QueryTargets};
use tracing::trace;

use crate::context::SearchContext;
use crate::error::Result;
use crate::intersection::Intersection;
use crate::relational::RelationalLeaf;
use crate::text::TextLeaf;
use crate::union::Union;

#[derive(Clone)]
pub enum Operation {
    /// Matches nothing; never touches a store.
    NoResults,
    Relational(RelationalLeaf),
    Text(TextLeaf),
    Intersection(Intersection),
    Union(Union),
}

/// Outcome of `combine_ops`. Operands that cannot merge are handed back unchanged.
pub enum Combined {
    Merged(Operation),
    NotCombinable(Operation, Operation),
}

impl Operation {
    pub fn begin(&mut self, ctx: &Arc<SearchContext>) -> Result<()> {
        match self {
            Operation::NoResults => Ok(()),
            Operation::Relational(op) => op.begin(ctx),
            Operation::Text(op) => op.begin(ctx),
            Operation::Intersection(op) => op.begin(ctx),
            Operation::Union(op) => op.begin(ctx),
        }
    }

    /// Next hit without consuming it; repeated calls return the same hit.
    pub fn peek_next(&mut self) -> Result<Option<Hit>> {
        match self {
            Operation::NoResults => Ok(None),
            Operation::Relational(op) => op.peek_next(),
            Operation::Text(op) => op.peek_next(),
            Operation::Intersection(op) => op.peek_next(),
            Operation::Union(op) => op.peek_next(),
        }
    }

    pub fn get_next(&mut self) -> Result<Option<Hit>> {
        match self {
            Operation::NoResults => Ok(None),
            Operation::Relational(op) => op.get_next(),
            Operation::Text(op) => op.get_next(),
            Operation::Intersection(op) => op.get_next(),
            Operation::Union(op) => op.get_next(),
        }
    }

    pub fn reset_iterator(&mut self) -> Result<()> {
        match self {
            Operation::NoResults => Ok(()),
            Operation::Relational(op) => op.reset_iterator(),
            Operation::Text(op) => op.reset_iterator(),
            Operation::Intersection(op) => op.reset_iterator(),
            Operation::Union(op) => op.reset_iterator(),
        }
    }

    /// Release cursors and caches. Safe to call more than once.
    pub fn done_with_search_results(&mut self) {
        match self {
            Operation::NoResults => {}
            Operation::Relational(op) => op.done_with_search_results(),
            Operation::Text(op) => op.release(),
            Operation::Intersection(op) => op.done_with_search_results(),
            Operation::Union(op) => op.done_with_search_results(),
        }
    }

    /// Rewrite to an equivalent tree, repeating until the rewrite is stable.
    pub fn optimize(self) -> Operation {
        let mut op = self;
        loop {
            let before = op.to_query_string();
            op = op.optimize_pass();
            let after = op.to_query_string();
            if after == before {
                return op;
            }
            trace!(%before, %after, "optimize pass");
        }
    }

    fn optimize_pass(self) -> Operation {
        match self {
            Operation::Relational(op) if op.has_no_results() => Operation::NoResults,
            Operation::Intersection(op) => op.optimize(),
            Operation::Union(op) => op.optimize(),
            other => other,
        }
    }

    /// Try to merge with a sibling under AND (`union == false`) or OR.
    pub fn combine_ops(self, other: Operation, union: bool) -> Combined {
        match (self, other) {
            (Operation::NoResults, op) | (op, Operation::NoResults) => {
                if union {
                    Combined::Merged(op)
                } else {
                    Combined::Merged(Operation::NoResults)
                }
            }
            (Operation::Relational(a), Operation::Relational(b)) => a.combine(b, union),
            (Operation::Text(a), Operation::Text(b)) => a.combine(b, union),
            (a, b) => Combined::NotCombinable(a, b),
        }
    }

    pub fn query_targets(&self) -> QueryTargets {
        match self {
            Operation::NoResults => QueryTargets::new(),
            Operation::Relational(op) => op.query_targets(),
            Operation::Text(_) => QueryTargets::from([QueryTarget::Unspecified]),
            Operation::Intersection(op) => op.query_targets(),
            Operation::Union(op) => op.query_targets(),
        }
    }

    pub fn has_no_results(&self) -> bool {
        match self {
            Operation::NoResults => true,
            Operation::Relational(op) => op.has_no_results(),
            Operation::Text(_) => false,
            Operation::Intersection(op) => op.ops().iter().any(Operation::has_no_results),
            Operation::Union(op) => op.ops().iter().all(Operation::has_no_results),
        }
    }

    pub fn has_all_results(&self) -> bool {
        match self {
            Operation::NoResults | Operation::Text(_) => false,
            Operation::Relational(op) => op.has_all_results(),
            Operation::Intersection(op) => {
                !op.ops().is_empty() && op.ops().iter().all(Operation::has_all_results)
            }
            Operation::Union(op) => op.ops().iter().any(Operation::has_all_results),
        }
    }

    pub fn has_spam_trash_setting(&self) -> bool {
        match self {
            Operation::NoResults => true,
            Operation::Relational(op) => op.has_spam_trash_setting(),
            Operation::Text(op) => op.has_spam_trash_setting(),
            Operation::Intersection(op) => op.ops().iter().any(Operation::has_spam_trash_setting),
            Operation::Union(op) => op.ops().iter().all(Operation::has_spam_trash_setting),
        }
    }

    /// Exclude `folders` (trash, spam) from every branch that has not opted in.
    pub fn ensure_spam_trash_setting(self, folders: &BTreeSet<FolderId>) -> Operation {
        if folders.is_empty() || self.has_spam_trash_setting() {
            return self;
        }
        match self {
            Operation::Relational(mut op) => {
                op.constraints_mut().ensure_spam_trash_setting(folders);
                Operation::Relational(op)
            }
            Operation::Text(text) => {
                let mut op = RelationalLeaf::new();
                op.constraints_mut().ensure_spam_trash_setting(folders);
                op.attach_text(text);
                Operation::Relational(op)
            }
            Operation::Intersection(op) => Operation::Intersection(Intersection::new(
                op.into_ops()
                    .into_iter()
                    .map(|c| c.ensure_spam_trash_setting(folders))
                    .collect(),
            )),
            Operation::Union(op) => Operation::Union(Union::new(
                op.into_ops()
                    .into_iter()
                    .map(|c| c.ensure_spam_trash_setting(folders))
                    .collect(),
            )),
            other => other,
        }
    }

    pub fn force_spam_trash_setting(&mut self) {
        match self {
            Operation::NoResults => {}
            Operation::Relational(op) => {
                op.constraints_mut().force_spam_trash_setting();
                if let Some(text) = op.text_mut() {
                    text.force_spam_trash_setting();
                }
            }
            Operation::Text(op) => op.force_spam_trash_setting(),
            Operation::Intersection(op) => op.ops_mut().iter_mut().for_each(Operation::force_spam_trash_setting),
            Operation::Union(op) => op.ops_mut().iter_mut().for_each(Operation::force_spam_trash_setting),
        }
    }

    /// Approximate hit count; additive across union branches. Requires `begin`.
    pub fn estimate_result_size(&mut self) -> Result<u64> {
        match self {
            Operation::NoResults => Ok(0),
            Operation::Relational(op) => op.estimate_result_size(),
            Operation::Text(op) => op.estimate_result_size(),
            Operation::Intersection(op) => {
                let mut best: Option<u64> = None;
                for child in op.ops_mut() {
                    let n = child.estimate_result_size()?;
                    best = Some(best.map_or(n, |b| b.min(n)));
                }
                Ok(best.unwrap_or(0))
            }
            Operation::Union(op) => {
                let mut total = 0u64;
                for child in op.ops_mut() {
                    total = total.saturating_add(child.estimate_result_size()?);
                }
                Ok(total)
            }
        }
    }

    /// Modes chosen so far by relational leaves, in tree order.
    pub fn execute_modes(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_execute_modes(&mut out);
        out
    }

    pub(crate) fn collect_execute_modes(&self, out: &mut Vec<String>) {
        match self {
            Operation::NoResults => {}
            Operation::Relational(op) => op.execute_modes(out),
            Operation::Text(op) => op.execute_modes(out),
            Operation::Intersection(op) => op.ops().iter().for_each(|c| c.collect_execute_modes(out)),
            Operation::Union(op) => op.ops().iter().for_each(|c| c.collect_execute_modes(out)),
        }
    }

    /// Visit every text leaf, attached or standalone.
    pub fn visit_text_leaves_mut(&mut self, f: &mut dyn FnMut(&mut TextLeaf)) {
        match self {
            Operation::NoResults => {}
            Operation::Relational(op) => {
                if let Some(text) = op.text_mut() {
                    f(text);
                }
            }
            Operation::Text(op) => f(op),
            Operation::Intersection(op) => op.ops_mut().iter_mut().for_each(|c| c.visit_text_leaves_mut(f)),
            Operation::Union(op) => op.ops_mut().iter_mut().for_each(|c| c.visit_text_leaves_mut(f)),
        }
    }

    pub fn text_leaf_count(&self) -> usize {
        match self {
            Operation::NoResults => 0,
            Operation::Relational(op) => usize::from(op.text().is_some()),
            Operation::Text(_) => 1,
            Operation::Intersection(op) => op.ops().iter().map(Operation::text_leaf_count).sum(),
            Operation::Union(op) => op.ops().iter().map(Operation::text_leaf_count).sum(),
        }
    }

    pub fn to_query_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::NoResults => f.write_str("NO_RESULTS"),
            Operation::Relational(op) => write!(f, "{op}"),
            Operation::Text(op) => write!(f, "{op}"),
            Operation::Intersection(op) => write!(f, "{op}"),
            Operation::Union(op) => write!(f, "{op}"),
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<RelationalLeaf> for Operation {
    fn from(op: RelationalLeaf) -> Self {
        Operation::Relational(op)
    }
}

impl From<TextLeaf> for Operation {
    fn from(op: TextLeaf) -> Self {
        Operation::Text(op)
    }
}

/// Greedy pairwise merge; restarts the scan after every successful merge.
pub(crate) fn combine_pairs(ops: &mut Vec<Operation>, union: bool) {
    'restart: loop {
        for i in 0..ops.len() {
            for j in (i + 1)..ops.len() {
                let rhs = ops.remove(j);
                let lhs = ops.remove(i);
                match lhs.combine_ops(rhs, union) {
                    Combined::Merged(op) => {
                        ops.insert(i, op);
                        continue 'restart;
                    }
                    Combined::NotCombinable(lhs, rhs) => {
                        ops.insert(i, lhs);
                        ops.insert(j, rhs);
                    }
                }
            }
        }
        return;
    }
}

/// Write `(a SEP b SEP c)`.
pub(crate) fn write_joined(f: &mut fmt::Formatter<'_>, ops: &[Operation], sep: &str) -> fmt::Result {
    f.write_str("(")?;
    for (i, op) in ops.iter().enumerate() {
        if i > 0 {
            write!(f, " {sep} ")?;
        }
        write!(f, "{op}")?;
    }
    f.write_str(")")
}

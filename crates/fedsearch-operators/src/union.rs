//! Union: a k-way merge of the children's streams.
//!
//! Under an ordered sort the children are merged through a min-heap keyed on
//! each child's next hit; equal keys go to the child listed first. Without
//! an ordering the children are drained one after another. Hits are not
//! deduplicated here.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::sync::Arc;

use fedsearch_core::hit::{Hit, SortBy, SortKey};
use fedsearch_core::target::{intersect_targets, QueryTargets};
use tracing::debug;

use crate::context::SearchContext;
use crate::error::{OpError, Result};
use crate::operation::{combine_pairs, write_joined, Operation};

pub struct Union {
    ops: Vec<Operation>,
    exec: Option<UnionExec>,
}

struct UnionExec {
    sort: SortBy,
    heap: BinaryHeap<MergeEntry>,
    primed: bool,
    /// Child being drained when unordered.
    current: usize,
}

struct MergeEntry {
    key: SortKey,
    child: usize,
    sort: SortBy,
}

impl PartialEq for MergeEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MergeEntry {}

impl PartialOrd for MergeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse for min-heap
        self.sort
            .compare_keys(&other.key, &self.key)
            .then_with(|| other.child.cmp(&self.child))
    }
}

impl Union {
    pub fn new(ops: Vec<Operation>) -> Self {
        Self { ops, exec: None }
    }

    pub fn ops(&self) -> &[Operation] {
        &self.ops
    }

    pub fn ops_mut(&mut self) -> &mut [Operation] {
        &mut self.ops
    }

    pub fn into_ops(self) -> Vec<Operation> {
        self.ops
    }

    pub fn add_op(&mut self, op: Operation) {
        self.ops.push(op);
    }

    pub fn query_targets(&self) -> QueryTargets {
        self.ops.iter().flat_map(Operation::query_targets).collect()
    }

    /// Drop branches that cannot address any of `targets`.
    pub fn prune_incompatible_targets(&mut self, targets: &QueryTargets) {
        self.ops.retain_mut(|op| match op {
            Operation::Union(nested) => {
                nested.prune_incompatible_targets(targets);
                !nested.ops.is_empty()
            }
            other => {
                let keep = !intersect_targets(&other.query_targets(), targets).is_empty();
                if !keep {
                    debug!(branch = %other, "pruned union branch with incompatible target");
                }
                keep
            }
        });
    }

    pub fn begin(&mut self, ctx: &Arc<SearchContext>) -> Result<()> {
        for op in &mut self.ops {
            op.begin(ctx)?;
        }
        self.exec = Some(UnionExec {
            sort: ctx.sort,
            heap: BinaryHeap::with_capacity(self.ops.len()),
            primed: false,
            current: 0,
        });
        Ok(())
    }

    /// Index of the child holding the next hit, if any.
    fn next_child(&mut self) -> Result<Option<usize>> {
        let exec = self
            .exec
            .as_mut()
            .ok_or_else(|| OpError::State("union used before begin".into()))?;
        if !exec.sort.is_ordered() {
            while exec.current < self.ops.len() {
                if self.ops[exec.current].peek_next()?.is_some() {
                    return Ok(Some(exec.current));
                }
                exec.current += 1;
            }
            return Ok(None);
        }
        if !exec.primed {
            for (child, op) in self.ops.iter_mut().enumerate() {
                if let Some(hit) = op.peek_next()? {
                    exec.heap.push(MergeEntry {
                        key: hit.sort_key,
                        child,
                        sort: exec.sort,
                    });
                }
            }
            exec.primed = true;
        }
        Ok(exec.heap.peek().map(|e| e.child))
    }

    pub fn peek_next(&mut self) -> Result<Option<Hit>> {
        match self.next_child()? {
            Some(child) => self.ops[child].peek_next(),
            None => Ok(None),
        }
    }

    pub fn get_next(&mut self) -> Result<Option<Hit>> {
        let Some(child) = self.next_child()? else {
            return Ok(None);
        };
        let hit = self.ops[child].get_next()?;
        if let Some(exec) = self.exec.as_mut() {
            if exec.sort.is_ordered() {
                exec.heap.pop();
                if let Some(next) = self.ops[child].peek_next()? {
                    exec.heap.push(MergeEntry {
                        key: next.sort_key,
                        child,
                        sort: exec.sort,
                    });
                }
            }
        }
        Ok(hit)
    }

    pub fn reset_iterator(&mut self) -> Result<()> {
        let exec = self
            .exec
            .as_mut()
            .ok_or_else(|| OpError::State("union reset before begin".into()))?;
        exec.heap.clear();
        exec.primed = false;
        exec.current = 0;
        for op in &mut self.ops {
            op.reset_iterator()?;
        }
        Ok(())
    }

    pub fn done_with_search_results(&mut self) {
        self.exec = None;
        self.ops.iter_mut().for_each(Operation::done_with_search_results);
    }

    pub fn optimize(self) -> Operation {
        let mut ops: Vec<Operation> = Vec::with_capacity(self.ops.len());
        for op in self.ops.into_iter().map(Operation::optimize) {
            match op {
                Operation::Union(nested) => ops.extend(nested.ops),
                Operation::NoResults => {}
                other => ops.push(other),
            }
        }
        combine_pairs(&mut ops, true);
        ops.retain(|op| !op.has_no_results());
        match ops.len() {
            0 => Operation::NoResults,
            1 => ops.pop().unwrap_or(Operation::NoResults),
            _ => Operation::Union(Union::new(ops)),
        }
    }
}

impl Clone for Union {
    fn clone(&self) -> Self {
        Union::new(self.ops.clone())
    }
}

impl fmt::Display for Union {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_joined(f, &self.ops, "OR")
    }
}

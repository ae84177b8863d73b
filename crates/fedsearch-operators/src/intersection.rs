//! N-way intersection.
//!
//! Hits are matched one sort-key group at a time: the first child fixes the
//! key, every other child contributes its hits with exactly that key, and a
//! hit survives when each other group holds a hit for the same item.
//! A whole-item hit matches any hit of its item; a part hit matches a
//! whole-item hit or the same part.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use fedsearch_core::hit::{Hit, SortBy, SortKey};
use fedsearch_core::id::ItemId;
use fedsearch_core::target::{intersect_targets, QueryTargets};
use tracing::{debug, trace};

use crate::context::SearchContext;
use crate::error::{OpError, Result};
use crate::operation::{combine_pairs, write_joined, Operation};
use crate::union::Union;

pub struct Intersection {
    ops: Vec<Operation>,
    exec: Option<IntersectionExec>,
}

struct IntersectionExec {
    sort: SortBy,
    buffered: VecDeque<Hit>,
    /// Some child was empty at `begin`; nothing is ever produced.
    no_hits: bool,
}

impl Intersection {
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
        let mut iter = self.ops.iter();
        let Some(first) = iter.next() else {
            return QueryTargets::new();
        };
        iter.fold(first.query_targets(), |acc, op| {
            intersect_targets(&acc, &op.query_targets())
        })
    }

    pub fn begin(&mut self, ctx: &Arc<SearchContext>) -> Result<()> {
        // children over-fetch; most of what they return is discarded
        let child_ctx = ctx.with_chunk_size((ctx.chunk_size + 1) * 3);
        for op in &mut self.ops {
            op.begin(&child_ctx)?;
        }
        let mut no_hits = self.ops.is_empty();
        for op in &mut self.ops {
            if no_hits {
                break;
            }
            no_hits = op.peek_next()?.is_none();
        }
        if no_hits {
            debug!(op = %self, "intersection has an empty operand");
            self.ops.iter_mut().for_each(Operation::done_with_search_results);
        }
        self.exec = Some(IntersectionExec {
            sort: ctx.sort,
            buffered: VecDeque::new(),
            no_hits,
        });
        Ok(())
    }

    pub fn peek_next(&mut self) -> Result<Option<Hit>> {
        self.fill()?;
        Ok(self.exec.as_ref().and_then(|e| e.buffered.front().cloned()))
    }

    pub fn get_next(&mut self) -> Result<Option<Hit>> {
        self.fill()?;
        Ok(self.exec.as_mut().and_then(|e| e.buffered.pop_front()))
    }

    pub fn reset_iterator(&mut self) -> Result<()> {
        let exec = self
            .exec
            .as_mut()
            .ok_or_else(|| OpError::State("intersection reset before begin".into()))?;
        exec.buffered.clear();
        if exec.no_hits {
            return Ok(());
        }
        for op in &mut self.ops {
            op.reset_iterator()?;
        }
        Ok(())
    }

    pub fn done_with_search_results(&mut self) {
        self.exec = None;
        self.ops.iter_mut().for_each(Operation::done_with_search_results);
    }

    fn fill(&mut self) -> Result<()> {
        let exec = self
            .exec
            .as_mut()
            .ok_or_else(|| OpError::State("intersection used before begin".into()))?;
        if exec.no_hits || !exec.buffered.is_empty() {
            return Ok(());
        }
        let sort = exec.sort;
        while let Some(groups) = next_groups(&mut self.ops, sort)? {
            let batch = match_groups(&groups);
            trace!(key_groups = groups.len(), matched = batch.len(), "intersection batch");
            if !batch.is_empty() {
                exec.buffered.extend(batch);
                break;
            }
        }
        Ok(())
    }

    /// Rewrite into the cheapest equivalent form.
    pub fn optimize(self) -> Operation {
        let mut ops: Vec<Operation> = Vec::with_capacity(self.ops.len());
        for op in self.ops.into_iter().map(Operation::optimize) {
            match op {
                Operation::Intersection(nested) => ops.extend(nested.ops),
                other => ops.push(other),
            }
        }

        combine_pairs(&mut ops, false);
        if ops.is_empty() || ops.iter().any(Operation::has_no_results) {
            return Operation::NoResults;
        }

        let targets = Intersection::new(ops.clone()).query_targets();
        if targets.is_empty() {
            debug!("intersection operands address disjoint targets");
            return Operation::NoResults;
        }
        for op in &mut ops {
            if let Operation::Union(union) = op {
                union.prune_incompatible_targets(&targets);
                if union.ops().is_empty() {
                    return Operation::NoResults;
                }
            }
        }

        if ops.len() > 1 {
            if let Some(pos) = ops.iter().position(|op| matches!(op, Operation::Union(_))) {
                if let Operation::Union(union) = ops.remove(pos) {
                    let branches = union
                        .into_ops()
                        .into_iter()
                        .map(|branch| {
                            let mut operands = ops.clone();
                            operands.insert(pos, branch);
                            Operation::Intersection(Intersection::new(operands))
                        })
                        .collect();
                    return Union::new(branches).optimize();
                }
            }
        }

        couple_text(&mut ops);

        if ops.len() == 1 {
            return ops.pop().unwrap_or(Operation::NoResults);
        }
        Operation::Intersection(Intersection::new(ops))
    }
}

/// Move a lone text operand onto its relational siblings, so the text query
/// runs joined with their constraints.
fn couple_text(ops: &mut Vec<Operation>) {
    let texts = ops.iter().filter(|op| matches!(op, Operation::Text(_))).count();
    let has_relational = ops.iter().any(|op| matches!(op, Operation::Relational(_)));
    if texts != 1 || !has_relational {
        return;
    }
    let Some(pos) = ops.iter().position(|op| matches!(op, Operation::Text(_))) else {
        return;
    };
    if let Operation::Text(text) = ops.remove(pos) {
        for op in ops.iter_mut() {
            if let Operation::Relational(leaf) = op {
                leaf.attach_text(text.clone());
            }
        }
    }
}

/// Pull the next key group from every child. `None` once any child runs dry.
fn next_groups(ops: &mut [Operation], sort: SortBy) -> Result<Option<Vec<Vec<Hit>>>> {
    loop {
        let Some((first, rest)) = ops.split_first_mut() else {
            return Ok(None);
        };
        let Some(head) = first.get_next()? else {
            return Ok(None);
        };
        let key = head.sort_key.clone();
        let mut groups = Vec::with_capacity(rest.len() + 1);
        let mut lead = vec![head];
        while let Some(hit) = first.peek_next()? {
            if sort.compare_keys(&hit.sort_key, &key).is_ne() {
                break;
            }
            lead.extend(first.get_next()?);
        }
        groups.push(lead);

        let mut complete = true;
        for op in rest.iter_mut() {
            let group = take_key_group(op, &key, sort)?;
            if group.is_empty() {
                if op.peek_next()?.is_none() {
                    return Ok(None);
                }
                complete = false;
            }
            groups.push(group);
        }
        if complete {
            return Ok(Some(groups));
        }
    }
}

/// Skip hits ordered before `key`, collect the ones equal to it.
fn take_key_group(op: &mut Operation, key: &SortKey, sort: SortBy) -> Result<Vec<Hit>> {
    let mut group = Vec::new();
    while let Some(hit) = op.peek_next()? {
        match sort.compare_keys(&hit.sort_key, key) {
            std::cmp::Ordering::Less => {
                op.get_next()?;
            }
            std::cmp::Ordering::Equal => group.extend(op.get_next()?),
            std::cmp::Ordering::Greater => break,
        }
    }
    Ok(group)
}

fn matches_group(hit: &Hit, group: &[Hit]) -> bool {
    group.iter().any(|other| {
        other.item_id == hit.item_id
            && (hit.part.is_none() || other.part.is_none() || other.part == hit.part)
    })
}

/// Hits of one key group present in every other group, in first-group item order.
fn match_groups(groups: &[Vec<Hit>]) -> Vec<Hit> {
    let mut order: Vec<ItemId> = Vec::new();
    for hit in &groups[0] {
        if !order.contains(&hit.item_id) {
            order.push(hit.item_id);
        }
    }
    let mut emitted = HashSet::new();
    let mut out = Vec::new();
    for item in order {
        for (i, group) in groups.iter().enumerate() {
            for hit in group.iter().filter(|h| h.item_id == item) {
                let everywhere = groups
                    .iter()
                    .enumerate()
                    .all(|(j, other)| j == i || matches_group(hit, other));
                if everywhere && emitted.insert(hit.id()) {
                    out.push(hit.clone());
                }
            }
        }
    }
    out
}

impl Clone for Intersection {
    fn clone(&self) -> Self {
        Intersection::new(self.ops.clone())
    }
}

impl fmt::Display for Intersection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_joined(f, &self.ops, "AND")
    }
}

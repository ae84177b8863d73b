//! Lowering a normalized clause tree to operations.

use std::collections::{BTreeMap, BTreeSet};

use fedsearch_core::clause::{Conjunction, FolderRef, ItemRef, PredicateKind};
use fedsearch_core::constraints::{RangeField, RemoteFolder};
use fedsearch_core::id::{AccountId, ItemId, RemoteId};
use fedsearch_core::target::QueryTarget;
use fedsearch_core::text::TextQuery;
use fedsearch_operators::{Intersection, Operation, RelationalLeaf, TextLeaf, Union};
use tracing::trace;

use crate::error::{PlanError, Result};
use crate::parse_tree::{Node, ThingNode};

/// Lower a tree produced by `Node::normalize`.
pub fn lower(node: &Node) -> Result<Operation> {
    match node {
        Node::Operator(op) => {
            if !op.truth {
                return Err(PlanError::InvalidClause(format!(
                    "negated operator reached lowering: {node}"
                )));
            }
            let mut children = Vec::with_capacity(op.children.len());
            let mut empty_text = false;
            for child in &op.children {
                if is_empty_text_node(child) {
                    empty_text = true;
                } else {
                    children.push(lower(child)?);
                }
            }
            Ok(match op.kind {
                // a sibling text query absorbs an empty term; without one nothing matches
                Conjunction::And if empty_text && !children.iter().any(|c| matches!(c, Operation::Text(_))) => {
                    trace!(clause = %node, "empty text term without a text sibling");
                    Operation::NoResults
                }
                Conjunction::And => Operation::Intersection(Intersection::new(children)),
                Conjunction::Or => Operation::Union(Union::new(children)),
            })
        }
        Node::Thing(thing) => {
            let op = lower_thing(thing)?;
            trace!(clause = %node, op = %op, "lowered clause");
            Ok(op)
        }
    }
}

fn lower_thing(thing: &ThingNode) -> Result<Operation> {
    let truth = thing.truth;
    let mut leaf = RelationalLeaf::new();
    match &thing.predicate.kind {
        PredicateKind::InFolder(FolderRef::Local(folder)) => {
            leaf.leaf_mut().add_in_folder(*folder, truth);
            // only a positive folder implies the local mailbox
            if truth {
                leaf = leaf.with_target(QueryTarget::Local);
            }
        }
        PredicateKind::InFolder(FolderRef::Remote { account, folder }) => {
            leaf.leaf_mut().add_in_remote_folder(
                RemoteFolder {
                    account: account.clone(),
                    folder: *folder,
                },
                truth,
            );
            leaf = leaf.with_target(QueryTarget::Account(account.clone()));
        }
        PredicateKind::Anywhere => leaf.leaf_mut().add_anywhere(truth),
        PredicateKind::Tag(tag) => leaf.leaf_mut().add_tag(tag, truth),
        PredicateKind::Date(range) => leaf.leaf_mut().add_range(RangeField::Date, *range, truth),
        PredicateKind::Size(range) => leaf.leaf_mut().add_range(RangeField::Size, *range, truth),
        PredicateKind::Items(refs) => return Ok(lower_items(refs, truth)),
        PredicateKind::Conversation(ItemRef { account: None, id }) => {
            leaf.leaf_mut().add_conv_id(*id, truth);
            leaf = leaf.with_target(QueryTarget::Local);
        }
        PredicateKind::Conversation(ItemRef {
            account: Some(account),
            id,
        }) => {
            leaf.leaf_mut()
                .add_remote_conv_id(RemoteId::new(account.clone(), *id), truth);
            leaf = leaf.with_target(QueryTarget::Account(account.clone()));
        }
        PredicateKind::Type(kind) => leaf.leaf_mut().add_type(*kind, truth),
        PredicateKind::Text(query) => {
            if is_empty_text(query) {
                return Ok(Operation::NoResults);
            }
            let query = if truth { query.clone() } else { query.clone().negate() };
            return Ok(Operation::Text(TextLeaf::new(query)));
        }
    }
    Ok(Operation::Relational(leaf))
}

fn is_empty_text_node(node: &Node) -> bool {
    matches!(node, Node::Thing(t) if matches!(&t.predicate.kind, PredicateKind::Text(q) if is_empty_text(q)))
}

fn is_empty_text(query: &TextQuery) -> bool {
    match query {
        TextQuery::Term(t) => t.text.trim().is_empty(),
        TextQuery::Not(inner) => is_empty_text(inner),
        TextQuery::And(cs) | TextQuery::Or(cs) => cs.is_empty() || cs.iter().all(is_empty_text),
    }
}

/// One leaf per mailbox. A positive list spanning mailboxes becomes a union
/// of per-mailbox leaves; a negative list excludes from every mailbox at once.
fn lower_items(refs: &[ItemRef], truth: bool) -> Operation {
    let mut local: BTreeSet<ItemId> = BTreeSet::new();
    let mut remote: BTreeMap<AccountId, BTreeSet<RemoteId>> = BTreeMap::new();
    for r in refs {
        match &r.account {
            None => {
                local.insert(r.id);
            }
            Some(account) => {
                remote
                    .entry(account.clone())
                    .or_default()
                    .insert(RemoteId::new(account.clone(), r.id));
            }
        }
    }

    if !truth {
        let mut leaf = RelationalLeaf::new();
        if !local.is_empty() {
            leaf.leaf_mut().add_item_ids(&local, false);
        }
        for ids in remote.values() {
            leaf.leaf_mut().add_remote_item_ids(ids, false);
        }
        return Operation::Relational(leaf);
    }

    let mut branches = Vec::new();
    if !local.is_empty() || remote.is_empty() {
        // an empty positive list matches nothing
        let mut leaf = RelationalLeaf::new().with_target(QueryTarget::Local);
        leaf.leaf_mut().add_item_ids(&local, true);
        branches.push(Operation::Relational(leaf));
    }
    for (account, ids) in remote {
        let mut leaf = RelationalLeaf::new().with_target(QueryTarget::Account(account));
        leaf.leaf_mut().add_remote_item_ids(&ids, true);
        branches.push(Operation::Relational(leaf));
    }
    if branches.len() == 1 {
        branches.pop().unwrap_or(Operation::NoResults)
    } else {
        Operation::Union(Union::new(branches))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedsearch_core::clause::{Clause, Predicate};

    fn lowered(clauses: &[Clause]) -> Operation {
        let tree = Node::normalize(clauses).unwrap();
        lower(&tree).unwrap()
    }

    #[test]
    fn test_leaves_per_clause() {
        let op = lowered(&[
            Clause::Predicate(Predicate::in_folder(2)),
            Clause::Predicate(Predicate::text("hello")),
        ]);
        let Operation::Intersection(and) = &op else {
            panic!("expected an intersection, got {op}");
        };
        assert_eq!(and.ops().len(), 2);
        assert_eq!(op.query_targets(), [QueryTarget::Local, QueryTarget::Unspecified].into());
    }

    #[test]
    fn test_negative_text_is_negated_query() {
        let op = lowered(&[Clause::Predicate(Predicate::text("spam").negated())]);
        assert_eq!(op.to_string(), "TEXT(-content:spam)");
    }

    #[test]
    fn test_negative_folder_keeps_target_open() {
        let op = lowered(&[Clause::Predicate(Predicate::in_folder(4).negated())]);
        assert_eq!(op.query_targets(), [QueryTarget::Unspecified].into());
        assert_eq!(op.to_string(), "DB[-IN:4]");
    }

    #[test]
    fn test_mixed_item_list_splits_per_mailbox() {
        let acct = AccountId::new("bob");
        let op = lowered(&[Clause::Predicate(Predicate::items(vec![
            ItemRef::local(1),
            ItemRef::remote(acct.clone(), 7),
            ItemRef::local(2),
        ]))]);
        let Operation::Union(or) = &op else {
            panic!("expected a union, got {op}");
        };
        assert_eq!(or.ops().len(), 2);
        assert_eq!(
            op.query_targets(),
            [QueryTarget::Local, QueryTarget::Account(acct)].into()
        );
    }

    #[test]
    fn test_empty_item_list_matches_nothing() {
        let op = lowered(&[Clause::Predicate(Predicate::items(vec![]))]);
        assert!(op.has_no_results());
    }

    #[test]
    fn test_empty_text_matches_nothing_alone() {
        let op = lowered(&[Clause::Predicate(Predicate::text("  "))]);
        assert!(matches!(op, Operation::NoResults));

        let op = lowered(&[
            Clause::Predicate(Predicate::text("  ")),
            Clause::Predicate(Predicate::tag("x")),
        ]);
        assert!(matches!(op, Operation::NoResults));
    }

    #[test]
    fn test_empty_text_absorbed_by_text_sibling() {
        let op = lowered(&[
            Clause::Predicate(Predicate::text("hello")),
            Clause::Predicate(Predicate::text(" ")),
            Clause::Predicate(Predicate::in_folder(2)),
        ]);
        let Operation::Intersection(and) = &op else {
            panic!("expected an intersection, got {op}");
        };
        assert_eq!(and.ops().len(), 2);
        assert_eq!(op.optimize().text_leaf_count(), 1);

        let op = lowered(&[
            Clause::Predicate(Predicate::text(" ")),
            Clause::or(),
            Clause::Predicate(Predicate::tag("x")),
        ])
        .optimize();
        assert_eq!(op.to_string(), "DB[TAG:(x)]");
    }
}

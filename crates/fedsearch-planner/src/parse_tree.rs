//! Clause tree normalization.
//!
//! `build` turns the flat clause list into an OR of AND groups, `push_nots_down`
//! applies De Morgan until only leaves carry a negative truth flag, and
//! `simplify` flattens same-kind nesting and removes empty and singleton
//! operator nodes.

use std::collections::BTreeSet;
use std::fmt;

use fedsearch_core::clause::{Clause, Conjunction, FolderRef, Modifier, Predicate, PredicateKind};
use fedsearch_core::id::FolderId;

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Operator(OperatorNode),
    Thing(ThingNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperatorNode {
    pub kind: Conjunction,
    pub truth: bool,
    pub children: Vec<Node>,
}

/// One clause, with the truth it carries at this point of normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct ThingNode {
    pub truth: bool,
    pub predicate: Predicate,
}

impl OperatorNode {
    pub fn new(kind: Conjunction) -> Self {
        Self {
            kind,
            truth: true,
            children: Vec::new(),
        }
    }

    fn push_nots_down(&mut self) {
        if !self.truth {
            self.kind = self.kind.flip();
            self.truth = true;
            self.children.iter_mut().for_each(Node::invert);
        }
        self.children.iter_mut().for_each(Node::push_nots_down);
    }
}

impl Node {
    /// Build the raw tree. Conjunction markers default to AND; an OR marker
    /// closes the current AND group.
    pub fn build(clauses: &[Clause]) -> Node {
        let mut top = OperatorNode::new(Conjunction::Or);
        let mut group = OperatorNode::new(Conjunction::And);
        for clause in clauses {
            match clause {
                Clause::Conjunction(Conjunction::And) => {}
                Clause::Conjunction(Conjunction::Or) => {
                    if !group.children.is_empty() {
                        let done = std::mem::replace(&mut group, OperatorNode::new(Conjunction::And));
                        top.children.push(Node::Operator(done));
                    }
                }
                Clause::Predicate(p) => group.children.push(Node::Thing(ThingNode {
                    truth: p.effective_truth(),
                    predicate: p.clone(),
                })),
                Clause::SubQuery { modifier, clauses } => {
                    let mut sub = Node::build(clauses);
                    if *modifier == Modifier::Minus {
                        sub.invert();
                    }
                    group.children.push(sub);
                }
            }
        }
        if !group.children.is_empty() {
            top.children.push(Node::Operator(group));
        }
        Node::Operator(top)
    }

    /// `build`, `push_nots_down`, `simplify`. `None` for an empty query.
    pub fn normalize(clauses: &[Clause]) -> Option<Node> {
        let mut tree = Node::build(clauses);
        tree.push_nots_down();
        tree.simplify()
    }

    pub fn truth(&self) -> bool {
        match self {
            Node::Operator(op) => op.truth,
            Node::Thing(t) => t.truth,
        }
    }

    pub fn invert(&mut self) {
        match self {
            Node::Operator(op) => op.truth = !op.truth,
            Node::Thing(t) => t.truth = !t.truth,
        }
    }

    pub fn push_nots_down(&mut self) {
        if let Node::Operator(op) = self {
            op.push_nots_down();
        }
    }

    pub fn simplify(self) -> Option<Node> {
        let mut op = match self {
            Node::Operator(op) => op,
            thing => return Some(thing),
        };
        let mut children = Vec::with_capacity(op.children.len());
        for child in op.children.drain(..).filter_map(Node::simplify) {
            match child {
                Node::Operator(inner) if inner.kind == op.kind && inner.truth => {
                    children.extend(inner.children)
                }
                other => children.push(other),
            }
        }
        match children.len() {
            0 => None,
            1 => {
                let mut sole = children.pop()?;
                if !op.truth {
                    sole.invert();
                }
                Some(sole)
            }
            _ => {
                op.children = children;
                Some(Node::Operator(op))
            }
        }
    }

    /// Evaluate against one item, given which predicates it satisfies.
    pub fn evaluate(&self, holds: &dyn Fn(&Predicate) -> bool) -> bool {
        let value = match self {
            Node::Thing(t) => return holds(&t.predicate) == t.truth,
            Node::Operator(op) => match op.kind {
                Conjunction::And => op.children.iter().all(|c| c.evaluate(holds)),
                Conjunction::Or => op.children.iter().any(|c| c.evaluate(holds)),
            },
        };
        value == self.truth()
    }

    /// Every operator node has a positive truth flag.
    pub fn nots_pushed_down(&self) -> bool {
        match self {
            Node::Thing(_) => true,
            Node::Operator(op) => op.truth && op.children.iter().all(Node::nots_pushed_down),
        }
    }

    /// Local folders named by a positive `in:` clause.
    pub fn positive_folders(&self) -> BTreeSet<FolderId> {
        let mut out = BTreeSet::new();
        self.collect_positive_folders(&mut out);
        out
    }

    fn collect_positive_folders(&self, out: &mut BTreeSet<FolderId>) {
        match self {
            Node::Thing(ThingNode {
                truth: true,
                predicate:
                    Predicate {
                        kind: PredicateKind::InFolder(FolderRef::Local(folder)),
                        ..
                    },
            }) => {
                out.insert(*folder);
            }
            Node::Thing(_) => {}
            Node::Operator(op) => op.children.iter().for_each(|c| c.collect_positive_folders(out)),
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Thing(t) => {
                let bare = Predicate {
                    truth: t.truth,
                    modifier: Modifier::None,
                    kind: t.predicate.kind.clone(),
                };
                write!(f, "{bare}")
            }
            Node::Operator(op) => {
                if !op.truth {
                    f.write_str("-")?;
                }
                f.write_str("(")?;
                for (i, c) in op.children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " {} ", op.kind)?;
                    }
                    write!(f, "{c}")?;
                }
                f.write_str(")")
            }
        }
    }
}

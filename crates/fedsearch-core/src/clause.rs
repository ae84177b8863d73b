//! Parsed clauses: the input of query building.
//!
//! A clause list interleaves predicates, conjunction markers and nested
//! subqueries, exactly as the grammar front end emits them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::hit::ItemType;
use crate::id::{AccountId, FolderId, ItemId};
use crate::text::TextQuery;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Modifier {
    #[default]
    None,
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Conjunction {
    And,
    Or,
}

impl Conjunction {
    pub fn flip(self) -> Self {
        match self {
            Conjunction::And => Conjunction::Or,
            Conjunction::Or => Conjunction::And,
        }
    }
}

impl fmt::Display for Conjunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conjunction::And => f.write_str("AND"),
            Conjunction::Or => f.write_str("OR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Clause {
    Conjunction(Conjunction),
    Predicate(Predicate),
    SubQuery {
        modifier: Modifier,
        clauses: Vec<Clause>,
    },
}

impl Clause {
    pub fn and() -> Self {
        Clause::Conjunction(Conjunction::And)
    }

    pub fn or() -> Self {
        Clause::Conjunction(Conjunction::Or)
    }

    pub fn sub(clauses: Vec<Clause>) -> Self {
        Clause::SubQuery {
            modifier: Modifier::None,
            clauses,
        }
    }

    pub fn not_sub(clauses: Vec<Clause>) -> Self {
        Clause::SubQuery {
            modifier: Modifier::Minus,
            clauses,
        }
    }

    /// A text predicate appears somewhere in this clause.
    pub fn has_text(&self) -> bool {
        match self {
            Clause::Conjunction(_) => false,
            Clause::Predicate(p) => matches!(p.kind, PredicateKind::Text(_)),
            Clause::SubQuery { clauses, .. } => clauses.iter().any(Clause::has_text),
        }
    }
}

/// Every clause other than a conjunction marker carries text.
pub fn all_clauses_have_text(clauses: &[Clause]) -> bool {
    clauses
        .iter()
        .all(|c| matches!(c, Clause::Conjunction(_)) || c.has_text())
}

impl From<Predicate> for Clause {
    fn from(p: Predicate) -> Self {
        Clause::Predicate(p)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FolderRef {
    Local(FolderId),
    Remote { account: AccountId, folder: FolderId },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemRef {
    /// `None` for the local mailbox.
    pub account: Option<AccountId>,
    pub id: ItemId,
}

impl ItemRef {
    pub fn local(id: u64) -> Self {
        Self {
            account: None,
            id: ItemId::new(id),
        }
    }

    pub fn remote(account: AccountId, id: u64) -> Self {
        Self {
            account: Some(account),
            id: ItemId::new(id),
        }
    }
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.account {
            Some(acct) => write!(f, "{}:{}", acct, self.id),
            None => write!(f, "{}", self.id),
        }
    }
}

/// Closed/open interval over an integer-valued field. Missing bounds are unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Range {
    pub min: Option<i64>,
    pub min_inclusive: bool,
    pub max: Option<i64>,
    pub max_inclusive: bool,
}

impl Range {
    pub fn between(min: i64, max: i64) -> Self {
        Self {
            min: Some(min),
            min_inclusive: true,
            max: Some(max),
            max_inclusive: false,
        }
    }

    pub fn at_least(min: i64) -> Self {
        Self {
            min: Some(min),
            min_inclusive: true,
            ..Self::default()
        }
    }

    pub fn below(max: i64) -> Self {
        Self {
            max: Some(max),
            ..Self::default()
        }
    }

    pub fn contains(&self, v: i64) -> bool {
        let above_min = match self.min {
            Some(min) if self.min_inclusive => v >= min,
            Some(min) => v > min,
            None => true,
        };
        let below_max = match self.max {
            Some(max) if self.max_inclusive => v <= max,
            Some(max) => v < max,
            None => true,
        };
        above_min && below_max
    }

    /// No value can satisfy the range.
    pub fn is_empty(&self) -> bool {
        match (self.min, self.max) {
            (Some(min), Some(max)) => {
                min > max || (min == max && !(self.min_inclusive && self.max_inclusive))
            }
            _ => false,
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min, self.max) {
            (Some(min), Some(max)) => write!(
                f,
                "{}{},{}{}",
                if self.min_inclusive { '[' } else { '(' },
                min,
                max,
                if self.max_inclusive { ']' } else { ')' }
            ),
            (Some(min), None) => write!(f, "{}{}", if self.min_inclusive { ">=" } else { ">" }, min),
            (None, Some(max)) => write!(f, "{}{}", if self.max_inclusive { "<=" } else { "<" }, max),
            (None, None) => f.write_str("*"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PredicateKind {
    InFolder(FolderRef),
    /// Every folder, including trash and spam.
    Anywhere,
    Tag(String),
    Date(Range),
    Size(Range),
    /// Any of the listed items. An empty list matches nothing.
    Items(Vec<ItemRef>),
    Conversation(ItemRef),
    Type(ItemType),
    Text(TextQuery),
}

/// One atomic parsed predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predicate {
    pub truth: bool,
    pub modifier: Modifier,
    pub kind: PredicateKind,
}

impl Predicate {
    pub fn new(kind: PredicateKind) -> Self {
        Self {
            truth: true,
            modifier: Modifier::None,
            kind,
        }
    }

    pub fn negated(mut self) -> Self {
        self.truth = !self.truth;
        self
    }

    pub fn with_modifier(mut self, modifier: Modifier) -> Self {
        self.modifier = modifier;
        self
    }

    /// Truth after applying a leading `-` modifier.
    pub fn effective_truth(&self) -> bool {
        self.truth != (self.modifier == Modifier::Minus)
    }

    pub fn in_folder(id: u64) -> Self {
        Self::new(PredicateKind::InFolder(FolderRef::Local(FolderId::new(id))))
    }

    pub fn in_remote_folder(account: AccountId, id: u64) -> Self {
        Self::new(PredicateKind::InFolder(FolderRef::Remote {
            account,
            folder: FolderId::new(id),
        }))
    }

    pub fn tag(name: impl Into<String>) -> Self {
        Self::new(PredicateKind::Tag(name.into()))
    }

    pub fn text(term: impl Into<String>) -> Self {
        Self::new(PredicateKind::Text(TextQuery::term(term)))
    }

    pub fn items(ids: Vec<ItemRef>) -> Self {
        Self::new(PredicateKind::Items(ids))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.effective_truth() {
            f.write_str("-")?;
        }
        match &self.kind {
            PredicateKind::InFolder(FolderRef::Local(id)) => write!(f, "in:{id}"),
            PredicateKind::InFolder(FolderRef::Remote { account, folder }) => {
                write!(f, "inid:{account}:{folder}")
            }
            PredicateKind::Anywhere => f.write_str("is:anywhere"),
            PredicateKind::Tag(tag) => write!(f, "tag:{tag}"),
            PredicateKind::Date(r) => write!(f, "date:{r}"),
            PredicateKind::Size(r) => write!(f, "size:{r}"),
            PredicateKind::Items(ids) => {
                f.write_str("item:{")?;
                for (i, id) in ids.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{id}")?;
                }
                f.write_str("}")
            }
            PredicateKind::Conversation(id) => write!(f, "conv:{id}"),
            PredicateKind::Type(t) => write!(f, "type:{}", t.to_string().to_lowercase()),
            PredicateKind::Text(q) => write!(f, "{q}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_truth() {
        let p = Predicate::tag("x");
        assert!(p.effective_truth());
        assert!(!p.clone().with_modifier(Modifier::Minus).effective_truth());
        assert!(p.negated().with_modifier(Modifier::Minus).effective_truth());
    }

    #[test]
    fn test_range() {
        let r = Range::between(10, 20);
        assert!(r.contains(10));
        assert!(!r.contains(20));
        assert!(!r.is_empty());
        assert!(Range::between(5, 5).is_empty());
        assert!(Range::at_least(3).contains(i64::MAX));
    }

    #[test]
    fn test_display() {
        assert_eq!(Predicate::in_folder(2).to_string(), "in:2");
        assert_eq!(Predicate::tag("x").negated().to_string(), "-tag:x");
        let items = Predicate::items(vec![ItemRef::local(1), ItemRef::local(2)]);
        assert_eq!(items.to_string(), "item:{1,2}");
    }

    #[test]
    fn test_all_clauses_have_text() {
        let text = Clause::from(Predicate::text("hello"));
        let tag = Clause::from(Predicate::tag("x"));
        assert!(all_clauses_have_text(&[text.clone(), Clause::or(), Clause::sub(vec![tag.clone(), text.clone()])]));
        assert!(!all_clauses_have_text(&[text, Clause::or(), tag.clone()]));
        assert!(!tag.has_text());
    }
}

//! YAML -> clause list loader.
//!
//! Example:
//! ```yaml
//! clauses:
//!   - { op: in, folder: 2 }
//!   - { op: tag, name: "\\Unread", not: true }
//!   - { op: or }
//!   - { op: text, query: "quarterly report" }
//!   - op: group
//!     not: true
//!     clauses:
//!       - { op: date, min: 1700000000000 }
//!       - { op: item, ids: [7, 9], account: "bob" }
//! ```
//!
//! This is a structured clause format, not a query grammar.

use serde::{Deserialize, Serialize};

use fedsearch_core::clause::{Clause, FolderRef, ItemRef, Modifier, Predicate, PredicateKind, Range};
use fedsearch_core::hit::ItemType;
use fedsearch_core::id::{AccountId, FolderId, ItemId};
use fedsearch_core::text::{TextQuery, DEFAULT_FIELD};

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClauseDoc {
    pub clauses: Vec<ClauseDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "op")]
pub enum ClauseDef {
    And,
    Or,
    In {
        folder: u64,
        #[serde(default)]
        account: Option<String>,
        #[serde(default)]
        not: bool,
    },
    Anywhere {
        #[serde(default)]
        not: bool,
    },
    Tag {
        name: String,
        #[serde(default)]
        not: bool,
    },
    Date {
        #[serde(default)]
        min: Option<i64>,
        #[serde(default)]
        max: Option<i64>,
        #[serde(default)]
        not: bool,
    },
    Size {
        #[serde(default)]
        min: Option<i64>,
        #[serde(default)]
        max: Option<i64>,
        #[serde(default)]
        not: bool,
    },
    Item {
        ids: Vec<u64>,
        #[serde(default)]
        account: Option<String>,
        #[serde(default)]
        not: bool,
    },
    Conv {
        id: u64,
        #[serde(default)]
        account: Option<String>,
        #[serde(default)]
        not: bool,
    },
    Type {
        kind: ItemType,
        #[serde(default)]
        not: bool,
    },
    /// Whitespace-separated words, all required.
    Text {
        query: String,
        #[serde(default)]
        field: Option<String>,
        #[serde(default)]
        not: bool,
    },
    Group {
        clauses: Vec<ClauseDef>,
        #[serde(default)]
        not: bool,
    },
}

/// Half-open `[min, max)`; a missing bound is unbounded.
fn range(min: Option<i64>, max: Option<i64>) -> Range {
    Range {
        min,
        min_inclusive: true,
        max,
        max_inclusive: false,
    }
}

fn text_query(query: &str, field: Option<&str>) -> TextQuery {
    let field = field.unwrap_or(DEFAULT_FIELD);
    let mut words = query
        .split_whitespace()
        .map(|w| TextQuery::field_term(field, w.to_lowercase()));
    match words.next() {
        // an empty clause reaches lowering and is rejected there
        None => TextQuery::And(Vec::new()),
        Some(first) => words.fold(first, TextQuery::and),
    }
}

fn predicate(kind: PredicateKind, not: bool) -> Clause {
    let p = Predicate::new(kind);
    Clause::Predicate(if not { p.negated() } else { p })
}

fn to_clause(def: ClauseDef) -> Clause {
    match def {
        ClauseDef::And => Clause::and(),
        ClauseDef::Or => Clause::or(),
        ClauseDef::In { folder, account, not } => {
            let folder = FolderId::new(folder);
            let r = match account {
                Some(a) => FolderRef::Remote {
                    account: AccountId::new(a),
                    folder,
                },
                None => FolderRef::Local(folder),
            };
            predicate(PredicateKind::InFolder(r), not)
        }
        ClauseDef::Anywhere { not } => predicate(PredicateKind::Anywhere, not),
        ClauseDef::Tag { name, not } => predicate(PredicateKind::Tag(name), not),
        ClauseDef::Date { min, max, not } => predicate(PredicateKind::Date(range(min, max)), not),
        ClauseDef::Size { min, max, not } => predicate(PredicateKind::Size(range(min, max)), not),
        ClauseDef::Item { ids, account, not } => {
            let account = account.map(AccountId::new);
            let refs = ids
                .into_iter()
                .map(|id| ItemRef {
                    account: account.clone(),
                    id: ItemId::new(id),
                })
                .collect();
            predicate(PredicateKind::Items(refs), not)
        }
        ClauseDef::Conv { id, account, not } => predicate(
            PredicateKind::Conversation(ItemRef {
                account: account.map(AccountId::new),
                id: ItemId::new(id),
            }),
            not,
        ),
        ClauseDef::Type { kind, not } => predicate(PredicateKind::Type(kind), not),
        ClauseDef::Text { query, field, not } => {
            predicate(PredicateKind::Text(text_query(&query, field.as_deref())), not)
        }
        ClauseDef::Group { clauses, not } => Clause::SubQuery {
            modifier: if not { Modifier::Minus } else { Modifier::None },
            clauses: clauses.into_iter().map(to_clause).collect(),
        },
    }
}

/// Parse a YAML clause document into the clause list the planner consumes.
pub fn parse_yaml_clauses(yaml_src: &str) -> Result<Vec<Clause>> {
    let doc: ClauseDoc = serde_yaml::from_str(yaml_src)?;
    Ok(doc.clauses.into_iter().map(to_clause).collect())
}

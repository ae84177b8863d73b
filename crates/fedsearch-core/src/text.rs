//! Full-text query model handed to the text store.
//!
//! The store owns analysis and scoring; this is only the boolean shape.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const DEFAULT_FIELD: &str = "content";

/// Field/term pair matching calendar items marked private.
pub const PRIVATE_FIELD: &str = "l.field";
pub const PRIVATE_TERM: &str = "_calendaritemclass:private";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextTerm {
    pub field: String,
    pub text: String,
}

impl TextTerm {
    pub fn new(text: impl Into<String>) -> Self {
        Self::in_field(DEFAULT_FIELD, text)
    }

    pub fn in_field(field: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            text: text.into(),
        }
    }

    /// Normalized `field:text` key the stores index by.
    pub fn key(&self) -> String {
        format!("{}:{}", self.field, self.text.to_lowercase())
    }
}

impl fmt::Display for TextTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.field, self.text)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextQuery {
    Term(TextTerm),
    Not(Box<TextQuery>),
    And(Vec<TextQuery>),
    Or(Vec<TextQuery>),
}

impl TextQuery {
    pub fn term(text: impl Into<String>) -> Self {
        TextQuery::Term(TextTerm::new(text))
    }

    pub fn field_term(field: impl Into<String>, text: impl Into<String>) -> Self {
        TextQuery::Term(TextTerm::in_field(field, text))
    }

    /// Clause excluding calendar items marked private.
    pub fn private_exclusion() -> Self {
        TextQuery::field_term(PRIVATE_FIELD, PRIVATE_TERM).negate()
    }

    pub fn negate(self) -> Self {
        match self {
            TextQuery::Not(inner) => *inner,
            other => TextQuery::Not(Box::new(other)),
        }
    }

    /// `self AND other`, keeping nested conjunctions flat.
    pub fn and(self, other: TextQuery) -> Self {
        let mut clauses = match self {
            TextQuery::And(cs) => cs,
            q => vec![q],
        };
        match other {
            TextQuery::And(cs) => clauses.extend(cs),
            q => clauses.push(q),
        }
        TextQuery::And(clauses)
    }

    /// `self OR other`, keeping nested disjunctions flat.
    pub fn or(self, other: TextQuery) -> Self {
        let mut clauses = match self {
            TextQuery::Or(cs) => cs,
            q => vec![q],
        };
        match other {
            TextQuery::Or(cs) => clauses.extend(cs),
            q => clauses.push(q),
        }
        TextQuery::Or(clauses)
    }

    /// True when nothing in the query requires a term to be present.
    pub fn is_negative_only(&self) -> bool {
        match self {
            TextQuery::Term(_) => false,
            TextQuery::Not(_) => true,
            TextQuery::And(cs) => cs.iter().all(|c| c.is_negative_only()),
            TextQuery::Or(cs) => cs.iter().any(|c| c.is_negative_only()),
        }
    }

    /// Evaluate against a document, given a predicate telling whether it holds a term.
    pub fn matches(&self, has_term: &dyn Fn(&TextTerm) -> bool) -> bool {
        match self {
            TextQuery::Term(t) => has_term(t),
            TextQuery::Not(inner) => !inner.matches(has_term),
            TextQuery::And(cs) => cs.iter().all(|c| c.matches(has_term)),
            TextQuery::Or(cs) => cs.iter().any(|c| c.matches(has_term)),
        }
    }

    /// Positive terms, in query order.
    pub fn positive_terms(&self) -> Vec<&TextTerm> {
        let mut out = Vec::new();
        self.collect_terms(true, &mut out);
        out
    }

    fn collect_terms<'a>(&'a self, positive: bool, out: &mut Vec<&'a TextTerm>) {
        match self {
            TextQuery::Term(t) => {
                if positive {
                    out.push(t);
                }
            }
            TextQuery::Not(inner) => inner.collect_terms(!positive, out),
            TextQuery::And(cs) | TextQuery::Or(cs) => {
                for c in cs {
                    c.collect_terms(positive, out);
                }
            }
        }
    }
}

impl fmt::Display for TextQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextQuery::Term(t) => write!(f, "{t}"),
            TextQuery::Not(inner) => write!(f, "-{inner}"),
            TextQuery::And(cs) | TextQuery::Or(cs) => {
                let sep = if matches!(self, TextQuery::And(_)) {
                    " AND "
                } else {
                    " OR "
                };
                f.write_str("(")?;
                for (i, c) in cs.iter().enumerate() {
                    if i > 0 {
                        f.write_str(sep)?;
                    }
                    write!(f, "{c}")?;
                }
                f.write_str(")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_and_or_flatten() {
        let q = TextQuery::term("a")
            .and(TextQuery::term("b"))
            .and(TextQuery::term("c"));
        assert_eq!(q.to_string(), "(content:a AND content:b AND content:c)");

        let q = TextQuery::term("a").or(TextQuery::term("b").or(TextQuery::term("c")));
        assert_eq!(q.to_string(), "(content:a OR content:b OR content:c)");
    }

    #[test]
    fn test_negative_only() {
        assert!(TextQuery::term("a").negate().is_negative_only());
        assert!(!TextQuery::term("a")
            .and(TextQuery::term("b").negate())
            .is_negative_only());
        assert_eq!(TextQuery::term("a").negate().negate(), TextQuery::term("a"));
    }

    #[test]
    fn test_matches() {
        let q = TextQuery::term("hello").and(TextQuery::private_exclusion());
        let doc = |t: &TextTerm| t.key() == "content:hello";
        assert!(q.matches(&doc));
        let private = |t: &TextTerm| t.key() == "content:hello" || t.field == PRIVATE_FIELD;
        assert!(!q.matches(&private));
        assert_eq!(q.positive_terms().len(), 1);
    }
}

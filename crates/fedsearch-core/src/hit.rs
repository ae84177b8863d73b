//! Result shapes: raw relational rows, matched text documents, and hits.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::{IndexId, ItemId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Message,
    Conversation,
    Contact,
    Appointment,
    Task,
    Document,
}

impl ItemType {
    /// Whether each matched sub-document of an item becomes its own hit.
    pub fn allows_part_hits(self) -> bool {
        matches!(self, ItemType::Message)
    }

    pub fn is_calendar(self) -> bool {
        matches!(self, ItemType::Appointment | ItemType::Task)
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ItemType::Message => "MESSAGE",
            ItemType::Conversation => "CONVERSATION",
            ItemType::Contact => "CONTACT",
            ItemType::Appointment => "APPOINTMENT",
            ItemType::Task => "TASK",
            ItemType::Document => "DOCUMENT",
        };
        f.write_str(s)
    }
}

/// Value a row carries for the requested sort criterion.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SortKey {
    None,
    Int(i64),
    Text(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    DateDesc,
    DateAsc,
    SubjectAsc,
    SubjectDesc,
    SenderAsc,
    SenderDesc,
    SizeAsc,
    SizeDesc,
    /// Text-store score, highest first.
    Relevance,
    /// No ordering guarantee; streams are drained in list order.
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortField {
    Date,
    Subject,
    Sender,
    Size,
    Score,
}

impl SortBy {
    pub fn field(self) -> Option<SortField> {
        match self {
            SortBy::DateAsc | SortBy::DateDesc => Some(SortField::Date),
            SortBy::SubjectAsc | SortBy::SubjectDesc => Some(SortField::Subject),
            SortBy::SenderAsc | SortBy::SenderDesc => Some(SortField::Sender),
            SortBy::SizeAsc | SortBy::SizeDesc => Some(SortField::Size),
            SortBy::Relevance => Some(SortField::Score),
            SortBy::None => None,
        }
    }

    pub fn is_ordered(self) -> bool {
        self != SortBy::None
    }

    pub fn is_descending(self) -> bool {
        matches!(
            self,
            SortBy::DateDesc
                | SortBy::SubjectDesc
                | SortBy::SenderDesc
                | SortBy::SizeDesc
                | SortBy::Relevance
        )
    }

    /// Order two sort keys in output order. `Equal` means "same group".
    pub fn compare_keys(self, a: &SortKey, b: &SortKey) -> Ordering {
        if !self.is_ordered() {
            return Ordering::Equal;
        }
        let ord = a.cmp(b);
        if self.is_descending() {
            ord.reverse()
        } else {
            ord
        }
    }

    pub fn compare(self, a: &Hit, b: &Hit) -> Ordering {
        self.compare_keys(&a.sort_key, &b.sort_key)
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SortBy::DateDesc => "dateDesc",
            SortBy::DateAsc => "dateAsc",
            SortBy::SubjectAsc => "subjAsc",
            SortBy::SubjectDesc => "subjDesc",
            SortBy::SenderAsc => "nameAsc",
            SortBy::SenderDesc => "nameDesc",
            SortBy::SizeAsc => "sizeAsc",
            SortBy::SizeDesc => "sizeDesc",
            SortBy::Relevance => "score",
            SortBy::None => "none",
        };
        f.write_str(s)
    }
}

/// One row returned by the relational store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub item_id: ItemId,
    pub index_id: Option<IndexId>,
    pub kind: ItemType,
    pub sort_key: SortKey,
}

/// One matched sub-document reported by the text store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextDoc {
    pub index_id: IndexId,
    /// `None` for the top-level document of an item.
    pub part: Option<String>,
    pub score: u32,
}

/// Identity used for deduplication and intersection checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HitId {
    pub item_id: ItemId,
    pub part: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hit {
    pub item_id: ItemId,
    pub part: Option<String>,
    pub kind: ItemType,
    pub sort_key: SortKey,
}

impl Hit {
    pub fn new(item_id: ItemId, kind: ItemType, sort_key: SortKey) -> Self {
        Self {
            item_id,
            part: None,
            kind,
            sort_key,
        }
    }

    pub fn with_part(mut self, part: impl Into<String>) -> Self {
        self.part = Some(part.into());
        self
    }

    pub fn id(&self) -> HitId {
        HitId {
            item_id: self.item_id,
            part: self.part.clone(),
        }
    }

    pub fn is_part(&self) -> bool {
        self.part.is_some()
    }
}

impl fmt::Display for Hit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.part {
            Some(part) => write!(f, "{}-{}", self.item_id, part),
            None => write!(f, "{}", self.item_id),
        }
    }
}

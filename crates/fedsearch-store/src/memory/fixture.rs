use std::collections::{BTreeMap, BTreeSet};

use fedsearch_core::hit::{ItemType, SortBy, SortField, SortKey};
use fedsearch_core::id::{FolderId, IndexId, ItemId};

/// One indexed sub-document of an item. `name == None` is the top-level document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPart {
    pub name: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredItem {
    pub id: ItemId,
    /// `None` for items the text index has not seen.
    pub index_id: Option<IndexId>,
    pub kind: ItemType,
    pub folder: FolderId,
    pub tags: BTreeSet<String>,
    pub date: i64,
    pub size: i64,
    pub subject: String,
    pub sender: String,
    pub conversation: Option<ItemId>,
    pub private: bool,
    pub deleted: bool,
    pub parts: Vec<StoredPart>,
}

impl StoredItem {
    pub fn new(id: u64, kind: ItemType, folder: u64) -> Self {
        Self {
            id: ItemId::new(id),
            index_id: Some(IndexId::new(id)),
            kind,
            folder: FolderId::new(folder),
            tags: BTreeSet::new(),
            date: 0,
            size: 0,
            subject: String::new(),
            sender: String::new(),
            conversation: None,
            private: false,
            deleted: false,
            parts: Vec::new(),
        }
    }

    pub fn message(id: u64, folder: u64) -> Self {
        Self::new(id, ItemType::Message, folder)
    }

    pub fn date(mut self, date: i64) -> Self {
        self.date = date;
        self
    }

    pub fn size(mut self, size: i64) -> Self {
        self.size = size;
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = sender.into();
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn conversation(mut self, conv: u64) -> Self {
        self.conversation = Some(ItemId::new(conv));
        self
    }

    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    pub fn deleted(mut self) -> Self {
        self.deleted = true;
        self
    }

    pub fn unindexed(mut self) -> Self {
        self.index_id = None;
        self
    }

    pub fn index_id(mut self, id: u64) -> Self {
        self.index_id = Some(IndexId::new(id));
        self
    }

    /// Top-level document text.
    pub fn body(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        match self.parts.iter_mut().find(|p| p.name.is_none()) {
            Some(p) => p.text = text,
            None => self.parts.insert(0, StoredPart { name: None, text }),
        }
        self
    }

    pub fn attachment(mut self, name: impl Into<String>, text: impl Into<String>) -> Self {
        self.parts.push(StoredPart {
            name: Some(name.into()),
            text: text.into(),
        });
        self
    }

    pub fn sort_key(&self, sort: SortBy) -> SortKey {
        match sort.field() {
            Some(SortField::Date) => SortKey::Int(self.date),
            Some(SortField::Size) => SortKey::Int(self.size),
            Some(SortField::Subject) => SortKey::Text(self.subject.to_lowercase()),
            Some(SortField::Sender) => SortKey::Text(self.sender.to_lowercase()),
            Some(SortField::Score) | None => SortKey::None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MailboxFixture {
    items: BTreeMap<ItemId, StoredItem>,
}

impl MailboxFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_item(mut self, item: StoredItem) -> Self {
        self.insert(item);
        self
    }

    pub fn insert(&mut self, item: StoredItem) {
        self.items.insert(item.id, item);
    }

    pub fn get(&self, id: ItemId) -> Option<&StoredItem> {
        self.items.get(&id)
    }

    pub fn items(&self) -> impl Iterator<Item = &StoredItem> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl FromIterator<StoredItem> for MailboxFixture {
    fn from_iter<T: IntoIterator<Item = StoredItem>>(iter: T) -> Self {
        let mut f = Self::new();
        for item in iter {
            f.insert(item);
        }
        f
    }
}

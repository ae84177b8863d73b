//! In-memory reference stores over a fixed `MailboxFixture`.
//!
//! Both stores count the work they do so callers can assert on execution
//! strategy (e.g. that a DB_FIRST plan never ran an unfiltered text search).

mod fixture;
mod relational;
mod text;

use std::sync::Arc;

pub use fixture::{MailboxFixture, StoredItem, StoredPart};
pub use relational::{MemoryRelationalStore, RelationalStats};
pub use text::{MemoryTextIndex, TextIndexStats};

use crate::mailbox::MailboxHandle;

/// A mailbox backed by the in-memory stores, with the stores kept reachable for stats.
pub struct MemoryMailbox {
    pub handle: Arc<MailboxHandle>,
    pub relational: Arc<MemoryRelationalStore>,
    pub text: Arc<MemoryTextIndex>,
}

impl MemoryMailbox {
    pub fn new(fixture: MailboxFixture) -> Self {
        let fixture = Arc::new(fixture);
        let relational = Arc::new(MemoryRelationalStore::new(fixture.clone()));
        let text = Arc::new(MemoryTextIndex::new(fixture));
        let handle = Arc::new(MailboxHandle::new(relational.clone(), text.clone()));
        Self {
            handle,
            relational,
            text,
        }
    }
}

//! Mailbox fixtures shared by the integration tests.

#![allow(dead_code)]

use fedsearch_core::hit::ItemType;
use fedsearch_exec::SearchResults;
use fedsearch_store::memory::{MailboxFixture, MemoryMailbox, StoredItem};

/// `n` messages dated by id. Odd ids live in folder 2, even ids in folder 5.
/// Every third id is tagged `x`; every body says "alpha", multiples of five
/// also say "beta".
pub fn mixed_mailbox(n: u64) -> MemoryMailbox {
    MemoryMailbox::new(
        (1..=n)
            .map(|i| {
                let folder = if i % 2 == 1 { 2 } else { 5 };
                let body = if i % 5 == 0 { "alpha beta" } else { "alpha" };
                let item = StoredItem::message(i, folder).date(i as i64).body(body);
                if i % 3 == 0 {
                    item.tag("x")
                } else {
                    item
                }
            })
            .collect(),
    )
}

/// A large folder 5 where every message says "hello", plus three messages
/// in folder 2 (ids `big + 1 ..= big + 3`), the middle one saying "bye".
pub fn large_index(big: u64) -> MemoryMailbox {
    let mut fixture: MailboxFixture = (1..=big)
        .map(|i| StoredItem::message(i, 5).date(i as i64).body("hello world"))
        .collect();
    for i in big + 1..=big + 3 {
        let body = if i == big + 2 { "bye" } else { "hello" };
        fixture.insert(StoredItem::message(i, 2).date(i as i64).body(body));
    }
    MemoryMailbox::new(fixture)
}

/// Calendar items for the private-access scenarios:
/// 1 public in folder 2, 2 private in folder 2, 3 private in folder 4,
/// 4 public in folder 4. All mention "meeting".
pub fn calendar_mailbox() -> MemoryMailbox {
    MemoryMailbox::new(
        vec![
            StoredItem::new(1, ItemType::Appointment, 2).date(1).body("team meeting"),
            StoredItem::new(2, ItemType::Appointment, 2).date(2).body("meeting").private(),
            StoredItem::new(3, ItemType::Appointment, 4).date(3).body("meeting").private(),
            StoredItem::new(4, ItemType::Appointment, 4).date(4).body("meeting notes"),
        ]
        .into_iter()
        .collect(),
    )
}

pub fn hit_ids(results: &mut SearchResults) -> Vec<String> {
    results
        .collect_hits()
        .expect("search failed")
        .iter()
        .map(ToString::to_string)
        .collect()
}

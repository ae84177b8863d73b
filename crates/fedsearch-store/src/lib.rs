#![forbid(unsafe_code)]
//! fedsearch-store: the boundaries between the query engine and a mailbox.
//!
//! Design:
//! - `RelationalStore` answers constraint queries with sorted, paged rows.
//! - `TextIndex` opens `TextCursor`s that stream matched documents grouped by index id.
//! - `HitMaterializer` turns a row (plus an optional matched document) into a `Hit`.
//! - `PermissionResolver` reports visible folders, default exclusions, and private access.
//! - `MailboxHandle` bundles the above with the mailbox lock held around store access.
//! - `memory::` holds reference stores used by tests and benches.

pub mod access;
pub mod error;
pub mod mailbox;
pub mod materialize;
pub mod memory;
pub mod relational;
pub mod text;

pub use access::{PermissionResolver, StaticPermissions};
pub use error::{Result, StoreError};
pub use mailbox::MailboxHandle;
pub use materialize::{HitMaterializer, RowMaterializer};
pub use relational::{FolderCount, Page, RelationalStore};
pub use text::{TextChunk, TextCursor, TextIndex};

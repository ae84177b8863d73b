#![forbid(unsafe_code)]
//! fedsearch-operators: the query operation tree.
//!
//! Design intent:
//! - `Operation` is a closed sum type; every variant honours the same lazy
//!   stream contract (`begin`, `peek_next`, `get_next`, `reset_iterator`,
//!   `done_with_search_results`).
//! - Store access is deferred to the first chunk fetch and always runs under
//!   the mailbox lock carried by the `SearchContext`.
//! - `optimize` consumes a tree and returns an equivalent one; `combine_ops`
//!   hands both operands back when they cannot be merged.
//! - Cloning an operation copies its plan, never its cursors or caches.

pub mod context;
pub mod error;
pub mod intersection;
pub mod operation;
pub mod policy;
pub mod relational;
pub mod seen;
pub mod text;
pub mod union;

pub use context::SearchContext;
pub use error::{OpError, Result};
pub use intersection::Intersection;
pub use operation::{Combined, Operation};
pub use policy::{DbFirstPolicy, ExecuteMode, ModeDecision, ModeProbe};
pub use relational::RelationalLeaf;
pub use seen::SeenHits;
pub use text::TextLeaf;
pub use union::Union;

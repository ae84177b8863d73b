//! Convenient re-exports for downstream crates.

pub use crate::clause::{Clause, Conjunction, FolderRef, ItemRef, Modifier, Predicate, PredicateKind, Range};
pub use crate::config::{DbFirstSignal, SearchConfig};
pub use crate::constraints::{ConstraintLeaf, Constraints, RangeField, RemoteFolder};
pub use crate::error::{Error, Result};
pub use crate::hash::Hash256;
pub use crate::hit::{Hit, HitId, ItemType, SearchResult, SortBy, SortKey, TextDoc};
pub use crate::id::{AccountId, FolderId, IndexId, ItemId, RemoteId};
pub use crate::manifest::{ManifestId, SearchManifest};
pub use crate::params::SearchParams;
pub use crate::target::{QueryTarget, QueryTargets};
pub use crate::text::{TextQuery, TextTerm};

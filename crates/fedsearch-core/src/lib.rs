#![forbid(unsafe_code)]
//! fedsearch-core: the data model shared by every fedsearch crate.
//!
//! Design:
//! - Parsed `Clause`s come from an external grammar front end; nothing here parses text.
//! - `Constraints` is the relational predicate tree a relational leaf executes.
//! - `Hit`/`SearchResult`/`TextDoc` are the shapes flowing out of the two stores.
//! - `SearchConfig` and `SearchParams` carry tunables and per-request inputs.
//! - `SearchManifest` records what an executed search did, keyed by a stable plan hash.

pub mod clause;
pub mod config;
pub mod constraints;
pub mod error;
pub mod hash;
pub mod hit;
pub mod id;
pub mod manifest;
pub mod params;
pub mod prelude;
pub mod target;
pub mod text;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#![forbid(unsafe_code)]
//! fedsearch-exec: compile clauses, run the local plan, and hand back a
//! scoped result stream.
//!
//! `SearchResults` owns the begun operation tree and releases it on every
//! exit path: explicit `close`, an operator error, or drop.

pub mod metrics;
pub mod results;
pub mod runtime;

pub use results::SearchResults;
pub use runtime::{Engine, ExecError};

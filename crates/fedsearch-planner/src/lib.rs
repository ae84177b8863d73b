#![forbid(unsafe_code)]
//! fedsearch-planner: parsed clauses -> normalized clause tree -> optimized
//! operation tree -> local plan plus per-account remote branches.
//!
//! Design:
//! - `parse_tree` builds a top-level OR of AND groups and pushes every NOT
//!   down to a leaf before anything is lowered; operations never invert a
//!   result stream.
//! - `lower` maps each clause to one leaf operation and each operator node
//!   to an `Intersection`/`Union`.
//! - `plan` splits the optimized tree by target, applies trash/spam and
//!   permission predicates to local branches, and re-optimizes.
//! - `dsl::yaml` loads clause lists from YAML for tests and tooling.

pub mod access;
pub mod dsl;
pub mod error;
pub mod lower;
pub mod parse_tree;
pub mod plan;

pub use dsl::yaml::parse_yaml_clauses;
pub use error::{PlanError, Result};
pub use lower::lower;
pub use parse_tree::{Node, OperatorNode, ThingNode};
pub use plan::{CompiledQuery, QueryPlanner, RemoteBranch};

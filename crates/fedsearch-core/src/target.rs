//! Query targets: which mailbox a leaf operation addresses.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::AccountId;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QueryTarget {
    /// Not bound to any mailbox yet; compatible with every target.
    Unspecified,
    /// The searching account's own mailbox.
    Local,
    /// One explicit remote account.
    Account(AccountId),
}

pub type QueryTargets = BTreeSet<QueryTarget>;

impl QueryTarget {
    pub fn is_explicit(&self) -> bool {
        !matches!(self, QueryTarget::Unspecified)
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, QueryTarget::Account(_))
    }

    /// Two targets can address the same mailbox.
    pub fn is_compatible(&self, other: &QueryTarget) -> bool {
        !self.is_explicit() || !other.is_explicit() || self == other
    }
}

impl Default for QueryTarget {
    fn default() -> Self {
        QueryTarget::Unspecified
    }
}

impl fmt::Display for QueryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryTarget::Unspecified => f.write_str("UNSPECIFIED"),
            QueryTarget::Local => f.write_str("LOCAL"),
            QueryTarget::Account(acct) => write!(f, "{acct}"),
        }
    }
}

/// Number of targets in the set that name a concrete mailbox.
pub fn explicit_target_count(targets: &QueryTargets) -> usize {
    targets.iter().filter(|t| t.is_explicit()).count()
}

/// Targets reachable by an AND of two operands.
///
/// An unspecified side defers to the other side; two unspecified sides
/// keep everything either side could address.
pub fn intersect_targets(lhs: &QueryTargets, rhs: &QueryTargets) -> QueryTargets {
    let lhs_open = lhs.contains(&QueryTarget::Unspecified);
    let rhs_open = rhs.contains(&QueryTarget::Unspecified);
    match (lhs_open, rhs_open) {
        (true, true) => lhs.union(rhs).cloned().collect(),
        (true, false) => rhs.clone(),
        (false, true) => lhs.clone(),
        (false, false) => lhs.intersection(rhs).cloned().collect(),
    }
}

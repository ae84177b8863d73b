//! Top-level planning: target split, permission injection, final optimize.

use std::collections::BTreeMap;

use fedsearch_core::clause::{all_clauses_have_text, Clause};
use fedsearch_core::hit::SortBy;
use fedsearch_core::id::AccountId;
use fedsearch_core::params::SearchParams;
use fedsearch_core::target::{explicit_target_count, QueryTarget};
use fedsearch_operators::{Operation, Union};
use fedsearch_store::PermissionResolver;
use tracing::debug;

use crate::access::{restrict_local, spam_trash_exclusions};
use crate::error::{PlanError, Result};
use crate::lower::lower;
use crate::parse_tree::Node;

/// All branches of a query that address one remote account.
#[derive(Debug, Clone)]
pub struct RemoteBranch {
    pub account: AccountId,
    pub operation: Operation,
}

#[derive(Debug, Clone)]
pub struct CompiledQuery {
    /// Normalized clause tree.
    pub tree: String,
    /// Optimized operation tree before permissions were applied.
    pub query_string: String,
    /// Local mailbox plan; `None` when every branch is remote.
    pub local: Option<Operation>,
    /// Handed to the cross-mailbox fan-out; never executed here.
    pub remote: Vec<RemoteBranch>,
    /// Order the local plan runs in.
    pub sort: SortBy,
}

impl CompiledQuery {
    pub fn local_or_empty(&self) -> Operation {
        self.local.clone().unwrap_or(Operation::NoResults)
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryPlanner {
    params: SearchParams,
}

impl QueryPlanner {
    pub fn new(params: SearchParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    pub fn compile(&self, clauses: &[Clause], resolver: &dyn PermissionResolver) -> Result<CompiledQuery> {
        let tree = Node::normalize(clauses)
            .ok_or_else(|| PlanError::InvalidClause("query has no clauses".into()))?;
        let sort = effective_sort(self.params.sort, clauses);
        let op = lower(&tree)?.optimize();
        let query_string = op.to_query_string();
        debug!(tree = %tree, plan = %query_string, "optimized query");

        let branches = match op {
            Operation::Union(union) => union.into_ops(),
            other => vec![other],
        };
        let mut local = Vec::new();
        let mut remote: BTreeMap<AccountId, Vec<Operation>> = BTreeMap::new();
        for branch in branches {
            let targets = branch.query_targets();
            if explicit_target_count(&targets) > 1 {
                return Err(PlanError::InvalidClause(format!(
                    "branch addresses more than one mailbox: {branch}"
                )));
            }
            match targets.into_iter().find(QueryTarget::is_remote) {
                Some(QueryTarget::Account(account)) => remote.entry(account).or_default().push(branch),
                _ => local.push(branch),
            }
        }
        debug!(local = local.len(), remote_accounts = remote.len(), "partitioned branches");

        let remote = remote
            .into_iter()
            .map(|(account, ops)| RemoteBranch {
                account,
                operation: Union::new(ops).optimize(),
            })
            .collect();

        let local = if local.is_empty() {
            None
        } else {
            Some(self.plan_local(Union::new(local).optimize(), &tree, resolver))
        };

        Ok(CompiledQuery {
            tree: tree.to_string(),
            query_string,
            local,
            remote,
            sort,
        })
    }

    fn plan_local(&self, op: Operation, tree: &Node, resolver: &dyn PermissionResolver) -> Operation {
        let excluded = spam_trash_exclusions(resolver.excluded_folders(), &tree.positive_folders());
        let op = op.ensure_spam_trash_setting(&excluded);

        let allow_private = resolver.allow_private_access();
        let private_folders = resolver.private_access_folders();
        let private_clone = (self.params.wants_calendar()
            && !allow_private
            && !private_folders.is_empty()
            && op.text_leaf_count() > 0)
            .then(|| op.clone());

        let visible = resolver.visible_folders();
        let primary = restrict_local(op, visible.as_ref(), allow_private).optimize();
        let Some(clone) = private_clone else {
            return primary;
        };

        let folders = match &visible {
            Some(v) => private_folders.intersection(v).copied().collect(),
            None => private_folders,
        };
        debug!(folders = folders.len(), "re-running text branches with private access");
        let secondary = restrict_local(clone, Some(&folders), true).optimize();
        Union::new(vec![primary, secondary]).optimize()
    }
}

/// Relevance needs a text score on every branch; otherwise newest first.
fn effective_sort(requested: SortBy, clauses: &[Clause]) -> SortBy {
    if requested == SortBy::Relevance && !all_clauses_have_text(clauses) {
        debug!(fallback = %SortBy::DateDesc, "relevance sort needs text in every clause");
        return SortBy::DateDesc;
    }
    requested
}

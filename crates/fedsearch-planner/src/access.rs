//! Permission predicates applied to the local part of a plan.

use std::collections::BTreeSet;

use fedsearch_core::id::FolderId;
use fedsearch_core::target::QueryTarget;
use fedsearch_core::text::TextQuery;
use fedsearch_operators::{Intersection, Operation, RelationalLeaf, Union};
use tracing::debug;

/// Trash/spam folders to exclude: the resolver's exclusions, minus any folder
/// the query itself names positively.
pub fn spam_trash_exclusions(
    excluded: BTreeSet<FolderId>,
    named: &BTreeSet<FolderId>,
) -> BTreeSet<FolderId> {
    excluded.difference(named).copied().collect()
}

/// AND every local branch with the caller's visibility.
///
/// Without private access each text query also excludes private calendar
/// items. `visible == None` means every folder is readable.
pub fn restrict_local(op: Operation, visible: Option<&BTreeSet<FolderId>>, allow_private: bool) -> Operation {
    let mut op = op;
    if !allow_private {
        op.visit_text_leaves_mut(&mut |text| text.add_anded_clause(TextQuery::private_exclusion()));
    }
    let Some(visible) = visible else {
        return op;
    };
    if visible.is_empty() {
        debug!("no visible folders; local search matches nothing");
        return Operation::NoResults;
    }
    match op {
        Operation::Union(union) => Operation::Union(Union::new(
            union
                .into_ops()
                .into_iter()
                .map(|branch| restrict_branch(branch, visible))
                .collect(),
        )),
        other => restrict_branch(other, visible),
    }
}

fn restrict_branch(branch: Operation, visible: &BTreeSet<FolderId>) -> Operation {
    let named = match &branch {
        Operation::Relational(leaf) => leaf
            .constraints()
            .leaf()
            .map(|l| l.folders.clone())
            .unwrap_or_default(),
        _ => BTreeSet::new(),
    };
    let folders: BTreeSet<FolderId> = if named.is_empty() {
        visible.clone()
    } else {
        named.intersection(visible).copied().collect()
    };
    if folders.is_empty() {
        return Operation::NoResults;
    }
    let allowed = folders
        .into_iter()
        .map(|folder| {
            let mut leaf = RelationalLeaf::new().with_target(QueryTarget::Local);
            leaf.leaf_mut().add_in_folder(folder, true);
            Operation::Relational(leaf)
        })
        .collect();
    Operation::Intersection(Intersection::new(vec![branch, Operation::Union(Union::new(allowed))]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedsearch_operators::TextLeaf;

    fn folder(id: u64) -> Operation {
        let mut leaf = RelationalLeaf::new();
        leaf.leaf_mut().add_in_folder(FolderId::new(id), true);
        Operation::Relational(leaf)
    }

    fn set(ids: &[u64]) -> BTreeSet<FolderId> {
        ids.iter().copied().map(FolderId::new).collect()
    }

    #[test]
    fn test_named_folder_lifts_exclusion() {
        assert_eq!(spam_trash_exclusions(set(&[3, 4]), &set(&[3])), set(&[4]));
    }

    #[test]
    fn test_restrict_to_visible_folders() {
        let op = restrict_local(folder(2), Some(&set(&[2, 5])), true).optimize();
        assert_eq!(op.to_string(), "DB[LOCAL: IN:2]");
        let op = restrict_local(folder(9), Some(&set(&[2, 5])), true).optimize();
        assert!(matches!(op, Operation::NoResults));
        let op = restrict_local(folder(2), Some(&BTreeSet::new()), true);
        assert!(matches!(op, Operation::NoResults));
    }

    #[test]
    fn test_private_exclusion_added_to_text() {
        let text = Operation::Text(TextLeaf::new(TextQuery::term("lunch")));
        let op = restrict_local(text, None, false);
        assert_eq!(
            op.to_string(),
            "TEXT((content:lunch AND -l.field:_calendaritemclass:private))"
        );
    }
}

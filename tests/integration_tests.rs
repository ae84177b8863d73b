//! End-to-end integration tests

mod test_data_gen;

use std::sync::Arc;

use fedsearch_core::clause::{Clause, Predicate};
use fedsearch_core::config::SearchConfig;
use fedsearch_core::hit::SortBy;
use fedsearch_core::id::{AccountId, FolderId};
use fedsearch_core::params::SearchParams;
use fedsearch_core::text::TextQuery;
use fedsearch_exec::Engine;
use fedsearch_operators::{Intersection, Operation, RelationalLeaf, SearchContext, TextLeaf};
use fedsearch_planner::QueryPlanner;
use fedsearch_store::StaticPermissions;
use test_data_gen::{hit_ids, large_index, mixed_mailbox};

fn pred(p: Predicate) -> Clause {
    Clause::Predicate(p)
}

fn folder_leaf(id: u64) -> Operation {
    let mut leaf = RelationalLeaf::new();
    leaf.leaf_mut().add_in_folder(FolderId::new(id), true);
    Operation::Relational(leaf)
}

fn tag_leaf(tag: &str) -> Operation {
    let mut leaf = RelationalLeaf::new();
    leaf.leaf_mut().add_tag(tag, true);
    Operation::Relational(leaf)
}

#[test]
fn test_relational_only_query_never_touches_text_index() {
    let mbox = mixed_mailbox(20);
    let engine = Engine::new(SearchConfig::default(), mbox.handle.clone());
    let clauses = [pred(Predicate::in_folder(2)), pred(Predicate::tag("x"))];
    let mut results = engine
        .search(&clauses, &SearchParams::default(), &StaticPermissions::owner())
        .unwrap();

    assert_eq!(hit_ids(&mut results), vec!["15", "9", "3"]);
    let manifest = results.close();
    assert_eq!(manifest.execute_modes, vec!["NO_LUCENE"]);
    assert_eq!(manifest.hits_returned, 3);
    assert_eq!(mbox.text.stats().cursors_opened, 0);
    assert!(mbox.relational.stats().searches > 0);
}

#[test]
fn test_common_term_runs_db_first_without_unfiltered_search() {
    let mbox = large_index(500);
    let engine = Engine::new(SearchConfig::default(), mbox.handle.clone());
    let clauses = [pred(Predicate::text("hello")), pred(Predicate::in_folder(2))];
    let mut results = engine
        .search(&clauses, &SearchParams::default(), &StaticPermissions::owner())
        .unwrap();

    assert_eq!(hit_ids(&mut results), vec!["503", "501"]);
    assert_eq!(results.execute_modes(), vec!["DB_FIRST"]);
    drop(results);

    let stats = mbox.text.stats();
    assert_eq!(stats.unfiltered_searches, 0);
    assert!(stats.filtered_searches > 0);
    assert_eq!(stats.open_cursors, 0);
}

#[test]
fn test_rare_term_runs_lucene_first() {
    let mbox = mixed_mailbox(20);
    let engine = Engine::new(SearchConfig::default(), mbox.handle.clone());
    let clauses = [pred(Predicate::text("beta")), pred(Predicate::in_folder(5))];
    let mut results = engine
        .search(&clauses, &SearchParams::default(), &StaticPermissions::owner())
        .unwrap();

    assert_eq!(hit_ids(&mut results), vec!["20", "10"]);
    assert_eq!(results.execute_modes(), vec!["LUCENE_FIRST"]);
}

#[test]
fn test_blank_text_query_returns_nothing_without_store_calls() {
    let mbox = mixed_mailbox(10);
    let engine = Engine::new(SearchConfig::default(), mbox.handle.clone());
    let mut results = engine
        .search(&[pred(Predicate::text("   "))], &SearchParams::default(), &StaticPermissions::owner())
        .unwrap();

    assert!(hit_ids(&mut results).is_empty());
    assert_eq!(mbox.relational.stats().searches, 0);
    assert_eq!(mbox.text.stats().cursors_opened, 0);
}

#[test]
fn test_union_of_folder_and_text_merges_in_sort_order() {
    let mbox = mixed_mailbox(20);
    let engine = Engine::new(SearchConfig::default(), mbox.handle.clone());
    let clauses = [
        pred(Predicate::in_folder(2)),
        Clause::or(),
        pred(Predicate::text("beta")),
    ];
    let params = SearchParams::default().with_sort(SortBy::DateAsc);
    let mut results = engine.search(&clauses, &params, &StaticPermissions::owner()).unwrap();

    assert_eq!(
        hit_ids(&mut results),
        vec!["1", "3", "5", "7", "9", "10", "11", "13", "15", "17", "19", "20"]
    );
}

#[test]
fn test_remote_branches_with_same_account_combine() {
    let bob = AccountId::new("bob");
    let clauses = [
        pred(Predicate::in_remote_folder(bob.clone(), 5)),
        Clause::or(),
        pred(Predicate::in_remote_folder(bob.clone(), 6)),
    ];
    let q = QueryPlanner::default()
        .compile(&clauses, &StaticPermissions::owner())
        .unwrap();

    assert!(q.local.is_none());
    assert_eq!(q.remote.len(), 1);
    assert_eq!(q.remote[0].account, bob);
    assert!(
        matches!(q.remote[0].operation, Operation::Relational(_)),
        "expected one merged leaf, got {}",
        q.remote[0].operation
    );
}

#[test]
fn test_remote_branches_for_different_accounts_stay_separate() {
    let bob = AccountId::new("bob");
    let carol = AccountId::new("carol");
    let clauses = [
        pred(Predicate::in_remote_folder(carol.clone(), 5)),
        Clause::or(),
        pred(Predicate::in_remote_folder(bob.clone(), 6)),
        Clause::or(),
        pred(Predicate::tag("x")),
    ];
    let q = QueryPlanner::default()
        .compile(&clauses, &StaticPermissions::owner())
        .unwrap();

    let accounts: Vec<_> = q.remote.iter().map(|r| r.account.clone()).collect();
    assert_eq!(accounts, vec![bob, carol]);
    assert_eq!(q.local_or_empty().to_string(), "DB[TAG:(x)]");
}

#[test]
fn test_intersection_skips_to_common_keys() {
    let mbox = mixed_mailbox(30);
    let params = SearchParams::default();
    let ctx = Arc::new(SearchContext::new(
        mbox.handle.clone(),
        Arc::new(SearchConfig::default()),
        &params,
    ));

    let mut op = Operation::Intersection(Intersection::new(vec![folder_leaf(2), tag_leaf("x")]));
    op.begin(&ctx).unwrap();
    let mut ids = Vec::new();
    while let Some(hit) = op.get_next().unwrap() {
        ids.push(hit.to_string());
    }
    assert_eq!(ids, vec!["27", "21", "15", "9", "3"]);
    op.done_with_search_results();

    let mut op = Operation::Intersection(Intersection::new(vec![
        folder_leaf(2),
        tag_leaf("x"),
        Operation::Text(TextLeaf::new(TextQuery::term("beta"))),
    ]));
    op.begin(&ctx).unwrap();
    assert_eq!(op.get_next().unwrap().map(|h| h.to_string()).as_deref(), Some("15"));
    assert!(op.get_next().unwrap().is_none());
    op.done_with_search_results();
    assert_eq!(mbox.text.stats().open_cursors, 0);
}

#[test]
fn test_yaml_query_end_to_end() {
    let mbox = mixed_mailbox(20);
    let engine = Engine::new(SearchConfig::default(), mbox.handle.clone());
    let yaml = r#"
clauses:
  - { op: in, folder: 2 }
  - { op: tag, name: x, not: true }
"#;
    let mut results = engine
        .search_yaml(yaml, &SearchParams::default(), &StaticPermissions::owner())
        .unwrap();
    assert_eq!(hit_ids(&mut results), vec!["19", "17", "13", "11", "7", "5", "1"]);
}

#[test]
fn test_manifest_serializes() {
    let mbox = mixed_mailbox(5);
    let engine = Engine::new(SearchConfig::default(), mbox.handle.clone());
    let mut results = engine
        .search(&[pred(Predicate::in_folder(5))], &SearchParams::default(), &StaticPermissions::owner())
        .unwrap();
    assert_eq!(hit_ids(&mut results), vec!["4", "2"]);
    let manifest = results.close();

    let json = serde_json::to_value(&manifest).unwrap();
    assert_eq!(json["hits_returned"], 2);
    assert_eq!(json["execute_modes"][0], "NO_LUCENE");
}

//! CRUD and query tests for a migrated Count kind
//!
//! Each test installs the kind in a fresh in-memory store, then drives
//! the typed client the way application code would.

mod common;

use common::{migrated, Count, NAMESPACE};
use crdbase::{CrdbError, DeleteOutcome, Filter, OperationResult, Order, Query};
use serde_json::Value;
use std::collections::BTreeSet;
use tokio::task::JoinSet;

#[tokio::test]
async fn count_scenario() {
    let (_, base) = migrated().await;

    let (name, result) = base.create(&Count::new("u1", 0, 1)).await.unwrap();
    assert_eq!((name.as_str(), result), ("u1", OperationResult::Created));

    let (name, result) = base.save(&Count::new("u1", 0, 2)).await.unwrap();
    assert_eq!((name.as_str(), result), ("u1", OperationResult::Updated));

    let counts = base.model::<Count>().unwrap();
    assert_eq!(counts.get("u1").await.unwrap(), Count::new("u1", 0, 2));
}

#[tokio::test]
async fn stored_document_uses_declared_names() {
    let (store, base) = migrated().await;
    let counts = base.model::<Count>().unwrap();
    counts.create(&Count::new("u1", 3, 7)).await.unwrap();

    let doc = store.documents(counts.resource()).pop().unwrap();
    assert_eq!(doc.namespace(), NAMESPACE);
    assert_eq!(doc.spec.get("type"), Some(&Value::from(3)));
    assert_eq!(doc.spec.get("count"), Some(&Value::from(7)));
    assert!(doc.spec.get("count_type").is_none());
    assert_eq!(doc.metadata.labels.get("crdbase.io/type").map(String::as_str), Some("3"));
    assert!(doc.resource_version().is_some());
}

#[tokio::test]
async fn duplicate_create_fails() {
    let (_, base) = migrated().await;
    base.create(&Count::new("u1", 0, 1)).await.unwrap();
    let err = base.create(&Count::new("u1", 0, 2)).await.unwrap_err();
    assert!(err.is_already_exists(), "{}", err);
}

#[tokio::test]
async fn empty_primary_key_is_generated() {
    let (_, base) = migrated().await;
    let counts = base.model::<Count>().unwrap();
    let (first, _) = counts.create(&Count::new("", 0, 1)).await.unwrap();
    let (second, _) = counts.create(&Count::new("", 0, 1)).await.unwrap();
    assert_ne!(first, second);
    for name in [&first, &second] {
        assert_eq!(name.len(), 26);
        assert!(name.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }
    assert_eq!(counts.get(&first).await.unwrap().name, first);
}

#[tokio::test]
async fn create_or_update_never_reports_created_twice() {
    let (_, base) = migrated().await;
    let counts = base.model::<Count>().unwrap();
    let mut outcomes = Vec::new();
    for counter in 0..4 {
        let (_, result) = counts
            .create_or_update(&Count::new("u1", 0, counter), |doc| {
                doc.metadata.annotations.insert("touched".into(), "yes".into());
                Ok(())
            })
            .await
            .unwrap();
        outcomes.push(result);
    }
    assert_eq!(
        outcomes,
        vec![
            OperationResult::Created,
            OperationResult::Updated,
            OperationResult::Updated,
            OperationResult::Updated
        ]
    );
    assert_eq!(counts.get("u1").await.unwrap().counter, 3);
}

#[tokio::test]
async fn mutate_cannot_change_identity() {
    let (store, base) = migrated().await;
    let counts = base.model::<Count>().unwrap();
    let err = counts
        .create_or_update(&Count::new("u1", 0, 1), |doc| {
            doc.metadata.name = "u2".into();
            Ok(())
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CrdbError::MutateContract { .. }), "{}", err);
    assert!(store.documents(counts.resource()).is_empty());

    counts.save(&Count::new("u1", 0, 1)).await.unwrap();
    let err = counts
        .create_or_update(&Count::new("u1", 0, 2), |doc| {
            doc.metadata.namespace = Some("elsewhere".into());
            Ok(())
        })
        .await
        .unwrap_err();
    assert!(matches!(err, CrdbError::MutateContract { .. }), "{}", err);
    assert_eq!(counts.get("u1").await.unwrap().counter, 1);
}

#[tokio::test]
async fn mutate_errors_abort_the_write() {
    let (store, base) = migrated().await;
    let counts = base.model::<Count>().unwrap();
    let err = counts
        .create_or_update(&Count::new("u1", 0, 1), |_| Err(CrdbError::Validation("refused".into())))
        .await
        .unwrap_err();
    assert!(matches!(err, CrdbError::Validation(_)));
    assert!(store.documents(counts.resource()).is_empty());
}

#[tokio::test(start_paused = true)]
async fn updates_retry_write_conflicts() {
    let (store, base) = migrated().await;
    let counts = base.model::<Count>().unwrap();
    counts.save(&Count::new("u1", 0, 1)).await.unwrap();

    store.inject_conflicts(3);
    let (_, result) = counts.save(&Count::new("u1", 0, 2)).await.unwrap();
    assert_eq!(result, OperationResult::Updated);
    assert_eq!(counts.get("u1").await.unwrap().counter, 2);

    store.inject_conflicts(50);
    let err = counts.save(&Count::new("u1", 0, 3)).await.unwrap_err();
    assert!(err.is_conflict(), "{}", err);
}

#[tokio::test]
async fn concurrent_saves_create_once() {
    let (_, base) = migrated().await;
    let counts = base.model::<Count>().unwrap();
    let mut tasks = JoinSet::new();
    for counter in 0..8 {
        let counts = counts.clone();
        tasks.spawn(async move { counts.save(&Count::new("shared", 0, counter)).await });
    }
    let mut created = 0;
    while let Some(joined) = tasks.join_next().await {
        let (_, result) = joined.unwrap().unwrap();
        if result == OperationResult::Created {
            created += 1;
        }
    }
    assert_eq!(created, 1);
}

#[tokio::test]
async fn delete_reports_absence_distinctly() {
    let (_, base) = migrated().await;
    let counts = base.model::<Count>().unwrap();
    counts.create(&Count::new("u1", 0, 1)).await.unwrap();
    assert_eq!(counts.delete("u1").await.unwrap(), DeleteOutcome::Deleted);
    assert_eq!(counts.delete("u1").await.unwrap(), DeleteOutcome::Absent);

    let err = counts.get("u1").await.unwrap_err();
    assert!(matches!(err, CrdbError::NotFound { .. }), "{}", err);
    assert!(err.is_not_found());
}

async fn seeded() -> crdbase::ModelClient<Count> {
    let (_, base) = migrated().await;
    let counts = base.model::<Count>().unwrap();
    let rows = [("a", 1, 30), ("b", 2, 10), ("c", 1, 20), ("d", 3, 40), ("e", 1, 10)];
    let rows: Vec<Count> = rows.iter().map(|(n, t, c)| Count::new(n, *t, *c)).collect();
    let results = counts.create_or_update_list(&rows, |_| Ok(())).await.unwrap();
    assert!(results.iter().all(|(_, r)| *r == OperationResult::Created));
    counts
}

fn names(rows: &[Count]) -> Vec<&str> {
    rows.iter().map(|c| c.name.as_str()).collect()
}

#[tokio::test]
async fn list_filters_sorts_and_pages() {
    let counts = seeded().await;

    let by_type = counts.list(&Query::new().filter(Filter::eq("type", 1))).await.unwrap();
    assert_eq!(names(&by_type), vec!["a", "c", "e"]);

    let ordered = Query::new().order_by(Order::desc("count")).order_by(Order::asc("name"));
    assert_eq!(names(&counts.list(&ordered).await.unwrap()), vec!["d", "a", "c", "b", "e"]);

    let second_page = ordered.clone().limit(2).page(2);
    assert_eq!(names(&counts.list(&second_page).await.unwrap()), vec!["c", "b"]);
    assert!(counts.list(&ordered.clone().limit(2).page(4)).await.unwrap().is_empty());

    let ranged = Query::new().filter(Filter::ge("count", 20)).filter(Filter::ne("type", 3));
    assert_eq!(names(&counts.list(&ranged).await.unwrap()), vec!["a", "c"]);

    let distinct = Query::new().order_by(Order::asc("count")).distinct_on("type");
    assert_eq!(names(&counts.list(&distinct).await.unwrap()), vec!["b", "e", "d"]);

    let parsed: Query = "filter=type+in+(2,3)&sort=-name".parse().unwrap();
    assert_eq!(names(&counts.list(&parsed).await.unwrap()), vec!["d", "b"]);

    let by_name = Query::new().filter(Filter::eq("metadata.name", "c"));
    assert_eq!(names(&counts.list(&by_name).await.unwrap()), vec!["c"]);
}

#[tokio::test]
async fn first_and_documents() {
    let counts = seeded().await;
    let top = counts.first(&Query::new().order_by(Order::desc("count"))).await.unwrap();
    assert_eq!(top.name, "d");

    let err = counts.first(&Query::new().filter(Filter::eq("type", 9))).await.unwrap_err();
    assert!(err.is_not_found());

    let docs = counts.documents(&Query::new().filter(Filter::exists("count"))).await.unwrap();
    assert_eq!(docs.len(), 5);
    let kinds: BTreeSet<&str> = docs.iter().map(|d| d.kind.as_str()).collect();
    assert_eq!(kinds, BTreeSet::from(["Count"]));
}

#[tokio::test]
async fn invalid_queries_are_rejected() {
    let counts = seeded().await;
    let err = counts.list(&Query::new().limit(5000)).await.unwrap_err();
    assert!(matches!(err, CrdbError::Query(_)), "{}", err);
    let err = counts.list(&Query::new().page(-1)).await.unwrap_err();
    assert!(matches!(err, CrdbError::Query(_)), "{}", err);
}

#[tokio::test]
async fn delete_all_of_ignores_pagination() {
    let counts = seeded().await;
    let deleted = counts
        .delete_all_of(&Query::new().filter(Filter::eq("type", 1)).limit(1))
        .await
        .unwrap();
    assert_eq!(deleted, 3);
    assert_eq!(names(&counts.list(&Query::new()).await.unwrap()), vec!["b", "d"]);
    assert_eq!(counts.delete_all_of(&Query::new().filter(Filter::eq("type", 1))).await.unwrap(), 0);
}

#[tokio::test]
async fn negative_index_values_filter_in_memory() {
    let (_, base) = migrated().await;
    let counts = base.model::<Count>().unwrap();
    counts.create(&Count::new("neg", -1, 1)).await.unwrap();
    counts.create(&Count::new("pos", 2, 1)).await.unwrap();

    let eq = counts.list(&Query::new().filter(Filter::eq("type", -1))).await.unwrap();
    assert_eq!(names(&eq), vec!["neg"]);
    let ne = counts.list(&Query::new().filter(Filter::ne("type", -1))).await.unwrap();
    assert_eq!(names(&ne), vec!["pos"]);
}

#[tokio::test]
async fn malformed_name_filters_match_nothing() {
    let counts = seeded().await;
    let by_name = Query::new().filter(Filter::eq("metadata.name", "x(y)"));
    assert!(counts.list(&by_name).await.unwrap().is_empty());
    let not_name = Query::new().filter(Filter::ne("metadata.name", "x(y)"));
    assert_eq!(counts.list(&not_name).await.unwrap().len(), 5);
}

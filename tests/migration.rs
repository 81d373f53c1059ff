//! Migration tests against the in-memory store
//!
//! Time is paused in tests that wait on discovery, so readiness timeouts and
//! retries complete without wall-clock delays.

mod common;

use common::{base_with, Count, DEFINITION, NAMESPACE};
use crdbase::{
    CrdbError, DeleteOutcome, FieldSchema, InMemoryStore, MigrationStep, Model, ModelSchema, ObjectKey,
    OperationResult, ReadinessError, SchemaBuilder,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Count with an extra field, stored under the same kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CountV2 {
    name: String,
    count_type: i64,
    counter: i64,
    owner: String,
}

impl Model for CountV2 {
    const NAME: &'static str = "CountV2";

    fn kind_name() -> &'static str {
        "Count"
    }

    fn describe(schema: &mut SchemaBuilder) {
        schema.field("name", FieldSchema::string()).tag("name,primaryKey");
        schema.field("count_type", FieldSchema::integer()).tag("type,index");
        schema.field("counter", FieldSchema::integer()).tag("count");
        schema.field("owner", FieldSchema::string());
    }
}

fn role_key() -> ObjectKey {
    ObjectKey::new(NAMESPACE, "count-manager-role")
}

fn binding_key() -> ObjectKey {
    ObjectKey::new(NAMESPACE, "count-manager-rolebinding")
}

#[tokio::test(start_paused = true)]
async fn installs_definition_and_access_control() {
    let store = Arc::new(InMemoryStore::with_establish_delay(Duration::from_millis(1500)));
    let base = base_with(store.clone());
    let schemas = [base.try_schema::<Count>().unwrap()];

    let start = Instant::now();
    let report = base.auto_migrate(&CancellationToken::new(), &schemas).await.unwrap();
    assert_eq!(start.elapsed(), Duration::from_secs(2));

    assert_eq!(report.definitions, vec![(DEFINITION.to_string(), OperationResult::Created)]);
    assert_eq!(report.roles, vec![("count-manager-role".to_string(), OperationResult::Created)]);
    assert_eq!(
        report.role_bindings,
        vec![("count-manager-rolebinding".to_string(), OperationResult::Created)]
    );

    let definition = store.definition(DEFINITION).unwrap();
    assert_eq!(definition.spec.names.plural, "counts");
    assert_eq!(definition.spec.names.kind, "Count");
    let role = store.role(&role_key()).unwrap();
    assert_eq!(
        role.rules[0].verbs,
        vec!["create", "delete", "get", "list", "patch", "update", "watch"]
    );
    let binding = store.role_binding(&binding_key()).unwrap();
    assert_eq!(binding.role_ref.name, "count-manager-role");
    assert_eq!(binding.subjects[0].name, NAMESPACE);
}

#[tokio::test]
async fn second_run_changes_nothing() {
    let store = Arc::new(InMemoryStore::new());
    let base = base_with(store.clone());
    let schemas = [base.try_schema::<Count>().unwrap()];
    let cancel = CancellationToken::new();

    base.auto_migrate(&cancel, &schemas).await.unwrap();
    let revision = store.revision();
    let report = base.auto_migrate(&cancel, &schemas).await.unwrap();
    assert!(report.is_unchanged(), "{:?}", report);
    assert_eq!(store.revision(), revision);
}

#[tokio::test(start_paused = true)]
async fn times_out_when_never_served() {
    let store = Arc::new(InMemoryStore::never_establish());
    let base = base_with(store.clone());
    let schemas = [base.try_schema::<Count>().unwrap()];

    let start = Instant::now();
    let err = base.auto_migrate(&CancellationToken::new(), &schemas).await.unwrap_err();
    assert_eq!(start.elapsed(), Duration::from_secs(10));
    assert!(
        matches!(err, CrdbError::Migration { step: MigrationStep::EnsureDefinitions, .. }),
        "{}",
        err
    );
    assert!(matches!(err.readiness_error(), Some(ReadinessError::Timeout { .. })));

    // Definitions are left installed; access control was never reached.
    assert!(store.definition(DEFINITION).is_some());
    assert!(store.role(&role_key()).is_none());
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_the_wait_promptly() {
    let store = Arc::new(InMemoryStore::never_establish());
    let base = base_with(store);
    let schemas = [base.try_schema::<Count>().unwrap()];
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2500)).await;
        trigger.cancel();
    });

    let start = Instant::now();
    let err = base.auto_migrate(&cancel, &schemas).await.unwrap_err();
    assert_eq!(start.elapsed(), Duration::from_millis(2500));
    assert_eq!(err.readiness_error(), Some(&ReadinessError::Cancelled));
}

#[tokio::test]
async fn changed_model_updates_the_definition_only() {
    let store = Arc::new(InMemoryStore::new());
    let base = base_with(store.clone());
    let cancel = CancellationToken::new();
    base.auto_migrate(&cancel, &[base.try_schema::<Count>().unwrap()]).await.unwrap();

    let report = base.auto_migrate(&cancel, &[base.try_schema::<CountV2>().unwrap()]).await.unwrap();
    assert_eq!(report.definitions, vec![(DEFINITION.to_string(), OperationResult::Updated)]);
    assert_eq!(report.roles[0].1, OperationResult::Unchanged);
    assert_eq!(report.role_bindings[0].1, OperationResult::Unchanged);

    let definition = store.definition(DEFINITION).unwrap();
    let spec = &definition.spec.versions[0].schema.open_api_v3_schema.properties["spec"];
    assert!(spec.properties.contains_key("owner"));
}

#[tokio::test(start_paused = true)]
async fn definition_updates_retry_conflicts() {
    let store = Arc::new(InMemoryStore::new());
    let base = base_with(store.clone());
    let cancel = CancellationToken::new();
    base.auto_migrate(&cancel, &[base.try_schema::<Count>().unwrap()]).await.unwrap();

    store.inject_conflicts(2);
    let report = base.auto_migrate(&cancel, &[base.try_schema::<CountV2>().unwrap()]).await.unwrap();
    assert_eq!(report.definitions[0].1, OperationResult::Updated);

    store.inject_conflicts(100);
    let err = base.auto_migrate(&cancel, &[base.try_schema::<Count>().unwrap()]).await.unwrap_err();
    assert!(err.is_conflict());
    assert!(matches!(err, CrdbError::Migration { step: MigrationStep::InstallDefinitions, .. }));
}

#[tokio::test]
async fn empty_schema_fails_before_touching_the_store() {
    let store = Arc::new(InMemoryStore::new());
    let base = base_with(store.clone());
    let schemas = [Arc::new(ModelSchema::empty("Broken"))];
    let err = base.auto_migrate(&CancellationToken::new(), &schemas).await.unwrap_err();
    match err {
        CrdbError::Migration { step: MigrationStep::GenerateDefinitions, source } => {
            assert!(matches!(*source, CrdbError::InvalidModel(_)));
        }
        other => panic!("unexpected {}", other),
    }
    assert_eq!(store.revision(), 0);
}

#[tokio::test]
async fn prune_removes_everything_and_tolerates_absence() {
    let store = Arc::new(InMemoryStore::new());
    let base = base_with(store.clone());
    let schemas = [base.try_schema::<Count>().unwrap()];
    base.auto_migrate(&CancellationToken::new(), &schemas).await.unwrap();

    let report = base.prune(&schemas).await.unwrap();
    assert_eq!(report.definitions, vec![(DEFINITION.to_string(), DeleteOutcome::Deleted)]);
    assert_eq!(report.roles[0].1, DeleteOutcome::Deleted);
    assert_eq!(report.role_bindings[0].1, DeleteOutcome::Deleted);
    assert!(store.definition(DEFINITION).is_none());
    assert!(store.role(&role_key()).is_none());
    assert!(store.role_binding(&binding_key()).is_none());

    let report = base.prune(&schemas).await.unwrap();
    assert_eq!(report.definitions[0].1, DeleteOutcome::Absent);
    assert_eq!(report.roles[0].1, DeleteOutcome::Absent);
    assert_eq!(report.role_bindings[0].1, DeleteOutcome::Absent);
}

#[tokio::test]
async fn prune_before_migrate_is_fine() {
    let base = base_with(Arc::new(InMemoryStore::new()));
    let report = base.prune(&[base.try_schema::<Count>().unwrap()]).await.unwrap();
    assert_eq!(report.definitions[0].1, DeleteOutcome::Absent);
}

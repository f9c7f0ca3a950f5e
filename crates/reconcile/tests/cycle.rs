#![forbid(unsafe_code)]

use std::sync::Arc;

use ethereal_core::mock::{InstanceCall, MockInstances, MockStore, StatusWrite};
use ethereal_core::{DesiredRecord, EtherealError, ReconcileAction};
use ethereal_reconcile::Reconciler;

const DEFAULT_IMAGE: &str = "sunday-app:latest";

fn record(name: &str, image: Option<&str>, resurrections: Option<u64>) -> DesiredRecord {
    let mut r = DesiredRecord::new(name, image);
    r.status.resurrections = resurrections;
    r
}

fn setup(records: Vec<DesiredRecord>) -> (Arc<MockStore>, Arc<MockInstances>, Reconciler) {
    let store = Arc::new(MockStore::with_records(records));
    let instances = Arc::new(MockInstances::new());
    let reconciler = Reconciler::new(store.clone(), instances.clone(), DEFAULT_IMAGE);
    (store, instances, reconciler)
}

#[tokio::test]
async fn alpha_is_created_with_default_image_and_counter_initialised() {
    let (store, instances, rec) = setup(vec![record("alpha", None, None)]);

    let report = rec.run_cycle().await.expect("cycle");

    let inst = instances.instance("real-alpha").expect("instance created");
    assert_eq!(inst.image.as_deref(), Some(DEFAULT_IMAGE));
    assert_eq!(store.resurrections("alpha"), Some(0));
    assert_eq!(
        instances.mutating_calls(),
        vec![InstanceCall::Create { name: "real-alpha".into(), image: DEFAULT_IMAGE.into() }]
    );
    assert_eq!(store.status_writes(), vec![StatusWrite { record: "alpha".into(), resurrections: Some(0) }]);
    let o = report.outcome("alpha").expect("outcome");
    assert_eq!(o.action, ReconcileAction::Create);
    assert_eq!(o.resurrections, Some(0));
    assert!(o.error.is_none());
}

#[tokio::test]
async fn beta_is_resurrected_and_counter_increments() {
    let (store, instances, rec) = setup(vec![record("beta", Some("app:v1"), Some(2))]);
    instances.seed("real-beta", "app:v1");
    instances.vanish("real-beta");

    rec.run_cycle().await.expect("cycle");

    assert_eq!(instances.instance("real-beta").and_then(|i| i.image).as_deref(), Some("app:v1"));
    assert_eq!(store.resurrections("beta"), Some(3));
    assert_eq!(store.status_writes().len(), 1);
}

#[tokio::test]
async fn gamma_drift_is_replaced_over_two_cycles() {
    let (store, instances, rec) = setup(vec![record("gamma", Some("v2"), Some(0))]);
    instances.seed("real-gamma", "v1");

    let first = rec.run_cycle().await.expect("cycle 1");
    assert_eq!(first.outcome("gamma").map(|o| o.action), Some(ReconcileAction::Recreate));
    assert!(instances.instance("real-gamma").is_none());
    assert_eq!(instances.mutating_calls(), vec![InstanceCall::Delete("real-gamma".into())]);
    assert_eq!(store.resurrections("gamma"), Some(0));
    assert!(store.status_writes().is_empty());

    instances.reset_calls();
    let second = rec.run_cycle().await.expect("cycle 2");
    assert_eq!(second.outcome("gamma").map(|o| o.action), Some(ReconcileAction::Create));
    assert_eq!(instances.instance("real-gamma").and_then(|i| i.image).as_deref(), Some("v2"));
    assert_eq!(instances.mutating_calls(), vec![InstanceCall::Create { name: "real-gamma".into(), image: "v2".into() }]);
    assert_eq!(store.resurrections("gamma"), Some(1));
    assert_eq!(store.status_writes().len(), 1);
}

#[tokio::test]
async fn matching_instance_sees_no_mutation() {
    let (store, instances, rec) = setup(vec![record("delta", Some("app:v3"), Some(4))]);
    instances.seed("real-delta", "app:v3");

    let report = rec.run_cycle().await.expect("cycle");

    assert_eq!(report.count(ReconcileAction::NoOp), 1);
    assert!(instances.mutating_calls().is_empty());
    assert!(store.status_writes().is_empty());
    assert_eq!(store.resurrections("delta"), Some(4));
}

#[tokio::test]
async fn second_cycle_without_drift_is_quiet() {
    let (store, instances, rec) = setup(vec![
        record("a", None, None),
        record("b", Some("app:v1"), Some(5)),
        record("c", Some("app:v2"), None),
    ]);
    instances.seed("real-c", "app:v2");

    rec.run_cycle().await.expect("cycle 1");
    let writes_after_first = store.status_writes().len();
    instances.reset_calls();

    let second = rec.run_cycle().await.expect("cycle 2");
    assert_eq!(second.count(ReconcileAction::NoOp), 3);
    assert!(instances.mutating_calls().is_empty());
    assert_eq!(store.status_writes().len(), writes_after_first);
    assert_eq!(store.resurrections("a"), Some(0));
    assert_eq!(store.resurrections("b"), Some(6));
    assert_eq!(store.resurrections("c"), None);
}

#[tokio::test]
async fn transient_lookup_skips_only_that_record() {
    let (store, instances, rec) = setup(vec![record("flaky", None, Some(1)), record("steady", None, None)]);
    instances.fail_get("real-flaky", EtherealError::Transient("connection refused".into()));

    let report = rec.run_cycle().await.expect("cycle still succeeds");

    let flaky = report.outcome("flaky").expect("flaky outcome");
    assert_eq!(flaky.action, ReconcileAction::NoOp);
    assert_eq!(flaky.error.as_ref().map(|e| e.kind()), Some("transient"));
    assert!(instances.instance("real-flaky").is_none());
    assert_eq!(store.resurrections("flaky"), Some(1));
    assert!(!instances.mutating_calls().iter().any(|c| matches!(c, InstanceCall::Create { name, .. } if name == "real-flaky")));

    assert!(instances.instance("real-steady").is_some());
    assert_eq!(store.resurrections("steady"), Some(0));
    assert_eq!(report.failures().count(), 1);
}

#[tokio::test]
async fn listing_failure_is_a_cycle_error() {
    let (store, instances, rec) = setup(vec![record("a", None, None)]);
    store.fail_list(Some(EtherealError::Transient("apiserver down".into())));

    let err = rec.run_cycle().await.unwrap_err();
    assert_eq!(err.kind(), "transient");
    assert!(instances.calls().is_empty());
}

#[tokio::test]
async fn empty_scope_is_not_an_error() {
    let (_store, instances, rec) = setup(vec![]);
    let report = rec.run_cycle().await.expect("cycle");
    assert_eq!(report.records(), 0);
    assert!(instances.calls().is_empty());
}

#[tokio::test]
async fn failed_create_records_nothing() {
    let (store, instances, rec) = setup(vec![record("a", None, Some(3))]);
    instances.fail_create("real-a", EtherealError::Transient("quota".into()));

    let report = rec.run_cycle().await.expect("cycle");
    assert_eq!(report.outcome("a").and_then(|o| o.error.as_ref()).map(|e| e.kind()), Some("transient"));
    assert!(store.status_writes().is_empty());
    assert_eq!(store.resurrections("a"), Some(3));

    instances.clear_failures();
    rec.run_cycle().await.expect("retry cycle");
    assert_eq!(store.resurrections("a"), Some(4));
}

#[tokio::test]
async fn create_race_counts_as_success() {
    // Another actor creates the instance between our lookup and our create.
    struct RacingInstances(MockInstances);

    #[async_trait::async_trait]
    impl ethereal_core::InstanceController for RacingInstances {
        async fn get(&self, name: &str) -> ethereal_core::EtherealResult<Option<ethereal_core::ManagedInstance>> {
            let seen = self.0.get(name).await;
            self.0.seed(name, "sunday-app:latest");
            seen
        }
        async fn create(&self, name: &str, image: &str) -> ethereal_core::EtherealResult<ethereal_core::CreateOutcome> {
            self.0.create(name, image).await
        }
        async fn delete(&self, name: &str) -> ethereal_core::EtherealResult<ethereal_core::DeleteOutcome> {
            self.0.delete(name).await
        }
    }

    let store = Arc::new(MockStore::with_records([record("a", None, None)]));
    let rec = Reconciler::new(store.clone(), Arc::new(RacingInstances(MockInstances::new())), DEFAULT_IMAGE);

    let report = rec.run_cycle().await.expect("cycle");
    let o = report.outcome("a").expect("outcome");
    assert!(o.error.is_none());
    assert_eq!(store.resurrections("a"), Some(0));
}

#[tokio::test]
async fn status_conflict_is_not_retried_within_cycle() {
    let (store, instances, rec) = setup(vec![record("a", None, Some(1))]);
    store.fail_patch("a", EtherealError::Conflict("record changed".into()));

    let report = rec.run_cycle().await.expect("cycle");

    let o = report.outcome("a").expect("outcome");
    assert_eq!(o.error.as_ref().map(|e| e.kind()), Some("conflict"));
    assert!(instances.instance("real-a").is_some());
    assert_eq!(store.resurrections("a"), Some(1));
    assert_eq!(instances.mutating_calls().len(), 1);
}

#[tokio::test]
async fn failed_status_write_after_create_stays_uncounted() {
    let (store, instances, rec) = setup(vec![record("a", None, None)]);
    store.fail_patch("a", EtherealError::Conflict("record changed".into()));

    rec.run_cycle().await.expect("cycle 1");
    assert!(instances.instance("real-a").is_some());
    assert!(store.status_writes().is_empty());

    store.clear_patch_failures();
    instances.reset_calls();
    let report = rec.run_cycle().await.expect("cycle 2");
    assert_eq!(report.outcome("a").map(|o| o.action), Some(ReconcileAction::NoOp));
    assert!(instances.mutating_calls().is_empty());
    assert!(store.status_writes().is_empty());
    assert_eq!(store.resurrections("a"), None);
}

#[tokio::test]
async fn failed_delete_keeps_drifted_instance_until_retry() {
    let (store, instances, rec) = setup(vec![record("x", Some("v2"), Some(4))]);
    instances.seed("real-x", "v1");
    instances.fail_delete("real-x", EtherealError::Transient("apiserver timeout".into()));

    let report = rec.run_cycle().await.expect("cycle 1");
    let o = report.outcome("x").expect("outcome");
    assert_eq!(o.action, ReconcileAction::Recreate);
    assert_eq!(o.error.as_ref().map(|e| e.kind()), Some("transient"));
    assert_eq!(report.failures().count(), 1);
    assert_eq!(instances.instance("real-x").and_then(|i| i.image).as_deref(), Some("v1"));
    assert!(store.status_writes().is_empty());

    instances.clear_failures();
    rec.run_cycle().await.expect("cycle 2");
    assert!(instances.instance("real-x").is_none());
    assert_eq!(store.resurrections("x"), Some(4));

    rec.run_cycle().await.expect("cycle 3");
    assert_eq!(instances.instance("real-x").and_then(|i| i.image).as_deref(), Some("v2"));
    assert_eq!(store.resurrections("x"), Some(5));
}

#[tokio::test]
async fn removed_record_leaves_its_instance_alone() {
    let (store, instances, rec) = setup(vec![record("a", Some("v1"), None), record("b", Some("v1"), None)]);

    rec.run_cycle().await.expect("cycle 1");
    assert!(instances.instance("real-a").is_some());

    store.remove("a");
    instances.reset_calls();
    let report = rec.run_cycle().await.expect("cycle 2");
    assert_eq!(report.records(), 1);
    assert!(report.outcome("a").is_none());
    assert!(instances.mutating_calls().is_empty());
    assert!(!instances.calls().contains(&InstanceCall::Get("real-a".into())));
    assert!(instances.instance("real-a").is_some());
}

#[tokio::test]
async fn image_change_converges_with_single_increment() {
    let (store, instances, rec) = setup(vec![record("e", Some("v1"), None)]);

    rec.run_cycle().await.expect("cycle 1");
    assert_eq!(store.resurrections("e"), Some(0));

    store.set_image("e", Some("v2"));
    let r2 = rec.run_cycle().await.expect("cycle 2");
    assert_eq!(r2.outcome("e").map(|o| o.action), Some(ReconcileAction::Recreate));
    assert_eq!(store.resurrections("e"), Some(0));

    rec.run_cycle().await.expect("cycle 3");
    assert_eq!(instances.instance("real-e").and_then(|i| i.image).as_deref(), Some("v2"));
    assert_eq!(store.resurrections("e"), Some(1));

    instances.reset_calls();
    let r4 = rec.run_cycle().await.expect("cycle 4");
    assert_eq!(r4.count(ReconcileAction::NoOp), 1);
    assert!(instances.mutating_calls().is_empty());
}

#[tokio::test]
async fn report_serializes_for_json_output() {
    let (_store, _instances, rec) = setup(vec![record("alpha", None, None)]);
    let report = rec.run_cycle().await.expect("cycle");
    let v = serde_json::to_value(&report).expect("json");
    assert_eq!(v["outcomes"][0]["record"], "alpha");
    assert_eq!(v["outcomes"][0]["instance"], "real-alpha");
    assert_eq!(v["outcomes"][0]["action"], "create");
    assert_eq!(v["outcomes"][0]["resurrections"], 0);
}

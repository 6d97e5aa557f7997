mod common;

use chrono::{Duration, TimeZone, Utc};
use common::{payload, FakeRemote};
use outbox_engine::{conflict_record, field_diffs, ConflictDetector, Detection, RemoteApi};
use outbox_types::{EntityTarget, Mutation, RemoteSnapshot};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

fn at(secs: i64) -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

fn update_at(entity_id: &str, fields: serde_json::Value, queued_secs: i64) -> Mutation {
    let mut m = Mutation::update(EntityTarget::new("order", entity_id), payload(fields));
    m.queued_at = at(queued_secs);
    m
}

// ── Creates ──────────────────────────────────────────────────────

#[tokio::test]
async fn create_is_always_clean() {
    // No remote state at all; a create never even fetches.
    let remote = Arc::new(FakeRemote::new());
    let detector = ConflictDetector::new(remote);

    let m = Mutation::create(EntityTarget::unassigned("order"), payload(json!({"qty": 1})));
    assert_eq!(detector.detect(&m).await.unwrap(), Detection::Clean);
}

// ── Timestamp gate ───────────────────────────────────────────────

#[tokio::test]
async fn server_unchanged_since_edit_is_clean() {
    let remote = Arc::new(FakeRemote::new());
    remote.put_entity("42", json!({"qty": 5}), at(50));
    let detector = ConflictDetector::new(remote);

    let m = update_at("42", json!({"qty": 5}), 100);
    assert_eq!(detector.detect(&m).await.unwrap(), Detection::Clean);
}

#[tokio::test]
async fn equal_timestamps_are_clean() {
    let remote = Arc::new(FakeRemote::new());
    remote.put_entity("42", json!({"qty": 7}), at(100));
    let detector = ConflictDetector::new(remote);

    let m = update_at("42", json!({"qty": 5}), 100);
    assert_eq!(detector.detect(&m).await.unwrap(), Detection::Clean);
}

#[tokio::test]
async fn skew_tolerance_widens_the_gate() {
    let remote = Arc::new(FakeRemote::new());
    remote.put_entity("42", json!({"qty": 7}), at(104));
    let strict = ConflictDetector::new(Arc::clone(&remote) as Arc<dyn RemoteApi>);
    let tolerant = ConflictDetector::with_skew_tolerance(remote, Duration::seconds(5));

    let m = update_at("42", json!({"qty": 5}), 100);
    assert!(matches!(
        strict.detect(&m).await.unwrap(),
        Detection::Conflict(Some(_))
    ));
    assert_eq!(tolerant.detect(&m).await.unwrap(), Detection::Clean);
}

// ── Value gate ───────────────────────────────────────────────────

#[tokio::test]
async fn newer_server_write_with_matching_values_is_clean() {
    // The server changed after the local edit, but not in any field the
    // client touched: no false-positive conflict.
    let remote = Arc::new(FakeRemote::new());
    remote.put_entity("42", json!({"qty": 5, "note": "changed remotely"}), at(150));
    let detector = ConflictDetector::new(remote);

    let m = update_at("42", json!({"qty": 5}), 100);
    assert_eq!(detector.detect(&m).await.unwrap(), Detection::Clean);
}

#[tokio::test]
async fn diverged_field_is_a_conflict() {
    let remote = Arc::new(FakeRemote::new());
    remote.put_entity("42", json!({"qty": 7, "updatedAt": "whenever"}), at(150));
    let detector = ConflictDetector::new(remote);

    let m = update_at("42", json!({"qty": 5}), 100);
    match detector.detect(&m).await.unwrap() {
        Detection::Conflict(Some(snapshot)) => {
            assert_eq!(snapshot.updated_at, at(150));
        }
        other => panic!("expected conflict with snapshot, got {other:?}"),
    }
}

#[tokio::test]
async fn audit_fields_never_count_as_divergence() {
    let remote = Arc::new(FakeRemote::new());
    remote.put_entity(
        "42",
        json!({"qty": 5, "id": "server-42", "updatedAt": "x", "createdAt": "y"}),
        at(150),
    );
    let detector = ConflictDetector::new(remote);

    let m = update_at("42", json!({"qty": 5, "id": "local-42", "updatedAt": "z"}), 100);
    assert_eq!(detector.detect(&m).await.unwrap(), Detection::Clean);
}

// ── Remote deletion ──────────────────────────────────────────────

#[tokio::test]
async fn update_against_deleted_entity_conflicts_without_snapshot() {
    let remote = Arc::new(FakeRemote::new());
    let detector = ConflictDetector::new(remote);

    let m = update_at("42", json!({"qty": 5}), 100);
    assert_eq!(detector.detect(&m).await.unwrap(), Detection::Conflict(None));
}

#[tokio::test]
async fn delete_against_deleted_entity_is_clean() {
    let remote = Arc::new(FakeRemote::new());
    let detector = ConflictDetector::new(remote);

    let mut m = Mutation::delete(EntityTarget::new("order", "42"));
    m.queued_at = at(100);
    assert_eq!(detector.detect(&m).await.unwrap(), Detection::Clean);
}

#[tokio::test]
async fn delete_conflicts_with_newer_server_write() {
    let remote = Arc::new(FakeRemote::new());
    remote.put_entity("42", json!({"qty": 7}), at(150));
    let detector = ConflictDetector::new(remote);

    let mut m = Mutation::delete(EntityTarget::new("order", "42"));
    m.queued_at = at(100);
    assert!(matches!(
        detector.detect(&m).await.unwrap(),
        Detection::Conflict(Some(_))
    ));
}

// ── Diffs & records ──────────────────────────────────────────────

#[test]
fn field_diffs_reports_only_divergent_fields() {
    let m = update_at("42", json!({"qty": 5, "note": "rush"}), 100);
    let snapshot = RemoteSnapshot::new(payload(json!({"qty": 7, "note": "rush"})), at(150));

    let diffs = field_diffs(&m, &snapshot);
    assert_eq!(diffs.len(), 1);
    assert_eq!(diffs[0].field, "qty");
    assert_eq!(diffs[0].local, json!(5));
    assert_eq!(diffs[0].remote, json!(7));
    assert_eq!(diffs[0].local_modified_at, at(100));
    assert_eq!(diffs[0].remote_modified_at, Some(at(150)));
}

#[test]
fn field_missing_remotely_diffs_against_null() {
    let m = update_at("42", json!({"note": "rush"}), 100);
    let snapshot = RemoteSnapshot::new(payload(json!({"qty": 7})), at(150));

    let diffs = field_diffs(&m, &snapshot);
    assert_eq!(diffs.len(), 1);
    assert_eq!(diffs[0].remote, json!(null));
}

#[test]
fn conflict_record_mirrors_the_parked_mutation() {
    let mut m = update_at("42", json!({"qty": 5}), 100);
    m.park_conflicted(Some(RemoteSnapshot::new(payload(json!({"qty": 7})), at(150))));

    let record = conflict_record(&m);
    assert_eq!(record.id, m.id);
    assert!(!record.remote_deleted);
    assert_eq!(record.diffs.len(), 1);
}

#[test]
fn conflict_record_for_remote_deletion() {
    let mut m = update_at("42", json!({"qty": 5}), 100);
    m.park_conflicted(None);

    let record = conflict_record(&m);
    assert!(record.remote_deleted);
    assert_eq!(record.diffs.len(), 1);
    assert_eq!(record.diffs[0].remote, json!(null));
    assert_eq!(record.diffs[0].remote_modified_at, None);
}

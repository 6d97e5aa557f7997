mod common;

use chrono::{TimeZone, Utc};
use common::payload;
use outbox_engine::{resolve, Resolution};
use outbox_types::{EntityTarget, Mutation, MutationStatus, RemoteSnapshot, ResolutionStrategy};
use pretty_assertions::assert_eq;
use serde_json::json;

fn conflicted(fields: serde_json::Value, remote: serde_json::Value) -> Mutation {
    let mut m = Mutation::update(EntityTarget::new("order", "42"), payload(fields));
    m.queued_at = Utc.timestamp_opt(100, 0).unwrap();
    m.fail("first try");
    m.park_conflicted(Some(RemoteSnapshot::new(
        payload(remote),
        Utc.timestamp_opt(150, 0).unwrap(),
    )));
    m
}

#[test]
fn keep_local_reenters_pending_with_payload_unchanged() {
    let m = conflicted(json!({"qty": 5}), json!({"qty": 7}));
    let snapshot = m.remote_snapshot.clone();

    match resolve(&m, snapshot.as_ref(), ResolutionStrategy::KeepLocal) {
        Resolution::Reapply(resolved) => {
            assert_eq!(resolved.payload, payload(json!({"qty": 5})));
            assert_eq!(resolved.status, MutationStatus::Pending);
            assert_eq!(resolved.attempts, 0);
            assert!(resolved.remote_snapshot.is_none());
            // Origin timestamp refreshed: the resolution is a new decision.
            assert!(resolved.queued_at > m.queued_at);
        }
        other => panic!("expected reapply, got {other:?}"),
    }
}

#[test]
fn keep_server_settles_without_reapply() {
    let m = conflicted(json!({"qty": 5}), json!({"qty": 7}));
    let snapshot = m.remote_snapshot.clone();

    assert_eq!(
        resolve(&m, snapshot.as_ref(), ResolutionStrategy::KeepServer),
        Resolution::Settle
    );
}

#[test]
fn merge_overlays_payload_onto_snapshot() {
    let m = conflicted(
        json!({"qty": 5}),
        json!({"qty": 7, "note": "remote note", "updatedAt": "x"}),
    );
    let snapshot = m.remote_snapshot.clone();

    match resolve(&m, snapshot.as_ref(), ResolutionStrategy::Merge) {
        Resolution::Reapply(resolved) => {
            // Fields the client set win; everything else keeps server values.
            assert_eq!(resolved.payload.get("qty"), Some(&json!(5)));
            assert_eq!(resolved.payload.get("note"), Some(&json!("remote note")));
            assert_eq!(resolved.payload.get("updatedAt"), Some(&json!("x")));
            assert_eq!(resolved.status, MutationStatus::Pending);
        }
        other => panic!("expected reapply, got {other:?}"),
    }
}

#[test]
fn merge_without_snapshot_degenerates_to_keep_local() {
    let mut m = Mutation::update(
        EntityTarget::new("order", "42"),
        payload(json!({"qty": 5})),
    );
    m.park_conflicted(None);

    match resolve(&m, None, ResolutionStrategy::Merge) {
        Resolution::Reapply(resolved) => {
            assert_eq!(resolved.payload, payload(json!({"qty": 5})));
        }
        other => panic!("expected reapply, got {other:?}"),
    }
}

#[test]
fn manual_defers() {
    let m = conflicted(json!({"qty": 5}), json!({"qty": 7}));
    let snapshot = m.remote_snapshot.clone();

    assert_eq!(
        resolve(&m, snapshot.as_ref(), ResolutionStrategy::Manual),
        Resolution::Defer
    );
}

use chrono::Utc;
use outbox_types::{ConflictRecord, EntityTarget, FieldDiff, MutationId, ResolutionStrategy};
use pretty_assertions::assert_eq;
use serde_json::json;

fn diff(field: &str) -> FieldDiff {
    FieldDiff {
        field: field.to_string(),
        local: json!(5),
        remote: json!(7),
        local_modified_at: Utc::now(),
        remote_modified_at: Some(Utc::now()),
    }
}

// ── ResolutionStrategy ───────────────────────────────────────────

#[test]
fn strategy_round_trips_through_strings() {
    for strategy in [
        ResolutionStrategy::KeepLocal,
        ResolutionStrategy::KeepServer,
        ResolutionStrategy::Merge,
        ResolutionStrategy::Manual,
    ] {
        let parsed: ResolutionStrategy = strategy.as_str().parse().unwrap();
        assert_eq!(parsed, strategy);
    }
    assert!("newest-wins".parse::<ResolutionStrategy>().is_err());
}

#[test]
fn strategy_serde_uses_kebab_case() {
    let json = serde_json::to_string(&ResolutionStrategy::KeepServer).unwrap();
    assert_eq!(json, r#""keep-server""#);
}

// ── ConflictRecord ───────────────────────────────────────────────

#[test]
fn new_record_is_unresolved() {
    let record = ConflictRecord::new(
        MutationId::new(),
        EntityTarget::new("order", "42"),
        vec![diff("qty")],
    );

    assert!(!record.resolved);
    assert!(!record.remote_deleted);
    assert!(record.strategy.is_none());
    assert_eq!(record.diffs.len(), 1);
}

#[test]
fn resolve_records_the_chosen_strategy() {
    let mut record = ConflictRecord::new(
        MutationId::new(),
        EntityTarget::new("order", "42"),
        vec![diff("qty")],
    );

    record.resolve(ResolutionStrategy::KeepLocal);
    assert!(record.resolved);
    assert_eq!(record.strategy, Some(ResolutionStrategy::KeepLocal));
}

#[test]
fn with_remote_deleted_flags_the_record() {
    let record = ConflictRecord::new(
        MutationId::new(),
        EntityTarget::new("order", "42"),
        Vec::new(),
    )
    .with_remote_deleted();

    assert!(record.remote_deleted);
}

#[test]
fn record_serde_round_trip() {
    let record = ConflictRecord::new(
        MutationId::new(),
        EntityTarget::new("order", "42"),
        vec![diff("qty"), diff("note")],
    );

    let json = serde_json::to_string(&record).unwrap();
    let back: ConflictRecord = serde_json::from_str(&json).unwrap();
    assert_eq!(back, record);
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Plan reconciliation against the in-memory platform.

use plan_sync::error::AppError;
use plan_sync::models::{Plan, PlanId, PlanState, PlanVersion, Volume, WorkoutType};
use plan_sync::services::{
    FailureKind, FailureMode, GatewayCall, InMemoryGateway, PlanSynchronizer, SyncOp,
};
use std::sync::Arc;
use std::time::Duration;

mod common;
use common::{date, three_workouts, workout};

fn setup() -> (PlanSynchronizer, Arc<InMemoryGateway>) {
    let gateway = Arc::new(InMemoryGateway::new());
    (PlanSynchronizer::new(gateway.clone()), gateway)
}

fn version(v: u32) -> PlanVersion {
    PlanVersion::new(v).unwrap()
}

/// Publish v1 of a three-workout plan and clear the call log.
async fn published_v1(sync: &PlanSynchronizer, gateway: &InMemoryGateway) -> Plan {
    let plan = Plan::from_generation(three_workouts()).unwrap();
    let report = sync.reconcile(&plan).await.unwrap();
    assert!(report.is_complete_success());
    gateway.reset_calls();
    plan
}

#[tokio::test]
async fn test_fresh_publish_creates_every_workout() {
    let (sync, gateway) = setup();
    let plan = Plan::from_generation(three_workouts()).unwrap();

    let report = sync.reconcile(&plan).await.unwrap();

    let counts = gateway.call_counts();
    assert_eq!(counts.creates, 3);
    assert_eq!(counts.updates, 0);
    assert_eq!(counts.deletes, 0);
    assert_eq!(report.created.len(), 3);
    assert_eq!(
        report.state,
        PlanState::Published {
            version: PlanVersion::INITIAL
        }
    );

    let workouts = gateway.workouts();
    assert_eq!(workouts.len(), 3);
    assert!(workouts
        .iter()
        .all(|w| w.is_owned_by(plan.plan_id()) && w.plan_version() == Some(PlanVersion::INITIAL)));
}

#[tokio::test]
async fn test_created_workouts_are_scheduled_on_their_date() {
    let (sync, gateway) = setup();
    let plan = Plan::from_generation(three_workouts()).unwrap();
    sync.reconcile(&plan).await.unwrap();

    for remote in gateway.workouts() {
        let key = remote.key().unwrap();
        assert_eq!(gateway.scheduled_date(&remote.remote_id), Some(key.scheduled_date));
    }
}

#[tokio::test]
async fn test_content_only_change_issues_single_update() {
    let (sync, gateway) = setup();
    let v1 = published_v1(&sync, &gateway).await;

    let mut workouts = three_workouts();
    workouts[1].volume = Volume::Duration { seconds: 50 * 60 };
    let changed_key = workouts[1].key();
    let v2 = Plan::derive_modification(&v1, workouts).unwrap();

    let report = sync.reconcile(&v2).await.unwrap();

    let counts = gateway.call_counts();
    assert_eq!(counts.updates, 1);
    assert_eq!(counts.creates, 0);
    assert_eq!(counts.deletes, 0);
    assert_eq!(report.updated, vec![changed_key]);
    assert_eq!(report.unchanged.len(), 2);
    assert_eq!(report.state, PlanState::Published { version: version(2) });

    let updated = gateway
        .workouts()
        .into_iter()
        .find(|w| w.key() == Some(changed_key))
        .unwrap();
    assert_eq!(updated.plan_version(), Some(version(2)));
    assert!(updated.matches_content(&v2.workouts()[1]));
}

#[tokio::test]
async fn test_shrink_plan_deletes_only_dropped_workout() {
    let (sync, gateway) = setup();
    let v1 = published_v1(&sync, &gateway).await;
    let before = gateway.workouts();

    let mut workouts = three_workouts();
    let dropped = workouts.remove(2).key();
    let v2 = Plan::derive_modification(&v1, workouts).unwrap();

    let report = sync.reconcile(&v2).await.unwrap();

    let counts = gateway.call_counts();
    assert_eq!(counts.deletes, 1);
    assert_eq!(counts.creates + counts.updates, 0);
    assert_eq!(report.deleted, vec![dropped]);

    let after = gateway.workouts();
    assert_eq!(after.len(), 2);
    for remote in &after {
        assert!(before.contains(remote), "untouched workouts keep their content");
    }

    // The survivors still carry v1, yet the plan reads as v2.
    assert_eq!(
        sync.plan_state(v2.plan_id(), Some(version(2))).await.unwrap(),
        PlanState::Published { version: version(2) }
    );
}

#[tokio::test]
async fn test_unchanged_new_version_reads_back_as_published() {
    let (sync, gateway) = setup();
    let v1 = published_v1(&sync, &gateway).await;
    let v2 = Plan::derive_modification(&v1, three_workouts()).unwrap();

    let report = sync.reconcile(&v2).await.unwrap();

    assert_eq!(report.writes(), 0);
    assert_eq!(report.unchanged.len(), 3);
    assert_eq!(report.state, PlanState::Published { version: version(2) });
    assert_eq!(
        sync.plan_state(v2.plan_id(), Some(version(2))).await.unwrap(),
        report.state
    );
    assert_eq!(sync.plan_state(v2.plan_id(), None).await.unwrap(), report.state);
}

#[tokio::test]
async fn test_modification_based_on_published_version_is_applied() {
    let (sync, gateway) = setup();
    let v1 = published_v1(&sync, &gateway).await;
    let mut workouts = three_workouts();
    workouts[0].volume = Volume::Duration { seconds: 35 * 60 };
    let v2 = Plan::derive_modification(&v1, workouts).unwrap();

    let report = sync
        .reconcile_modification(v1.version(), &v2)
        .await
        .unwrap();

    assert!(report.is_complete_success());
    assert_eq!(report.updated.len(), 1);
    assert_eq!(report.state, PlanState::Published { version: version(2) });
}

#[tokio::test]
async fn test_modification_from_superseded_version_is_rejected() {
    let (sync, gateway) = setup();
    let v1 = published_v1(&sync, &gateway).await;

    let mut first = three_workouts();
    first[0].volume = Volume::Duration { seconds: 35 * 60 };
    let first = Plan::derive_modification(&v1, first).unwrap();
    sync.reconcile_modification(v1.version(), &first)
        .await
        .unwrap();
    gateway.reset_calls();

    // A second editor also started from v1.
    let mut second = three_workouts();
    second[1].volume = Volume::Duration { seconds: 55 * 60 };
    let second = Plan::derive_modification(&v1, second).unwrap();
    let result = sync.reconcile_modification(v1.version(), &second).await;

    assert!(matches!(result, Err(AppError::PlanIntegrity(_))));
    assert_eq!(gateway.call_counts().writes(), 0);
    assert_eq!(
        sync.plan_state(v1.plan_id(), None).await.unwrap(),
        PlanState::Published { version: version(2) }
    );
}

#[tokio::test]
async fn test_modification_of_unpublished_plan_is_rejected() {
    let (sync, gateway) = setup();
    let v1 = Plan::from_generation(three_workouts()).unwrap();
    let v2 = Plan::derive_modification(&v1, three_workouts()).unwrap();

    let result = sync.reconcile_modification(v1.version(), &v2).await;

    assert!(matches!(result, Err(AppError::PlanIntegrity(_))));
    assert_eq!(gateway.call_counts().writes(), 0);
}

#[tokio::test]
async fn test_mixed_ownership_never_touches_user_workout() {
    let (sync, gateway) = setup();
    let user_id = gateway.insert_user_workout("Track with club", "6x800m", date("2026-10-20"));

    let v1 = Plan::from_generation(vec![
        workout("2026-10-20", WorkoutType::Easy, 40),
        workout("2026-10-20", WorkoutType::Recovery, 20),
        workout("2026-10-22", WorkoutType::Tempo, 45),
    ])
    .unwrap();
    sync.reconcile(&v1).await.unwrap();
    gateway.reset_calls();

    // v2 drops 2026-10-20 entirely.
    let v2 =
        Plan::derive_modification(&v1, vec![workout("2026-10-22", WorkoutType::Tempo, 45)]).unwrap();
    let report = sync.reconcile(&v2).await.unwrap();

    assert_eq!(gateway.call_counts().deletes, 2);
    assert_eq!(report.deleted.len(), 2);
    assert!(gateway.get(&user_id).is_some());
    assert!(gateway.calls().iter().all(|call| match call {
        GatewayCall::Update(id) | GatewayCall::Delete(id) => id != &user_id,
        _ => true,
    }));
}

#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let (sync, gateway) = setup();
    let v1 = published_v1(&sync, &gateway).await;

    let report = sync.reconcile(&v1).await.unwrap();

    assert_eq!(gateway.call_counts().writes(), 0);
    assert_eq!(report.unchanged.len(), 3);
    assert_eq!(report.writes(), 0);
    assert!(report.is_complete_success());
}

#[tokio::test]
async fn test_duplicate_key_fails_fast_without_remote_calls() {
    let (sync, gateway) = setup();
    let plan = Plan::from_parts(
        PlanId::new(),
        PlanVersion::INITIAL,
        vec![
            workout("2026-10-20", WorkoutType::Tempo, 40),
            workout("2026-10-20", WorkoutType::Tempo, 30),
        ],
    );

    let result = sync.reconcile(&plan).await;

    assert!(matches!(result, Err(AppError::PlanIntegrity(_))));
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn test_every_written_entry_carries_target_version() {
    let (sync, gateway) = setup();
    let v1 = published_v1(&sync, &gateway).await;

    let workouts = three_workouts()
        .into_iter()
        .map(|mut w| {
            w.description.push_str(" (revised)");
            w
        })
        .chain([workout("2026-10-24", WorkoutType::Recovery, 25)])
        .collect();
    let v2 = Plan::derive_modification(&v1, workouts).unwrap();
    let report = sync.reconcile(&v2).await.unwrap();

    assert!(report.is_complete_success());
    let owned = gateway.workouts();
    assert_eq!(owned.len(), 4);
    assert!(owned.iter().all(|w| w.plan_version() == Some(version(2))));
}

#[tokio::test]
async fn test_partial_failure_reports_failed_key_and_retry_fills_gap() {
    let (sync, gateway) = setup();
    let plan = Plan::from_generation(three_workouts()).unwrap();
    let failing = plan.workouts()[1].key();
    gateway.fail_next(SyncOp::Create, failing, FailureMode::NotApplied);

    let report = sync.reconcile(&plan).await.unwrap();

    assert!(report.is_partial_failure());
    assert_eq!(report.created.len(), 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].key, failing);
    assert_eq!(report.failures[0].op, SyncOp::Create);
    assert_eq!(report.failures[0].kind, FailureKind::NotApplied);
    // The logical version does not advance.
    assert_eq!(report.state, PlanState::Absent);
    assert!(matches!(
        report.clone().into_result(),
        Err(AppError::PartialReconciliation { failed: 1, total: 3 })
    ));

    gateway.reset_calls();
    let retry = sync.reconcile(&plan).await.unwrap();

    assert!(retry.is_complete_success());
    assert_eq!(retry.created, vec![failing]);
    assert_eq!(gateway.call_counts().creates, 1);
    assert_eq!(gateway.workouts().len(), 3);
}

#[tokio::test]
async fn test_ambiguous_create_that_landed_is_resolved_without_duplicate() {
    let (sync, gateway) = setup();
    let plan = Plan::from_generation(three_workouts()).unwrap();
    let key = plan.workouts()[0].key();
    gateway.fail_next(SyncOp::Create, key, FailureMode::AmbiguousButApplied);

    let report = sync.reconcile(&plan).await.unwrap();

    assert!(report.is_complete_success());
    assert!(report.created.contains(&key));
    assert_eq!(gateway.call_counts().creates, 3);
    // One listing to plan, one to settle the ambiguous create.
    assert_eq!(gateway.call_counts().lists, 2);
    assert_eq!(gateway.workouts().len(), 3);
}

#[tokio::test]
async fn test_ambiguous_create_that_did_not_land_is_never_blindly_retried() {
    let (sync, gateway) = setup();
    let plan = Plan::from_generation(three_workouts()).unwrap();
    let key = plan.workouts()[2].key();
    gateway.fail_next(SyncOp::Create, key, FailureMode::Ambiguous);

    let report = sync.reconcile(&plan).await.unwrap();

    assert_eq!(gateway.call_counts().creates, 3);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].kind, FailureKind::NotApplied);
    assert_eq!(gateway.workouts().len(), 2);

    gateway.reset_calls();
    let retry = sync.reconcile(&plan).await.unwrap();
    assert!(retry.is_complete_success());
    assert_eq!(gateway.call_counts().creates, 1);
    assert_eq!(gateway.workouts().len(), 3);
}

#[tokio::test]
async fn test_interrupted_run_leftovers_are_cleaned_up_after_keeper_update() {
    let (sync, gateway) = setup();
    let plan_id = PlanId::new();
    let easy_v1 = workout("2026-10-20", WorkoutType::Easy, 40);
    let easy_v2 = workout("2026-10-20", WorkoutType::Easy, 45);
    let tempo_v1 = workout("2026-10-22", WorkoutType::Tempo, 45);

    // A prior run crashed after creating v2 of one key but before cleanup.
    let stale = gateway.insert_owned(&easy_v1, plan_id, version(1));
    let keeper = gateway.insert_owned(&easy_v2, plan_id, version(2));
    let orphan = gateway.insert_owned(&tempo_v1, plan_id, version(1));

    let target = Plan::from_parts(
        plan_id,
        version(3),
        vec![workout("2026-10-20", WorkoutType::Easy, 50)],
    );
    let report = sync.reconcile(&target).await.unwrap();

    assert!(report.is_complete_success());
    assert_eq!(report.updated.len(), 1);
    assert_eq!(report.deleted.len(), 2);

    let calls = gateway.calls();
    let update_at = calls
        .iter()
        .position(|c| c == &GatewayCall::Update(keeper.clone()))
        .expect("keeper updated");
    let delete_at = calls
        .iter()
        .position(|c| c == &GatewayCall::Delete(stale.clone()))
        .expect("superseded entry deleted");
    assert!(update_at < delete_at);
    assert!(calls.contains(&GatewayCall::Delete(orphan)));

    let remaining = gateway.workouts();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].remote_id, keeper);
    assert_eq!(remaining[0].plan_version(), Some(version(3)));
}

#[tokio::test]
async fn test_superseded_entry_survives_failed_update() {
    let (sync, gateway) = setup();
    let plan_id = PlanId::new();
    let old = workout("2026-10-20", WorkoutType::Easy, 40);
    let stale = gateway.insert_owned(&old, plan_id, version(1));
    let keeper = gateway.insert_owned(&old, plan_id, version(2));

    let changed = workout("2026-10-20", WorkoutType::Easy, 60);
    gateway.fail_next(SyncOp::Update, changed.key(), FailureMode::NotApplied);
    let target = Plan::from_parts(plan_id, version(3), vec![changed]);

    let report = sync.reconcile(&target).await.unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].op, SyncOp::Update);
    assert_eq!(gateway.call_counts().deletes, 0);
    assert!(gateway.get(&stale).is_some());
    assert!(gateway.get(&keeper).is_some());
    assert_eq!(
        report.state,
        PlanState::Stale {
            current: version(2),
            desired: version(3)
        }
    );
}

#[tokio::test]
async fn test_failed_orphan_delete_is_reported() {
    let (sync, gateway) = setup();
    let v1 = published_v1(&sync, &gateway).await;

    let mut workouts = three_workouts();
    let dropped = workouts.remove(0).key();
    gateway.fail_next(SyncOp::Delete, dropped, FailureMode::NotApplied);
    let v2 = Plan::derive_modification(&v1, workouts).unwrap();

    let report = sync.reconcile(&v2).await.unwrap();

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].op, SyncOp::Delete);
    assert!(report.failures[0].remote_id.is_some());
    assert_eq!(gateway.workouts().len(), 3);
}

#[tokio::test]
async fn test_older_target_version_is_rejected() {
    let (sync, gateway) = setup();
    let v1 = published_v1(&sync, &gateway).await;
    let mut workouts = three_workouts();
    workouts[0].description = "changed".to_string();
    let v2 = Plan::derive_modification(&v1, workouts).unwrap();
    sync.reconcile(&v2).await.unwrap();
    gateway.reset_calls();

    let result = sync.reconcile(&v1).await;

    assert!(matches!(result, Err(AppError::PlanIntegrity(_))));
    assert_eq!(gateway.call_counts().writes(), 0);
}

#[tokio::test]
async fn test_list_failure_is_upstream_unavailable() {
    let (sync, gateway) = setup();
    gateway.fail_lists(1);
    let plan = Plan::from_generation(three_workouts()).unwrap();

    let result = sync.reconcile(&plan).await;

    match result {
        Err(err) => {
            assert!(matches!(err, AppError::UpstreamUnavailable(_)));
            assert!(err.is_retryable());
        }
        Ok(_) => panic!("expected listing failure"),
    }
    assert_eq!(gateway.call_counts().writes(), 0);
}

#[tokio::test]
async fn test_plan_state_transitions() {
    let (sync, gateway) = setup();
    let plan = Plan::from_generation(three_workouts()).unwrap();
    let plan_id = plan.plan_id();

    assert_eq!(sync.plan_state(plan_id, None).await.unwrap(), PlanState::Absent);

    sync.reconcile(&plan).await.unwrap();
    assert_eq!(
        sync.plan_state(plan_id, None).await.unwrap(),
        PlanState::Published {
            version: PlanVersion::INITIAL
        }
    );
    assert_eq!(
        sync.plan_state(plan_id, Some(version(2))).await.unwrap(),
        PlanState::Stale {
            current: PlanVersion::INITIAL,
            desired: version(2)
        }
    );

    sync.delete_plan(plan_id).await.unwrap();
    assert_eq!(sync.plan_state(plan_id, None).await.unwrap(), PlanState::Absent);
    assert!(gateway.workouts().is_empty());
}

#[tokio::test]
async fn test_delete_plan_removes_all_versions_and_spares_user_workouts() {
    let (sync, gateway) = setup();
    let plan_id = PlanId::new();
    let user_id = gateway.insert_user_workout("Parkrun", "", date("2026-10-24"));
    let other_plan = gateway.insert_owned(
        &workout("2026-10-20", WorkoutType::Easy, 30),
        PlanId::new(),
        version(1),
    );
    gateway.insert_owned(&workout("2026-10-20", WorkoutType::Easy, 40), plan_id, version(1));
    gateway.insert_owned(&workout("2026-10-20", WorkoutType::Easy, 45), plan_id, version(2));
    gateway.insert_owned(&workout("2026-10-22", WorkoutType::Tempo, 45), plan_id, version(2));

    let report = sync.delete_plan(plan_id).await.unwrap();

    assert!(report.is_complete_success());
    assert_eq!(report.deleted.len(), 3);
    assert_eq!(report.versions, vec![version(1), version(2)]);
    assert_eq!(report.state, PlanState::Absent);
    assert_eq!(gateway.call_counts().deletes, 3);

    let remaining: Vec<_> = gateway.workouts().into_iter().map(|w| w.remote_id).collect();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.contains(&user_id));
    assert!(remaining.contains(&other_plan));
}

#[tokio::test]
async fn test_failed_plan_delete_names_the_surviving_workout() {
    let (sync, gateway) = setup();
    let plan = published_v1(&sync, &gateway).await;
    let stuck = plan.workouts()[1].key();
    gateway.fail_next(SyncOp::Delete, stuck, FailureMode::NotApplied);

    let report = sync.delete_plan(plan.plan_id()).await.unwrap();

    assert!(!report.is_complete_success());
    assert_eq!(gateway.call_counts().deletes, 3);
    assert_eq!(report.deleted.len(), 2);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].key, Some(stuck));
    assert_eq!(report.failures[0].kind, FailureKind::NotApplied);

    let remaining = gateway.workouts();
    assert_eq!(remaining.len(), 1);
    assert_eq!(report.failures[0].remote_id, remaining[0].remote_id);
    assert_eq!(
        report.state,
        PlanState::Published {
            version: PlanVersion::INITIAL
        }
    );
}

#[tokio::test]
async fn test_delete_of_absent_plan_is_integrity_error() {
    let (sync, gateway) = setup();
    gateway.insert_user_workout("Long run with friends", "", date("2026-10-25"));

    let result = sync.delete_plan(PlanId::new()).await;

    assert!(matches!(result, Err(AppError::PlanIntegrity(_))));
    assert_eq!(gateway.call_counts().deletes, 0);
}

#[tokio::test]
async fn test_concurrent_reconciles_of_same_plan_do_not_double_create() {
    // Every platform call yields, so unserialized passes would interleave.
    let gateway = Arc::new(InMemoryGateway::new().with_latency(Duration::from_millis(10)));
    let sync = PlanSynchronizer::new(gateway.clone());
    let plan = Plan::from_generation(three_workouts()).unwrap();

    let (a, b) = tokio::join!(sync.reconcile(&plan), sync.reconcile(&plan));

    assert!(a.unwrap().is_complete_success());
    assert!(b.unwrap().is_complete_success());
    assert_eq!(gateway.call_counts().creates, 3);
    assert_eq!(gateway.workouts().len(), 3);
}

#[tokio::test]
async fn test_different_plans_reconcile_independently() {
    let (sync, gateway) = setup();
    let a = Plan::from_generation(three_workouts()).unwrap();
    let b = Plan::from_generation(three_workouts()).unwrap();

    let (ra, rb) = tokio::join!(sync.reconcile(&a), sync.reconcile(&b));

    assert_eq!(ra.unwrap().created.len(), 3);
    assert_eq!(rb.unwrap().created.len(), 3);
    // Same dates and types, different owners: both sets exist side by side.
    assert_eq!(gateway.workouts().len(), 6);
}

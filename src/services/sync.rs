// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Plan synchronization.
//!
//! Reconciles a target [`Plan`] against the workouts the remote platform
//! holds for its `plan_id`:
//! 1. List owned workouts and group them by key
//! 2. Per target key: no-op, create or update, then delete superseded entries
//! 3. Delete owned entries whose key left the plan
//! 4. Re-list once to resolve ambiguous writes
//!
//! Unowned workouts are never listed here, so they are never updated or
//! deleted. Per-key failures are collected into the report instead of
//! aborting the batch.

use crate::error::AppError;
use crate::models::remote::highest_version;
use crate::models::{
    Plan, PlanId, PlanState, PlanVersion, RemoteId, RemoteWorkout, WorkoutKey, WorkoutSpec,
};
use crate::services::gateway::{GatewayError, WorkoutGateway, WriteOutcome};
use dashmap::DashMap;
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Default number of remote writes in flight during one reconciliation.
const MAX_CONCURRENT_WRITES: usize = 8;

/// Shared per-plan locks. Reconciliations of one plan run one at a time;
/// different plans do not block each other.
pub type PlanLocks = Arc<DashMap<PlanId, Arc<Mutex<()>>>>;

/// Last confirmed version per plan. `None` records a plan whose first
/// publication has not completed.
type PublishedVersions = Arc<DashMap<PlanId, Option<PlanVersion>>>;

/// Exclusive use of one plan. Dropping it releases the lock and forgets the
/// plan's lock entry when nobody else is waiting on it.
struct PlanGuard {
    plan_id: PlanId,
    locks: PlanLocks,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PlanGuard {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.plan_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

/// Remote write kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOp {
    Create,
    Update,
    Delete,
}

impl fmt::Display for SyncOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncOp::Create => "create",
            SyncOp::Update => "update",
            SyncOp::Delete => "delete",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Nothing changed remotely; safe to retry.
    NotApplied,
    /// May have changed remotely; reconcile again rather than retrying the write.
    Ambiguous,
}

/// One failed remote write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyFailure {
    pub key: WorkoutKey,
    pub op: SyncOp,
    pub kind: FailureKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<RemoteId>,
    pub message: String,
}

impl KeyFailure {
    fn new(
        key: WorkoutKey,
        op: SyncOp,
        kind: FailureKind,
        remote_id: Option<RemoteId>,
        err: &GatewayError,
    ) -> Self {
        Self {
            key,
            op,
            kind,
            remote_id,
            message: err.to_string(),
        }
    }
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub plan_id: PlanId,
    pub target_version: PlanVersion,
    pub created: Vec<WorkoutKey>,
    pub updated: Vec<WorkoutKey>,
    /// One entry per deleted remote workout (superseded or removed from the plan).
    pub deleted: Vec<WorkoutKey>,
    pub unchanged: Vec<WorkoutKey>,
    pub failures: Vec<KeyFailure>,
    pub state: PlanState,
}

impl ReconciliationReport {
    /// Returns true if every write succeeded.
    pub fn is_complete_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// Returns true if some writes succeeded and some failed.
    pub fn is_partial_failure(&self) -> bool {
        !self.failures.is_empty() && self.writes() > self.failures.len()
    }

    /// Remote writes attempted, including failures.
    pub fn writes(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len() + self.failures.len()
    }

    /// Keys with at least one failed write, for a targeted retry.
    pub fn failed_keys(&self) -> BTreeSet<WorkoutKey> {
        self.failures.iter().map(|f| f.key).collect()
    }

    pub fn has_ambiguous(&self) -> bool {
        self.failures.iter().any(|f| f.kind == FailureKind::Ambiguous)
    }

    /// Convert to an error if any write failed.
    pub fn into_result(self) -> Result<Self, AppError> {
        if self.is_complete_success() {
            Ok(self)
        } else {
            Err(AppError::PartialReconciliation {
                failed: self.failures.len(),
                total: self.writes(),
            })
        }
    }
}

/// One remote workout a plan deletion could not remove.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteFailure {
    pub remote_id: RemoteId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<WorkoutKey>,
    pub kind: FailureKind,
    pub message: String,
}

/// Outcome of deleting a whole plan.
#[derive(Debug, Clone, Serialize)]
pub struct DeletionReport {
    pub plan_id: PlanId,
    pub deleted: Vec<RemoteId>,
    /// Distinct versions found among the plan's remote workouts.
    pub versions: Vec<PlanVersion>,
    pub failures: Vec<DeleteFailure>,
    pub state: PlanState,
}

impl DeletionReport {
    pub fn is_complete_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Running totals while applying writes.
#[derive(Debug, Default)]
struct Tally {
    created: Vec<WorkoutKey>,
    updated: Vec<WorkoutKey>,
    deleted: Vec<WorkoutKey>,
    unchanged: Vec<WorkoutKey>,
    failures: Vec<KeyFailure>,
}

impl Tally {
    fn merge(&mut self, other: Tally) {
        self.created.extend(other.created);
        self.updated.extend(other.updated);
        self.deleted.extend(other.deleted);
        self.unchanged.extend(other.unchanged);
        self.failures.extend(other.failures);
    }

    fn record(&mut self, op: SyncOp, key: WorkoutKey) {
        match op {
            SyncOp::Create => self.created.push(key),
            SyncOp::Update => self.updated.push(key),
            SyncOp::Delete => self.deleted.push(key),
        }
    }

    /// Record a failed outcome; an applied value passes through.
    fn settle<T>(
        &mut self,
        key: WorkoutKey,
        op: SyncOp,
        remote_id: Option<&RemoteId>,
        outcome: WriteOutcome<T>,
    ) -> Option<T> {
        let (kind, err) = match outcome {
            WriteOutcome::Applied(v) => return Some(v),
            WriteOutcome::NotApplied(e) => (FailureKind::NotApplied, e),
            WriteOutcome::Ambiguous(e) => (FailureKind::Ambiguous, e),
        };
        tracing::warn!(
            key = %key,
            op = %op,
            remote_id = remote_id.map(|id| id.as_str()),
            kind = ?kind,
            error = %err,
            "Remote write failed"
        );
        self.failures
            .push(KeyFailure::new(key, op, kind, remote_id.cloned(), &err));
        None
    }
}

/// Owned workouts grouped by key, highest version first within each key.
fn group_by_key(owned: Vec<RemoteWorkout>) -> BTreeMap<WorkoutKey, Vec<RemoteWorkout>> {
    let mut groups: BTreeMap<WorkoutKey, Vec<RemoteWorkout>> = BTreeMap::new();
    for workout in owned {
        if let Some(key) = workout.key() {
            groups.entry(key).or_default().push(workout);
        }
    }
    for entries in groups.values_mut() {
        entries.sort_by(|a, b| {
            b.plan_version()
                .cmp(&a.plan_version())
                .then_with(|| a.remote_id.cmp(&b.remote_id))
        });
    }
    groups
}

/// Computes and applies the diff between a target plan and the remote platform.
#[derive(Clone)]
pub struct PlanSynchronizer {
    gateway: Arc<dyn WorkoutGateway>,
    locks: PlanLocks,
    published: PublishedVersions,
    max_concurrency: usize,
}

impl PlanSynchronizer {
    pub fn new(gateway: Arc<dyn WorkoutGateway>) -> Self {
        Self {
            gateway,
            locks: Arc::new(DashMap::new()),
            published: Arc::new(DashMap::new()),
            max_concurrency: MAX_CONCURRENT_WRITES,
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Wait for exclusive use of `plan_id`.
    async fn lock_plan(&self, plan_id: PlanId) -> PlanGuard {
        let lock = Arc::clone(&self.locks.entry(plan_id).or_default());
        let guard = lock.lock_owned().await;
        PlanGuard {
            plan_id,
            locks: Arc::clone(&self.locks),
            guard: Some(guard),
        }
    }

    /// Owned workouts for `plan_id`, re-checked client-side.
    async fn list_owned(&self, plan_id: PlanId) -> Result<Vec<RemoteWorkout>, GatewayError> {
        let mut owned = self.gateway.list_owned_workouts(plan_id).await?;
        owned.retain(|w| w.is_owned_by(plan_id));
        Ok(owned)
    }

    /// Confirmed version of `plan_id` given its owned workouts.
    ///
    /// Unchanged workouts keep their older stamp, so the outcome recorded
    /// by this process wins over the stamps. A plan not reconciled since
    /// startup falls back to the highest stamped version.
    fn confirmed_version(&self, plan_id: PlanId, owned: &[RemoteWorkout]) -> Option<PlanVersion> {
        if owned.is_empty() {
            return None;
        }
        match self.published.get(&plan_id) {
            Some(recorded) => *recorded,
            None => highest_version(owned),
        }
    }

    /// Observed state of `plan_id`, compared against `desired` when given.
    pub async fn plan_state(
        &self,
        plan_id: PlanId,
        desired: Option<PlanVersion>,
    ) -> Result<PlanState, AppError> {
        let owned = self.list_owned(plan_id).await?;
        Ok(PlanState::classify(
            self.confirmed_version(plan_id, &owned),
            desired,
        ))
    }

    /// Bring the remote platform in line with `plan`.
    ///
    /// Returns `Err` only when nothing was written: an invalid plan, a
    /// target older than what is published, or a failed listing. Per-key
    /// write failures are reported in the returned report.
    pub async fn reconcile(&self, plan: &Plan) -> Result<ReconciliationReport, AppError> {
        self.run(plan, None).await
    }

    /// Reconcile `plan`, a modification derived from version `base`.
    ///
    /// Fails with `PlanIntegrity`, before any write, unless `base` is the
    /// newest version of the plan on the remote platform. Two modifications
    /// of the same base can therefore never both be published.
    pub async fn reconcile_modification(
        &self,
        base: PlanVersion,
        plan: &Plan,
    ) -> Result<ReconciliationReport, AppError> {
        self.run(plan, Some(base)).await
    }

    async fn run(
        &self,
        plan: &Plan,
        base: Option<PlanVersion>,
    ) -> Result<ReconciliationReport, AppError> {
        plan.validate()?;

        let plan_id = plan.plan_id();
        let target_version = plan.version();
        let _guard = self.lock_plan(plan_id).await;

        tracing::info!(
            plan_id = %plan_id,
            version = %target_version,
            base = ?base,
            workouts = plan.workouts().len(),
            "Reconciling plan"
        );

        let owned = self.list_owned(plan_id).await?;
        let confirmed = self.confirmed_version(plan_id, &owned);
        // Newest version known to exist, confirmed or partially written.
        let latest = confirmed.max(highest_version(&owned));

        if let Some(base) = base {
            if latest != Some(base) {
                return Err(AppError::PlanIntegrity(match latest {
                    Some(latest) => format!(
                        "plan {} is at v{}, modification is based on v{}",
                        plan_id, latest, base
                    ),
                    None => format!("plan {} has nothing published to modify", plan_id),
                }));
            }
        }
        if let Some(latest) = latest {
            if latest > target_version {
                return Err(AppError::PlanIntegrity(format!(
                    "plan {} is published at v{}, refusing to reconcile older v{}",
                    plan_id, latest, target_version
                )));
            }
        }

        let groups = group_by_key(owned);
        let no_entries: &[RemoteWorkout] = &[];
        let mut tally = Tally::default();

        // Upserts, each followed by deletion of its superseded entries.
        let upserts: Vec<_> = plan
            .workouts()
            .iter()
            .map(|spec| {
                let entries = groups.get(&spec.key()).map_or(no_entries, Vec::as_slice);
                self.apply_key(plan, spec, entries)
            })
            .collect();
        let upserts: Vec<Tally> = stream::iter(upserts)
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;
        upserts.into_iter().for_each(|t| tally.merge(t));

        // Keys no longer in the plan.
        let target_keys: BTreeSet<WorkoutKey> =
            plan.workouts().iter().map(WorkoutSpec::key).collect();
        let deletes: Vec<_> = groups
            .iter()
            .filter(|(key, _)| !target_keys.contains(*key))
            .flat_map(|(key, entries)| entries.iter().map(move |w| (*key, w)))
            .map(|(key, workout)| self.delete_entry(key, workout))
            .collect();
        let deletes: Vec<Tally> = stream::iter(deletes)
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;
        deletes.into_iter().for_each(|t| tally.merge(t));

        self.resolve_ambiguous(plan, &groups, &mut tally).await;

        let state = if tally.failures.is_empty() {
            self.published.insert(plan_id, Some(target_version));
            PlanState::Published {
                version: target_version,
            }
        } else {
            // The logical version stays where it was before this pass.
            self.published.insert(plan_id, confirmed);
            PlanState::classify(confirmed, Some(target_version))
        };

        let report = ReconciliationReport {
            plan_id,
            target_version,
            created: tally.created,
            updated: tally.updated,
            deleted: tally.deleted,
            unchanged: tally.unchanged,
            failures: tally.failures,
            state,
        };

        if report.is_complete_success() {
            tracing::info!(
                plan_id = %plan_id,
                version = %target_version,
                created = report.created.len(),
                updated = report.updated.len(),
                deleted = report.deleted.len(),
                unchanged = report.unchanged.len(),
                "Plan reconciled"
            );
        } else {
            tracing::warn!(
                plan_id = %plan_id,
                version = %target_version,
                failed = report.failures.len(),
                writes = report.writes(),
                "Plan partially reconciled"
            );
        }

        Ok(report)
    }

    /// Create, update or keep one target key; then drop its superseded entries.
    async fn apply_key(&self, plan: &Plan, spec: &WorkoutSpec, entries: &[RemoteWorkout]) -> Tally {
        let key = spec.key();
        let mut tally = Tally::default();

        let (keeper, superseded) = match entries.split_first() {
            Some((keeper, rest)) => (Some(keeper), rest),
            None => (None, entries),
        };

        let applied = match keeper {
            Some(keeper) if keeper.matches_content(spec) => {
                tracing::debug!(key = %key, remote_id = %keeper.remote_id, "Workout unchanged");
                tally.unchanged.push(key);
                true
            }
            Some(keeper) => {
                match self
                    .gateway
                    .update_workout(&keeper.remote_id, spec, plan.plan_id(), plan.version())
                    .await
                {
                    // Removed by the user since listing; recreate it.
                    WriteOutcome::NotApplied(GatewayError::NotFound(_)) => {
                        self.create(plan, spec, &mut tally).await
                    }
                    outcome => {
                        let applied = tally
                            .settle(key, SyncOp::Update, Some(&keeper.remote_id), outcome)
                            .is_some();
                        if applied {
                            tracing::info!(key = %key, remote_id = %keeper.remote_id, "Updated workout");
                            tally.updated.push(key);
                        }
                        applied
                    }
                }
            }
            None => self.create(plan, spec, &mut tally).await,
        };

        // Superseded entries go only once the new entry is in place.
        if applied {
            for workout in superseded {
                tally.merge(self.delete_entry(key, workout).await);
            }
        }
        tally
    }

    async fn create(&self, plan: &Plan, spec: &WorkoutSpec, tally: &mut Tally) -> bool {
        let key = spec.key();
        let outcome = self
            .gateway
            .create_workout(spec, plan.plan_id(), plan.version())
            .await;
        match tally.settle(key, SyncOp::Create, None, outcome) {
            Some(created) => {
                tracing::info!(key = %key, remote_id = %created.remote_id, "Created workout");
                tally.created.push(key);
                true
            }
            None => false,
        }
    }

    async fn delete_entry(&self, key: WorkoutKey, workout: &RemoteWorkout) -> Tally {
        let mut tally = Tally::default();
        let outcome = self.gateway.delete_workout(&workout.remote_id).await;
        if tally
            .settle(key, SyncOp::Delete, Some(&workout.remote_id), outcome)
            .is_some()
        {
            tracing::info!(
                key = %key,
                remote_id = %workout.remote_id,
                version = ?workout.plan_version(),
                "Deleted workout"
            );
            tally.deleted.push(key);
        }
        tally
    }

    /// Re-list once and settle ambiguous writes against what actually landed.
    async fn resolve_ambiguous(
        &self,
        plan: &Plan,
        groups: &BTreeMap<WorkoutKey, Vec<RemoteWorkout>>,
        tally: &mut Tally,
    ) {
        if !tally.failures.iter().any(|f| f.kind == FailureKind::Ambiguous) {
            return;
        }

        let owned = match self.list_owned(plan.plan_id()).await {
            Ok(owned) => owned,
            Err(e) => {
                tracing::warn!(
                    plan_id = %plan.plan_id(),
                    error = %e,
                    "Re-list failed, ambiguous writes stay unresolved"
                );
                return;
            }
        };

        let mut landed_upserts = Vec::new();
        for mut failure in std::mem::take(&mut tally.failures) {
            if failure.kind != FailureKind::Ambiguous {
                tally.failures.push(failure);
                continue;
            }

            let landed = match failure.op {
                SyncOp::Create | SyncOp::Update => plan
                    .workouts()
                    .iter()
                    .find(|s| s.key() == failure.key)
                    .is_some_and(|spec| {
                        owned.iter().any(|w| {
                            w.key() == Some(failure.key)
                                && w.plan_version() == Some(plan.version())
                                && w.matches_content(spec)
                        })
                    }),
                SyncOp::Delete => failure
                    .remote_id
                    .as_ref()
                    .is_some_and(|id| !owned.iter().any(|w| &w.remote_id == id)),
            };

            if landed {
                tracing::info!(key = %failure.key, op = %failure.op, "Ambiguous write confirmed applied");
                tally.record(failure.op, failure.key);
                if failure.op != SyncOp::Delete {
                    landed_upserts.push(failure.key);
                }
            } else {
                // The re-list shows the write did not land.
                tracing::warn!(key = %failure.key, op = %failure.op, "Ambiguous write not applied");
                failure.kind = FailureKind::NotApplied;
                tally.failures.push(failure);
            }
        }

        // Superseded entries held back by the ambiguous upsert.
        for key in landed_upserts {
            if let Some((_, superseded)) = groups.get(&key).and_then(|e| e.split_first()) {
                for workout in superseded {
                    tally.merge(self.delete_entry(key, workout).await);
                }
            }
        }
    }

    /// Delete every owned workout of `plan_id`, whatever its version.
    pub async fn delete_plan(&self, plan_id: PlanId) -> Result<DeletionReport, AppError> {
        let _guard = self.lock_plan(plan_id).await;

        let owned = self.list_owned(plan_id).await?;
        if owned.is_empty() {
            return Err(AppError::PlanIntegrity(format!(
                "plan {} has no remote workouts to delete",
                plan_id
            )));
        }

        let versions: Vec<PlanVersion> = owned
            .iter()
            .filter_map(RemoteWorkout::plan_version)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        tracing::info!(
            plan_id = %plan_id,
            workouts = owned.len(),
            versions = ?versions,
            "Deleting plan"
        );

        let deletes: Vec<_> = owned.iter().map(|w| self.delete_remote(w)).collect();
        let outcomes: Vec<(&RemoteWorkout, WriteOutcome<()>)> = stream::iter(deletes)
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        let mut deleted = Vec::new();
        let mut failures = Vec::new();
        for (workout, outcome) in outcomes {
            let (kind, err) = match outcome {
                WriteOutcome::Applied(()) => {
                    deleted.push(workout.remote_id.clone());
                    continue;
                }
                WriteOutcome::NotApplied(e) => (FailureKind::NotApplied, e),
                WriteOutcome::Ambiguous(e) => (FailureKind::Ambiguous, e),
            };
            tracing::warn!(
                remote_id = %workout.remote_id,
                kind = ?kind,
                error = %err,
                "Remote delete failed"
            );
            failures.push(DeleteFailure {
                remote_id: workout.remote_id.clone(),
                key: workout.key(),
                kind,
                message: err.to_string(),
            });
        }

        // Settle ambiguous deletes against a fresh listing.
        if failures.iter().any(|f| f.kind == FailureKind::Ambiguous) {
            if let Ok(listed) = self.list_owned(plan_id).await {
                for mut failure in std::mem::take(&mut failures) {
                    let still_there = listed.iter().any(|w| w.remote_id == failure.remote_id);
                    match (failure.kind, still_there) {
                        (FailureKind::Ambiguous, false) => deleted.push(failure.remote_id),
                        (FailureKind::Ambiguous, true) => {
                            failure.kind = FailureKind::NotApplied;
                            failures.push(failure);
                        }
                        _ => failures.push(failure),
                    }
                }
            }
        }

        let state = if failures.is_empty() {
            tracing::info!(plan_id = %plan_id, deleted = deleted.len(), "Plan deleted");
            self.published.remove(&plan_id);
            PlanState::Absent
        } else {
            tracing::warn!(
                plan_id = %plan_id,
                deleted = deleted.len(),
                failed = failures.len(),
                "Plan partially deleted"
            );
            let remaining: Vec<RemoteWorkout> = owned
                .into_iter()
                .filter(|w| !deleted.contains(&w.remote_id))
                .collect();
            PlanState::classify(self.confirmed_version(plan_id, &remaining), None)
        };

        Ok(DeletionReport {
            plan_id,
            deleted,
            versions,
            failures,
            state,
        })
    }

    async fn delete_remote<'a>(
        &self,
        workout: &'a RemoteWorkout,
    ) -> (&'a RemoteWorkout, WriteOutcome<()>) {
        let outcome = self.gateway.delete_workout(&workout.remote_id).await;
        if outcome.is_applied() {
            tracing::info!(
                remote_id = %workout.remote_id,
                version = ?workout.plan_version(),
                "Deleted workout"
            );
        }
        (workout, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use crate::models::WorkoutType;

    fn key(day: u32) -> WorkoutKey {
        WorkoutKey {
            scheduled_date: NaiveDate::from_ymd_opt(2026, 10, day).unwrap(),
            workout_type: WorkoutType::Easy,
        }
    }

    fn report(created: usize, failures: Vec<KeyFailure>) -> ReconciliationReport {
        ReconciliationReport {
            plan_id: PlanId::new(),
            target_version: PlanVersion::INITIAL,
            created: (1..=created as u32).map(key).collect(),
            updated: vec![],
            deleted: vec![],
            unchanged: vec![],
            failures,
            state: PlanState::Absent,
        }
    }

    fn failure(day: u32, kind: FailureKind) -> KeyFailure {
        KeyFailure::new(key(day), SyncOp::Create, kind, None, &GatewayError::RateLimited)
    }

    #[test]
    fn report_complete_success() {
        let r = report(3, vec![]);
        assert!(r.is_complete_success());
        assert!(!r.is_partial_failure());
        assert!(r.into_result().is_ok());
    }

    #[test]
    fn report_partial_failure() {
        let r = report(2, vec![failure(9, FailureKind::NotApplied)]);
        assert!(r.is_partial_failure());
        assert!(!r.has_ambiguous());
        assert_eq!(r.failed_keys().into_iter().collect::<Vec<_>>(), vec![key(9)]);
        assert!(matches!(
            r.into_result(),
            Err(AppError::PartialReconciliation { failed: 1, total: 3 })
        ));
    }

    #[test]
    fn report_complete_failure_is_not_partial() {
        let r = report(0, vec![failure(9, FailureKind::Ambiguous)]);
        assert!(!r.is_complete_success());
        assert!(!r.is_partial_failure());
        assert!(r.has_ambiguous());
    }

    #[test]
    fn group_by_key_orders_highest_version_first() {
        use crate::models::{OwnerTag, TargetMetric, Volume};

        let spec = WorkoutSpec {
            scheduled_date: key(20).scheduled_date,
            workout_type: WorkoutType::Easy,
            target: TargetMetric::None,
            volume: Volume::Duration { seconds: 1800 },
            description: String::new(),
            name: None,
            steps: vec![],
        };
        let plan_id = PlanId::new();
        let owned = |id: &str, v: u32| RemoteWorkout {
            remote_id: RemoteId::new(id),
            name: "Easy Run".to_string(),
            owner_tag: Some(OwnerTag::for_spec(&spec, plan_id, PlanVersion::new(v).unwrap())),
        };

        let groups = group_by_key(vec![owned("a", 1), owned("b", 3), owned("c", 2)]);
        let entries = &groups[&spec.key()];
        let versions: Vec<u32> = entries
            .iter()
            .filter_map(|w| w.plan_version())
            .map(|v| v.get())
            .collect();
        assert_eq!(versions, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn plan_lock_entries_are_dropped_after_use() {
        use crate::services::memory::InMemoryGateway;

        let sync = PlanSynchronizer::new(Arc::new(InMemoryGateway::new()));
        let plan_id = PlanId::new();

        let first = sync.lock_plan(plan_id).await;
        assert_eq!(sync.locks.len(), 1);

        let waiter = {
            let sync = sync.clone();
            tokio::spawn(async move {
                let _second = sync.lock_plan(plan_id).await;
            })
        };
        tokio::task::yield_now().await;
        drop(first);
        // Still held by the waiter, so the entry survives the first release.
        waiter.await.unwrap();

        assert!(sync.locks.is_empty());
    }

    #[test]
    fn sync_op_display() {
        assert_eq!(SyncOp::Create.to_string(), "create");
        assert_eq!(SyncOp::Delete.to_string(), "delete");
    }
}

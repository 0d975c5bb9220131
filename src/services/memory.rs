// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory remote platform for offline runs and tests.
//!
//! Keeps a full workout inventory (owned and user-authored), records every
//! call, and can be told to fail specific writes or to answer slowly.

use crate::error::AppError;
use crate::models::remote::tag_description;
use crate::models::{
    Activity, AthleteProfile, OwnerTag, PlanId, PlanVersion, RemoteId, RemoteWorkout, WorkoutKey,
    WorkoutSpec,
};
use crate::services::gateway::{ActivitySource, GatewayError, WorkoutGateway, WriteOutcome};
use crate::services::sync::SyncOp;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

/// How an injected failure behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// Rejected; nothing changes.
    NotApplied,
    /// Outcome unknown; nothing changes.
    Ambiguous,
    /// Outcome unknown to the caller, but the write did land.
    AmbiguousButApplied,
}

/// One recorded gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    List(PlanId),
    Create(WorkoutKey),
    Update(RemoteId),
    Delete(RemoteId),
}

/// Call totals by kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub lists: usize,
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
}

impl CallCounts {
    pub fn writes(&self) -> usize {
        self.creates + self.updates + self.deletes
    }
}

#[derive(Debug, Clone)]
struct StoredWorkout {
    name: String,
    description: String,
    scheduled_date: Option<NaiveDate>,
}

impl StoredWorkout {
    fn to_remote(&self, remote_id: &RemoteId) -> RemoteWorkout {
        RemoteWorkout {
            remote_id: remote_id.clone(),
            name: self.name.clone(),
            owner_tag: OwnerTag::find_in(&self.description),
        }
    }
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    workouts: BTreeMap<RemoteId, StoredWorkout>,
    activities: Vec<Activity>,
    profile: AthleteProfile,
    calls: Vec<GatewayCall>,
    failures: HashMap<(SyncOp, WorkoutKey), FailureMode>,
    failing_lists: u32,
}

impl Inner {
    fn allocate_id(&mut self) -> RemoteId {
        self.next_id += 1;
        RemoteId::new(format!("mem-{}", self.next_id))
    }

    fn take_failure(&mut self, op: SyncOp, key: WorkoutKey) -> Option<FailureMode> {
        self.failures.remove(&(op, key))
    }

    fn store(&mut self, remote_id: RemoteId, spec: &WorkoutSpec, tag: &OwnerTag) -> RemoteWorkout {
        let stored = StoredWorkout {
            name: spec.display_name().to_string(),
            description: tag_description(&spec.description, tag),
            scheduled_date: Some(spec.scheduled_date),
        };
        let remote = stored.to_remote(&remote_id);
        self.workouts.insert(remote_id, stored);
        remote
    }
}

/// Remote platform double backed by a map.
#[derive(Default)]
pub struct InMemoryGateway {
    inner: Mutex<Inner>,
    /// Delay before every workout call, so concurrent callers interleave.
    latency: Option<Duration>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_activities(activities: Vec<Activity>) -> Self {
        let gateway = Self::default();
        gateway.lock().activities = activities;
        gateway
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn set_profile(&self, profile: AthleteProfile) {
        self.lock().profile = profile;
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock only means a test panicked mid-call; the data is still usable.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add a user-authored workout (no ownership tag).
    pub fn insert_user_workout(
        &self,
        name: &str,
        description: &str,
        scheduled_date: NaiveDate,
    ) -> RemoteId {
        let mut inner = self.lock();
        let remote_id = inner.allocate_id();
        inner.workouts.insert(
            remote_id.clone(),
            StoredWorkout {
                name: name.to_string(),
                description: description.to_string(),
                scheduled_date: Some(scheduled_date),
            },
        );
        remote_id
    }

    /// Add an owned workout directly, bypassing the call log.
    pub fn insert_owned(&self, spec: &WorkoutSpec, plan_id: PlanId, version: PlanVersion) -> RemoteId {
        let mut inner = self.lock();
        let remote_id = inner.allocate_id();
        inner.store(
            remote_id.clone(),
            spec,
            &OwnerTag::for_spec(spec, plan_id, version),
        );
        remote_id
    }

    /// Make the next `op` on `key` fail.
    pub fn fail_next(&self, op: SyncOp, key: WorkoutKey, mode: FailureMode) {
        self.lock().failures.insert((op, key), mode);
    }

    /// Make the next `count` listings fail with a transient error.
    pub fn fail_lists(&self, count: u32) {
        self.lock().failing_lists = count;
    }

    /// Snapshot of the full inventory.
    pub fn workouts(&self) -> Vec<RemoteWorkout> {
        self.lock()
            .workouts
            .iter()
            .map(|(id, w)| w.to_remote(id))
            .collect()
    }

    pub fn get(&self, remote_id: &RemoteId) -> Option<RemoteWorkout> {
        self.lock().workouts.get(remote_id).map(|w| w.to_remote(remote_id))
    }

    pub fn scheduled_date(&self, remote_id: &RemoteId) -> Option<NaiveDate> {
        self.lock()
            .workouts
            .get(remote_id)
            .and_then(|w| w.scheduled_date)
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.lock().calls.clone()
    }

    pub fn call_counts(&self) -> CallCounts {
        let inner = self.lock();
        let mut counts = CallCounts::default();
        for call in &inner.calls {
            match call {
                GatewayCall::List(_) => counts.lists += 1,
                GatewayCall::Create(_) => counts.creates += 1,
                GatewayCall::Update(_) => counts.updates += 1,
                GatewayCall::Delete(_) => counts.deletes += 1,
            }
        }
        counts
    }

    pub fn reset_calls(&self) {
        self.lock().calls.clear();
    }
}

fn injected(mode: FailureMode, op: SyncOp) -> GatewayError {
    match mode {
        FailureMode::NotApplied => GatewayError::Rejected {
            status: 400,
            body: format!("injected {} failure", op),
        },
        FailureMode::Ambiguous | FailureMode::AmbiguousButApplied => {
            GatewayError::Server {
                status: 504,
                body: format!("injected {} timeout", op),
            }
        }
    }
}

#[async_trait]
impl WorkoutGateway for InMemoryGateway {
    async fn list_owned_workouts(&self, plan_id: PlanId) -> Result<Vec<RemoteWorkout>, GatewayError> {
        self.pause().await;
        let mut inner = self.lock();
        inner.calls.push(GatewayCall::List(plan_id));

        if inner.failing_lists > 0 {
            inner.failing_lists -= 1;
            return Err(GatewayError::Connect("injected list failure".to_string()));
        }

        // Full inventory scan with client-side filtering, as against the real platform.
        Ok(inner
            .workouts
            .iter()
            .map(|(id, w)| w.to_remote(id))
            .filter(|w| w.is_owned_by(plan_id))
            .collect())
    }

    async fn create_workout(
        &self,
        spec: &WorkoutSpec,
        plan_id: PlanId,
        version: PlanVersion,
    ) -> WriteOutcome<RemoteWorkout> {
        self.pause().await;
        let mut inner = self.lock();
        inner.calls.push(GatewayCall::Create(spec.key()));

        let tag = OwnerTag::for_spec(spec, plan_id, version);
        match inner.take_failure(SyncOp::Create, spec.key()) {
            None => {
                let remote_id = inner.allocate_id();
                WriteOutcome::Applied(inner.store(remote_id, spec, &tag))
            }
            Some(FailureMode::AmbiguousButApplied) => {
                let remote_id = inner.allocate_id();
                inner.store(remote_id, spec, &tag);
                WriteOutcome::Ambiguous(injected(FailureMode::AmbiguousButApplied, SyncOp::Create))
            }
            Some(FailureMode::Ambiguous) => {
                WriteOutcome::Ambiguous(injected(FailureMode::Ambiguous, SyncOp::Create))
            }
            Some(FailureMode::NotApplied) => {
                WriteOutcome::NotApplied(injected(FailureMode::NotApplied, SyncOp::Create))
            }
        }
    }

    async fn update_workout(
        &self,
        remote_id: &RemoteId,
        spec: &WorkoutSpec,
        plan_id: PlanId,
        version: PlanVersion,
    ) -> WriteOutcome<RemoteWorkout> {
        self.pause().await;
        let mut inner = self.lock();
        inner.calls.push(GatewayCall::Update(remote_id.clone()));

        if !inner.workouts.contains_key(remote_id) {
            return WriteOutcome::NotApplied(GatewayError::NotFound(format!(
                "workout {}",
                remote_id
            )));
        }

        let tag = OwnerTag::for_spec(spec, plan_id, version);
        match inner.take_failure(SyncOp::Update, spec.key()) {
            None => WriteOutcome::Applied(inner.store(remote_id.clone(), spec, &tag)),
            Some(FailureMode::AmbiguousButApplied) => {
                inner.store(remote_id.clone(), spec, &tag);
                WriteOutcome::Ambiguous(injected(FailureMode::AmbiguousButApplied, SyncOp::Update))
            }
            Some(mode @ FailureMode::Ambiguous) => {
                WriteOutcome::Ambiguous(injected(mode, SyncOp::Update))
            }
            Some(mode @ FailureMode::NotApplied) => {
                WriteOutcome::NotApplied(injected(mode, SyncOp::Update))
            }
        }
    }

    async fn delete_workout(&self, remote_id: &RemoteId) -> WriteOutcome<()> {
        self.pause().await;
        let mut inner = self.lock();
        inner.calls.push(GatewayCall::Delete(remote_id.clone()));

        let key = inner
            .workouts
            .get(remote_id)
            .and_then(|w| OwnerTag::find_in(&w.description))
            .map(|t| t.key);

        let failure = key.and_then(|k| inner.take_failure(SyncOp::Delete, k));
        match failure {
            None => {
                // Already gone counts as deleted.
                inner.workouts.remove(remote_id);
                WriteOutcome::Applied(())
            }
            Some(FailureMode::AmbiguousButApplied) => {
                inner.workouts.remove(remote_id);
                WriteOutcome::Ambiguous(injected(FailureMode::AmbiguousButApplied, SyncOp::Delete))
            }
            Some(mode @ FailureMode::Ambiguous) => {
                WriteOutcome::Ambiguous(injected(mode, SyncOp::Delete))
            }
            Some(mode @ FailureMode::NotApplied) => {
                WriteOutcome::NotApplied(injected(mode, SyncOp::Delete))
            }
        }
    }
}

#[async_trait]
impl ActivitySource for InMemoryGateway {
    async fn fetch_activities(&self, since: DateTime<Utc>) -> Result<Vec<Activity>, AppError> {
        let mut activities: Vec<Activity> = self
            .lock()
            .activities
            .iter()
            .filter(|a| a.start_time >= since)
            .cloned()
            .collect();
        activities.sort_by_key(|a| a.start_time);
        Ok(activities)
    }

    async fn fetch_profile(&self) -> Result<AthleteProfile, AppError> {
        Ok(self.lock().profile.clone())
    }
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Contracts with the remote platform.
//!
//! - [`WorkoutGateway`]: workout CRUD, owned-workout listing
//! - [`ActivitySource`]: read-only activity history and athlete profile
//!
//! Write operations return a three-valued [`WriteOutcome`]: a failed write
//! either definitely did not happen, or may have happened. The two are never
//! folded together, and an ambiguous write is never treated as success.

use crate::error::AppError;
use crate::models::{
    Activity, AthleteProfile, PlanId, PlanVersion, RemoteId, RemoteWorkout, WorkoutSpec,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Transport-level failure talking to the remote platform.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum GatewayError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("rate limited")]
    RateLimited,

    #[error("server error (HTTP {status}): {body}")]
    Server { status: u16, body: String },

    #[error("authentication rejected (HTTP {0})")]
    Unauthorized(u16),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("request rejected (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("unexpected response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Transient failures worth retrying (for operations safe to repeat).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Timeout(_)
                | GatewayError::Connect(_)
                | GatewayError::RateLimited
                | GatewayError::Server { .. }
        )
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound(what) => AppError::NotFound(what),
            e if e.is_retryable() => AppError::UpstreamUnavailable(e.to_string()),
            e => AppError::GarminApi(e.to_string()),
        }
    }
}

/// Result of a remote write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome<T> {
    Applied(T),
    /// The platform confirmed nothing changed.
    NotApplied(GatewayError),
    /// The write may or may not have happened.
    Ambiguous(GatewayError),
}

impl<T> WriteOutcome<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, WriteOutcome::Applied(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> WriteOutcome<U> {
        match self {
            WriteOutcome::Applied(v) => WriteOutcome::Applied(f(v)),
            WriteOutcome::NotApplied(e) => WriteOutcome::NotApplied(e),
            WriteOutcome::Ambiguous(e) => WriteOutcome::Ambiguous(e),
        }
    }

    /// Collapse into an application result. Ambiguity is an error, not success.
    pub fn into_result(self) -> Result<T, AppError> {
        match self {
            WriteOutcome::Applied(v) => Ok(v),
            WriteOutcome::NotApplied(e) => Err(e.into()),
            WriteOutcome::Ambiguous(e) => Err(AppError::AmbiguousWrite(e.to_string())),
        }
    }
}

/// Workout CRUD on the remote platform.
///
/// Implementations own retry/backoff for idempotent calls and a timeout on
/// every call. They carry no business semantics.
#[async_trait]
pub trait WorkoutGateway: Send + Sync {
    /// All workouts tagged as owned by `plan_id`, regardless of version.
    async fn list_owned_workouts(&self, plan_id: PlanId) -> Result<Vec<RemoteWorkout>, GatewayError>;

    async fn create_workout(
        &self,
        spec: &WorkoutSpec,
        plan_id: PlanId,
        version: PlanVersion,
    ) -> WriteOutcome<RemoteWorkout>;

    async fn update_workout(
        &self,
        remote_id: &RemoteId,
        spec: &WorkoutSpec,
        plan_id: PlanId,
        version: PlanVersion,
    ) -> WriteOutcome<RemoteWorkout>;

    /// Deleting a workout that no longer exists counts as applied.
    async fn delete_workout(&self, remote_id: &RemoteId) -> WriteOutcome<()>;
}

/// Read-only provider of past activities and profile metadata.
#[async_trait]
pub trait ActivitySource: Send + Sync {
    /// Activities starting at or after `since`, sorted ascending by start time.
    async fn fetch_activities(&self, since: DateTime<Utc>) -> Result<Vec<Activity>, AppError>;

    /// Profile settings of the athlete whose history this is.
    async fn fetch_profile(&self) -> Result<AthleteProfile, AppError>;
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod activity;
pub mod load;
pub mod plan;
pub mod remote;

pub use activity::{Activity, AthleteProfile};
pub use load::{LoadSample, LoadState};
pub use plan::{
    Plan, PlanId, PlanVersion, StepKind, TargetMetric, Volume, WorkoutKey, WorkoutSpec,
    WorkoutStep, WorkoutType,
};
pub use remote::{OwnerTag, PlanState, RemoteId, RemoteWorkout};

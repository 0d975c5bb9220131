// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod garmin;
pub mod gateway;
pub mod load;
pub mod memory;
pub mod retry;
pub mod sync;

pub use garmin::GarminClient;
pub use gateway::{ActivitySource, GatewayError, WorkoutGateway, WriteOutcome};
pub use load::{HeartRateProfile, LoadError, TrainingLoadCalculator};
pub use memory::{CallCounts, FailureMode, GatewayCall, InMemoryGateway};
pub use retry::RetryPolicy;
pub use sync::{
    DeleteFailure, DeletionReport, FailureKind, KeyFailure, PlanLocks, PlanSynchronizer,
    ReconciliationReport, SyncOp,
};

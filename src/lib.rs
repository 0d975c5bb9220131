// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Plan-Sync: training-load tracking and plan publishing for Garmin Connect
//!
//! This crate computes acute/chronic training load from activity history
//! and keeps a versioned training plan in sync with the workouts on a
//! Garmin Connect account.

pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use services::{ActivitySource, PlanSynchronizer, TrainingLoadCalculator};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub synchronizer: PlanSynchronizer,
    pub history: Arc<dyn ActivitySource>,
    pub calculator: TrainingLoadCalculator,
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for training load and plan publishing.
//!
//! Thin wrappers over `compute_load` and the plan synchronizer. A
//! reconciliation with per-key failures answers 207 with the full report so
//! the caller can see which keys to retry.

use crate::error::{AppError, Result};
use crate::models::{
    AthleteProfile, LoadState, Plan, PlanId, PlanState, PlanVersion, WorkoutKey, WorkoutSpec,
};
use crate::services::{DeletionReport, HeartRateProfile, ReconciliationReport};
use crate::time_utils::{format_utc_rfc3339, parse_utc_timestamp};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

/// API routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/load", get(get_load))
        .route("/api/plans", post(create_plan))
        .route(
            "/api/plans/{plan_id}",
            get(get_plan_state).put(modify_plan).delete(delete_plan),
        )
        .route("/api/plans/{plan_id}/reconcile", post(reconcile_plan))
}

// ─── Training Load ───────────────────────────────────────────

#[derive(Deserialize)]
pub struct LoadQuery {
    /// RFC3339 timestamp or `YYYY-MM-DD`; defaults to now.
    pub as_of: Option<String>,
}

/// Compute load from the activity history as of a point in time.
///
/// Heart-rate bounds come from the athlete profile when the source has one,
/// otherwise from configuration.
async fn get_load(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LoadQuery>,
) -> Result<Json<LoadState>> {
    let as_of = match params.as_of.as_deref() {
        Some(raw) => parse_utc_timestamp(raw)
            .ok_or_else(|| AppError::BadRequest(format!("Invalid as_of: {}", raw)))?,
        None => Utc::now(),
    };

    let since = as_of - state.calculator.lookback();
    let (activities, athlete) = tokio::join!(
        state.history.fetch_activities(since),
        state.history.fetch_profile()
    );
    let activities = activities?;
    let athlete = athlete.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Athlete profile unavailable, using configured heart rate");
        AthleteProfile::default()
    });

    let heart_rate = HeartRateProfile::resolve(&athlete, &state.config, as_of.date_naive());
    let calculator = state.calculator.clone().with_heart_rate(heart_rate);
    let load = calculator.compute_load(&activities, as_of)?;

    tracing::info!(
        as_of = %format_utc_rfc3339(as_of),
        max_heart_rate = heart_rate.max,
        activities = load.samples.len(),
        acute = load.acute_load,
        chronic = load.chronic_load,
        ramp_ratio = ?load.ramp_ratio,
        "Computed training load"
    );

    Ok(Json(load))
}

// ─── Plans ───────────────────────────────────────────────────

/// New plan request.
#[derive(Deserialize)]
pub struct CreatePlanRequest {
    pub workouts: Vec<WorkoutSpec>,
}

/// Modification request: `version` is the currently published version.
#[derive(Deserialize)]
pub struct ModifyPlanRequest {
    pub version: PlanVersion,
    pub workouts: Vec<WorkoutSpec>,
}

/// A plan together with the outcome of publishing it.
#[derive(Serialize)]
pub struct PublishResponse {
    pub plan: Plan,
    pub report: ReconciliationReport,
    /// Keys to resubmit through `/reconcile`.
    pub retry_keys: BTreeSet<WorkoutKey>,
    /// Some write may have landed; re-read state before retrying.
    pub ambiguous: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PublishResponse {
    fn new(plan: Plan, report: ReconciliationReport) -> Self {
        let retry_keys = report.failed_keys();
        let ambiguous = report.has_ambiguous();
        let error = report.clone().into_result().err().map(|e| e.to_string());
        Self {
            plan,
            report,
            retry_keys,
            ambiguous,
            error,
        }
    }
}

#[derive(Deserialize)]
pub struct StateQuery {
    pub desired: Option<PlanVersion>,
}

fn publish_status(report: &ReconciliationReport) -> StatusCode {
    if report.is_complete_success() {
        StatusCode::OK
    } else {
        StatusCode::MULTI_STATUS
    }
}

/// Generate a new plan (fresh id, version 1) and publish it.
async fn create_plan(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreatePlanRequest>,
) -> Result<(StatusCode, Json<PublishResponse>)> {
    let plan = Plan::from_generation(body.workouts)?;
    publish(&state, plan).await
}

/// Publish the next version of an existing plan.
async fn modify_plan(
    State(state): State<Arc<AppState>>,
    Path(plan_id): Path<PlanId>,
    Json(body): Json<ModifyPlanRequest>,
) -> Result<(StatusCode, Json<PublishResponse>)> {
    let current = Plan::from_parts(plan_id, body.version, Vec::new());
    let plan = Plan::derive_modification(&current, body.workouts)?;
    let report = state
        .synchronizer
        .reconcile_modification(body.version, &plan)
        .await?;
    Ok((publish_status(&report), Json(PublishResponse::new(plan, report))))
}

/// Reconcile a complete plan as given (e.g. to retry failed keys).
async fn reconcile_plan(
    State(state): State<Arc<AppState>>,
    Path(plan_id): Path<PlanId>,
    Json(plan): Json<Plan>,
) -> Result<(StatusCode, Json<PublishResponse>)> {
    if plan.plan_id() != plan_id {
        return Err(AppError::BadRequest(format!(
            "Plan id {} does not match path {}",
            plan.plan_id(),
            plan_id
        )));
    }
    publish(&state, plan).await
}

async fn publish(state: &AppState, plan: Plan) -> Result<(StatusCode, Json<PublishResponse>)> {
    let report = state.synchronizer.reconcile(&plan).await?;
    Ok((publish_status(&report), Json(PublishResponse::new(plan, report))))
}

/// Observed remote state of a plan.
async fn get_plan_state(
    State(state): State<Arc<AppState>>,
    Path(plan_id): Path<PlanId>,
    Query(params): Query<StateQuery>,
) -> Result<Json<PlanState>> {
    let plan_state = state.synchronizer.plan_state(plan_id, params.desired).await?;
    Ok(Json(plan_state))
}

/// Delete every remote workout of a plan.
async fn delete_plan(
    State(state): State<Arc<AppState>>,
    Path(plan_id): Path<PlanId>,
) -> Result<(StatusCode, Json<DeletionReport>)> {
    tracing::info!(plan_id = %plan_id, "Plan deletion requested");
    let report = state.synchronizer.delete_plan(plan_id).await?;
    let status = if report.is_complete_success() {
        StatusCode::OK
    } else {
        StatusCode::MULTI_STATUS
    };
    Ok((status, Json(report)))
}

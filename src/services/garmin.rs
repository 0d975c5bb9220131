// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Garmin Connect API client for workouts and activity history.
//!
//! Handles:
//! - Workout upload, calendar scheduling, update and delete
//! - Paged listing of the full workout inventory (ownership is filtered
//!   client-side; server-side filtering is not relied on)
//! - Paged activity history fetches and athlete profile settings
//! - Classifying failures as "not applied" or "may have applied"

use crate::config::Config;
use crate::error::AppError;
use crate::models::remote::tag_description;
use crate::models::{
    Activity, AthleteProfile, OwnerTag, PlanId, PlanVersion, RemoteId, RemoteWorkout, StepKind,
    TargetMetric, Volume, WorkoutSpec, WorkoutStep, WorkoutType,
};
use crate::services::gateway::{ActivitySource, GatewayError, WorkoutGateway, WriteOutcome};
use crate::services::retry::RetryPolicy;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Activities requested per page (matches the web UI).
const ACTIVITY_PAGE_SIZE: u32 = 20;

/// Garmin Connect API client.
#[derive(Clone)]
pub struct GarminClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
    page_size: u32,
    retry: RetryPolicy,
}

impl GarminClient {
    /// Create a new client with a bearer token.
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            access_token: access_token.into(),
            page_size: 100,
            retry: RetryPolicy::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.garmin_api_base_url, &config.garmin_access_token)
            .with_retry(RetryPolicy::from_config(config))
            .with_page_size(config.workout_page_size)
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    // ─── Raw Calls ───────────────────────────────────────────────────────────

    /// One page of the workout inventory.
    async fn list_workouts_page(&self, start: u32) -> Result<Vec<GarminWorkoutSummary>, GatewayError> {
        let url = format!("{}/workout-service/workouts", self.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&[
                ("start", start.to_string()),
                ("limit", self.page_size.to_string()),
            ])
            .send()
            .await
            .map_err(classify_send_error)?;

        check_response_json(response).await
    }

    /// One page of the activity history.
    async fn list_activities_page(
        &self,
        since: DateTime<Utc>,
        start: u32,
    ) -> Result<Vec<GarminActivity>, GatewayError> {
        let url = format!(
            "{}/activitylist-service/activities/search/activities",
            self.base_url
        );
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&[
                ("startDate", since.format("%Y-%m-%d").to_string()),
                ("start", start.to_string()),
                ("limit", ACTIVITY_PAGE_SIZE.to_string()),
            ])
            .send()
            .await
            .map_err(classify_send_error)?;

        check_response_json(response).await
    }

    async fn get_user_settings(&self) -> Result<GarminUserSettings, GatewayError> {
        let url = format!(
            "{}/userprofile-service/userprofile/user-settings",
            self.base_url
        );
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(classify_send_error)?;

        check_response_json(response).await
    }

    /// Upload a workout, returning its new id.
    async fn upload_workout(&self, payload: &GarminWorkoutPayload) -> WriteOutcome<u64> {
        let url = format!("{}/workout-service/workout", self.base_url);
        let response = match self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(payload)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return write_failure(classify_send_error(e)),
        };

        if let Err(e) = check_response(&response) {
            return write_failure(e.with_body(response).await);
        }

        // The workout exists but without an id we cannot tell which one.
        match response.json::<GarminCreatedWorkout>().await {
            Ok(created) => WriteOutcome::Applied(created.workout_id),
            Err(e) => WriteOutcome::Ambiguous(GatewayError::Decode(e.to_string())),
        }
    }

    /// Put a workout on the calendar.
    async fn schedule_workout(&self, workout_id: u64, date: chrono::NaiveDate) -> WriteOutcome<()> {
        let url = format!("{}/workout-service/schedule/{}", self.base_url, workout_id);
        let body = serde_json::json!({ "date": date.format("%Y-%m-%d").to_string() });
        self.send_write(self.http.post(&url).json(&body)).await
    }

    async fn put_workout(&self, workout_id: u64, payload: &GarminWorkoutPayload) -> WriteOutcome<()> {
        let url = format!("{}/workout-service/workout/{}", self.base_url, workout_id);
        self.send_write(self.http.put(&url).json(payload)).await
    }

    async fn delete_raw(&self, remote_id: &RemoteId) -> Result<(), GatewayError> {
        let url = format!("{}/workout-service/workout/{}", self.base_url, remote_id);
        let response = self
            .http
            .delete(&url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(classify_send_error)?;

        match check_response(&response) {
            Ok(()) => Ok(()),
            // Already gone.
            Err(GatewayError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.with_body(response).await),
        }
    }

    /// Send a write whose response body we do not need.
    async fn send_write(&self, request: reqwest::RequestBuilder) -> WriteOutcome<()> {
        let response = match request.bearer_auth(&self.access_token).send().await {
            Ok(r) => r,
            Err(e) => return write_failure(classify_send_error(e)),
        };
        match check_response(&response) {
            Ok(()) => WriteOutcome::Applied(()),
            Err(e) => write_failure(e.with_body(response).await),
        }
    }

    /// Upload then schedule. If scheduling fails the upload is rolled back;
    /// if the rollback fails too the outcome is ambiguous.
    async fn create_once(
        &self,
        spec: &WorkoutSpec,
        payload: &GarminWorkoutPayload,
    ) -> WriteOutcome<RemoteWorkout> {
        let workout_id = match self.upload_workout(payload).await {
            WriteOutcome::Applied(id) => id,
            WriteOutcome::NotApplied(e) => return WriteOutcome::NotApplied(e),
            WriteOutcome::Ambiguous(e) => return WriteOutcome::Ambiguous(e),
        };
        let remote_id = RemoteId::new(workout_id.to_string());

        match self.schedule_workout(workout_id, spec.scheduled_date).await {
            WriteOutcome::Applied(()) => WriteOutcome::Applied(RemoteWorkout {
                remote_id,
                name: payload.workout_name.clone(),
                owner_tag: OwnerTag::find_in(&payload.description),
            }),
            WriteOutcome::NotApplied(e) | WriteOutcome::Ambiguous(e) => {
                tracing::warn!(
                    remote_id = %remote_id,
                    key = %spec.key(),
                    error = %e,
                    "Scheduling failed, rolling back upload"
                );
                match self.delete_workout(&remote_id).await {
                    WriteOutcome::Applied(()) => WriteOutcome::NotApplied(e),
                    _ => WriteOutcome::Ambiguous(e),
                }
            }
        }
    }
}

#[async_trait]
impl WorkoutGateway for GarminClient {
    async fn list_owned_workouts(&self, plan_id: PlanId) -> Result<Vec<RemoteWorkout>, GatewayError> {
        let mut owned = Vec::new();
        let mut start = 0;
        loop {
            let page = self
                .retry
                .run_idempotent("list_workouts", || self.list_workouts_page(start))
                .await?;
            // The server may cap `limit` below the page size, so only an
            // empty page ends the inventory.
            if page.is_empty() {
                break;
            }
            start += page.len() as u32;

            owned.extend(
                page.into_iter()
                    .map(GarminWorkoutSummary::into_remote)
                    .filter(|w| w.is_owned_by(plan_id)),
            );
        }

        tracing::debug!(plan_id = %plan_id, count = owned.len(), "Listed owned workouts");
        Ok(owned)
    }

    async fn create_workout(
        &self,
        spec: &WorkoutSpec,
        plan_id: PlanId,
        version: PlanVersion,
    ) -> WriteOutcome<RemoteWorkout> {
        let payload = GarminWorkoutPayload::from_spec(spec, plan_id, version, None);
        self.retry
            .run_write("create_workout", || self.create_once(spec, &payload))
            .await
    }

    async fn update_workout(
        &self,
        remote_id: &RemoteId,
        spec: &WorkoutSpec,
        plan_id: PlanId,
        version: PlanVersion,
    ) -> WriteOutcome<RemoteWorkout> {
        let Ok(workout_id) = remote_id.as_str().parse::<u64>() else {
            return WriteOutcome::NotApplied(GatewayError::NotFound(format!(
                "workout {}",
                remote_id
            )));
        };
        let payload = GarminWorkoutPayload::from_spec(spec, plan_id, version, Some(workout_id));

        self.retry
            .run_write("update_workout", || self.put_workout(workout_id, &payload))
            .await
            .map(|()| RemoteWorkout {
                remote_id: remote_id.clone(),
                name: payload.workout_name.clone(),
                owner_tag: OwnerTag::find_in(&payload.description),
            })
    }

    async fn delete_workout(&self, remote_id: &RemoteId) -> WriteOutcome<()> {
        match self
            .retry
            .run_idempotent("delete_workout", || self.delete_raw(remote_id))
            .await
        {
            Ok(()) => WriteOutcome::Applied(()),
            Err(e) => write_failure(e),
        }
    }
}

#[async_trait]
impl ActivitySource for GarminClient {
    async fn fetch_activities(&self, since: DateTime<Utc>) -> Result<Vec<Activity>, AppError> {
        let mut activities = Vec::new();
        let mut start = 0;
        loop {
            let page = self
                .retry
                .run_idempotent("list_activities", || self.list_activities_page(since, start))
                .await
                .map_err(|e| AppError::UpstreamUnavailable(format!("activity history: {}", e)))?;

            if page.is_empty() {
                break;
            }
            start += page.len() as u32;
            activities.extend(page.into_iter().filter_map(GarminActivity::into_activity));
        }

        activities.retain(|a| a.start_time >= since);
        activities.sort_by_key(|a| a.start_time);
        tracing::debug!(count = activities.len(), since = %since, "Fetched activity history");
        Ok(activities)
    }

    async fn fetch_profile(&self) -> Result<AthleteProfile, AppError> {
        let settings = self
            .retry
            .run_idempotent("user_settings", || self.get_user_settings())
            .await
            .map_err(|e| AppError::UpstreamUnavailable(format!("athlete profile: {}", e)))?;

        tracing::debug!(
            birth_date = ?settings.user_data.birth_date,
            "Fetched athlete profile"
        );
        Ok(AthleteProfile {
            birth_date: settings.user_data.birth_date,
            ..AthleteProfile::default()
        })
    }
}

// ─── Failure Classification ──────────────────────────────────────────────────

/// Map a transport error. Connect failures never reached the server.
fn classify_send_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout(std::time::Duration::ZERO)
    } else if e.is_connect() {
        GatewayError::Connect(e.to_string())
    } else {
        GatewayError::Server {
            status: 0,
            body: e.to_string(),
        }
    }
}

/// Decide whether a failed write may still have been applied.
fn write_failure<T>(e: GatewayError) -> WriteOutcome<T> {
    match e {
        GatewayError::Timeout(_) | GatewayError::Server { .. } | GatewayError::Decode(_) => {
            WriteOutcome::Ambiguous(e)
        }
        GatewayError::Connect(_)
        | GatewayError::RateLimited
        | GatewayError::Unauthorized(_)
        | GatewayError::NotFound(_)
        | GatewayError::Rejected { .. } => WriteOutcome::NotApplied(e),
    }
}

/// Check response status and return error if not successful.
fn check_response(response: &reqwest::Response) -> Result<(), GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }

    match status.as_u16() {
        429 => {
            tracing::warn!("Garmin rate limit hit (429)");
            Err(GatewayError::RateLimited)
        }
        401 | 403 => Err(GatewayError::Unauthorized(status.as_u16())),
        404 => Err(GatewayError::NotFound(response.url().path().to_string())),
        code if status.is_server_error() => Err(GatewayError::Server {
            status: code,
            body: String::new(),
        }),
        code => Err(GatewayError::Rejected {
            status: code,
            body: String::new(),
        }),
    }
}

impl GatewayError {
    /// Attach the response body to status errors that carry one.
    async fn with_body(self, response: reqwest::Response) -> Self {
        match self {
            GatewayError::Server { status, .. } => GatewayError::Server {
                status,
                body: response.text().await.unwrap_or_default(),
            },
            GatewayError::Rejected { status, .. } => GatewayError::Rejected {
                status,
                body: response.text().await.unwrap_or_default(),
            },
            other => other,
        }
    }
}

/// Check response and parse JSON body.
async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, GatewayError> {
    if let Err(e) = check_response(&response) {
        return Err(e.with_body(response).await);
    }

    response
        .json()
        .await
        .map_err(|e| GatewayError::Decode(format!("JSON parse error: {}", e)))
}

// ─── Wire Types ──────────────────────────────────────────────────────────────

/// Workout entry from the inventory listing.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GarminWorkoutSummary {
    workout_id: u64,
    #[serde(default)]
    workout_name: String,
    #[serde(default)]
    description: Option<String>,
}

impl GarminWorkoutSummary {
    fn into_remote(self) -> RemoteWorkout {
        RemoteWorkout {
            remote_id: RemoteId::new(self.workout_id.to_string()),
            owner_tag: self.description.as_deref().and_then(OwnerTag::find_in),
            name: self.workout_name,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GarminCreatedWorkout {
    workout_id: u64,
}

/// Activity entry from the activity search endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GarminActivity {
    activity_id: u64,
    #[serde(default)]
    activity_name: Option<String>,
    #[serde(rename = "startTimeGMT")]
    start_time_gmt: String,
    #[serde(default)]
    duration: f64,
    #[serde(default)]
    distance: f64,
    #[serde(rename = "averageHR", default)]
    average_hr: Option<f64>,
    #[serde(default)]
    activity_type: Option<GarminActivityType>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GarminActivityType {
    type_key: String,
}

/// Profile settings; only the fields used for heart-rate scaling.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GarminUserSettings {
    user_data: GarminUserData,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GarminUserData {
    #[serde(default)]
    birth_date: Option<NaiveDate>,
}

impl GarminActivity {
    /// Entries with an unparseable start time are skipped.
    fn into_activity(self) -> Option<Activity> {
        let start_time = NaiveDateTime::parse_from_str(&self.start_time_gmt, "%Y-%m-%d %H:%M:%S")
            .map(|dt| dt.and_utc())
            .map_err(|e| {
                tracing::warn!(
                    activity_id = self.activity_id,
                    start = %self.start_time_gmt,
                    error = %e,
                    "Skipping activity with invalid start time"
                );
            })
            .ok()?;

        Some(Activity {
            activity_id: self.activity_id,
            name: self.activity_name.unwrap_or_default(),
            activity_type: self
                .activity_type
                .map(|t| t.type_key)
                .unwrap_or_else(|| "unknown".to_string()),
            start_time,
            duration_secs: self.duration,
            distance_meters: self.distance,
            average_heart_rate: self.average_hr,
        })
    }
}

/// Upload/update body for a running workout.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GarminWorkoutPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    workout_id: Option<u64>,
    workout_name: String,
    description: String,
    sport_type: SportTypeDto,
    workout_segments: Vec<SegmentDto>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
struct SportTypeDto {
    sport_type_id: u32,
    sport_type_key: &'static str,
}

const RUNNING: SportTypeDto = SportTypeDto {
    sport_type_id: 1,
    sport_type_key: "running",
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SegmentDto {
    segment_order: u32,
    sport_type: SportTypeDto,
    workout_steps: Vec<StepDto>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct StepDto {
    #[serde(rename = "type")]
    dto_type: &'static str,
    step_order: u32,
    step_type: StepTypeDto,
    end_condition: EndConditionDto,
    end_condition_value: f64,
    target_type: TargetTypeDto,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_value_one: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_value_two: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    zone_number: Option<u8>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
struct StepTypeDto {
    step_type_id: u32,
    step_type_key: &'static str,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
struct EndConditionDto {
    condition_type_id: u32,
    condition_type_key: &'static str,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
struct TargetTypeDto {
    workout_target_type_id: u32,
    workout_target_type_key: &'static str,
}

impl GarminWorkoutPayload {
    fn from_spec(
        spec: &WorkoutSpec,
        plan_id: PlanId,
        version: PlanVersion,
        workout_id: Option<u64>,
    ) -> Self {
        let tag = OwnerTag::for_spec(spec, plan_id, version);

        // Steady and long runs are one step throughout.
        let default_step;
        let steps: &[WorkoutStep] = if spec.steps.is_empty() {
            default_step = [WorkoutStep {
                kind: match spec.workout_type {
                    WorkoutType::Rest => StepKind::Rest,
                    _ => StepKind::Interval,
                },
                volume: spec.volume,
                target: spec.target,
            }];
            &default_step
        } else {
            &spec.steps
        };

        Self {
            workout_id,
            workout_name: spec.display_name().to_string(),
            description: tag_description(&spec.description, &tag),
            sport_type: RUNNING,
            workout_segments: vec![SegmentDto {
                segment_order: 1,
                sport_type: RUNNING,
                workout_steps: steps
                    .iter()
                    .enumerate()
                    .map(|(i, step)| StepDto::from_step(i as u32 + 1, step))
                    .collect(),
            }],
        }
    }
}

impl StepDto {
    fn from_step(step_order: u32, step: &WorkoutStep) -> Self {
        let step_type = match step.kind {
            StepKind::Warmup => StepTypeDto {
                step_type_id: 1,
                step_type_key: "warmup",
            },
            StepKind::Cooldown => StepTypeDto {
                step_type_id: 2,
                step_type_key: "cooldown",
            },
            StepKind::Interval => StepTypeDto {
                step_type_id: 3,
                step_type_key: "interval",
            },
            StepKind::Recovery => StepTypeDto {
                step_type_id: 4,
                step_type_key: "recovery",
            },
            StepKind::Rest => StepTypeDto {
                step_type_id: 5,
                step_type_key: "rest",
            },
        };

        let (end_condition, end_condition_value) = match step.volume {
            Volume::Duration { seconds } => (
                EndConditionDto {
                    condition_type_id: 2,
                    condition_type_key: "time",
                },
                f64::from(seconds),
            ),
            Volume::Distance { meters } => (
                EndConditionDto {
                    condition_type_id: 3,
                    condition_type_key: "distance",
                },
                f64::from(meters),
            ),
        };

        let (target_type, target_value_one, target_value_two, zone_number) = match step.target {
            TargetMetric::None => (
                TargetTypeDto {
                    workout_target_type_id: 1,
                    workout_target_type_key: "no.target",
                },
                None,
                None,
                None,
            ),
            TargetMetric::CadenceRange { low_spm, high_spm } => (
                TargetTypeDto {
                    workout_target_type_id: 3,
                    workout_target_type_key: "cadence",
                },
                Some(f64::from(low_spm)),
                Some(f64::from(high_spm)),
                None,
            ),
            TargetMetric::HeartRateZone { zone } => (
                TargetTypeDto {
                    workout_target_type_id: 4,
                    workout_target_type_key: "heart.rate.zone",
                },
                None,
                None,
                Some(zone),
            ),
            // Speeds in m/s, faster bound first.
            TargetMetric::PaceRange {
                slow_secs_per_km,
                fast_secs_per_km,
            } => (
                TargetTypeDto {
                    workout_target_type_id: 6,
                    workout_target_type_key: "pace.zone",
                },
                Some(pace_to_speed(fast_secs_per_km)),
                Some(pace_to_speed(slow_secs_per_km)),
                None,
            ),
        };

        Self {
            dto_type: "ExecutableStepDTO",
            step_order,
            step_type,
            end_condition,
            end_condition_value,
            target_type,
            target_value_one,
            target_value_two,
            zone_number,
        }
    }
}

/// Seconds per kilometre to metres per second.
fn pace_to_speed(secs_per_km: u32) -> f64 {
    if secs_per_km == 0 {
        return 0.0;
    }
    1000.0 / f64::from(secs_per_km)
}

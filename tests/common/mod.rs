// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use plan_sync::config::Config;
use plan_sync::models::{Activity, TargetMetric, Volume, WorkoutSpec, WorkoutType};
use plan_sync::routes::create_router;
use plan_sync::services::{InMemoryGateway, PlanSynchronizer, TrainingLoadCalculator};
use plan_sync::AppState;
use std::sync::Arc;

/// Parse a `YYYY-MM-DD` date.
#[allow(dead_code)]
pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("valid date")
}

/// A workout spec with a heart-rate zone 2 target.
#[allow(dead_code)]
pub fn workout(d: &str, workout_type: WorkoutType, minutes: u32) -> WorkoutSpec {
    WorkoutSpec {
        scheduled_date: date(d),
        workout_type,
        target: TargetMetric::HeartRateZone { zone: 2 },
        volume: Volume::Duration {
            seconds: minutes * 60,
        },
        description: format!("{} minutes {}", minutes, workout_type),
        name: None,
        steps: vec![],
    }
}

/// Three workouts in the week of 2026-10-19.
#[allow(dead_code)]
pub fn three_workouts() -> Vec<WorkoutSpec> {
    vec![
        workout("2026-10-20", WorkoutType::Easy, 40),
        workout("2026-10-22", WorkoutType::Tempo, 45),
        workout("2026-10-25", WorkoutType::Long, 90),
    ]
}

/// Noon UTC on the given day.
#[allow(dead_code)]
pub fn noon(d: &str) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date(d).and_hms_opt(12, 0, 0).expect("valid time"))
}

/// A run of `minutes` at `hr` bpm, `days_before` days before `as_of`.
#[allow(dead_code)]
pub fn run(id: u64, as_of: DateTime<Utc>, days_before: i64, minutes: f64, hr: Option<f64>) -> Activity {
    Activity {
        activity_id: id,
        name: format!("Run {}", id),
        activity_type: "running".to_string(),
        start_time: as_of - Duration::days(days_before),
        duration_secs: minutes * 60.0,
        distance_meters: minutes * 180.0,
        average_heart_rate: hr,
    }
}

/// Create a test app backed by an in-memory gateway.
/// Returns the router, the shared state and the gateway.
#[allow(dead_code)]
pub fn create_test_app() -> (axum::Router, Arc<AppState>, Arc<InMemoryGateway>) {
    create_test_app_with_activities(Vec::new())
}

#[allow(dead_code)]
pub fn create_test_app_with_activities(
    activities: Vec<Activity>,
) -> (axum::Router, Arc<AppState>, Arc<InMemoryGateway>) {
    let config = Config::default();
    let gateway = Arc::new(InMemoryGateway::with_activities(activities));

    let state = Arc::new(AppState {
        synchronizer: PlanSynchronizer::new(gateway.clone())
            .with_max_concurrency(config.sync_max_concurrency),
        history: gateway.clone(),
        calculator: TrainingLoadCalculator::from_config(&config),
        config,
    });

    (create_router(state.clone()), state, gateway)
}

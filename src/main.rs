// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Plan-Sync API Server
//!
//! Publishes versioned training plans to Garmin Connect and reports
//! training load from the athlete's activity history.

use plan_sync::{
    config::Config,
    services::{GarminClient, PlanSynchronizer, TrainingLoadCalculator},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting Plan-Sync API");

    // One client serves both workouts and activity history
    let garmin = Arc::new(GarminClient::from_config(&config));
    tracing::info!(base_url = %config.garmin_api_base_url, "Garmin client initialized");

    let synchronizer =
        PlanSynchronizer::new(garmin.clone()).with_max_concurrency(config.sync_max_concurrency);
    let calculator = TrainingLoadCalculator::from_config(&config);
    tracing::info!(
        acute_days = config.acute_window_days,
        chronic_days = config.chronic_window_days,
        ramp_threshold = config.ramp_ratio_threshold,
        "Load calculator configured"
    );

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        synchronizer,
        history: garmin,
        calculator,
    });

    // Build router
    let app = plan_sync::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("plan_sync=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Historical activity model (read-only, fetched from the activity history).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A completed activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Garmin activity ID
    pub activity_id: u64,
    /// Activity name/title
    pub name: String,
    /// Activity type key (running, trail_running, cycling, etc.)
    pub activity_type: String,
    /// Start time (UTC)
    pub start_time: DateTime<Utc>,
    /// Moving duration in seconds
    pub duration_secs: f64,
    /// Distance in meters
    pub distance_meters: f64,
    /// Average heart rate in bpm, if recorded
    pub average_heart_rate: Option<f64>,
}

impl Activity {
    pub fn duration_minutes(&self) -> f64 {
        self.duration_secs.max(0.0) / 60.0
    }
}

/// Athlete settings read from the platform profile. Missing values fall back
/// to configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AthleteProfile {
    pub birth_date: Option<NaiveDate>,
    /// Measured resting heart rate in bpm
    pub resting_heart_rate: Option<f64>,
    /// Measured maximum heart rate in bpm
    pub max_heart_rate: Option<f64>,
}

impl AthleteProfile {
    /// Age in whole years on `date`.
    pub fn age_on(&self, date: NaiveDate) -> Option<u32> {
        self.birth_date.and_then(|birth| date.years_since(birth))
    }
}

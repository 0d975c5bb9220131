// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Training-load values derived from activity history.
//!
//! These are recomputed from the activity window on every request and never
//! persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Load score of one activity, anchored to its start time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadSample {
    timestamp: DateTime<Utc>,
    activity_id: u64,
    score: f64,
}

impl LoadSample {
    /// Negative or non-finite scores are stored as 0.
    pub fn new(timestamp: DateTime<Utc>, activity_id: u64, score: f64) -> Self {
        let score = if score.is_finite() { score.max(0.0) } else { 0.0 };
        Self {
            timestamp,
            activity_id,
            score,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn activity_id(&self) -> u64 {
        self.activity_id
    }

    pub fn score(&self) -> f64 {
        self.score
    }
}

/// Rolling acute/chronic load as of a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadState {
    pub as_of: DateTime<Utc>,
    pub acute_window_days: u32,
    pub chronic_window_days: u32,
    /// Average daily load over the acute window.
    pub acute_load: f64,
    /// Average daily load over the chronic window.
    pub chronic_load: f64,
    /// `acute / chronic`; `None` when there is no chronic load ("no data").
    pub ramp_ratio: Option<f64>,
    pub ramp_threshold: f64,
    /// Ramp ratio above threshold. A signal for callers; nothing acts on it here.
    pub threshold_breached: bool,
    /// Per-activity samples inside the chronic window, oldest first.
    pub samples: Vec<LoadSample>,
}

impl LoadState {
    /// Distinguishes "no history" from "history with zero load".
    pub fn has_history(&self) -> bool {
        !self.samples.is_empty()
    }
}

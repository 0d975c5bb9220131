// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Training-load calculator.
//!
//! Turns an ascending sequence of activities into per-activity load samples
//! (Banister TRIMP) and rolling acute/chronic averages:
//! - acute load: average daily load over the short window (default 7 days)
//! - chronic load: average daily load over the long window (default 28 days)
//! - ramp ratio: acute / chronic, undefined when chronic is 0
//!
//! Pure and deterministic: no I/O, no clock reads.

use crate::config::Config;
use crate::models::{Activity, AthleteProfile, LoadSample, LoadState};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::collections::VecDeque;

/// Heart-rate reserve fraction assumed when an activity has no heart rate.
const DEFAULT_HRR: f64 = 0.5;
/// Banister TRIMP weighting constants.
const TRIMP_A: f64 = 0.64;
const TRIMP_B: f64 = 1.92;

/// Errors from load computation.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum LoadError {
    #[error("Activities must be sorted ascending by start time (out of order at index {index})")]
    Unordered { index: usize },
}

impl From<LoadError> for crate::error::AppError {
    fn from(err: LoadError) -> Self {
        // History sources return sorted data; anything else is a bug upstream.
        crate::error::AppError::Internal(anyhow::anyhow!(err))
    }
}

/// Resting and maximum heart rate used to scale effort.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeartRateProfile {
    pub resting: f64,
    pub max: f64,
}

impl Default for HeartRateProfile {
    fn default() -> Self {
        Self {
            resting: 60.0,
            max: 190.0,
        }
    }
}

impl HeartRateProfile {
    /// Configured values, with built-in defaults for anything unset.
    pub fn from_config(config: &Config) -> Self {
        Self::resolve(&AthleteProfile::default(), config, NaiveDate::MIN)
    }

    /// Measured profile values win over configured ones. A max still
    /// missing is estimated from age (208 - 0.7 * age) when the birth date
    /// is known on `today`.
    pub fn resolve(athlete: &AthleteProfile, config: &Config, today: NaiveDate) -> Self {
        let defaults = Self::default();
        let resting = athlete
            .resting_heart_rate
            .or(config.resting_heart_rate)
            .unwrap_or(defaults.resting);
        let max = athlete
            .max_heart_rate
            .or(config.max_heart_rate)
            .or_else(|| athlete.age_on(today).map(|age| 208.0 - 0.7 * f64::from(age)))
            .unwrap_or(defaults.max);
        Self { resting, max }
    }
}

/// Computes load metrics from activity history.
#[derive(Debug, Clone)]
pub struct TrainingLoadCalculator {
    acute_days: u32,
    chronic_days: u32,
    ramp_threshold: f64,
    heart_rate: HeartRateProfile,
}

impl TrainingLoadCalculator {
    /// Create with default windows (7/28 days) and threshold 1.5.
    pub fn new() -> Self {
        Self {
            acute_days: 7,
            chronic_days: 28,
            ramp_threshold: 1.5,
            heart_rate: HeartRateProfile::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new()
            .with_windows(config.acute_window_days, config.chronic_window_days)
            .with_ramp_threshold(config.ramp_ratio_threshold)
            .with_heart_rate(HeartRateProfile::from_config(config))
    }

    /// Windows are clamped to at least one day, with chronic >= acute.
    pub fn with_windows(mut self, acute_days: u32, chronic_days: u32) -> Self {
        self.acute_days = acute_days.max(1);
        self.chronic_days = chronic_days.max(self.acute_days);
        self
    }

    pub fn with_ramp_threshold(mut self, threshold: f64) -> Self {
        self.ramp_threshold = threshold;
        self
    }

    pub fn with_heart_rate(mut self, profile: HeartRateProfile) -> Self {
        self.heart_rate = profile;
        self
    }

    pub fn heart_rate(&self) -> HeartRateProfile {
        self.heart_rate
    }

    /// The longest window; history older than this is irrelevant.
    pub fn lookback(&self) -> Duration {
        Duration::days(i64::from(self.chronic_days))
    }

    /// Load score for one activity. Never negative; increases with duration
    /// at fixed intensity and with intensity at fixed duration.
    pub fn score(&self, activity: &Activity) -> f64 {
        let hrr = activity
            .average_heart_rate
            .filter(|hr| hr.is_finite())
            .map(|hr| self.heart_rate_reserve(hr))
            .unwrap_or(DEFAULT_HRR);

        activity.duration_minutes() * hrr * TRIMP_A * (TRIMP_B * hrr).exp()
    }

    fn heart_rate_reserve(&self, average_hr: f64) -> f64 {
        let reserve = self.heart_rate.max - self.heart_rate.resting;
        if reserve <= 0.0 {
            return DEFAULT_HRR;
        }
        ((average_hr - self.heart_rate.resting) / reserve).max(0.0)
    }

    /// Compute the load state as of `as_of`.
    ///
    /// `activities` must be sorted ascending by start time. Activities older
    /// than the chronic window, or starting after `as_of`, are ignored.
    pub fn compute_load(
        &self,
        activities: &[Activity],
        as_of: DateTime<Utc>,
    ) -> Result<LoadState, LoadError> {
        if let Some(index) = activities
            .windows(2)
            .position(|pair| pair[1].start_time < pair[0].start_time)
        {
            return Err(LoadError::Unordered { index: index + 1 });
        }

        let mut window = LoadWindow::new(self.lookback());
        for activity in activities.iter().filter(|a| a.start_time <= as_of) {
            window.push(LoadSample::new(
                activity.start_time,
                activity.activity_id,
                self.score(activity),
            ));
        }
        window.evict_before(as_of - self.lookback());

        let acute_cutoff = as_of - Duration::days(i64::from(self.acute_days));
        let acute_total = window.total_since(acute_cutoff);
        let chronic_total = window.total_since(as_of - self.lookback());

        let acute_load = acute_total / f64::from(self.acute_days);
        let chronic_load = chronic_total / f64::from(self.chronic_days);
        let ramp_ratio = (chronic_load > 0.0).then(|| acute_load / chronic_load);
        let threshold_breached = ramp_ratio.is_some_and(|r| r > self.ramp_threshold);

        if threshold_breached {
            tracing::info!(
                ramp_ratio = ?ramp_ratio,
                threshold = self.ramp_threshold,
                "Ramp ratio above threshold"
            );
        }

        Ok(LoadState {
            as_of,
            acute_window_days: self.acute_days,
            chronic_window_days: self.chronic_days,
            acute_load,
            chronic_load,
            ramp_ratio,
            ramp_threshold: self.ramp_threshold,
            threshold_breached,
            samples: window.into_samples(),
        })
    }
}

impl Default for TrainingLoadCalculator {
    fn default() -> Self {
        Self::new()
    }
}

/// Time-ordered buffer of samples bounded by a span.
struct LoadWindow {
    span: Duration,
    samples: VecDeque<LoadSample>,
}

impl LoadWindow {
    fn new(span: Duration) -> Self {
        Self {
            span,
            samples: VecDeque::new(),
        }
    }

    /// Push a sample; samples older than `span` before it fall out.
    fn push(&mut self, sample: LoadSample) {
        self.evict_before(sample.timestamp() - self.span);
        self.samples.push_back(sample);
    }

    /// Drop samples at or before `cutoff`.
    fn evict_before(&mut self, cutoff: DateTime<Utc>) {
        while self
            .samples
            .front()
            .is_some_and(|s| s.timestamp() <= cutoff)
        {
            self.samples.pop_front();
        }
    }

    fn total_since(&self, cutoff: DateTime<Utc>) -> f64 {
        self.samples
            .iter()
            .rev()
            .take_while(|s| s.timestamp() > cutoff)
            .map(LoadSample::score)
            .sum()
    }

    fn into_samples(self) -> Vec<LoadSample> {
        self.samples.into()
    }
}

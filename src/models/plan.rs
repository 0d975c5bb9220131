// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Training plan model.
//!
//! A [`Plan`] is an ordered set of [`WorkoutSpec`]s sharing one `plan_id` and
//! stamped with the [`PlanVersion`] of the generation or modification pass
//! that produced it. Plans are never mutated in place: a modification always
//! produces a new value with the same id and the next version.

use crate::error::AppError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Hex characters kept from the SHA-256 content digest.
const FINGERPRINT_LEN: usize = 16;

/// Stable identifier of a plan across all of its versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanId(Uuid);

impl PlanId {
    /// Allocate a fresh plan id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlanId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for PlanId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for PlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for PlanId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Monotonically increasing generation counter, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct PlanVersion(u32);

impl PlanVersion {
    pub const INITIAL: PlanVersion = PlanVersion(1);

    /// Returns `None` for 0; versions start at 1.
    pub fn new(version: u32) -> Option<Self> {
        (version >= 1).then_some(Self(version))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl TryFrom<u32> for PlanVersion {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| "plan version must be at least 1".to_string())
    }
}

impl From<PlanVersion> for u32 {
    fn from(version: PlanVersion) -> Self {
        version.0
    }
}

impl fmt::Display for PlanVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Kind of planned session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkoutType {
    Easy,
    Interval,
    Tempo,
    Long,
    Recovery,
    Rest,
}

impl WorkoutType {
    pub const ALL: [WorkoutType; 6] = [
        WorkoutType::Easy,
        WorkoutType::Interval,
        WorkoutType::Tempo,
        WorkoutType::Long,
        WorkoutType::Recovery,
        WorkoutType::Rest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkoutType::Easy => "easy",
            WorkoutType::Interval => "interval",
            WorkoutType::Tempo => "tempo",
            WorkoutType::Long => "long",
            WorkoutType::Recovery => "recovery",
            WorkoutType::Rest => "rest",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    /// Human readable default workout name.
    pub fn display_name(&self) -> &'static str {
        match self {
            WorkoutType::Easy => "Easy Run",
            WorkoutType::Interval => "Intervals",
            WorkoutType::Tempo => "Tempo Run",
            WorkoutType::Long => "Long Run",
            WorkoutType::Recovery => "Recovery Run",
            WorkoutType::Rest => "Rest Day",
        }
    }
}

impl fmt::Display for WorkoutType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a workout within a plan: one workout per type per day.
///
/// The platform offers no native identifier we can set on a workout, so
/// matching falls back to date plus type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkoutKey {
    pub scheduled_date: NaiveDate,
    pub workout_type: WorkoutType,
}

impl fmt::Display for WorkoutKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scheduled_date, self.workout_type)
    }
}

/// Intensity target for a workout or step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetMetric {
    #[default]
    None,
    HeartRateZone {
        zone: u8,
    },
    /// Pace bounds in seconds per kilometre (`fast` is the smaller number).
    PaceRange {
        slow_secs_per_km: u32,
        fast_secs_per_km: u32,
    },
    CadenceRange {
        low_spm: u32,
        high_spm: u32,
    },
}

impl TargetMetric {
    fn validate(&self) -> Result<(), String> {
        match *self {
            TargetMetric::None => Ok(()),
            TargetMetric::HeartRateZone { zone } if (1..=5).contains(&zone) => Ok(()),
            TargetMetric::HeartRateZone { zone } => {
                Err(format!("heart rate zone must be 1-5, got {}", zone))
            }
            TargetMetric::PaceRange {
                slow_secs_per_km,
                fast_secs_per_km,
            } if fast_secs_per_km > 0 && fast_secs_per_km <= slow_secs_per_km => Ok(()),
            TargetMetric::PaceRange { .. } => {
                Err("pace range must be positive with fast <= slow".to_string())
            }
            TargetMetric::CadenceRange { low_spm, high_spm } if low_spm > 0 && low_spm <= high_spm => {
                Ok(())
            }
            TargetMetric::CadenceRange { .. } => {
                Err("cadence range must be positive with low <= high".to_string())
            }
        }
    }
}

/// How long a workout or step lasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "unit", rename_all = "snake_case")]
pub enum Volume {
    Duration { seconds: u32 },
    Distance { meters: u32 },
}

impl Volume {
    fn validate(&self) -> Result<(), String> {
        match *self {
            Volume::Duration { seconds: 0 } => Err("duration must be positive".to_string()),
            Volume::Distance { meters: 0 } => Err("distance must be positive".to_string()),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Warmup,
    Interval,
    Recovery,
    Cooldown,
    Rest,
}

/// One structured step inside a workout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkoutStep {
    pub kind: StepKind,
    pub volume: Volume,
    #[serde(default)]
    pub target: TargetMetric,
}

/// One planned session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkoutSpec {
    pub scheduled_date: NaiveDate,
    pub workout_type: WorkoutType,
    #[serde(default)]
    pub target: TargetMetric,
    pub volume: Volume,
    #[serde(default)]
    pub description: String,
    /// Display name; defaults to the workout type's name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Structured steps. Empty means one step spanning the whole volume.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<WorkoutStep>,
}

/// The part of a spec that counts as "content" for change detection.
#[derive(Serialize)]
struct ContentView<'a> {
    name: &'a str,
    target: &'a TargetMetric,
    volume: &'a Volume,
    description: &'a str,
    steps: &'a [WorkoutStep],
}

impl WorkoutSpec {
    pub fn key(&self) -> WorkoutKey {
        WorkoutKey {
            scheduled_date: self.scheduled_date,
            workout_type: self.workout_type,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| self.workout_type.display_name())
    }

    /// Short digest of the content fields (target, volume, description,
    /// steps, name). Key and version are excluded.
    pub fn fingerprint(&self) -> String {
        let view = ContentView {
            name: self.display_name(),
            target: &self.target,
            volume: &self.volume,
            description: self.description.trim(),
            steps: &self.steps,
        };
        // Plain data with string keys; serialization cannot fail.
        let canonical = serde_json::to_vec(&view).unwrap_or_default();
        let digest = Sha256::digest(&canonical);
        let mut hex = hex::encode(digest);
        hex.truncate(FINGERPRINT_LEN);
        hex
    }

    /// Check the semantic content of this workout.
    pub fn validate(&self) -> Result<(), AppError> {
        let invalid = |msg: String| AppError::BadRequest(format!("workout {}: {}", self.key(), msg));

        self.target.validate().map_err(invalid)?;
        self.volume.validate().map_err(invalid)?;
        for (i, step) in self.steps.iter().enumerate() {
            step.target
                .validate()
                .and_then(|_| step.volume.validate())
                .map_err(|e| invalid(format!("step {}: {}", i + 1, e)))?;
        }
        Ok(())
    }
}

/// A versioned training plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    plan_id: PlanId,
    version: PlanVersion,
    workouts: Vec<WorkoutSpec>,
}

impl Plan {
    /// Build a brand-new plan: fresh id, version 1.
    pub fn from_generation(workouts: Vec<WorkoutSpec>) -> Result<Self, AppError> {
        Self::checked(PlanId::new(), PlanVersion::INITIAL, workouts)
    }

    /// Build the next version of an existing plan: same id, version + 1.
    pub fn derive_modification(
        existing: &Plan,
        workouts: Vec<WorkoutSpec>,
    ) -> Result<Self, AppError> {
        Self::checked(existing.plan_id, existing.version.next(), workouts)
    }

    /// Assemble a plan without validation. Reconciliation validates before
    /// touching the remote platform.
    pub fn from_parts(plan_id: PlanId, version: PlanVersion, workouts: Vec<WorkoutSpec>) -> Self {
        Self {
            plan_id,
            version,
            workouts,
        }
    }

    fn checked(
        plan_id: PlanId,
        version: PlanVersion,
        mut workouts: Vec<WorkoutSpec>,
    ) -> Result<Self, AppError> {
        workouts.sort_by_key(WorkoutSpec::key);
        let plan = Self::from_parts(plan_id, version, workouts);
        plan.validate()?;
        Ok(plan)
    }

    pub fn plan_id(&self) -> PlanId {
        self.plan_id
    }

    pub fn version(&self) -> PlanVersion {
        self.version
    }

    pub fn workouts(&self) -> &[WorkoutSpec] {
        &self.workouts
    }

    /// Duplicate keys are an integrity error; bad content is a bad request.
    pub fn validate(&self) -> Result<(), AppError> {
        let mut seen = HashSet::with_capacity(self.workouts.len());
        for spec in &self.workouts {
            if !seen.insert(spec.key()) {
                return Err(AppError::PlanIntegrity(format!(
                    "plan {} v{} contains more than one workout for {}",
                    self.plan_id,
                    self.version,
                    spec.key()
                )));
            }
        }
        self.workouts.iter().try_for_each(WorkoutSpec::validate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn spec(d: &str, workout_type: WorkoutType, minutes: u32) -> WorkoutSpec {
        WorkoutSpec {
            scheduled_date: date(d),
            workout_type,
            target: TargetMetric::HeartRateZone { zone: 2 },
            volume: Volume::Duration {
                seconds: minutes * 60,
            },
            description: String::new(),
            name: None,
            steps: vec![],
        }
    }

    #[test]
    fn test_from_generation_starts_at_version_one() {
        let plan = Plan::from_generation(vec![spec("2026-10-20", WorkoutType::Easy, 40)]).unwrap();
        assert_eq!(plan.version(), PlanVersion::INITIAL);
        assert_eq!(plan.workouts().len(), 1);
    }

    #[test]
    fn test_derive_modification_keeps_id_and_bumps_version() {
        let v1 = Plan::from_generation(vec![spec("2026-10-20", WorkoutType::Easy, 40)]).unwrap();
        let v2 =
            Plan::derive_modification(&v1, vec![spec("2026-10-20", WorkoutType::Easy, 50)]).unwrap();

        assert_eq!(v2.plan_id(), v1.plan_id());
        assert_eq!(v2.version().get(), 2);
        // The original value is untouched.
        assert_eq!(v1.version().get(), 1);
        assert_eq!(
            v1.workouts()[0].volume,
            Volume::Duration { seconds: 40 * 60 }
        );
    }

    #[test]
    fn test_duplicate_key_is_integrity_error() {
        let result = Plan::from_generation(vec![
            spec("2026-10-20", WorkoutType::Tempo, 40),
            spec("2026-10-20", WorkoutType::Tempo, 30),
        ]);
        assert!(matches!(result, Err(AppError::PlanIntegrity(_))));
    }

    #[test]
    fn test_same_date_different_type_is_allowed() {
        let plan = Plan::from_generation(vec![
            spec("2026-10-20", WorkoutType::Easy, 40),
            spec("2026-10-20", WorkoutType::Recovery, 20),
        ]);
        assert!(plan.is_ok());
    }

    #[test]
    fn test_invalid_zone_is_bad_request() {
        let mut bad = spec("2026-10-20", WorkoutType::Easy, 40);
        bad.target = TargetMetric::HeartRateZone { zone: 6 };
        let result = Plan::from_generation(vec![bad]);
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_inverted_pace_range_is_bad_request() {
        let mut bad = spec("2026-10-20", WorkoutType::Tempo, 40);
        bad.target = TargetMetric::PaceRange {
            slow_secs_per_km: 240,
            fast_secs_per_km: 300,
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_zero_volume_step_is_bad_request() {
        let mut bad = spec("2026-10-20", WorkoutType::Interval, 40);
        bad.steps = vec![WorkoutStep {
            kind: StepKind::Warmup,
            volume: Volume::Distance { meters: 0 },
            target: TargetMetric::None,
        }];
        assert!(matches!(bad.validate(), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn test_version_zero_rejected_on_deserialize() {
        let result: std::result::Result<PlanVersion, _> = serde_json::from_str("0");
        assert!(result.is_err());
        let ok: PlanVersion = serde_json::from_str("3").unwrap();
        assert_eq!(ok.get(), 3);
    }

    #[test]
    fn test_fingerprint_tracks_content_not_key() {
        let a = spec("2026-10-20", WorkoutType::Easy, 40);
        let mut moved = a.clone();
        moved.scheduled_date = date("2026-10-21");
        assert_eq!(a.fingerprint(), moved.fingerprint());

        let longer = spec("2026-10-20", WorkoutType::Easy, 45);
        assert_ne!(a.fingerprint(), longer.fingerprint());
        assert_eq!(a.fingerprint().len(), FINGERPRINT_LEN);
    }

    #[test]
    fn test_workout_type_round_trips_through_str() {
        for t in WorkoutType::ALL {
            assert_eq!(WorkoutType::parse(t.as_str()), Some(t));
        }
        assert_eq!(WorkoutType::parse("sprint"), None);
    }
}

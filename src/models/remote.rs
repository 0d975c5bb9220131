// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Remote workout representation and ownership tags.
//!
//! Garmin Connect workouts have no custom metadata fields, so ownership is
//! recorded as a marker line at the end of the workout description. A workout
//! without a parseable marker was authored by the user and is never touched.

use crate::models::plan::{PlanId, PlanVersion, WorkoutKey, WorkoutSpec, WorkoutType};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker that starts the ownership line in a workout description.
pub const OWNER_TAG_MARKER: &str = "[plan-sync]";

/// Opaque identifier assigned by the remote platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(String);

impl RemoteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ownership and version metadata embedded in a system-created workout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerTag {
    pub plan_id: PlanId,
    pub plan_version: PlanVersion,
    pub key: WorkoutKey,
    /// Content fingerprint of the spec this workout was written from.
    pub fingerprint: String,
}

impl OwnerTag {
    pub fn for_spec(spec: &WorkoutSpec, plan_id: PlanId, plan_version: PlanVersion) -> Self {
        Self {
            plan_id,
            plan_version,
            key: spec.key(),
            fingerprint: spec.fingerprint(),
        }
    }

    /// Render as a single description line.
    pub fn encode(&self) -> String {
        format!(
            "{} plan={} v={} date={} type={} sum={}",
            OWNER_TAG_MARKER,
            self.plan_id,
            self.plan_version,
            self.key.scheduled_date,
            self.key.workout_type,
            self.fingerprint
        )
    }

    /// Parse a single line produced by [`OwnerTag::encode`].
    pub fn parse(line: &str) -> Option<Self> {
        let rest = line.trim().strip_prefix(OWNER_TAG_MARKER)?;

        let mut plan_id = None;
        let mut plan_version = None;
        let mut date = None;
        let mut workout_type = None;
        let mut fingerprint = None;

        for field in rest.split_whitespace() {
            let (name, value) = field.split_once('=')?;
            match name {
                "plan" => plan_id = value.parse::<PlanId>().ok(),
                "v" => plan_version = value.parse::<u32>().ok().and_then(PlanVersion::new),
                "date" => date = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok(),
                "type" => workout_type = WorkoutType::parse(value),
                "sum" if !value.is_empty() => fingerprint = Some(value.to_string()),
                _ => {}
            }
        }

        Some(Self {
            plan_id: plan_id?,
            plan_version: plan_version?,
            key: WorkoutKey {
                scheduled_date: date?,
                workout_type: workout_type?,
            },
            fingerprint: fingerprint?,
        })
    }

    /// Find the ownership line in a description (the last marker line wins).
    pub fn find_in(description: &str) -> Option<Self> {
        description
            .lines()
            .rev()
            .find(|line| line.trim_start().starts_with(OWNER_TAG_MARKER))
            .and_then(Self::parse)
    }
}

/// Append the ownership line to a user-facing description.
pub fn tag_description(description: &str, tag: &OwnerTag) -> String {
    let body = strip_tag(description);
    if body.is_empty() {
        tag.encode()
    } else {
        format!("{}\n\n{}", body, tag.encode())
    }
}

/// Description text without any ownership line.
pub fn strip_tag(description: &str) -> &str {
    match description.find(OWNER_TAG_MARKER) {
        Some(idx) => description[..idx].trim_end(),
        None => description.trim_end(),
    }
}

/// A workout as it exists on the remote platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteWorkout {
    pub remote_id: RemoteId,
    pub name: String,
    /// `None` marks a user-authored workout.
    pub owner_tag: Option<OwnerTag>,
}

impl RemoteWorkout {
    pub fn is_owned_by(&self, plan_id: PlanId) -> bool {
        self.plan_id() == Some(plan_id)
    }

    pub fn plan_id(&self) -> Option<PlanId> {
        self.owner_tag.as_ref().map(|t| t.plan_id)
    }

    pub fn plan_version(&self) -> Option<PlanVersion> {
        self.owner_tag.as_ref().map(|t| t.plan_version)
    }

    pub fn key(&self) -> Option<WorkoutKey> {
        self.owner_tag.as_ref().map(|t| t.key)
    }

    /// True when this owned workout was written from content equal to `spec`.
    pub fn matches_content(&self, spec: &WorkoutSpec) -> bool {
        self.owner_tag
            .as_ref()
            .is_some_and(|t| t.fingerprint == spec.fingerprint())
    }
}

/// Observed lifecycle state of one plan on the remote platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PlanState {
    Absent,
    Published {
        version: PlanVersion,
    },
    Stale {
        current: PlanVersion,
        desired: PlanVersion,
    },
}

impl PlanState {
    /// Classify a plan whose confirmed version is `current`.
    pub fn classify(current: Option<PlanVersion>, desired: Option<PlanVersion>) -> Self {
        let Some(current) = current else {
            return PlanState::Absent;
        };

        match desired {
            Some(desired) if desired > current => PlanState::Stale { current, desired },
            _ => PlanState::Published { version: current },
        }
    }
}

/// Highest version stamped on any of `owned`.
pub fn highest_version(owned: &[RemoteWorkout]) -> Option<PlanVersion> {
    owned.iter().filter_map(RemoteWorkout::plan_version).max()
}

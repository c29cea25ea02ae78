//! Classify review apps as active, idle, or gone.

use crate::error::Result;
use crate::platform::{ActivityApi, AppActivity};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Apps idle for longer than this many whole hours are reclaimed (5 days).
pub const DEFAULT_MAX_INACTIVE_HOURS: i64 = 5 * 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Liveness {
    /// Activity within the last hour, or no timestamp to judge by.
    Active,
    /// Whole hours since the last recorded activity.
    InactiveForHours(i64),
    NotFound,
}

impl Liveness {
    pub fn is_expired(&self, max_inactive_hours: i64) -> bool {
        match self {
            Liveness::NotFound => true,
            Liveness::InactiveForHours(h) => *h > max_inactive_hours,
            Liveness::Active => false,
        }
    }
}

impl std::fmt::Display for Liveness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Liveness::Active => write!(f, "active"),
            Liveness::InactiveForHours(h) => write!(f, "inactive for {h}h"),
            Liveness::NotFound => write!(f, "not found"),
        }
    }
}

/// Pure classification of an activity report at time `now`.
pub fn classify(activity: &AppActivity, now: DateTime<Utc>) -> Liveness {
    match activity {
        AppActivity::NotFound => Liveness::NotFound,
        AppActivity::Found { last_updated: None } => Liveness::Active,
        AppActivity::Found {
            last_updated: Some(at),
        } => {
            let hours = (now - *at).num_hours();
            if hours <= 0 {
                Liveness::Active
            } else {
                Liveness::InactiveForHours(hours)
            }
        }
    }
}

pub trait Probe {
    fn probe(&self, app: &str) -> Result<Liveness>;
}

/// [`Probe`] backed by an [`ActivityApi`] and a clock.
pub struct LivenessProber<A> {
    api: A,
    now: fn() -> DateTime<Utc>,
}

impl<A: ActivityApi> LivenessProber<A> {
    pub fn new(api: A) -> Self {
        Self { api, now: Utc::now }
    }

    pub fn with_clock(mut self, now: fn() -> DateTime<Utc>) -> Self {
        self.now = now;
        self
    }
}

impl<A: ActivityApi> Probe for LivenessProber<A> {
    fn probe(&self, app: &str) -> Result<Liveness> {
        let activity = self.api.query_app_activity(app)?;
        let liveness = classify(&activity, (self.now)());
        tracing::debug!(%app, %liveness, "probed");
        Ok(liveness)
    }
}

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

/// Upstream nodes whose liveness gates arming.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Display, EnumIter, serde::Serialize, serde::Deserialize)]
pub enum HeartbeatSource {
    Joystick,
    Pid,
    Altitude,
    StateEstimator,
}

impl HeartbeatSource {
    /// Operator-facing explanation logged when this source goes stale.
    pub fn failure_rationale(self) -> &'static str {
        match self {
            HeartbeatSource::Joystick => "not receiving flight commands. Check the 'Joystick' node",
            HeartbeatSource::Pid => "not receiving flight commands. Check the 'PID' node",
            HeartbeatSource::Altitude => "not receiving data from the IR sensor. Check the 'altitude' node",
            HeartbeatSource::StateEstimator => {
                "not receiving a state estimate. Check the 'state estimator' node"
            }
        }
    }
}

/// Last-seen timestamps for every [`HeartbeatSource`].
///
/// Every source starts out stamped with the monitor's creation time, so a source
/// that never reports is considered fresh until one threshold has elapsed.
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    last_seen: HashMap<HeartbeatSource, DateTime<Utc>>,
}

impl HeartbeatMonitor {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { last_seen: HeartbeatSource::iter().map(|s| (s, start)).collect() }
    }

    pub fn touch(&mut self, source: HeartbeatSource) { self.touch_at(source, Utc::now()); }

    /// Records `at` for `source`. Timestamps never move backwards.
    pub fn touch_at(&mut self, source: HeartbeatSource, at: DateTime<Utc>) {
        let entry = self.last_seen.entry(source).or_insert(at);
        if at > *entry {
            *entry = at;
        }
    }

    pub fn last_seen(&self, source: HeartbeatSource) -> Option<DateTime<Utc>> {
        self.last_seen.get(&source).copied()
    }

    /// Enabled sources whose last heartbeat is older than `threshold` at `now`.
    pub fn stale_sources<F>(&self, now: DateTime<Utc>, threshold: TimeDelta, enabled: F) -> Vec<HeartbeatSource>
    where F: Fn(HeartbeatSource) -> bool {
        HeartbeatSource::iter()
            .filter(|s| enabled(*s))
            .filter(|s| self.last_seen.get(s).is_none_or(|seen| now - *seen > threshold))
            .collect()
    }

    pub fn should_disarm<F>(&self, now: DateTime<Utc>, threshold: TimeDelta, enabled: F) -> bool
    where F: Fn(HeartbeatSource) -> bool {
        !self.stale_sources(now, threshold, enabled).is_empty()
    }
}

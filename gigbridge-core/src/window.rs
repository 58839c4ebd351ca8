//! Analytics time windows and the clock they are evaluated against

use crate::Timestamp;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::RwLock;

/// Trailing time range an analytics report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum AnalyticsWindow {
    #[serde(rename = "1d")]
    OneDay,
    #[default]
    #[serde(rename = "7d")]
    SevenDays,
    #[serde(rename = "30d")]
    ThirtyDays,
    #[serde(rename = "90d")]
    NinetyDays,
}

wire_enum!(AnalyticsWindow, "time range", {
    OneDay => "1d",
    SevenDays => "7d",
    ThirtyDays => "30d",
    NinetyDays => "90d",
});

impl AnalyticsWindow {
    pub fn days(&self) -> i64 {
        match self {
            AnalyticsWindow::OneDay => 1,
            AnalyticsWindow::SevenDays => 7,
            AnalyticsWindow::ThirtyDays => 30,
            AnalyticsWindow::NinetyDays => 90,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::days(self.days())
    }

    /// Start of the window relative to `now`. Never cached; recomputed per call.
    pub fn start(&self, now: Timestamp) -> Timestamp {
        now - self.duration()
    }

    /// `(start, end)` for a window ending at the clock's current instant.
    pub fn bounds(&self, clock: &dyn Clock) -> (Timestamp, Timestamp) {
        let now = clock.now();
        (self.start(now), now)
    }
}

/// Source of "now" for anything time-windowed.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Timestamp;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// Manually driven clock for tests and replays.
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<Timestamp>,
}

impl FixedClock {
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    pub fn set(&self, now: Timestamp) {
        let mut guard = self.now.write().unwrap_or_else(|e| e.into_inner());
        *guard = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.write().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}

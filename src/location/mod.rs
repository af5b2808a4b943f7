// src/location/mod.rs
//! Position stream adapter over a platform's continuous location updates
//!
//! A [`LocationPlatform`] pushes raw readings into a channel; the
//! [`PositionStream`] validates them into [`Position`]s and forwards them,
//! tagged with their subscription, to whoever owns the stream.

pub mod platform;
pub mod stream;

#[cfg(test)]
pub(crate) mod testing;

use crate::geo::Coordinate;
use crate::gps::RawFix;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;

pub use platform::{GpsdPlatform, ReplayPlatform, SerialPlatform};
pub use stream::{PositionStream, StreamEvent, StreamEventKind, SubscriptionId};

/// Conversion factor from m/s to km/h
pub const MPS_TO_KMH: f64 = 3.6;

/// Allowance for receiver clocks that report whole seconds or drift from the host
pub const FIX_CLOCK_TOLERANCE_MS: i64 = 2_000;

/// Classified failure of a location subscription
#[derive(Debug, Clone, PartialEq)]
pub enum PositionError {
    PermissionDenied,
    Unavailable(String),
    Timeout,
}

impl fmt::Display for PositionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionError::PermissionDenied => write!(f, "location permission denied"),
            PositionError::Unavailable(reason) => write!(f, "position unavailable: {}", reason),
            PositionError::Timeout => write!(f, "timed out waiting for a position fix"),
        }
    }
}

impl std::error::Error for PositionError {}

/// Options passed to the platform when a watch is opened
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchOptions {
    pub high_accuracy: bool,
    pub timeout_ms: u64,
    pub max_fix_age_ms: u64,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout_ms: 10_000,
            max_fix_age_ms: 0,
        }
    }
}

impl WatchOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn max_fix_age(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.max_fix_age_ms as i64)
    }
}

/// A validated fix. Only [`normalize`] constructs one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    latitude: f64,
    longitude: f64,
    speed_mps: Option<f64>,
    timestamp: DateTime<Utc>,
}

impl Position {
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn speed_mps(&self) -> Option<f64> {
        self.speed_mps
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }

    /// Speed in km/h, treating an unknown speed as standing still
    pub fn speed_kmh(&self) -> f64 {
        self.speed_mps.map_or(0.0, |mps| mps * MPS_TO_KMH)
    }
}

/// Validate a raw platform fix.
///
/// `watch_started` is when the subscription was opened; a fix taken more than
/// `max_fix_age` (plus [`FIX_CLOCK_TOLERANCE_MS`]) before that is a cached fix
/// and is rejected.
pub fn normalize(
    raw: RawFix,
    options: &WatchOptions,
    watch_started: DateTime<Utc>,
) -> std::result::Result<Position, PositionError> {
    if !raw.latitude.is_finite()
        || !raw.longitude.is_finite()
        || !(-90.0..=90.0).contains(&raw.latitude)
        || !(-180.0..=180.0).contains(&raw.longitude)
    {
        return Err(PositionError::Unavailable(format!(
            "invalid coordinates ({}, {})",
            raw.latitude, raw.longitude
        )));
    }

    let tolerance = chrono::Duration::milliseconds(FIX_CLOCK_TOLERANCE_MS);
    if raw.age_at(watch_started) > options.max_fix_age() + tolerance {
        return Err(PositionError::Unavailable(format!(
            "cached fix from {} is older than {} ms",
            raw.timestamp.format("%H:%M:%S%.3f"),
            options.max_fix_age_ms
        )));
    }

    let speed_mps = raw.speed_mps.filter(|s| s.is_finite() && *s >= 0.0);

    Ok(Position {
        latitude: raw.latitude,
        longitude: raw.longitude,
        speed_mps,
        timestamp: raw.timestamp,
    })
}

/// Platform-side handle of an open watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(pub u64);

/// Channel a platform pushes readings into
pub type FixSink = mpsc::UnboundedSender<std::result::Result<RawFix, PositionError>>;

/// The platform's continuous location capability
pub trait LocationPlatform {
    /// Open a watch that delivers readings into `sink` until cleared
    fn watch_position(
        &mut self,
        options: &WatchOptions,
        sink: FixSink,
    ) -> std::result::Result<WatchId, PositionError>;

    /// Cancel a watch; no further readings are sent for it
    fn clear_watch(&mut self, id: WatchId);
}

impl<P: LocationPlatform + ?Sized> LocationPlatform for Box<P> {
    fn watch_position(
        &mut self,
        options: &WatchOptions,
        sink: FixSink,
    ) -> std::result::Result<WatchId, PositionError> {
        (**self).watch_position(options, sink)
    }

    fn clear_watch(&mut self, id: WatchId) {
        (**self).clear_watch(id)
    }
}

// src/gps/fix.rs
//! Raw fixes as reported by a location platform

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One unvalidated position/speed report from a platform
#[derive(Debug, Clone, PartialEq)]
pub struct RawFix {
    pub latitude: f64,
    pub longitude: f64,
    pub speed_mps: Option<f64>, // m/s, None when the receiver has no velocity
    pub timestamp: DateTime<Utc>,
}

impl RawFix {
    /// Create a fix stamped with the current time
    pub fn now(latitude: f64, longitude: f64, speed_mps: Option<f64>) -> Self {
        Self {
            latitude,
            longitude,
            speed_mps,
            timestamp: Utc::now(),
        }
    }

    /// Create a fix stamped with the receiver's own fix time
    pub fn at(latitude: f64, longitude: f64, speed_mps: Option<f64>, timestamp: DateTime<Utc>) -> Self {
        Self {
            latitude,
            longitude,
            speed_mps,
            timestamp,
        }
    }

    /// Age of the fix relative to `reference`, zero when the fix is newer
    pub fn age_at(&self, reference: DateTime<Utc>) -> chrono::Duration {
        let age = reference.signed_duration_since(self.timestamp);
        if age < chrono::Duration::zero() {
            chrono::Duration::zero()
        } else {
            age
        }
    }
}

/// A fix stored in a replay file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedFix {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub speed_mps: Option<f64>,
}

impl RecordedFix {
    pub fn stamp_now(&self) -> RawFix {
        RawFix::now(self.latitude, self.longitude, self.speed_mps)
    }
}

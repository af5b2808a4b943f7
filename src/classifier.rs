// src/classifier.rs
//! Harsh acceleration and braking detection from the speed sequence
//!
//! Events are plain deltas between consecutive samples, with no smoothing or
//! minimum interval. Noisy low-rate fixes can therefore register as harsh
//! events.

use crate::error::{Result, TrackerError};
use serde::Serialize;

/// Speed gain between consecutive samples counted as rapid acceleration (km/h)
pub const ACCELERATION_THRESHOLD_KMH: f64 = 10.0;

/// Speed change between consecutive samples counted as hard braking (km/h)
pub const BRAKING_THRESHOLD_KMH: f64 = -15.0;

/// Input to the advice service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DrivingSummary {
    pub average_speed_kmh: f64,
    pub acceleration_events: u32,
    pub braking_events: u32,
    pub distance_km: f64,
}

/// Per-ride counters, fed one speed sample per fix
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrivingEventCounters {
    acceleration_events: u32,
    braking_events: u32,
    speed_samples: Vec<f64>,
}

impl DrivingEventCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build counters from a whole speed sequence
    pub fn from_samples(samples: &[f64]) -> Self {
        let mut counters = Self::new();
        for &speed in samples {
            counters.record(speed);
        }
        counters
    }

    /// Append a sample and classify it against its predecessor
    pub fn record(&mut self, speed_kmh: f64) {
        if let Some(&previous) = self.speed_samples.last() {
            let delta = speed_kmh - previous;
            if delta > ACCELERATION_THRESHOLD_KMH {
                self.acceleration_events += 1;
            }
            if delta < BRAKING_THRESHOLD_KMH {
                self.braking_events += 1;
            }
        }
        self.speed_samples.push(speed_kmh);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn acceleration_events(&self) -> u32 {
        self.acceleration_events
    }

    pub fn braking_events(&self) -> u32 {
        self.braking_events
    }

    pub fn speed_samples(&self) -> &[f64] {
        &self.speed_samples
    }

    /// Arithmetic mean of the samples, `None` when there are none
    pub fn average_speed(&self) -> Option<f64> {
        if self.speed_samples.is_empty() {
            return None;
        }
        Some(self.speed_samples.iter().sum::<f64>() / self.speed_samples.len() as f64)
    }

    /// Produce the ride summary and clear the counters.
    ///
    /// Rejects a ride with no distance or no samples; the counters are left
    /// untouched in that case.
    pub fn summarize(&mut self, distance_km: f64) -> Result<DrivingSummary> {
        if distance_km <= 0.0 {
            return Err(TrackerError::InsufficientData);
        }
        let average_speed_kmh = self.average_speed().ok_or(TrackerError::InsufficientData)?;

        let summary = DrivingSummary {
            average_speed_kmh,
            acceleration_events: self.acceleration_events,
            braking_events: self.braking_events,
            distance_km,
        };
        self.reset();
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_sequence() {
        // deltas: +15, -1, +21, -17
        let counters = DrivingEventCounters::from_samples(&[20.0, 35.0, 34.0, 55.0, 38.0]);
        assert_eq!(counters.acceleration_events(), 2);
        assert_eq!(counters.braking_events(), 1);
    }

    #[test]
    fn test_thresholds_are_strict() {
        let counters = DrivingEventCounters::from_samples(&[20.0, 30.0, 15.0]);
        assert_eq!(counters.acceleration_events(), 0);
        assert_eq!(counters.braking_events(), 0);
    }

    #[test]
    fn test_first_sample_never_counts() {
        let counters = DrivingEventCounters::from_samples(&[80.0]);
        assert_eq!(counters.acceleration_events(), 0);
        assert_eq!(counters.braking_events(), 0);
        assert_eq!(counters.speed_samples(), &[80.0]);
    }

    #[test]
    fn test_average_speed() {
        let counters = DrivingEventCounters::from_samples(&[20.0, 35.0, 34.0, 55.0, 38.0]);
        assert!((counters.average_speed().unwrap() - 36.4).abs() < 1e-9);
        assert_eq!(DrivingEventCounters::new().average_speed(), None);
    }

    #[test]
    fn test_summarize_consumes_counters() {
        let mut counters = DrivingEventCounters::from_samples(&[10.0, 25.0, 5.0]);
        let summary = counters.summarize(3.5).unwrap();

        assert_eq!(summary.acceleration_events, 1);
        assert_eq!(summary.braking_events, 1);
        assert_eq!(summary.distance_km, 3.5);
        assert!((summary.average_speed_kmh - 40.0 / 3.0).abs() < 1e-9);
        assert_eq!(counters, DrivingEventCounters::new());
    }

    #[test]
    fn test_summarize_rejects_empty_ride() {
        let mut counters = DrivingEventCounters::from_samples(&[12.0]);
        assert!(matches!(counters.summarize(0.0), Err(TrackerError::InsufficientData)));
        assert_eq!(counters.speed_samples().len(), 1);

        let mut empty = DrivingEventCounters::new();
        assert!(matches!(empty.summarize(2.0), Err(TrackerError::InsufficientData)));
    }
}

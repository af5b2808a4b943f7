// src/lib.rs
//! Ride Tracker Library
//!
//! Trip distance and speed tracking from live location fixes, with driving
//! event classification, fuel mileage and ride coaching.

pub mod advice;
pub mod classifier;
pub mod coach;
pub mod config;
pub mod display;
pub mod error;
pub mod geo;
pub mod gps;
pub mod location;
pub mod mileage;
pub mod monitor;
pub mod permission;
pub mod tracker;

// Re-export main types for convenience
pub use config::TrackerConfig;
pub use error::{Result, TrackerError};
pub use location::{Position, PositionError, WatchOptions};
pub use monitor::{RideMonitor, RideSource};
pub use permission::{PermissionMonitor, PermissionState};
pub use tracker::{TrackingSession, TrackingStatus, TripTracker};

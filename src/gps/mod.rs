// src/gps/mod.rs
//! GPS wire formats: gpsd JSON and NMEA sentences

pub mod fix;
pub mod gpsd;
pub mod nmea;

pub use fix::{RawFix, RecordedFix};

// src/mileage.rs
//! Fuel mileage from a tracked distance and the fuel it took

use crate::error::{Result, TrackerError};

/// Kilometres per litre for `distance_km` ridden on `litres` of fuel
pub fn mileage_kmpl(distance_km: f64, litres: f64) -> Result<f64> {
    if !distance_km.is_finite() || distance_km <= 0.0 {
        return Err(TrackerError::InvalidInput(
            "track some distance before computing mileage".to_string(),
        ));
    }
    if !litres.is_finite() || litres <= 0.0 {
        return Err(TrackerError::InvalidInput(
            "enter a valid amount of petrol refilled".to_string(),
        ));
    }

    Ok(distance_km / litres)
}

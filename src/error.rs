// src/error.rs
//! Error types for the ride tracker

use crate::location::PositionError;
use std::fmt;

pub type Result<T> = std::result::Result<T, TrackerError>;

#[derive(Debug)]
pub enum TrackerError {
    Io(std::io::Error),
    Serial(tokio_serial::Error),
    Json(serde_json::Error),
    Http(reqwest::Error),
    Connection(String),
    Parse(String),
    Config(String),
    /// A location subscription failed or could not be opened
    Position(PositionError),
    /// Tracking was requested while location permission is denied
    PermissionDenied,
    /// Analysis requested without distance or speed samples
    InsufficientData,
    RemoteService(String),
    InvalidInput(String),
    Other(String),
}

impl fmt::Display for TrackerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackerError::Io(e) => write!(f, "IO error: {}", e),
            TrackerError::Serial(e) => write!(f, "Serial error: {}", e),
            TrackerError::Json(e) => write!(f, "JSON error: {}", e),
            TrackerError::Http(e) => write!(f, "HTTP error: {}", e),
            TrackerError::Connection(msg) => write!(f, "Connection error: {}", msg),
            TrackerError::Parse(msg) => write!(f, "Parse error: {}", msg),
            TrackerError::Config(msg) => write!(f, "Configuration error: {}", msg),
            TrackerError::Position(e) => write!(f, "Location error: {}", e),
            TrackerError::PermissionDenied => {
                write!(f, "Location access is denied. Enable it in your settings.")
            }
            TrackerError::InsufficientData => {
                write!(f, "Not enough data to analyze. Please track a longer ride.")
            }
            TrackerError::RemoteService(msg) => write!(f, "Advice service error: {}", msg),
            TrackerError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            TrackerError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for TrackerError {}

impl From<std::io::Error> for TrackerError {
    fn from(error: std::io::Error) -> Self {
        TrackerError::Io(error)
    }
}

impl From<tokio_serial::Error> for TrackerError {
    fn from(error: tokio_serial::Error) -> Self {
        TrackerError::Serial(error)
    }
}

impl From<serde_json::Error> for TrackerError {
    fn from(error: serde_json::Error) -> Self {
        TrackerError::Json(error)
    }
}

impl From<reqwest::Error> for TrackerError {
    fn from(error: reqwest::Error) -> Self {
        TrackerError::Http(error)
    }
}

impl From<PositionError> for TrackerError {
    fn from(error: PositionError) -> Self {
        match error {
            PositionError::PermissionDenied => TrackerError::PermissionDenied,
            other => TrackerError::Position(other),
        }
    }
}

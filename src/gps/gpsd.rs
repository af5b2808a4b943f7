// src/gps/gpsd.rs
//! GPSD client implementation

use super::fix::RawFix;
use crate::error::{Result, TrackerError};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::TcpStream,
};
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct GpsdMessage {
    class: String,
    #[serde(flatten)]
    data: HashMap<String, serde_json::Value>,
}

/// Connect to a gpsd daemon and return a stream reader
pub async fn connect_gpsd(host: &str, port: u16) -> Result<BufReader<TcpStream>> {
    let mut stream = TcpStream::connect(format!("{}:{}", host, port))
        .await
        .map_err(|e| TrackerError::Connection(format!("Failed to connect to gpsd at {}:{}: {}", host, port, e)))?;

    // Send WATCH command to start receiving JSON data
    let watch_cmd = "?WATCH={\"enable\":true,\"json\":true}\n";
    stream
        .write_all(watch_cmd.as_bytes())
        .await
        .map_err(|e| TrackerError::Connection(format!("Failed to send WATCH command: {}", e)))?;

    Ok(BufReader::new(stream))
}

/// Parse a single line of gpsd JSON data.
///
/// Returns a fix for TPV reports that carry a 2D or 3D position; every other
/// report is informational.
pub fn parse_gpsd_json(line: &str) -> Result<Option<RawFix>> {
    let msg: GpsdMessage = serde_json::from_str(line)
        .map_err(|e| TrackerError::Parse(format!("Failed to parse gpsd JSON: {}", e)))?;

    let fix = match msg.class.as_str() {
        "TPV" => parse_tpv_message(&msg.data),
        "VERSION" => {
            parse_version_message(&msg.data);
            None
        }
        "DEVICES" => {
            parse_devices_message(&msg.data);
            None
        }
        _ => None,
    };

    Ok(fix)
}

/// Parse TPV (Time Position Velocity) message
fn parse_tpv_message(msg_data: &HashMap<String, serde_json::Value>) -> Option<RawFix> {
    let mode = msg_data.get("mode").and_then(|v| v.as_u64()).unwrap_or(0);
    if mode < 2 {
        debug!(mode, "gpsd TPV without a position fix");
        return None;
    }

    let latitude = msg_data.get("lat").and_then(|v| v.as_f64())?;
    let longitude = msg_data.get("lon").and_then(|v| v.as_f64())?;
    // gpsd already reports m/s
    let speed_mps = msg_data.get("speed").and_then(|v| v.as_f64());

    let fix_time = msg_data
        .get("time")
        .and_then(|v| v.as_str())
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc));

    Some(match fix_time {
        Some(timestamp) => RawFix::at(latitude, longitude, speed_mps, timestamp),
        None => RawFix::now(latitude, longitude, speed_mps),
    })
}

/// Parse VERSION message (informational)
fn parse_version_message(msg_data: &HashMap<String, serde_json::Value>) {
    if let Some(version) = msg_data.get("release").and_then(|v| v.as_str()) {
        info!(version, "connected to gpsd");
    }
}

/// Parse DEVICES message (informational)
fn parse_devices_message(msg_data: &HashMap<String, serde_json::Value>) {
    if let Some(devices) = msg_data.get("devices").and_then(|v| v.as_array()) {
        info!(count = devices.len(), "gpsd managing devices");
        for device in devices {
            if let Some(path) = device.get("path").and_then(|v| v.as_str()) {
                debug!(path, "gpsd device");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tpv_parsing() {
        let json = r#"{"class":"TPV","device":"/dev/ttyUSB0","mode":3,"time":"2023-01-01T12:00:00.000Z","ept":0.005,"lat":48.117,"lon":11.517,"alt":545.4,"epx":15.319,"epy":17.054,"epv":124.484,"track":10.3797,"speed":0.091,"climb":10.7,"eps":34.11,"epc":248.97}"#;

        let fix = parse_gpsd_json(json).unwrap().unwrap();

        assert_eq!(fix.latitude, 48.117);
        assert_eq!(fix.longitude, 11.517);
        assert_eq!(fix.speed_mps, Some(0.091));
        assert_eq!(fix.timestamp.to_rfc3339(), "2023-01-01T12:00:00+00:00");
    }

    #[test]
    fn test_stale_tpv_is_not_accepted() {
        use crate::location::{normalize, PositionError, WatchOptions};

        let json = r#"{"class":"TPV","mode":3,"time":"2001-01-01T00:00:00.000Z","lat":12.97,"lon":77.59,"speed":4.0}"#;
        let fix = parse_gpsd_json(json).unwrap().unwrap();

        let err = normalize(fix, &WatchOptions::default(), Utc::now()).unwrap_err();
        assert!(matches!(err, PositionError::Unavailable(_)));
    }

    #[test]
    fn test_fresh_tpv_is_accepted() {
        use crate::location::{normalize, WatchOptions};

        let started = Utc::now();
        let json = format!(
            r#"{{"class":"TPV","mode":2,"time":"{}","lat":12.97,"lon":77.59}}"#,
            started.to_rfc3339()
        );
        let fix = parse_gpsd_json(&json).unwrap().unwrap();
        assert!(normalize(fix, &WatchOptions::default(), started).is_ok());
    }

    #[test]
    fn test_tpv_without_fix() {
        let json = r#"{"class":"TPV","device":"/dev/ttyUSB0","mode":1}"#;
        assert!(parse_gpsd_json(json).unwrap().is_none());
    }

    #[test]
    fn test_tpv_without_speed() {
        let json = r#"{"class":"TPV","mode":2,"lat":12.97,"lon":77.59}"#;
        let before = Utc::now();
        let fix = parse_gpsd_json(json).unwrap().unwrap();
        assert_eq!(fix.speed_mps, None);
        assert!(fix.timestamp >= before);
    }

    #[test]
    fn test_sky_is_informational() {
        let json = r#"{"class":"SKY","device":"/dev/ttyUSB0","hdop":1.2,"satellites":[{"PRN":1,"ss":42,"used":true}]}"#;
        assert!(parse_gpsd_json(json).unwrap().is_none());
    }

    #[test]
    fn test_invalid_json() {
        let invalid_json = r#"{"invalid": json"#;

        let result = parse_gpsd_json(invalid_json);
        assert!(result.is_err());
    }
}

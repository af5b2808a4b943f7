// src/gps/nmea.rs
//! NMEA sentence parsing

use super::fix::RawFix;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

const KNOTS_TO_MPS: f64 = 0.514_444;

/// Parse a single NMEA sentence into a fix.
///
/// Only RMC sentences carry both position and speed, so everything else is
/// ignored. Sentences with a bad checksum or a void status yield `None`.
pub fn parse_nmea_sentence(line: &str) -> Option<RawFix> {
    let line = line.trim();
    if !checksum_ok(line) {
        return None;
    }

    let body = line.split('*').next()?;
    let parts: Vec<&str> = body.split(',').collect();

    if line.starts_with("$GPRMC") || line.starts_with("$GNRMC") {
        parse_rmc(&parts)
    } else {
        None
    }
}

/// Verify the `*hh` checksum when present
fn checksum_ok(line: &str) -> bool {
    let Some(body) = line.strip_prefix('$') else {
        return false;
    };

    match body.split_once('*') {
        Some((payload, checksum)) => {
            let computed = payload.bytes().fold(0u8, |acc, b| acc ^ b);
            u8::from_str_radix(checksum.trim(), 16).map_or(false, |c| c == computed)
        }
        None => true,
    }
}

/// Parse RMC (Recommended Minimum Course) sentence
fn parse_rmc(parts: &[&str]) -> Option<RawFix> {
    if parts.len() < 10 {
        return None;
    }

    // Status (field 2): A = valid, V = void
    if parts[2] != "A" {
        return None;
    }

    let latitude = parse_degrees(parts[3], parts[4], 2)?;
    let longitude = parse_degrees(parts[5], parts[6], 3)?;

    // Speed over ground in knots (field 7)
    let speed_mps = parts[7]
        .parse::<f64>()
        .ok()
        .map(|knots| knots * KNOTS_TO_MPS);

    // Fix time (field 1) and date (field 9); receipt time when absent
    let fix = match parse_fix_time(parts[1], parts[9]) {
        Some(timestamp) => RawFix::at(latitude, longitude, speed_mps, timestamp),
        None => RawFix::now(latitude, longitude, speed_mps),
    };
    Some(fix)
}

/// Combine `hhmmss[.sss]` and `ddmmyy` into a UTC timestamp
fn parse_fix_time(time: &str, date: &str) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(date, "%d%m%y").ok()?;
    let (hms, fraction) = time.split_once('.').unwrap_or((time, ""));
    let mut time = NaiveTime::parse_from_str(hms, "%H%M%S").ok()?;

    if !fraction.is_empty() {
        let seconds = format!("0.{}", fraction).parse::<f64>().ok()?;
        time += chrono::Duration::milliseconds((seconds * 1000.0).round() as i64);
    }

    Some(date.and_time(time).and_utc())
}

/// Convert `ddmm.mmmm` / `dddmm.mmmm` plus hemisphere into signed degrees
fn parse_degrees(value: &str, hemisphere: &str, degree_digits: usize) -> Option<f64> {
    if value.len() <= degree_digits || hemisphere.is_empty() {
        return None;
    }

    let degrees = value.get(..degree_digits)?.parse::<f64>().ok()?;
    let minutes = value.get(degree_digits..)?.parse::<f64>().ok()?;
    let decimal = degrees + minutes / 60.0;

    match hemisphere {
        "N" | "E" => Some(decimal),
        "S" | "W" => Some(-decimal),
        _ => None,
    }
}

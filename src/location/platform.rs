// src/location/platform.rs
//! Location platforms: gpsd, serial NMEA receivers and recorded rides

use super::{FixSink, LocationPlatform, PositionError, WatchId, WatchOptions};
use crate::{
    error::{Result, TrackerError},
    gps::{gpsd, nmea, RecordedFix},
};
use std::{collections::HashMap, path::Path, time::Duration};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    task::JoinHandle,
};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

/// Reader tasks backing the open watches of a platform
#[derive(Default)]
struct WatchTasks {
    next: u64,
    tasks: HashMap<WatchId, JoinHandle<()>>,
}

impl WatchTasks {
    fn insert(&mut self, task: JoinHandle<()>) -> WatchId {
        self.next += 1;
        let id = WatchId(self.next);
        self.tasks.insert(id, task);
        id
    }

    fn abort(&mut self, id: WatchId) {
        if let Some(task) = self.tasks.remove(&id) {
            task.abort();
        }
    }
}

impl Drop for WatchTasks {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}

/// Fixes from a gpsd daemon
pub struct GpsdPlatform {
    host: String,
    port: u16,
    watches: WatchTasks,
}

impl GpsdPlatform {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            watches: WatchTasks::default(),
        }
    }
}

impl LocationPlatform for GpsdPlatform {
    fn watch_position(
        &mut self,
        _options: &WatchOptions,
        sink: FixSink,
    ) -> std::result::Result<WatchId, PositionError> {
        let host = self.host.clone();
        let port = self.port;

        let task = tokio::spawn(async move {
            info!(%host, port, "connecting to gpsd");
            let mut reader = match gpsd::connect_gpsd(&host, port).await {
                Ok(reader) => reader,
                Err(e) => {
                    let _ = sink.send(Err(PositionError::Unavailable(e.to_string())));
                    return;
                }
            };

            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => break, // EOF
                    Ok(_) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match gpsd::parse_gpsd_json(line) {
                            Ok(Some(fix)) => {
                                if sink.send(Ok(fix)).is_err() {
                                    break;
                                }
                            }
                            Ok(None) => {}
                            Err(e) => warn!("Error parsing gpsd JSON: {}", e),
                        }
                    }
                    Err(e) => {
                        let _ = sink.send(Err(PositionError::Unavailable(format!(
                            "error reading from gpsd: {}",
                            e
                        ))));
                        break;
                    }
                }
            }
        });

        Ok(self.watches.insert(task))
    }

    fn clear_watch(&mut self, id: WatchId) {
        self.watches.abort(id);
    }
}

/// Fixes from an NMEA receiver on a serial port
pub struct SerialPlatform {
    port: String,
    baudrate: u32,
    watches: WatchTasks,
}

impl SerialPlatform {
    pub fn new(port: impl Into<String>, baudrate: u32) -> Self {
        Self {
            port: port.into(),
            baudrate,
            watches: WatchTasks::default(),
        }
    }
}

/// Map a serial open failure onto the location error classes
fn classify_serial_error(error: &tokio_serial::Error) -> PositionError {
    match error.kind() {
        tokio_serial::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
            PositionError::PermissionDenied
        }
        _ => PositionError::Unavailable(error.to_string()),
    }
}

impl LocationPlatform for SerialPlatform {
    fn watch_position(
        &mut self,
        _options: &WatchOptions,
        sink: FixSink,
    ) -> std::result::Result<WatchId, PositionError> {
        info!(port = %self.port, baudrate = self.baudrate, "opening GPS serial port");

        let serial = tokio_serial::new(self.port.as_str(), self.baudrate)
            .timeout(Duration::from_millis(1000))
            .open_native_async()
            .map_err(|e| classify_serial_error(&e))?;

        let port = self.port.clone();
        let task = tokio::spawn(async move {
            let mut reader = BufReader::new(serial);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => break, // EOF
                    Ok(_) => {
                        if let Some(fix) = nmea::parse_nmea_sentence(&line) {
                            if sink.send(Ok(fix)).is_err() {
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        let _ = sink.send(Err(PositionError::Unavailable(format!(
                            "error reading from {}: {}",
                            port, e
                        ))));
                        break;
                    }
                }
            }
        });

        Ok(self.watches.insert(task))
    }

    fn clear_watch(&mut self, id: WatchId) {
        self.watches.abort(id);
    }
}

/// Plays back a recorded ride, one fix per interval
pub struct ReplayPlatform {
    fixes: Vec<RecordedFix>,
    interval: Duration,
    watches: WatchTasks,
}

impl ReplayPlatform {
    pub fn new(fixes: Vec<RecordedFix>, interval: Duration) -> Self {
        Self {
            fixes,
            interval,
            watches: WatchTasks::default(),
        }
    }

    /// Load a JSON array of recorded fixes
    pub fn from_file(path: &Path, interval: Duration) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            TrackerError::Other(format!("Failed to read replay file {}: {}", path.display(), e))
        })?;
        let fixes: Vec<RecordedFix> = serde_json::from_str(&contents)?;

        Ok(Self::new(fixes, interval))
    }

    pub fn len(&self) -> usize {
        self.fixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fixes.is_empty()
    }
}

impl LocationPlatform for ReplayPlatform {
    fn watch_position(
        &mut self,
        _options: &WatchOptions,
        sink: FixSink,
    ) -> std::result::Result<WatchId, PositionError> {
        let fixes = self.fixes.clone();
        let interval = self.interval;

        let task = tokio::spawn(async move {
            for (index, fix) in fixes.iter().enumerate() {
                if index > 0 {
                    tokio::time::sleep(interval).await;
                }
                if sink.send(Ok(fix.stamp_now())).is_err() {
                    return;
                }
            }
            debug!(count = fixes.len(), "replay finished");
        });

        Ok(self.watches.insert(task))
    }

    fn clear_watch(&mut self, id: WatchId) {
        self.watches.abort(id);
    }
}

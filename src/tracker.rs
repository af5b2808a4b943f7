// src/tracker.rs
//! Trip tracker: accumulates distance and speed from a position stream
//!
//! The tracker is the only writer of its [`TrackingSession`]. Other parts of
//! the program read it through [`TripTracker::session`] or a `watch`
//! receiver from [`TripTracker::subscribe`].
//!
//! Stopping and resetting are separate so a rider can pause at a red light
//! and resume the same trip. Stopping always discards the last position, so
//! the first fix after a restart seeds a new anchor instead of adding the
//! distance travelled while the tracker was idle.

use crate::{
    error::{Result, TrackerError},
    geo::distance_km,
    location::{
        LocationPlatform, Position, PositionError, PositionStream, StreamEvent, StreamEventKind,
        SubscriptionId, WatchOptions,
    },
    permission::PermissionState,
};
use serde::Serialize;
use std::fmt;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrackingStatus {
    Idle,
    Tracking,
}

/// What a rider sees: the machine status refined by the last fault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    Idle,
    Tracking,
    Denied,
    Error,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionPhase::Idle => "Idle",
            SessionPhase::Tracking => "Tracking",
            SessionPhase::Denied => "Denied",
            SessionPhase::Error => "Error",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FaultKind {
    PermissionDenied,
    Unavailable,
    Timeout,
}

/// User-facing record of why tracking is not running
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackerFault {
    pub kind: FaultKind,
    pub message: String,
}

impl TrackerFault {
    fn denied_at_start() -> Self {
        Self {
            kind: FaultKind::PermissionDenied,
            message: "Location access is denied. Enable it in your settings.".to_string(),
        }
    }
}

impl From<&PositionError> for TrackerFault {
    fn from(error: &PositionError) -> Self {
        match error {
            PositionError::PermissionDenied => Self {
                kind: FaultKind::PermissionDenied,
                message: "Location access was denied. Please enable it in your settings."
                    .to_string(),
            },
            PositionError::Unavailable(reason) => Self {
                kind: FaultKind::Unavailable,
                message: format!("Position unavailable: {}", reason),
            },
            PositionError::Timeout => Self {
                kind: FaultKind::Timeout,
                message: "Timed out waiting for a GPS fix.".to_string(),
            },
        }
    }
}

impl fmt::Display for TrackerFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Live state of one tracker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingSession {
    pub status: TrackingStatus,
    pub last_position: Option<Position>,
    pub accumulated_distance_km: f64,
    pub current_speed_kmh: Option<f64>,
    pub last_error: Option<TrackerFault>,
}

impl TrackingSession {
    fn new() -> Self {
        Self {
            status: TrackingStatus::Idle,
            last_position: None,
            accumulated_distance_km: 0.0,
            current_speed_kmh: None,
            last_error: None,
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.status == TrackingStatus::Tracking
    }

    pub fn phase(&self) -> SessionPhase {
        match (self.status, &self.last_error) {
            (TrackingStatus::Tracking, _) => SessionPhase::Tracking,
            (TrackingStatus::Idle, None) => SessionPhase::Idle,
            (TrackingStatus::Idle, Some(fault)) if fault.kind == FaultKind::PermissionDenied => {
                SessionPhase::Denied
            }
            (TrackingStatus::Idle, Some(_)) => SessionPhase::Error,
        }
    }
}

impl Default for TrackingSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of feeding one stream event to the tracker
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerUpdate {
    Fix {
        speed_kmh: f64,
        leg_km: f64,
        distance_km: f64,
    },
    Stopped(TrackerFault),
    /// The event belonged to a closed subscription
    Ignored,
}

pub struct TripTracker<P: LocationPlatform> {
    session: TrackingSession,
    stream: PositionStream<P>,
    subscription: Option<SubscriptionId>,
    events: mpsc::UnboundedReceiver<StreamEvent>,
    permission: watch::Receiver<PermissionState>,
    snapshots: watch::Sender<TrackingSession>,
}

impl<P: LocationPlatform> TripTracker<P> {
    pub fn new(platform: P, options: WatchOptions, permission: watch::Receiver<PermissionState>) -> Self {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (snapshots, _) = watch::channel(TrackingSession::new());

        Self {
            session: TrackingSession::new(),
            stream: PositionStream::new(platform, options, events_tx),
            subscription: None,
            events,
            permission,
            snapshots,
        }
    }

    /// Begin (or resume) tracking.
    ///
    /// Distance is kept; call [`reset_distance`](Self::reset_distance) first
    /// for a new trip.
    pub fn start(&mut self) -> Result<()> {
        if *self.permission.borrow() == PermissionState::Denied {
            warn!("tracking refused: location permission denied");
            self.release();
            self.session.status = TrackingStatus::Idle;
            self.session.last_position = None;
            self.session.last_error = Some(TrackerFault::denied_at_start());
            self.publish();
            return Err(TrackerError::PermissionDenied);
        }

        self.release();
        self.session.last_position = None;
        self.session.last_error = None;

        match self.stream.start() {
            Ok(id) => {
                self.subscription = Some(id);
                self.session.status = TrackingStatus::Tracking;
                info!(
                    distance_km = self.session.accumulated_distance_km,
                    "tracking started"
                );
                self.publish();
                Ok(())
            }
            Err(e) => {
                warn!("location watch refused: {}", e);
                self.session.status = TrackingStatus::Idle;
                self.session.last_error = Some(TrackerFault::from(&e));
                self.publish();
                Err(e.into())
            }
        }
    }

    /// Stop tracking; the accumulated distance is kept. No-op when idle.
    pub fn stop(&mut self) {
        if !self.session.is_tracking() && self.subscription.is_none() {
            return;
        }

        self.release();
        self.session.status = TrackingStatus::Idle;
        self.session.last_position = None;
        self.session.current_speed_kmh = Some(0.0);
        info!(
            distance_km = self.session.accumulated_distance_km,
            "tracking stopped"
        );
        self.publish();
    }

    /// Zero the trip distance without touching anything else
    pub fn reset_distance(&mut self) {
        self.session.accumulated_distance_km = 0.0;
        debug!("trip distance reset");
        self.publish();
    }

    pub fn session(&self) -> &TrackingSession {
        &self.session
    }

    pub fn subscribe(&self) -> watch::Receiver<TrackingSession> {
        self.snapshots.subscribe()
    }

    pub fn subscription(&self) -> Option<SubscriptionId> {
        self.subscription
    }

    pub fn platform(&self) -> &P {
        self.stream.platform()
    }

    /// Wait for the next event from the position stream
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Apply one stream event to the session
    pub fn handle_event(&mut self, event: StreamEvent) -> TrackerUpdate {
        if self.subscription != Some(event.subscription) || !self.session.is_tracking() {
            debug!(subscription = ?event.subscription, "dropping event from closed subscription");
            return TrackerUpdate::Ignored;
        }

        match event.kind {
            StreamEventKind::Fix(position) => self.apply_fix(position),
            StreamEventKind::Error(error) => {
                let fault = TrackerFault::from(&error);
                warn!("tracking stopped: {}", error);
                self.release();
                self.session.status = TrackingStatus::Idle;
                self.session.last_error = Some(fault.clone());
                self.publish();
                TrackerUpdate::Stopped(fault)
            }
        }
    }

    fn apply_fix(&mut self, position: Position) -> TrackerUpdate {
        let speed_kmh = position.speed_kmh();
        let leg_km = self
            .session
            .last_position
            .as_ref()
            .map_or(0.0, |last| distance_km(last.coordinate(), position.coordinate()));

        self.session.accumulated_distance_km += leg_km;
        self.session.last_position = Some(position);
        self.session.current_speed_kmh = Some(speed_kmh);
        self.session.last_error = None;

        debug!(
            speed_kmh,
            leg_km,
            distance_km = self.session.accumulated_distance_km,
            "fix applied"
        );
        self.publish();

        TrackerUpdate::Fix {
            speed_kmh,
            leg_km,
            distance_km: self.session.accumulated_distance_km,
        }
    }

    fn release(&mut self) {
        if let Some(id) = self.subscription.take() {
            self.stream.stop(id);
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.session.clone());
    }
}

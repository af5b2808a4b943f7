// src/location/stream.rs
//! Subscription management on top of a location platform

use super::{normalize, LocationPlatform, Position, PositionError, WatchId, WatchOptions};
use crate::gps::RawFix;
use chrono::{DateTime, Utc};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

/// Identifies one `start()` of a [`PositionStream`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub(crate) u64);

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEventKind {
    Fix(Position),
    Error(PositionError),
}

/// A normalized fix or a classified error, tagged with its subscription
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub subscription: SubscriptionId,
    pub kind: StreamEventKind,
}

struct ActiveWatch {
    id: SubscriptionId,
    watch: WatchId,
    forwarder: JoinHandle<()>,
}

/// Owns at most one platform watch at a time and forwards its readings
pub struct PositionStream<P: LocationPlatform> {
    platform: P,
    options: WatchOptions,
    events: mpsc::UnboundedSender<StreamEvent>,
    active: Option<ActiveWatch>,
    next_id: u64,
}

impl<P: LocationPlatform> PositionStream<P> {
    pub fn new(platform: P, options: WatchOptions, events: mpsc::UnboundedSender<StreamEvent>) -> Self {
        Self {
            platform,
            options,
            events,
            active: None,
            next_id: 0,
        }
    }

    /// Open a new subscription, closing any previous one first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> std::result::Result<SubscriptionId, PositionError> {
        if let Some(previous) = self.active.take() {
            warn!(subscription = previous.id.0, "closing active watch before restarting");
            self.release(previous);
        }

        let (sink, readings) = mpsc::unbounded_channel();
        let started = Utc::now();
        let watch = self.platform.watch_position(&self.options, sink)?;

        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        let forwarder = tokio::spawn(forward(
            id,
            readings,
            self.options.clone(),
            started,
            self.events.clone(),
        ));

        info!(subscription = id.0, "location watch started");
        self.active = Some(ActiveWatch { id, watch, forwarder });
        Ok(id)
    }

    /// Close `id` if it is the active subscription
    pub fn stop(&mut self, id: SubscriptionId) {
        match self.active.take() {
            Some(active) if active.id == id => {
                info!(subscription = id.0, "location watch stopped");
                self.release(active);
            }
            other => self.active = other,
        }
    }

    pub fn active(&self) -> Option<SubscriptionId> {
        self.active.as_ref().map(|a| a.id)
    }

    pub fn options(&self) -> &WatchOptions {
        &self.options
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    fn release(&mut self, active: ActiveWatch) {
        active.forwarder.abort();
        self.platform.clear_watch(active.watch);
    }
}

impl<P: LocationPlatform> Drop for PositionStream<P> {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            self.release(active);
        }
    }
}

/// Validate readings for one subscription until it errors or is aborted
async fn forward(
    id: SubscriptionId,
    mut readings: mpsc::UnboundedReceiver<std::result::Result<RawFix, PositionError>>,
    options: WatchOptions,
    started: DateTime<Utc>,
    events: mpsc::UnboundedSender<StreamEvent>,
) {
    let timeout = options.timeout();

    loop {
        let kind = match tokio::time::timeout(timeout, readings.recv()).await {
            Err(_) => StreamEventKind::Error(PositionError::Timeout),
            Ok(None) => StreamEventKind::Error(PositionError::Unavailable(
                "location source closed".to_string(),
            )),
            Ok(Some(Err(e))) => StreamEventKind::Error(e),
            Ok(Some(Ok(raw))) => match normalize(raw, &options, started) {
                Ok(position) => StreamEventKind::Fix(position),
                Err(e) => StreamEventKind::Error(e),
            },
        };

        let terminal = matches!(kind, StreamEventKind::Error(_));
        if terminal {
            debug!(subscription = id.0, "location watch ended with an error");
        }

        if events.send(StreamEvent { subscription: id, kind }).is_err() || terminal {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::testing::ManualPlatform;

    fn stream() -> (
        PositionStream<ManualPlatform>,
        ManualPlatform,
        mpsc::UnboundedReceiver<StreamEvent>,
    ) {
        let platform = ManualPlatform::default();
        let (tx, rx) = mpsc::unbounded_channel();
        (
            PositionStream::new(platform.clone(), WatchOptions::default(), tx),
            platform,
            rx,
        )
    }

    #[tokio::test]
    async fn test_fix_is_forwarded() {
        let (mut stream, platform, mut rx) = stream();
        let id = stream.start().unwrap();

        platform.push(RawFix::now(12.0, 77.0, Some(5.0)));
        let event = rx.recv().await.unwrap();

        assert_eq!(event.subscription, id);
        match event.kind {
            StreamEventKind::Fix(pos) => assert_eq!(pos.latitude(), 12.0),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_restart_keeps_single_watch() {
        let (mut stream, platform, _rx) = stream();
        let first = stream.start().unwrap();
        let second = stream.start().unwrap();

        assert_ne!(first, second);
        assert_eq!(platform.open_watches(), 1);
        assert_eq!(platform.opened(), 2);
        assert_eq!(stream.active(), Some(second));
    }

    #[tokio::test]
    async fn test_stop_clears_watch() {
        let (mut stream, platform, _rx) = stream();
        let id = stream.start().unwrap();
        stream.stop(id);

        assert_eq!(platform.open_watches(), 0);
        assert_eq!(stream.active(), None);

        // stale ids are ignored
        let id2 = stream.start().unwrap();
        stream.stop(id);
        assert_eq!(stream.active(), Some(id2));
    }

    #[tokio::test]
    async fn test_drop_releases_watch() {
        let (mut stream, platform, _rx) = stream();
        stream.start().unwrap();
        drop(stream);
        assert_eq!(platform.open_watches(), 0);
    }

    #[tokio::test]
    async fn test_platform_error_is_forwarded() {
        let (mut stream, platform, mut rx) = stream();
        stream.start().unwrap();

        platform.push_error(PositionError::PermissionDenied);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, StreamEventKind::Error(PositionError::PermissionDenied));
    }

    #[tokio::test]
    async fn test_refused_watch_is_reported() {
        let (mut stream, platform, _rx) = stream();
        platform.refuse_with(PositionError::PermissionDenied);

        assert_eq!(stream.start(), Err(PositionError::PermissionDenied));
        assert_eq!(stream.active(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_times_out() {
        let (mut stream, _platform, mut rx) = stream();
        stream.start().unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, StreamEventKind::Error(PositionError::Timeout));
    }
}

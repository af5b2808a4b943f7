// src/permission.rs
//! Location permission monitoring
//!
//! The monitor is the single writer of the process-wide [`PermissionState`].
//! Everyone else reads it through a `watch` receiver.

use serde::{Deserialize, Serialize};
use std::{
    fmt,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionState {
    Checking,
    Prompt,
    Granted,
    Denied,
}

impl fmt::Display for PermissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PermissionState::Checking => "checking",
            PermissionState::Prompt => "prompt",
            PermissionState::Granted => "granted",
            PermissionState::Denied => "denied",
        };
        write!(f, "{}", label)
    }
}

/// The platform's permission query capability
pub trait PermissionProbe: Send + Sync {
    /// Current platform state, or `None` when the platform cannot be queried
    fn query(&self) -> Option<PermissionState>;
}

/// Platforms without any permission API
pub struct NoPermissionApi;

impl PermissionProbe for NoPermissionApi {
    fn query(&self) -> Option<PermissionState> {
        None
    }
}

/// Read access to a serial GPS device node
pub struct DeviceAccessProbe {
    path: PathBuf,
}

impl DeviceAccessProbe {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// EBUSY: another process holds the device exclusively
#[cfg(unix)]
const DEVICE_BUSY: i32 = 16;

impl PermissionProbe for DeviceAccessProbe {
    fn query(&self) -> Option<PermissionState> {
        let state = match std::fs::OpenOptions::new().read(true).open(&self.path) {
            Ok(_) => PermissionState::Granted,
            #[cfg(unix)]
            Err(e) if e.raw_os_error() == Some(DEVICE_BUSY) => {
                debug!(path = %self.path.display(), "device busy, permission unknown");
                return None;
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => PermissionState::Denied,
            // Not plugged in yet; the first tracking attempt reports the outcome
            Err(_) => PermissionState::Prompt,
        };
        Some(state)
    }
}

#[derive(Clone)]
pub struct PermissionMonitor {
    state: Arc<watch::Sender<PermissionState>>,
}

impl PermissionMonitor {
    /// Create a monitor in the `Checking` state
    pub fn new() -> Self {
        let (state, _) = watch::channel(PermissionState::Checking);
        Self {
            state: Arc::new(state),
        }
    }

    /// Resolve the initial state from the platform.
    ///
    /// Without a query capability the state falls back to `Prompt`.
    pub fn initialize<P: PermissionProbe + ?Sized>(&self, probe: &P) -> PermissionState {
        let state = probe.query().unwrap_or(PermissionState::Prompt);
        self.notify(state);
        state
    }

    /// Apply a platform permission-change notification
    pub fn notify(&self, state: PermissionState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            info!(from = %current, to = %state, "location permission changed");
            *current = state;
            true
        });
    }

    pub fn current_status(&self) -> PermissionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PermissionState> {
        self.state.subscribe()
    }

    /// Call `callback` with every subsequent state change
    pub fn on_change<F>(&self, mut callback: F) -> JoinHandle<()>
    where
        F: FnMut(PermissionState) + Send + 'static,
    {
        let mut rx = self.subscribe();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let state = *rx.borrow_and_update();
                callback(state);
            }
        })
    }

    /// Poll `probe` every `interval` and publish changes.
    ///
    /// Polls are skipped while `hold` returns true, for example while the
    /// tracker has the device open. A probe with no answer leaves the state
    /// as it is.
    pub fn watch_platform<P, F>(&self, probe: P, interval: Duration, hold: F) -> JoinHandle<()>
    where
        P: PermissionProbe + 'static,
        F: Fn() -> bool + Send + 'static,
    {
        let monitor = self.clone();
        let probe = Arc::new(probe);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if hold() {
                    continue;
                }

                let query = Arc::clone(&probe);
                match tokio::task::spawn_blocking(move || query.query()).await {
                    Ok(Some(state)) => monitor.notify(state),
                    Ok(None) => debug!("permission probe gave no answer, keeping state"),
                    Err(e) => warn!("permission probe failed: {}", e),
                }
            }
        })
    }
}

impl Default for PermissionMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicBool, AtomicU8, Ordering},
        Mutex,
    };

    struct Fixed(PermissionState);

    impl PermissionProbe for Fixed {
        fn query(&self) -> Option<PermissionState> {
            Some(self.0)
        }
    }

    struct Switchable(Arc<AtomicU8>);

    impl PermissionProbe for Switchable {
        fn query(&self) -> Option<PermissionState> {
            Some(match self.0.load(Ordering::SeqCst) {
                0 => PermissionState::Granted,
                _ => PermissionState::Denied,
            })
        }
    }

    #[test]
    fn test_starts_checking() {
        let monitor = PermissionMonitor::new();
        assert_eq!(monitor.current_status(), PermissionState::Checking);
    }

    #[test]
    fn test_no_api_falls_back_to_prompt() {
        let monitor = PermissionMonitor::new();
        assert_eq!(monitor.initialize(&NoPermissionApi), PermissionState::Prompt);
        assert_eq!(monitor.current_status(), PermissionState::Prompt);
    }

    #[test]
    fn test_initialize_from_platform() {
        let monitor = PermissionMonitor::new();
        monitor.initialize(&Fixed(PermissionState::Denied));
        assert_eq!(monitor.current_status(), PermissionState::Denied);
    }

    #[test]
    fn test_subscribers_see_changes() {
        let monitor = PermissionMonitor::new();
        let mut rx = monitor.subscribe();
        monitor.notify(PermissionState::Granted);

        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), PermissionState::Granted);

        // repeating the same state is not a change
        monitor.notify(PermissionState::Granted);
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_on_change_callback() {
        let monitor = PermissionMonitor::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handle = monitor.on_change(move |state| sink.lock().unwrap().push(state));

        tokio::task::yield_now().await;
        monitor.notify(PermissionState::Denied);
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        handle.abort();

        assert_eq!(*seen.lock().unwrap(), vec![PermissionState::Denied]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_platform_publishes_revocation() {
        let flag = Arc::new(AtomicU8::new(0));
        let monitor = PermissionMonitor::new();
        monitor.initialize(&Switchable(Arc::clone(&flag)));
        assert_eq!(monitor.current_status(), PermissionState::Granted);

        let mut rx = monitor.subscribe();
        let handle =
            monitor.watch_platform(Switchable(Arc::clone(&flag)), Duration::from_secs(1), || false);

        flag.store(1, Ordering::SeqCst);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), PermissionState::Denied);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_platform_holds_while_device_in_use() {
        let flag = Arc::new(AtomicU8::new(0));
        let monitor = PermissionMonitor::new();
        monitor.initialize(&Switchable(Arc::clone(&flag)));

        let in_use = Arc::new(AtomicBool::new(true));
        let hold = Arc::clone(&in_use);
        let handle = monitor.watch_platform(
            Switchable(Arc::clone(&flag)),
            Duration::from_secs(1),
            move || hold.load(Ordering::SeqCst),
        );

        // the open device reads as denied, but nobody polls it
        flag.store(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(monitor.current_status(), PermissionState::Granted);

        in_use.store(false, Ordering::SeqCst);
        let mut rx = monitor.subscribe();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), PermissionState::Denied);
        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_poll_keeps_state() {
        let monitor = PermissionMonitor::new();
        monitor.notify(PermissionState::Granted);

        let handle = monitor.watch_platform(NoPermissionApi, Duration::from_secs(1), || false);
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(monitor.current_status(), PermissionState::Granted);
        assert!(!handle.is_finished());
        handle.abort();
    }

    #[test]
    fn test_device_access_answers() {
        let path = std::env::temp_dir().join(format!("ride-tracker-probe-{}", std::process::id()));
        std::fs::write(&path, b"").unwrap();
        assert_eq!(DeviceAccessProbe::new(&path).query(), Some(PermissionState::Granted));
        std::fs::remove_file(&path).unwrap();

        assert_eq!(DeviceAccessProbe::new(&path).query(), Some(PermissionState::Prompt));
    }
}

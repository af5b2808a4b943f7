// src/monitor.rs
//! Ride monitor: wires permission, tracking, coaching and display together

use crate::{
    advice::{advice_or_fallback, DrivingAdvisor},
    coach::{ChatMessage, RideCoach},
    config::TrackerConfig,
    display::{DashboardView, TerminalDisplay},
    error::Result,
    location::{GpsdPlatform, LocationPlatform, ReplayPlatform, SerialPlatform, WatchOptions},
    permission::{DeviceAccessProbe, NoPermissionApi, PermissionMonitor, PermissionState},
    tracker::{TrackerFault, TrackerUpdate, TrackingSession, TripTracker},
};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Location data source
#[derive(Debug, Clone)]
pub enum RideSource {
    Serial { port: String, baudrate: u32 },
    Gpsd { host: String, port: u16 },
    Replay { path: PathBuf, interval: Duration },
}

impl RideSource {
    /// Open the platform behind this source
    pub fn open(&self) -> Result<Box<dyn LocationPlatform>> {
        let platform: Box<dyn LocationPlatform> = match self {
            RideSource::Serial { port, baudrate } => Box::new(SerialPlatform::new(port.clone(), *baudrate)),
            RideSource::Gpsd { host, port } => Box::new(GpsdPlatform::new(host.clone(), *port)),
            RideSource::Replay { path, interval } => {
                let replay = ReplayPlatform::from_file(path, *interval)?;
                if replay.is_empty() {
                    warn!(path = %path.display(), "replay file contains no fixes");
                }
                Box::new(replay)
            }
        };
        Ok(platform)
    }

    pub fn describe(&self) -> String {
        match self {
            RideSource::Serial { port, baudrate } => format!("Serial GPS {} @ {} baud", port, baudrate),
            RideSource::Gpsd { host, port } => format!("gpsd {}:{}", host, port),
            RideSource::Replay { path, .. } => format!("Replay {}", path.display()),
        }
    }
}

/// What a headless ride produced
#[derive(Debug, Clone)]
pub struct RideReport {
    pub distance_km: f64,
    pub fixes: usize,
    pub ended_by: Option<TrackerFault>,
    pub messages: Vec<ChatMessage>,
}

/// Owns one tracker and everything around it
pub struct RideMonitor<A: DrivingAdvisor + 'static> {
    source: String,
    permissions: PermissionMonitor,
    tracker: TripTracker<Box<dyn LocationPlatform>>,
    coach: RideCoach,
    advisor: Arc<A>,
    permission_watch: Option<JoinHandle<()>>,
}

impl<A: DrivingAdvisor + 'static> RideMonitor<A> {
    /// Create a monitor for `source`, resolving the initial permission state
    pub fn new(source: &RideSource, config: &TrackerConfig, advisor: A) -> Result<Self> {
        let permissions = PermissionMonitor::new();

        let device = match source {
            RideSource::Serial { port, .. } => {
                let state = permissions.initialize(&DeviceAccessProbe::new(port.clone()));
                info!(%state, %port, "serial device permission");
                Some(port.clone())
            }
            _ => {
                permissions.initialize(&NoPermissionApi);
                None
            }
        };

        let mut monitor = Self::with_platform(
            source.describe(),
            source.open()?,
            config.watch.clone(),
            permissions,
            advisor,
        );

        if let Some(port) = device {
            // The tracker holds the port while tracking; only probe it when idle
            let sessions = monitor.tracker.subscribe();
            let interval = Duration::from_secs(config.permission_poll_secs.unwrap_or(5).max(1));
            monitor.permission_watch = Some(monitor.permissions.watch_platform(
                DeviceAccessProbe::new(port),
                interval,
                move || sessions.borrow().is_tracking(),
            ));
        }
        Ok(monitor)
    }

    /// Create a monitor over an already opened platform
    pub fn with_platform(
        source: impl Into<String>,
        platform: Box<dyn LocationPlatform>,
        options: WatchOptions,
        permissions: PermissionMonitor,
        advisor: A,
    ) -> Self {
        let tracker = TripTracker::new(platform, options, permissions.subscribe());
        Self {
            source: source.into(),
            permissions,
            tracker,
            coach: RideCoach::new(),
            advisor: Arc::new(advisor),
            permission_watch: None,
        }
    }

    pub fn session(&self) -> &TrackingSession {
        self.tracker.session()
    }

    pub fn permission(&self) -> PermissionState {
        self.permissions.current_status()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.coach.messages()
    }

    /// Start (or resume) tracking and open a new ride for the coach
    pub fn start_ride(&mut self) -> Result<()> {
        self.tracker.start()?;
        self.coach.begin_ride();
        Ok(())
    }

    pub fn stop_ride(&mut self) {
        self.tracker.stop();
    }

    pub fn reset_trip(&mut self) {
        self.tracker.reset_distance();
    }

    /// Toggle tracking; start failures are already recorded in the session
    pub fn toggle(&mut self) {
        if self.tracker.session().is_tracking() {
            self.stop_ride();
        } else if let Err(e) = self.start_ride() {
            warn!("could not start tracking: {}", e);
        }
    }

    /// Wait for the next stream event and apply it
    pub async fn step(&mut self) -> Option<TrackerUpdate> {
        let event = self.tracker.next_event().await?;
        let update = self.tracker.handle_event(event);
        self.coach.observe(&update);
        Some(update)
    }

    /// Stop tracking and request advice for the ride.
    ///
    /// Returns the advice task, or `None` when there was not enough data.
    pub fn stop_and_analyze(&mut self) -> Option<JoinHandle<String>> {
        self.tracker.stop();
        let distance_km = self.tracker.session().accumulated_distance_km;
        let summary = self.coach.finish_ride(distance_km)?;

        let advisor = Arc::clone(&self.advisor);
        Some(tokio::spawn(async move {
            advice_or_fallback(advisor.as_ref(), &summary).await
        }))
    }

    /// Append a finished advice request to the conversation
    pub fn deliver_advice(&mut self, result: std::result::Result<String, tokio::task::JoinError>) {
        match result {
            Ok(text) => self.coach.append_advice(text),
            Err(e) => {
                warn!("advice task failed: {}", e);
                self.coach.append_advice(crate::advice::FAILURE_MESSAGE);
            }
        }
    }

    /// Track until the source ends or fails, then optionally ask for advice
    pub async fn run_headless(&mut self, analyze: bool) -> Result<RideReport> {
        self.start_ride()?;
        let mut fixes = 0;

        let ended_by = loop {
            tokio::select! {
                update = self.step() => match update {
                    Some(TrackerUpdate::Fix { .. }) => fixes += 1,
                    Some(TrackerUpdate::Stopped(fault)) => break Some(fault),
                    Some(TrackerUpdate::Ignored) => {}
                    None => break None,
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("interrupted");
                    break None;
                }
            }
        };

        if analyze {
            if let Some(task) = self.stop_and_analyze() {
                let result = task.await;
                self.deliver_advice(result);
            }
        } else {
            self.stop_ride();
        }

        Ok(RideReport {
            distance_km: self.tracker.session().accumulated_distance_km,
            fixes,
            ended_by,
            messages: self.coach.messages().to_vec(),
        })
    }

    /// Interactive terminal dashboard
    pub async fn run_dashboard(&mut self) -> Result<()> {
        let display = TerminalDisplay::new();
        display.enter()?;

        let result = self.dashboard_loop(&display).await;

        display.leave()?;
        println!("\nShutting down...");
        result
    }

    async fn dashboard_loop(&mut self, display: &TerminalDisplay) -> Result<()> {
        let mut render = tokio::time::interval(Duration::from_secs(1));
        let mut keys = tokio::time::interval(Duration::from_millis(100));
        let mut advice: Option<JoinHandle<String>> = None;

        if let Err(e) = self.start_ride() {
            warn!("could not start tracking: {}", e);
        }

        loop {
            tokio::select! {
                Some(_) = self.step() => {}
                result = async {
                    match advice.as_mut() {
                        Some(task) => task.await,
                        None => std::future::pending().await,
                    }
                } => {
                    advice = None;
                    self.deliver_advice(result);
                    self.draw(display, false)?;
                }
                _ = render.tick() => {
                    self.draw(display, advice.is_some())?;
                }
                _ = keys.tick() => {
                    match read_key()? {
                        Some(DashboardKey::Quit) => break,
                        Some(DashboardKey::Toggle) => self.toggle(),
                        Some(DashboardKey::Reset) => self.reset_trip(),
                        Some(DashboardKey::Analyze) if advice.is_none() => {
                            advice = self.stop_and_analyze();
                        }
                        Some(DashboardKey::Analyze) | None => continue,
                    }
                    self.draw(display, advice.is_some())?;
                }
                _ = tokio::signal::ctrl_c() => break,
            }
        }

        self.stop_ride();
        if let Some(task) = advice {
            task.abort();
        }
        if let Some(task) = self.permission_watch.take() {
            task.abort();
        }
        Ok(())
    }

    fn draw(&self, display: &TerminalDisplay, analyzing: bool) -> Result<()> {
        display.draw(&DashboardView {
            source: &self.source,
            session: self.tracker.session(),
            permission: self.permissions.current_status(),
            messages: self.coach.messages(),
            analyzing,
        })
    }
}

impl<A: DrivingAdvisor + 'static> Drop for RideMonitor<A> {
    fn drop(&mut self) {
        if let Some(task) = self.permission_watch.take() {
            task.abort();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DashboardKey {
    Toggle,
    Reset,
    Analyze,
    Quit,
}

fn map_key(key: KeyEvent) -> Option<DashboardKey> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(DashboardKey::Quit),
        KeyCode::Char('s') | KeyCode::Char(' ') => Some(DashboardKey::Toggle),
        KeyCode::Char('r') => Some(DashboardKey::Reset),
        KeyCode::Char('a') => Some(DashboardKey::Analyze),
        KeyCode::Char('q') | KeyCode::Esc => Some(DashboardKey::Quit),
        _ => None,
    }
}

/// Drain pending terminal events without blocking
fn read_key() -> Result<Option<DashboardKey>> {
    while event::poll(Duration::ZERO)? {
        if let Event::Key(key) = event::read()? {
            if let Some(action) = map_key(key) {
                return Ok(Some(action));
            }
        }
    }
    Ok(None)
}

/// List available serial ports
pub fn list_serial_ports() -> Result<()> {
    let ports = tokio_serial::available_ports()?;

    if ports.is_empty() {
        println!("No serial ports found.");
    } else {
        println!("Available serial ports:");
        for port in ports {
            println!("  {} - {:?}", port.port_name, port.port_type);
        }
    }

    Ok(())
}

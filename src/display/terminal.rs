// src/display/terminal.rs
//! Terminal dashboard

use crate::{
    coach::{ChatMessage, Sender},
    error::{Result, TrackerError},
    permission::PermissionState,
    tracker::{SessionPhase, TrackingSession},
};
use crossterm::{
    cursor::{Hide, MoveTo, MoveToNextLine, Show},
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{self, Clear, ClearType, DisableLineWrap, EnableLineWrap},
};
use std::io::{self, Write};

/// Number of chat messages shown under the gauges
const VISIBLE_MESSAGES: usize = 4;

/// Everything one frame shows
pub struct DashboardView<'a> {
    pub source: &'a str,
    pub session: &'a TrackingSession,
    pub permission: PermissionState,
    pub messages: &'a [ChatMessage],
    pub analyzing: bool,
}

pub struct TerminalDisplay;

impl TerminalDisplay {
    pub fn new() -> Self {
        Self
    }

    /// Switch the terminal into dashboard mode
    pub fn enter(&self) -> Result<()> {
        terminal::enable_raw_mode().map_err(TrackerError::Io)?;
        execute!(io::stdout(), Hide, DisableLineWrap).map_err(TrackerError::Io)?;
        Ok(())
    }

    /// Restore the terminal
    pub fn leave(&self) -> Result<()> {
        execute!(io::stdout(), Show, EnableLineWrap).map_err(TrackerError::Io)?;
        terminal::disable_raw_mode().map_err(TrackerError::Io)?;
        Ok(())
    }

    /// Redraw the whole screen
    pub fn draw(&self, view: &DashboardView<'_>) -> Result<()> {
        let mut stdout = io::stdout();
        execute!(stdout, Clear(ClearType::All), MoveTo(0, 0)).map_err(TrackerError::Io)?;
        self.render_display(&mut stdout, view)?;
        stdout.flush().map_err(TrackerError::Io)?;
        Ok(())
    }

    /// Render one frame into `out`
    pub fn render_display(&self, out: &mut impl Write, view: &DashboardView<'_>) -> Result<()> {
        // Header
        heading(out, Color::Green, &"=".repeat(60))?;
        heading(out, Color::Green, "Ride Tracker - Trip Distance & Mileage")?;
        heading(out, Color::Green, &"=".repeat(60))?;

        let updated = match view.session.last_position.as_ref() {
            Some(position) => position.timestamp().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            None => "No fix yet".to_string(),
        };
        line(out, &format!("Last Fix: {} ({})", updated, view.source))?;
        line(out, "")?;

        self.render_trip_section(out, view)?;
        self.render_status_section(out, view)?;
        self.render_coach_section(out, view)?;

        // Footer
        heading(out, Color::Green, &"=".repeat(60))?;
        heading(out, Color::Green, "[s] start/stop  [r] reset  [a] stop & analyze  [q] quit")?;

        Ok(())
    }

    fn render_trip_section(&self, out: &mut impl Write, view: &DashboardView<'_>) -> Result<()> {
        let session = view.session;
        heading(out, Color::Cyan, "TRIP:")?;
        line(out, &format!("  Speed:     {}", format_value(session.current_speed_kmh, "km/h")))?;
        line(
            out,
            &format!("  Distance:  {:>12.2} km", session.accumulated_distance_km),
        )?;

        if let Some(position) = session.last_position.as_ref() {
            line(out, &format!("  Latitude:  {:>12.6}°", position.latitude()))?;
            line(out, &format!("  Longitude: {:>12.6}°", position.longitude()))?;
        }
        line(out, "")
    }

    fn render_status_section(&self, out: &mut impl Write, view: &DashboardView<'_>) -> Result<()> {
        heading(out, Color::Yellow, "STATUS:")?;

        let phase = view.session.phase();
        let color = match phase {
            SessionPhase::Tracking => Color::Green,
            SessionPhase::Idle => Color::White,
            SessionPhase::Denied | SessionPhase::Error => Color::Red,
        };
        execute!(
            out,
            Print("  Tracking:   "),
            SetForegroundColor(color),
            Print(format!("{:>11}", phase.to_string())),
            ResetColor,
            MoveToNextLine(1)
        )
        .map_err(TrackerError::Io)?;

        line(out, &format!("  Permission: {:>11}", view.permission.to_string()))?;

        if let Some(fault) = view.session.last_error.as_ref() {
            execute!(
                out,
                SetForegroundColor(Color::Red),
                Print(format!("  {}", fault)),
                ResetColor,
                MoveToNextLine(1)
            )
            .map_err(TrackerError::Io)?;
        }
        line(out, "")
    }

    fn render_coach_section(&self, out: &mut impl Write, view: &DashboardView<'_>) -> Result<()> {
        heading(out, Color::Magenta, "COACH:")?;

        let skip = view.messages.len().saturating_sub(VISIBLE_MESSAGES);
        for message in &view.messages[skip..] {
            let who = match message.sender {
                Sender::User => "You",
                Sender::Coach => "Coach",
            };
            line(out, &format!("  {}: {}", who, message.text))?;
        }
        if view.analyzing {
            line(out, "  Coach: ...")?;
        }
        line(out, "")
    }
}

impl Default for TerminalDisplay {
    fn default() -> Self {
        Self::new()
    }
}

/// Format an optional value with a unit
pub fn format_value(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) => format!("{:>12.1} {}", v, unit),
        None => format!("{:>12} {}", "N/A", unit),
    }
}

// Raw mode does not return the carriage on '\n'
fn line(out: &mut impl Write, text: &str) -> Result<()> {
    execute!(out, Print(text), MoveToNextLine(1)).map_err(TrackerError::Io)
}

fn heading(out: &mut impl Write, color: Color, text: &str) -> Result<()> {
    execute!(
        out,
        SetForegroundColor(color),
        Print(text),
        ResetColor,
        MoveToNextLine(1)
    )
    .map_err(TrackerError::Io)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{coach::RideCoach, tracker::TrackerFault};

    fn render(view: &DashboardView<'_>) -> String {
        let mut out = Vec::new();
        TerminalDisplay::new().render_display(&mut out, view).unwrap();
        String::from_utf8_lossy(&out).into_owned()
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(Some(36.04), "km/h").trim(), "36.0 km/h");
        assert_eq!(format_value(None, "km/h").trim(), "N/A km/h");
    }

    #[test]
    fn test_render_idle_session() {
        let session = TrackingSession::default();
        let coach = RideCoach::new();
        let text = render(&DashboardView {
            source: "gpsd localhost:2947",
            session: &session,
            permission: PermissionState::Prompt,
            messages: coach.messages(),
            analyzing: false,
        });

        assert!(text.contains("No fix yet (gpsd localhost:2947)"));
        assert!(text.contains("0.00 km"));
        assert!(text.contains("Idle"));
        assert!(text.contains("prompt"));
        assert!(text.contains("AI driving coach"));
    }

    #[test]
    fn test_render_fault_and_pending_advice() {
        let session = TrackingSession {
            accumulated_distance_km: 3.456,
            last_error: Some(TrackerFault::from(&crate::location::PositionError::Timeout)),
            ..TrackingSession::default()
        };
        let text = render(&DashboardView {
            source: "replay",
            session: &session,
            permission: PermissionState::Granted,
            messages: &[],
            analyzing: true,
        });

        assert!(text.contains("3.46 km"));
        assert!(text.contains("Error"));
        assert!(text.contains("Timed out waiting for a GPS fix."));
        assert!(text.contains("Coach: ..."));
    }
}

// src/coach.rs
//! Ride coaching conversation

use crate::{
    classifier::{DrivingEventCounters, DrivingSummary},
    tracker::TrackerUpdate,
};
use serde::Serialize;
use tracing::info;

pub const GREETING: &str = "Hello! I'm your AI driving coach. Start tracking your ride, and I'll give you tips to improve your mileage.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Sender {
    User,
    Coach,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub sender: Sender,
    pub text: String,
}

impl ChatMessage {
    fn user(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
        }
    }

    fn coach(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Coach,
            text: text.into(),
        }
    }
}

/// Collects the speed sequence of a ride and keeps the conversation
pub struct RideCoach {
    messages: Vec<ChatMessage>,
    counters: DrivingEventCounters,
}

impl RideCoach {
    pub fn new() -> Self {
        Self {
            messages: vec![ChatMessage::coach(GREETING)],
            counters: DrivingEventCounters::new(),
        }
    }

    /// Reset the counters for a new ride
    pub fn begin_ride(&mut self) {
        self.counters.reset();
        self.messages
            .push(ChatMessage::user("Tracking started! Enjoy your ride."));
    }

    /// Record one speed sample per applied fix
    pub fn observe(&mut self, update: &TrackerUpdate) {
        if let TrackerUpdate::Fix { speed_kmh, .. } = update {
            self.counters.record(*speed_kmh);
        }
    }

    /// Close the ride and produce the summary to analyze, if there is enough
    /// data for one
    pub fn finish_ride(&mut self, distance_km: f64) -> Option<DrivingSummary> {
        match self.counters.summarize(distance_km) {
            Ok(summary) => {
                info!(
                    distance_km,
                    acceleration_events = summary.acceleration_events,
                    braking_events = summary.braking_events,
                    "ride summarized"
                );
                self.messages.push(ChatMessage::user(format!(
                    "Okay, analyzing your {:.2} km ride...",
                    distance_km
                )));
                Some(summary)
            }
            Err(e) => {
                self.messages.push(ChatMessage::coach(e.to_string()));
                None
            }
        }
    }

    /// Append the coach's reply, whenever it arrives
    pub fn append_advice(&mut self, text: impl Into<String>) {
        self.messages.push(ChatMessage::coach(text));
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn counters(&self) -> &DrivingEventCounters {
        &self.counters
    }
}

impl Default for RideCoach {
    fn default() -> Self {
        Self::new()
    }
}

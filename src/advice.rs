// src/advice.rs
//! Fuel-saving advice from a remote text-generation service

use crate::{
    classifier::DrivingSummary,
    config::AdviceConfig,
    error::{Result, TrackerError},
};
use serde::{Deserialize, Serialize};
use std::{future::Future, time::Duration};
use tracing::{debug, warn};

pub const UNAVAILABLE_MESSAGE: &str =
    "AI analysis is currently unavailable. Please configure the Gemini API key.";

pub const FAILURE_MESSAGE: &str =
    "Sorry, I couldn't analyze the data right now. There might be an issue with the AI service.";

/// Something that turns a ride summary into advice text
pub trait DrivingAdvisor: Send + Sync {
    fn advise(&self, summary: &DrivingSummary) -> impl Future<Output = Result<String>> + Send;
}

/// Ask `advisor` for advice, replacing any failure with a fixed apology
pub async fn advice_or_fallback<A: DrivingAdvisor>(advisor: &A, summary: &DrivingSummary) -> String {
    match advisor.advise(summary).await {
        Ok(text) => text,
        Err(e) => {
            warn!("advice request failed: {}", e);
            FAILURE_MESSAGE.to_string()
        }
    }
}

/// The prompt sent for one ride
pub fn build_prompt(summary: &DrivingSummary) -> String {
    format!(
        "Analyze the following bike driving data and provide actionable suggestions to improve mileage.\n\
         The user is on a commuter bike in India. Be concise and encouraging.\n\
         \n\
         Driving Data:\n\
         - Average Speed: {:.1} km/h\n\
         - Rapid Acceleration Events: {}\n\
         - Hard Braking Events: {}\n\
         - Total Distance Tracked: {:.2} km\n\
         \n\
         Provide 2-3 specific tips based on this data. Format the output as a friendly chat message.",
        summary.average_speed_kmh,
        summary.acceleration_events,
        summary.braking_events,
        summary.distance_km,
    )
}

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

impl GenerateResponse {
    fn into_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().map(|p| p.text).collect();
        if text.trim().is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Client for the Generative Language `generateContent` endpoint
pub struct GeminiAdvisor {
    client: reqwest::Client,
    api_key: Option<String>,
    endpoint: String,
    model: String,
}

impl GeminiAdvisor {
    pub fn new(
        api_key: Option<String>,
        endpoint: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ride-tracker/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let api_key = api_key.filter(|k| !k.trim().is_empty());
        if api_key.is_none() {
            warn!("Gemini API key not found. AI features will be disabled.");
        }

        Ok(Self {
            client,
            api_key,
            endpoint: endpoint.into(),
            model: model.into(),
        })
    }

    /// Build from configuration, reading the key from the configured variable
    pub fn from_config(config: &AdviceConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).ok();
        Self::new(
            api_key,
            config.endpoint.clone(),
            config.model.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        )
    }
}

impl DrivingAdvisor for GeminiAdvisor {
    async fn advise(&self, summary: &DrivingSummary) -> Result<String> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Ok(UNAVAILABLE_MESSAGE.to_string());
        };

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: build_prompt(summary),
                }],
            }],
        };

        let url = self.url();
        debug!(%url, "requesting driving advice");

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TrackerError::RemoteService(format!(
                "HTTP {} from {}",
                response.status(),
                url
            )));
        }

        let body: GenerateResponse = response.json().await?;

        body.into_text()
            .ok_or_else(|| TrackerError::RemoteService("response contained no text".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    impl DrivingAdvisor for Failing {
        async fn advise(&self, _summary: &DrivingSummary) -> Result<String> {
            Err(TrackerError::RemoteService("boom".to_string()))
        }
    }

    fn summary() -> DrivingSummary {
        DrivingSummary {
            average_speed_kmh: 36.44,
            acceleration_events: 2,
            braking_events: 1,
            distance_km: 12.5,
        }
    }

    #[test]
    fn test_prompt_contents() {
        let prompt = build_prompt(&summary());
        assert!(prompt.contains("Average Speed: 36.4 km/h"));
        assert!(prompt.contains("Rapid Acceleration Events: 2"));
        assert!(prompt.contains("Hard Braking Events: 1"));
        assert!(prompt.contains("Total Distance Tracked: 12.50 km"));
        assert!(prompt.contains("2-3 specific tips"));
    }

    #[tokio::test]
    async fn test_missing_key_degrades() {
        let advisor = GeminiAdvisor::new(None, "http://127.0.0.1:9", "gemini-2.5-flash", Duration::from_secs(1)).unwrap();
        assert!(!advisor.is_configured());
        assert_eq!(advisor.advise(&summary()).await.unwrap(), UNAVAILABLE_MESSAGE);
    }

    #[tokio::test]
    async fn test_unreachable_service_is_http_error() {
        let advisor = GeminiAdvisor::new(
            Some("k".to_string()),
            "http://127.0.0.1:9/v1beta",
            "gemini-2.5-flash",
            Duration::from_secs(2),
        )
        .unwrap();
        assert!(matches!(advisor.advise(&summary()).await, Err(TrackerError::Http(_))));
        assert_eq!(advice_or_fallback(&advisor, &summary()).await, FAILURE_MESSAGE);
    }

    #[tokio::test]
    async fn test_failure_becomes_fallback() {
        assert_eq!(advice_or_fallback(&Failing, &summary()).await, FAILURE_MESSAGE);
    }

    #[test]
    fn test_url() {
        let advisor = GeminiAdvisor::new(
            Some("k".to_string()),
            "https://generativelanguage.googleapis.com/v1beta/",
            "gemini-2.5-flash",
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            advisor.url(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn test_response_text_extraction() {
        let body: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Ease off "},{"text":"the throttle."}],"role":"model"}}]}"#,
        )
        .unwrap();
        assert_eq!(body.into_text().unwrap(), "Ease off the throttle.");

        let empty: GenerateResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(empty.into_text().is_none());
    }
}

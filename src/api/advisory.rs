//! HTTP client for the external advisory (LLM) decision service
//!
//! Speaks the Ollama `generate` protocol: one non-streaming POST per request,
//! JSON mode requested, reply text returned in the `response` field.

use crate::config::AdvisoryConfig;
use crate::error::TradingError;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    system: &'a str,
    stream: bool,
    temperature: f64,
    format: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Wrap the observation text into the user prompt
pub fn observation_prompt(observation: &str) -> String {
    format!(
        "Market Observation:\n{}\n\nBased on this, what is your trading decision?",
        observation
    )
}

#[derive(Clone)]
pub struct AdvisoryClient {
    client: reqwest::Client,
    url: String,
    model: String,
    temperature: f64,
}

impl AdvisoryClient {
    pub fn new(config: &AdvisoryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TradingError::Config(format!("advisory client: {}", e)))?;

        Ok(Self {
            client,
            url: config.url.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    /// Send one observation with the given system prompt and return the raw reply text
    ///
    /// No retries: a failed request is the caller's HOLD.
    pub async fn request(&self, system: &str, observation: &str) -> Result<String> {
        let request = GenerateRequest {
            model: &self.model,
            prompt: observation_prompt(observation),
            system,
            stream: false,
            temperature: self.temperature,
            format: "json",
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TradingError::AdvisoryFailure(format!("timed out: {}", e))
                } else {
                    TradingError::AdvisoryFailure(format!("network error: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(TradingError::AdvisoryFailure(format!(
                "advisory service error {}: {}",
                status, body
            )));
        }

        let reply: GenerateResponse = response
            .json()
            .await
            .map_err(|e| TradingError::AdvisoryFailure(format!("JSON decode error: {}", e)))?;

        let preview: String = reply.response.chars().take(200).collect();
        tracing::debug!("Raw advisory reply: {}...", preview);

        Ok(reply.response)
    }
}

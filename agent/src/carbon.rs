//! Optional carbon-intensity side channel: periodically polls a
//! WattTime-style HTTP API for the grid's current carbon intensity.
//!
//! This never runs unless the `[carbon]` table is present in the agent's
//! config, and `hwpc_power` itself never depends on this module or on
//! `reqwest`: the power models are computed purely from HWPC/RAPL data,
//! same as the original formula this agent reimplements.

use std::time::Duration;

use serde::Deserialize;

use crate::config::CarbonConfig;

#[derive(Debug, thiserror::Error)]
pub enum CarbonError {
    #[error("request to `{url}` failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("response from `{url}` was not valid carbon-intensity JSON: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
struct CarbonIntensityResponse {
    /// Grams of CO2 per kilowatt-hour.
    #[serde(rename = "moer")]
    grams_co2_per_kwh: f64,
}

/// Polls a carbon-intensity API on a fixed interval, independent of the
/// tick-driven power pipeline.
pub struct CarbonIntensityPoller {
    client: reqwest::Client,
    config: CarbonConfig,
}

impl CarbonIntensityPoller {
    pub fn new(config: CarbonConfig) -> Self {
        CarbonIntensityPoller {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Fetches the current carbon intensity once.
    pub async fn fetch_once(&self) -> Result<f64, CarbonError> {
        let url = format!("{}/v3/forecast?region={}", self.config.api_url, self.config.region);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.api_token)
            .send()
            .await
            .map_err(|source| CarbonError::Request { url: url.clone(), source })?;
        let parsed: CarbonIntensityResponse = response
            .json()
            .await
            .map_err(|source| CarbonError::Decode { url: url.clone(), source })?;
        Ok(parsed.grams_co2_per_kwh)
    }

    pub fn poll_interval(&self) -> Duration {
        self.config.poll_interval
    }
}

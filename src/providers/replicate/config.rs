//! Replicate provider configuration
//! This module contains configuration structures and defaults specific to Replicate

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default model used for location imagery
pub const DEFAULT_MODEL: &str = "black-forest-labs/flux-1.1-pro";

/// Default API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.replicate.com/v1";

/// Replicate-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicateConfig {
    /// API token for authentication
    pub api_token: String,
    /// Base URL for API requests
    pub base_url: String,
    /// Model in `owner/name` form
    pub model: String,
    /// Overall budget for one generation, including polling, in seconds
    pub timeout_seconds: u64,
    /// Delay between prediction status polls in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for ReplicateConfig {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_seconds: 120,
            poll_interval_ms: 1000,
        }
    }
}

impl ReplicateConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Endpoint that creates a prediction against the configured model
    pub fn predictions_url(&self) -> String {
        format!(
            "{}/models/{}/predictions",
            self.base_url.trim_end_matches('/'),
            self.model
        )
    }
}

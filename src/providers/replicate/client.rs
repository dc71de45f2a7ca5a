//! Replicate provider client implementation
//! This module contains the client that creates and polls predictions on Replicate

use async_trait::async_trait;
use reqwest::{header::HeaderMap, header::HeaderValue, header::AUTHORIZATION, header::CONTENT_TYPE, Client};
use tokio::time::Instant;
use tracing::{debug, error};

use crate::providers::traits::ImageGenerationClient;
use crate::providers::{status_error, GenerationOutput, ProviderError, ProviderResult};

use super::config::ReplicateConfig;
use super::types::{Prediction, PredictionRequest, PredictionStatus};

/// Replicate provider client
pub struct ReplicateClient {
    client: Client,
    config: ReplicateConfig,
}

impl ReplicateClient {
    /// Create a new Replicate client with configuration
    pub fn new(config: ReplicateConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &ReplicateConfig {
        &self.config
    }

    /// Build HTTP headers for requests
    fn build_headers(&self) -> ProviderResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.config.api_token))
                .map_err(|e| ProviderError::Internal(format!("Invalid API token format: {}", e)))?,
        );
        Ok(headers)
    }

    /// Decode a prediction response, mapping error statuses
    async fn read_prediction(&self, response: reqwest::Response) -> ProviderResult<Prediction> {
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            error!("Replicate API Error: {} - {}", status, error_text);
            return Err(status_error(status.as_u16(), &error_text));
        }

        response
            .json::<Prediction>()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }

    async fn create_prediction(&self, prompt: &str, deadline: Instant) -> ProviderResult<Prediction> {
        let request_url = self.config.predictions_url();
        debug!("Replicate API Request: URL={}, Model={}", request_url, self.config.model);

        let response = self
            .client
            .post(&request_url)
            .headers(self.build_headers()?)
            // Ask the API to hold the connection until the prediction settles
            .header("Prefer", "wait")
            .json(&PredictionRequest::for_prompt(prompt))
            .timeout(remaining(deadline)?)
            .send()
            .await?;

        self.read_prediction(response).await
    }

    async fn get_prediction(&self, url: &str, deadline: Instant) -> ProviderResult<Prediction> {
        let response = self
            .client
            .get(url)
            .headers(self.build_headers()?)
            .timeout(remaining(deadline)?)
            .send()
            .await?;

        self.read_prediction(response).await
    }
}

/// Time left before `deadline`, or a timeout error once it has passed
fn remaining(deadline: Instant) -> ProviderResult<std::time::Duration> {
    let now = Instant::now();
    if now >= deadline {
        return Err(ProviderError::Timeout(
            "generation deadline exceeded".to_string(),
        ));
    }
    Ok(deadline - now)
}

#[async_trait]
impl ImageGenerationClient for ReplicateClient {
    async fn generate(&self, prompt: &str) -> ProviderResult<GenerationOutput> {
        let deadline = Instant::now() + self.config.timeout();
        let mut prediction = self.create_prediction(prompt, deadline).await?;

        loop {
            match prediction.status {
                PredictionStatus::Succeeded => {
                    return prediction.output.ok_or_else(|| {
                        ProviderError::InvalidResponse(format!(
                            "prediction {} succeeded without output",
                            prediction.id
                        ))
                    });
                }
                PredictionStatus::Failed | PredictionStatus::Canceled => {
                    return Err(ProviderError::Prediction(prediction.error_message()));
                }
                PredictionStatus::Starting | PredictionStatus::Processing => {
                    let poll_url = prediction
                        .urls
                        .as_ref()
                        .map(|urls| urls.get.clone())
                        .ok_or_else(|| {
                            ProviderError::InvalidResponse(format!(
                                "prediction {} is pending but has no poll URL",
                                prediction.id
                            ))
                        })?;

                    if remaining(deadline)? <= self.config.poll_interval() {
                        return Err(ProviderError::Timeout(format!(
                            "prediction {} still {:?} at deadline",
                            prediction.id, prediction.status
                        )));
                    }
                    tokio::time::sleep(self.config.poll_interval()).await;

                    debug!("Polling Replicate prediction {}", prediction.id);
                    prediction = self.get_prediction(&poll_url, deadline).await?;
                }
            }
        }
    }

    fn provider_name(&self) -> &str {
        "replicate"
    }
}

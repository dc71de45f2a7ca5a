//! Replicate API request/response types

use serde::{Deserialize, Serialize};

use crate::providers::GenerationOutput;

/// Body of `POST /models/{owner}/{name}/predictions`
#[derive(Debug, Clone, Serialize)]
pub struct PredictionRequest {
    pub input: PredictionInput,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionInput {
    pub prompt: String,
}

impl PredictionRequest {
    pub fn for_prompt(prompt: &str) -> Self {
        Self {
            input: PredictionInput {
                prompt: prompt.to_string(),
            },
        }
    }
}

/// Prediction lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PredictionStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PredictionUrls {
    pub get: String,
}

/// Prediction resource as returned by create and get
#[derive(Debug, Clone, Deserialize)]
pub struct Prediction {
    pub id: String,
    pub status: PredictionStatus,
    #[serde(default)]
    pub output: Option<GenerationOutput>,
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    #[serde(default)]
    pub urls: Option<PredictionUrls>,
}

impl Prediction {
    /// Human-readable failure reason
    pub fn error_message(&self) -> String {
        match &self.error {
            Some(serde_json::Value::String(message)) => message.clone(),
            Some(other) => other.to_string(),
            None => format!("prediction {} ended with status {:?}", self.id, self.status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_succeeded_prediction_with_string_output() {
        let json = r#"{
            "id": "p1",
            "status": "succeeded",
            "output": "https://replicate.delivery/out.webp",
            "urls": {"get": "https://api.replicate.com/v1/predictions/p1"}
        }"#;
        let prediction: Prediction = serde_json::from_str(json).unwrap();
        assert_eq!(prediction.status, PredictionStatus::Succeeded);
        assert_eq!(
            prediction.output.unwrap().first_url(),
            Some("https://replicate.delivery/out.webp")
        );
    }

    #[test]
    fn test_parse_processing_prediction() {
        let json = r#"{"id": "p2", "status": "processing", "output": null,
                       "urls": {"get": "https://api.replicate.com/v1/predictions/p2"}}"#;
        let prediction: Prediction = serde_json::from_str(json).unwrap();
        assert_eq!(prediction.status, PredictionStatus::Processing);
        assert!(prediction.output.is_none());
    }

    #[test]
    fn test_failed_prediction_message() {
        let json = r#"{"id": "p3", "status": "failed", "error": "NSFW content detected"}"#;
        let prediction: Prediction = serde_json::from_str(json).unwrap();
        assert_eq!(prediction.error_message(), "NSFW content detected");
    }
}

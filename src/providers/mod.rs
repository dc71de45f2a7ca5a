//! Remote Collaborators
//!
//! This module contains the clients for the external services the image
//! generation pipeline depends on, organized by provider with each having their
//! own subdirectory containing:
//! - client.rs: Provider-specific client implementation
//! - config.rs: Provider-specific configuration and defaults
//! - types.rs: Provider-specific request/response types
//! - mod.rs: Module exports
//!
//! The pipeline itself only sees the traits in [`traits`]; tests substitute
//! in-process doubles.

pub mod cloudinary;
pub mod fetcher;
pub mod replicate;
pub mod traits;

use serde::{Deserialize, Serialize};

pub use cloudinary::CloudinaryStore;
pub use fetcher::HttpImageFetcher;
pub use replicate::ReplicateClient;
pub use traits::{ArtifactStore, ImageFetcher, ImageGenerationClient};

/// Output of a generation call
///
/// Generation providers return either a single URL or a list of URLs depending
/// on the model. The first element of a list is the one that gets used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GenerationOutput {
    Single(String),
    Many(Vec<String>),
}

impl GenerationOutput {
    /// The image URL to download, if the provider produced one
    pub fn first_url(&self) -> Option<&str> {
        let url = match self {
            GenerationOutput::Single(url) => Some(url.as_str()),
            GenerationOutput::Many(urls) => urls.first().map(|u| u.as_str()),
        };
        url.map(str::trim).filter(|u| !u.is_empty())
    }
}

impl From<&str> for GenerationOutput {
    fn from(url: &str) -> Self {
        GenerationOutput::Single(url.to_string())
    }
}

/// Error types for remote collaborator calls
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Prediction failed: {0}")]
    Prediction(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ProviderError {
    /// Whether the same request could plausibly succeed later
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Network(_)
            | ProviderError::Timeout(_)
            | ProviderError::RateLimitExceeded(_) => true,
            ProviderError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(err.to_string())
        } else if err.is_decode() {
            ProviderError::InvalidResponse(err.to_string())
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}

impl From<std::io::Error> for ProviderError {
    fn from(err: std::io::Error) -> Self {
        ProviderError::Io(err.to_string())
    }
}

/// Map a non-success HTTP status to a provider error
pub(crate) fn status_error(status: u16, body: &str) -> ProviderError {
    match status {
        401 | 403 => ProviderError::AuthenticationFailed(body.to_string()),
        420 | 429 => ProviderError::RateLimitExceeded(body.to_string()),
        _ => ProviderError::Http {
            status,
            body: body.to_string(),
        },
    }
}

/// Result type for remote collaborator calls
pub type ProviderResult<T> = Result<T, ProviderError>;

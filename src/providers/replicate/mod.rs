//! Replicate provider module
//! This module provides the Replicate-backed image generation client

pub mod client;
pub mod config;
pub mod types;

pub use client::ReplicateClient;
pub use config::{ReplicateConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
pub use types::{Prediction, PredictionRequest, PredictionStatus};

//! Cloudinary artifact store configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Cloudinary-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    /// Folder prefix for public ids; empty for the account root
    pub folder: String,
    /// Base URL for API requests
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for CloudinaryConfig {
    fn default() -> Self {
        Self {
            cloud_name: String::new(),
            api_key: String::new(),
            api_secret: String::new(),
            folder: "explora".to_string(),
            base_url: "https://api.cloudinary.com/v1_1".to_string(),
            timeout_seconds: 60,
        }
    }
}

impl CloudinaryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn upload_url(&self) -> String {
        format!(
            "{}/{}/image/upload",
            self.base_url.trim_end_matches('/'),
            self.cloud_name
        )
    }

    /// Public id for an artifact key, e.g. `explora/location_42`
    pub fn public_id(&self, key: &str) -> String {
        let folder = self.folder.trim_matches('/');
        if folder.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", folder, key)
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.cloud_name.is_empty() && !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}

//! Cloudinary artifact store client
//! Performs signed uploads of staged images and returns their secure URL

use async_trait::async_trait;
use base64::Engine as _;
use bytes::Bytes;
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, error};

use crate::providers::traits::ArtifactStore;
use crate::providers::{status_error, ProviderError, ProviderResult};

use super::config::CloudinaryConfig;

/// Successful upload response (subset)
#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
    #[serde(default)]
    public_id: Option<String>,
}

/// Cloudinary-backed [`ArtifactStore`]
pub struct CloudinaryStore {
    client: Client,
    config: CloudinaryConfig,
}

impl CloudinaryStore {
    pub fn new(config: CloudinaryConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &CloudinaryConfig {
        &self.config
    }

    /// SHA-256 request signature over the sorted signed parameters
    ///
    /// The account must have SHA-256 signatures enabled.
    fn sign(&self, params: &[(&str, String)]) -> String {
        let mut sorted: Vec<&(&str, String)> = params.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));

        let to_sign = sorted
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let digest = Sha256::digest(format!("{}{}", to_sign, self.config.api_secret).as_bytes());
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

/// Best-effort content type from magic bytes
pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        "image/png"
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "image/webp"
    } else if bytes.starts_with(b"GIF8") {
        "image/gif"
    } else {
        "application/octet-stream"
    }
}

#[async_trait]
impl ArtifactStore for CloudinaryStore {
    async fn upload(&self, bytes: Bytes, key: &str) -> ProviderResult<String> {
        if !self.config.is_configured() {
            return Err(ProviderError::AuthenticationFailed(
                "cloudinary credentials are not configured".to_string(),
            ));
        }

        let public_id = self.config.public_id(key);
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signed = [
            ("overwrite", "true".to_string()),
            ("public_id", public_id.clone()),
            ("timestamp", timestamp),
        ];
        let signature = self.sign(&signed);

        let data_uri = format!(
            "data:{};base64,{}",
            sniff_mime(&bytes),
            base64::engine::general_purpose::STANDARD.encode(&bytes)
        );

        let mut form: Vec<(&str, String)> = signed.to_vec();
        form.push(("api_key", self.config.api_key.clone()));
        form.push(("signature", signature));
        form.push(("file", data_uri));

        debug!("Uploading {} bytes to Cloudinary as {}", bytes.len(), public_id);

        let response = self
            .client
            .post(self.config.upload_url())
            .form(&form)
            .timeout(self.config.timeout())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            error!("Cloudinary upload error: {} - {}", status, error_text);
            return Err(status_error(status.as_u16(), &error_text));
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        debug!(
            "Cloudinary stored {}",
            uploaded.public_id.as_deref().unwrap_or(&public_id)
        );
        Ok(uploaded.secure_url)
    }
}

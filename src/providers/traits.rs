//! Common traits for remote collaborators
//! These are the seams between the generation pipeline and the outside world

use async_trait::async_trait;
use bytes::Bytes;

use super::{GenerationOutput, ProviderResult};

/// Generative-image provider
///
/// Opaque and potentially slow (seconds); may fail transiently.
#[async_trait]
pub trait ImageGenerationClient: Send + Sync {
    /// Generate an image for `prompt` and return where it can be downloaded
    async fn generate(&self, prompt: &str) -> ProviderResult<GenerationOutput>;

    /// Short provider name for logs
    fn provider_name(&self) -> &str;
}

/// Durable object storage for generated artifacts
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Upload `bytes` under `key` and return a stable public URL
    ///
    /// Uploading twice under the same key must overwrite, not duplicate.
    async fn upload(&self, bytes: Bytes, key: &str) -> ProviderResult<String>;
}

/// Downloads a generated image into a staging file
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    /// Stream the body at `url` into `sink`, returning the number of bytes written
    async fn fetch_into(&self, url: &str, sink: &mut tokio::fs::File) -> ProviderResult<u64>;
}

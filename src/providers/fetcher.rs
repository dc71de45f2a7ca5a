//! HTTP image fetcher
//! Streams a generated image into a staging file without buffering it in memory

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use url::Url;

use super::traits::ImageFetcher;
use super::{status_error, ProviderError, ProviderResult};

/// `reqwest`-backed [`ImageFetcher`]
pub struct HttpImageFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            timeout,
        }
    }
}

impl Default for HttpImageFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

/// Accept only absolute http(s) URLs
pub fn parse_image_url(raw: &str) -> ProviderResult<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ProviderError::InvalidResponse(format!("invalid image URL {:?}: {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ProviderError::InvalidResponse(format!(
            "unsupported image URL scheme: {}",
            other
        ))),
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch_into(&self, url: &str, sink: &mut tokio::fs::File) -> ProviderResult<u64> {
        let url = parse_image_url(url)?;

        let response = self
            .client
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(status_error(status.as_u16(), &error_text));
        }

        let mut written: u64 = 0;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            sink.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        sink.flush().await?;

        if written == 0 {
            return Err(ProviderError::InvalidResponse(format!(
                "empty image body from {}",
                url
            )));
        }

        debug!("Downloaded {} bytes from {}", written, url);
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_image_url() {
        assert!(parse_image_url("https://replicate.delivery/x.webp").is_ok());
        assert!(parse_image_url(" http://localhost:8080/a.png ").is_ok());
        assert!(parse_image_url("ftp://example.com/a.png").is_err());
        assert!(parse_image_url("not a url").is_err());
    }
}

//! Application configuration
//!
//! Settings are layered, lowest precedence first:
//! 1. Built-in defaults (the `Default` impls below)
//! 2. Conventional provider variables (`DATABASE_URL`, `REPLICATE_API_TOKEN`,
//!    `CLOUDINARY_*`, `JWT_SECRET_KEY`)
//! 3. `EXPLORA__SECTION__KEY` environment variables, e.g.
//!    `EXPLORA__SERVER__PORT=8080` or `EXPLORA__JOBS__MAX_ATTEMPTS=5`
//!
//! Binaries call `dotenv` first, so a `.env` file feeds both env layers.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::engine::{DispatcherConfig, JobSettings, RetryPolicy};
use crate::providers::cloudinary::CloudinaryConfig;
use crate::providers::replicate::ReplicateConfig;
use crate::{ExploraError, Result};

/// Conventional variable names mapped onto config keys
const LEGACY_ENV: &[(&str, &str)] = &[
    ("DATABASE_URL", "database.url"),
    ("JWT_SECRET_KEY", "auth.jwt_secret"),
    ("REPLICATE_API_TOKEN", "generation.api_token"),
    ("CLOUDINARY_CLOUD_NAME", "storage.cloud_name"),
    ("CLOUDINARY_API_KEY", "storage.api_key"),
    ("CLOUDINARY_API_SECRET", "storage.api_secret"),
];

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub cors_enabled: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            cors_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// In-memory storage is used when unset
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub api_token: String,
    pub base_url: String,
    pub model: String,
    pub timeout_seconds: u64,
    pub poll_interval_ms: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        let replicate = ReplicateConfig::default();
        Self {
            api_token: replicate.api_token,
            base_url: replicate.base_url,
            model: replicate.model,
            timeout_seconds: replicate.timeout_seconds,
            poll_interval_ms: replicate.poll_interval_ms,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub folder: String,
    pub timeout_seconds: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        let cloudinary = CloudinaryConfig::default();
        Self {
            cloud_name: cloudinary.cloud_name,
            api_key: cloudinary.api_key,
            api_secret: cloudinary.api_secret,
            folder: cloudinary.folder,
            timeout_seconds: cloudinary.timeout_seconds,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobSettingsConfig {
    pub max_attempts: u32,
    pub retry_delay_seconds: u64,
    pub download_timeout_seconds: u64,
    pub max_concurrent_jobs: usize,
    pub retry_downstream_failures: bool,
    pub staging_dir: Option<PathBuf>,
    pub trigger_radius_meters: f64,
    pub context_radius_meters: f64,
}

impl Default for JobSettingsConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_seconds: 10,
            download_timeout_seconds: 60,
            max_concurrent_jobs: 4,
            retry_downstream_failures: false,
            staging_dir: None,
            trigger_radius_meters: 500.0,
            context_radius_meters: 1000.0,
        }
    }
}

/// Complete application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub generation: GenerationSettings,
    pub storage: StorageSettings,
    pub jobs: JobSettingsConfig,
    pub log_level: String,
}

impl AppConfig {
    /// Load from the process environment
    pub fn load() -> Result<Self> {
        let mut builder = ::config::Config::builder();
        for (var, key) in LEGACY_ENV {
            if let Ok(value) = std::env::var(var) {
                builder = builder.set_default(*key, value)?;
            }
        }

        Self::from_builder(
            builder.add_source(
                ::config::Environment::with_prefix("EXPLORA")
                    .separator("__")
                    .try_parsing(true),
            ),
        )
    }

    /// Build from an explicit set of sources
    pub fn from_builder(
        builder: ::config::ConfigBuilder<::config::builder::DefaultState>,
    ) -> Result<Self> {
        let mut config: AppConfig = builder.build()?.try_deserialize()?;
        if config.log_level.is_empty() {
            config.log_level = "info".to_string();
        }
        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Fail early when the HTTP API cannot authenticate anyone
    pub fn require_jwt_secret(&self) -> Result<&str> {
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(ExploraError::Config(
                "auth.jwt_secret (or JWT_SECRET_KEY) must be set".to_string(),
            ));
        }
        Ok(&self.auth.jwt_secret)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.jobs.max_attempts,
            Duration::from_secs(self.jobs.retry_delay_seconds),
        )
        .with_downstream_retries(self.jobs.retry_downstream_failures)
    }

    pub fn job_settings(&self) -> JobSettings {
        JobSettings {
            generation_timeout: Duration::from_secs(self.generation.timeout_seconds),
            download_timeout: Duration::from_secs(self.jobs.download_timeout_seconds),
            staging_dir: self.jobs.staging_dir.clone(),
        }
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            max_concurrent_jobs: self.jobs.max_concurrent_jobs,
        }
    }

    pub fn replicate_config(&self) -> ReplicateConfig {
        ReplicateConfig {
            api_token: self.generation.api_token.clone(),
            base_url: self.generation.base_url.clone(),
            model: self.generation.model.clone(),
            timeout_seconds: self.generation.timeout_seconds,
            poll_interval_ms: self.generation.poll_interval_ms,
        }
    }

    pub fn cloudinary_config(&self) -> CloudinaryConfig {
        CloudinaryConfig {
            cloud_name: self.storage.cloud_name.clone(),
            api_key: self.storage.api_key.clone(),
            api_secret: self.storage.api_secret.clone(),
            folder: self.storage.folder.clone(),
            timeout_seconds: self.storage.timeout_seconds,
            ..CloudinaryConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_builder(::config::Config::builder()).unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:5000");
        assert!(config.server.cors_enabled);
        assert!(config.database.url.is_none());
        assert_eq!(config.log_level, "info");
        assert_eq!(config.generation.model, "black-forest-labs/flux-1.1-pro");
        assert_eq!(config.storage.folder, "explora");
        assert_eq!(config.jobs.trigger_radius_meters, 500.0);

        let policy = config.retry_policy();
        assert_eq!(policy, RetryPolicy::default());
        assert_eq!(config.job_settings().generation_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_overrides() {
        let builder = ::config::Config::builder()
            .set_override("server.port", 8080)
            .unwrap()
            .set_override("jobs.max_attempts", 5)
            .unwrap()
            .set_override("jobs.retry_downstream_failures", true)
            .unwrap()
            .set_override("storage.cloud_name", "demo")
            .unwrap()
            .set_override("log_level", "debug")
            .unwrap();

        let config = AppConfig::from_builder(builder).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.retry_policy().max_attempts, 5);
        assert!(config.retry_policy().retry_downstream_failures);
        assert_eq!(config.cloudinary_config().cloud_name, "demo");
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_missing_jwt_secret() {
        let config = AppConfig::default();
        assert!(matches!(
            config.require_jwt_secret(),
            Err(ExploraError::Config(_))
        ));
    }
}

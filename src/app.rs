//! Service wiring shared by the `server` and `admin` binaries
//!
//! Chooses the storage backend and builds the real remote collaborators from
//! an [`AppConfig`].

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::engine::{
    ImageGenerationJob, InMemoryStore, LocationStorage, MediaRepository, PostgresStore, UserStorage,
};
use crate::providers::{CloudinaryStore, HttpImageFetcher, ReplicateClient};
use crate::Result;

/// Storage handles plus the generation job wired to them
pub struct Services {
    pub locations: Arc<dyn LocationStorage>,
    pub media: Arc<dyn MediaRepository>,
    pub users: Arc<dyn UserStorage>,
    pub job: Arc<ImageGenerationJob>,
}

impl Services {
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let (locations, media, users): (
            Arc<dyn LocationStorage>,
            Arc<dyn MediaRepository>,
            Arc<dyn UserStorage>,
        ) = match &config.database.url {
            Some(url) => {
                let store =
                    Arc::new(PostgresStore::connect(url, config.database.max_connections).await?);
                store.init_schema().await?;
                info!("💾 Using PostgreSQL storage");
                let locations: Arc<dyn LocationStorage> = store.clone();
                let media: Arc<dyn MediaRepository> = store.clone();
                let users: Arc<dyn UserStorage> = store;
                (locations, media, users)
            }
            None => {
                let store = Arc::new(InMemoryStore::new());
                warn!("💾 No database.url configured, using in-memory storage");
                let locations: Arc<dyn LocationStorage> = store.clone();
                let media: Arc<dyn MediaRepository> = store.clone();
                let users: Arc<dyn UserStorage> = store;
                (locations, media, users)
            }
        };

        let replicate = config.replicate_config();
        if replicate.api_token.is_empty() {
            warn!("Generation API token is not set; image jobs will fail until it is");
        }
        let cloudinary = config.cloudinary_config();
        if !cloudinary.is_configured() {
            warn!("Artifact store credentials are not set; image uploads will fail");
        }

        let job = ImageGenerationJob::new(
            locations.clone(),
            media.clone(),
            Arc::new(ReplicateClient::new(replicate)),
            Arc::new(HttpImageFetcher::new(Duration::from_secs(
                config.jobs.download_timeout_seconds,
            ))),
            Arc::new(CloudinaryStore::new(cloudinary)),
        )
        .with_policy(config.retry_policy())
        .with_settings(config.job_settings());

        Ok(Self {
            locations,
            media,
            users,
            job: Arc::new(job),
        })
    }
}

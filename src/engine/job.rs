// Image generation job
// One attempt of the pipeline that turns a location into a stored image

//! # Image Generation Job
//!
//! Executes one attempt of the generation pipeline for a single location.
//! Each attempt walks the same stages in order:
//!
//! ```text
//! fetch location ─► already has image? ─► build prompt ─► remote generation
//!        │                 │ yes                                 │
//!        ▼                 ▼                                     ▼
//!     NotFound        AlreadyGenerated        download ─► upload ─► persist
//! ```
//!
//! The job never retries by itself. It returns a [`JobOutcome`] and the
//! dispatcher acts on it: `RetryScheduled` re-enqueues after the policy delay,
//! `Abandoned` and `Failed` go to the dead-letter registry. The dispatcher
//! also owns outcome logging; the job only traces its stages at `debug`.
//!
//! Both remote waits are bounded. Running out of time on generation or on the
//! download is retryable on the same attempt budget as a provider failure.
//!
//! ## Idempotency
//!
//! The existence check in stage 2 is an optimization only. Two attempts for the
//! same location can both get past it; the media repository's atomic insert
//! decides the winner and the loser completes as
//! [`JobCompletion::Deduplicated`]. The upload key is derived from the location
//! id, so the loser's upload overwrote the same object and nothing leaks.
//!
//! ## Rust Learning Notes:
//!
//! ### Two-Layer Error Handling
//! `execute` is written with `?` against `Result<JobCompletion, JobError>`,
//! and `run` folds that result into a `JobOutcome` using the retry policy.
//! Callers never see a bare `Err` from a job.
//!
//! ### Scoped Cleanup
//! The staging file is a `StagedImage` local; Rust drops it at the end of the
//! scope on every path, including when the future itself is dropped.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::retry::{RetryDecision, RetryPolicy};
use super::staging::StagedImage;
use super::storage::{LocationStorage, MediaRepository};
use crate::models::{LocationId, MediaKind, MediaRecord, NewMediaRecord};
use crate::providers::{ArtifactStore, ImageFetcher, ImageGenerationClient, ProviderError};
use crate::ExploraError;

/// Prompt for a location's generated image
pub fn build_prompt(location_name: &str) -> String {
    format!(
        "Generate an image representing {} with a twist of grandeur, fantasy, historical, kind of first person view.",
        location_name
    )
}

/// Why an attempt failed
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JobError {
    #[error("location {0} not found")]
    NotFound(LocationId),

    /// The location could not be read from storage
    #[error("loading location failed: {0}")]
    LocationLookupFailure(String),

    /// Provider error, timeout, or a result with no usable URL
    #[error("generation failed: {0}")]
    TransientProviderFailure(String),

    #[error("download failed: {0}")]
    DownloadFailure(String),

    #[error("download timed out: {0}")]
    DownloadTimeout(String),

    #[error("upload failed: {0}")]
    UploadFailure(String),

    #[error("persisting media failed: {0}")]
    PersistFailure(String),
}

impl JobError {
    /// Retryable under the default policy
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            JobError::TransientProviderFailure(_) | JobError::DownloadTimeout(_)
        )
    }

    /// Failure after a successful generation (download, upload, persist)
    pub fn is_downstream(&self) -> bool {
        matches!(
            self,
            JobError::DownloadFailure(_)
                | JobError::DownloadTimeout(_)
                | JobError::UploadFailure(_)
                | JobError::PersistFailure(_)
        )
    }

    /// Stable snake_case name for logs and the dead-letter registry
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::NotFound(_) => "not_found",
            JobError::LocationLookupFailure(_) => "location_lookup_failure",
            JobError::TransientProviderFailure(_) => "transient_provider_failure",
            JobError::DownloadFailure(_) => "download_failure",
            JobError::DownloadTimeout(_) => "download_timeout",
            JobError::UploadFailure(_) => "upload_failure",
            JobError::PersistFailure(_) => "persist_failure",
        }
    }
}

/// How a successful attempt ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum JobCompletion {
    /// This attempt generated, uploaded and persisted the image
    Generated { media: MediaRecord },
    /// An image already existed before any remote call was made
    AlreadyGenerated,
    /// Another attempt persisted first; this one's insert was rejected
    Deduplicated,
}

/// Result of one attempt, as handed to the dispatcher
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(JobCompletion),
    RetryScheduled {
        next_attempt: u32,
        delay: Duration,
        error: JobError,
    },
    /// Retryable failure with no attempts left
    Abandoned { attempts: u32, error: JobError },
    /// Failure the policy does not retry
    Failed { error: JobError },
}

/// Timeouts and staging location for a job
#[derive(Debug, Clone)]
pub struct JobSettings {
    pub generation_timeout: Duration,
    pub download_timeout: Duration,
    /// Directory for staging files; the system temp dir when `None`
    pub staging_dir: Option<PathBuf>,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            generation_timeout: Duration::from_secs(120),
            download_timeout: Duration::from_secs(60),
            staging_dir: None,
        }
    }
}

/// The generation pipeline, wired to its collaborators
///
/// Cheap to share behind an `Arc`; one value serves every attempt.
pub struct ImageGenerationJob {
    locations: Arc<dyn LocationStorage>,
    media: Arc<dyn MediaRepository>,
    generator: Arc<dyn ImageGenerationClient>,
    fetcher: Arc<dyn ImageFetcher>,
    artifacts: Arc<dyn ArtifactStore>,
    policy: RetryPolicy,
    settings: JobSettings,
}

impl ImageGenerationJob {
    pub fn new(
        locations: Arc<dyn LocationStorage>,
        media: Arc<dyn MediaRepository>,
        generator: Arc<dyn ImageGenerationClient>,
        fetcher: Arc<dyn ImageFetcher>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            locations,
            media,
            generator,
            fetcher,
            artifacts,
            policy: RetryPolicy::default(),
            settings: JobSettings::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_settings(mut self, settings: JobSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run attempt number `attempt` (1-based) for `location_id`
    pub async fn run(&self, location_id: LocationId, attempt: u32) -> JobOutcome {
        debug!(
            "Starting image generation for location {} (attempt {}/{})",
            location_id, attempt, self.policy.max_attempts
        );

        let error = match self.execute(location_id).await {
            Ok(completion) => return JobOutcome::Completed(completion),
            Err(error) => error,
        };

        debug!(
            location_id = %location_id,
            attempt,
            error_kind = error.kind(),
            "Attempt failed: {}",
            error
        );
        match self.policy.decide(&error, attempt) {
            RetryDecision::Retry {
                next_attempt,
                delay,
            } => JobOutcome::RetryScheduled {
                next_attempt,
                delay,
                error,
            },
            RetryDecision::Exhausted => JobOutcome::Abandoned {
                attempts: attempt,
                error,
            },
            RetryDecision::Fatal => JobOutcome::Failed { error },
        }
    }

    async fn execute(&self, location_id: LocationId) -> Result<JobCompletion, JobError> {
        let location = self
            .locations
            .get_location(location_id)
            .await
            .map_err(|e| JobError::LocationLookupFailure(e.to_string()))?
            .ok_or(JobError::NotFound(location_id))?;

        let already_generated = self
            .media
            .exists(location_id, MediaKind::Image)
            .await
            .map_err(|e| JobError::PersistFailure(e.to_string()))?;
        if already_generated {
            debug!("Location {} already has an image, skipping", location_id);
            return Ok(JobCompletion::AlreadyGenerated);
        }

        let prompt = build_prompt(&location.name);
        debug!(
            "Requesting image for {:?} from {}",
            location.name,
            self.generator.provider_name()
        );

        let output = tokio::time::timeout(
            self.settings.generation_timeout,
            self.generator.generate(&prompt),
        )
        .await
        .map_err(|_| {
            JobError::TransientProviderFailure(format!(
                "no result within {:?}",
                self.settings.generation_timeout
            ))
        })?
        .map_err(|e| {
            if !e.is_transient() {
                debug!("Provider rejected prompt for location {}: {}", location_id, e);
            }
            JobError::TransientProviderFailure(e.to_string())
        })?;

        let image_url = output.first_url().ok_or_else(|| {
            JobError::TransientProviderFailure("provider returned no image URL".to_string())
        })?;

        let staged = StagedImage::create(self.settings.staging_dir.as_deref())
            .map_err(|e| JobError::DownloadFailure(format!("cannot create staging file: {}", e)))?;

        let written = tokio::time::timeout(
            self.settings.download_timeout,
            staged.fill_from(self.fetcher.as_ref(), image_url),
        )
        .await
        .map_err(|_| {
            JobError::DownloadTimeout(format!(
                "no complete body within {:?}",
                self.settings.download_timeout
            ))
        })?
        .map_err(|e| match e {
            ProviderError::Timeout(message) => JobError::DownloadTimeout(message),
            other => JobError::DownloadFailure(other.to_string()),
        })?;

        let bytes = staged
            .read()
            .await
            .map_err(|e| JobError::DownloadFailure(e.to_string()))?;
        debug!("Staged {} bytes for location {}", written, location_id);

        let public_url = self
            .artifacts
            .upload(bytes, &location_id.artifact_key())
            .await
            .map_err(|e| JobError::UploadFailure(e.to_string()))?;
        drop(staged);

        match self
            .media
            .insert(NewMediaRecord::image(location_id, public_url))
            .await
        {
            Ok(media) => {
                debug!("Stored image for location {} at {}", location_id, media.url);
                Ok(JobCompletion::Generated { media })
            }
            Err(ExploraError::DuplicateMedia { .. }) => {
                debug!(
                    "Image for location {} was stored by a concurrent job",
                    location_id
                );
                Ok(JobCompletion::Deduplicated)
            }
            Err(e) => Err(JobError::PersistFailure(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{
        Harness, RecordingStore, ScriptedGenerator, StaticFetcher, GENERATED_URL,
    };
    use crate::providers::GenerationOutput;

    fn quick_policy() -> RetryPolicy {
        RetryPolicy::fixed(3, Duration::ZERO)
    }

    #[test]
    fn test_build_prompt() {
        assert_eq!(
            build_prompt("Notre-Dame de Paris"),
            "Generate an image representing Notre-Dame de Paris with a twist of grandeur, fantasy, historical, kind of first person view."
        );
    }

    #[tokio::test]
    async fn test_generates_uploads_and_persists() {
        let harness = Harness::new(ScriptedGenerator::succeeding());
        let location = harness
            .location("Notre-Dame de Paris", 48.852968, 2.349902)
            .await;

        let outcome = harness.job(quick_policy()).run(location.id, 1).await;

        let media = match outcome {
            JobOutcome::Completed(JobCompletion::Generated { media }) => media,
            other => panic!("unexpected outcome: {:?}", other),
        };
        assert_eq!(media.location_id, location.id);
        assert_eq!(media.kind, MediaKind::Image);
        assert_eq!(media.url, RecordingStore::url_for("location_1"));

        assert_eq!(
            harness.generator.prompts(),
            vec![build_prompt("Notre-Dame de Paris")]
        );
        assert_eq!(harness.fetcher.urls(), vec![GENERATED_URL.to_string()]);

        let uploads = harness.artifacts.uploads();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].0, "location_1");
        assert!(uploads[0].1.starts_with(b"\x89PNG"));

        assert_eq!(harness.store.media_count().await, 1);
        assert_eq!(harness.staged_files(), 0);
    }

    #[tokio::test]
    async fn test_existing_image_short_circuits() {
        let harness = Harness::new(ScriptedGenerator::succeeding());
        let location = harness.location("Louvre", 48.8606, 2.3376).await;
        harness
            .store
            .insert(NewMediaRecord::image(location.id, "https://cdn.example/old.png"))
            .await
            .unwrap();

        let outcome = harness.job(quick_policy()).run(location.id, 1).await;

        assert_eq!(outcome, JobOutcome::Completed(JobCompletion::AlreadyGenerated));
        assert_eq!(harness.generator.calls(), 0);
        assert!(harness.artifacts.uploads().is_empty());
        assert_eq!(harness.store.media_count().await, 1);
    }

    #[tokio::test]
    async fn test_missing_location_fails_without_remote_calls() {
        let harness = Harness::new(ScriptedGenerator::succeeding());

        let outcome = harness.job(quick_policy()).run(LocationId(404), 1).await;

        assert_eq!(
            outcome,
            JobOutcome::Failed {
                error: JobError::NotFound(LocationId(404))
            }
        );
        assert_eq!(harness.generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_provider_failure_schedules_retry_then_abandons() {
        let harness = Harness::new(ScriptedGenerator::always_failing());
        let location = harness.location("Pantheon", 48.8462, 2.3464).await;
        let job = harness.job(RetryPolicy::default());

        match job.run(location.id, 1).await {
            JobOutcome::RetryScheduled {
                next_attempt,
                delay,
                error,
            } => {
                assert_eq!(next_attempt, 2);
                assert_eq!(delay, Duration::from_secs(10));
                assert_eq!(error.kind(), "transient_provider_failure");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        match job.run(location.id, 3).await {
            JobOutcome::Abandoned { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected outcome: {:?}", other),
        }

        assert_eq!(harness.store.media_count().await, 0);
        assert!(harness.artifacts.uploads().is_empty());
    }

    #[tokio::test]
    async fn test_output_without_url_is_retryable() {
        let harness = Harness::new(ScriptedGenerator::returning(GenerationOutput::Many(vec![])));
        let location = harness.location("Opera Garnier", 48.8720, 2.3316).await;

        let outcome = harness.job(quick_policy()).run(location.id, 1).await;

        assert!(matches!(
            outcome,
            JobOutcome::RetryScheduled {
                error: JobError::TransientProviderFailure(_),
                ..
            }
        ));
        assert!(harness.fetcher.urls().is_empty());
    }

    #[tokio::test]
    async fn test_generation_timeout_is_retryable() {
        let harness =
            Harness::new(ScriptedGenerator::succeeding().with_delay(Duration::from_millis(500)));
        let location = harness.location("Sacre-Coeur", 48.8867, 2.3431).await;
        let settings = JobSettings {
            generation_timeout: Duration::from_millis(20),
            ..harness.settings()
        };

        let outcome = harness
            .job_with_settings(quick_policy(), settings)
            .run(location.id, 1)
            .await;

        assert!(matches!(
            outcome,
            JobOutcome::RetryScheduled {
                error: JobError::TransientProviderFailure(_),
                ..
            }
        ));
        assert!(harness.fetcher.urls().is_empty());
    }

    #[tokio::test]
    async fn test_download_failure_is_fatal_and_cleans_up() {
        let harness = Harness::with_collaborators(
            ScriptedGenerator::succeeding(),
            StaticFetcher::failing(),
            RecordingStore::new(),
        );
        let location = harness.location("Sainte-Chapelle", 48.855392, 2.345003).await;

        let outcome = harness.job(quick_policy()).run(location.id, 1).await;

        assert!(matches!(
            outcome,
            JobOutcome::Failed {
                error: JobError::DownloadFailure(_)
            }
        ));
        assert!(harness.artifacts.uploads().is_empty());
        assert_eq!(harness.store.media_count().await, 0);
        assert_eq!(harness.staged_files(), 0);
    }

    #[tokio::test]
    async fn test_upload_failure_persists_nothing() {
        let harness = Harness::with_collaborators(
            ScriptedGenerator::succeeding(),
            StaticFetcher::png(),
            RecordingStore::failing(),
        );
        let location = harness.location("Arc de Triomphe", 48.8738, 2.2950).await;

        let outcome = harness.job(quick_policy()).run(location.id, 1).await;

        assert!(matches!(
            outcome,
            JobOutcome::Failed {
                error: JobError::UploadFailure(_)
            }
        ));
        assert_eq!(harness.store.media_count().await, 0);
        assert_eq!(harness.staged_files(), 0);
    }

    #[tokio::test]
    async fn test_downstream_failure_retried_when_enabled() {
        let harness = Harness::with_collaborators(
            ScriptedGenerator::succeeding(),
            StaticFetcher::png(),
            RecordingStore::failing(),
        );
        let location = harness.location("Arc de Triomphe", 48.8738, 2.2950).await;

        let outcome = harness
            .job(quick_policy().with_downstream_retries(true))
            .run(location.id, 1)
            .await;

        assert!(matches!(
            outcome,
            JobOutcome::RetryScheduled {
                next_attempt: 2,
                error: JobError::UploadFailure(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_concurrent_attempts_store_one_record() {
        let harness =
            Harness::new(ScriptedGenerator::succeeding().with_delay(Duration::from_millis(50)));
        let location = harness.location("Notre-Dame de Paris", 48.852968, 2.349902).await;
        let job = Arc::new(harness.job(quick_policy()));

        let first = tokio::spawn({
            let job = job.clone();
            async move { job.run(location.id, 1).await }
        });
        let second = tokio::spawn({
            let job = job.clone();
            async move { job.run(location.id, 1).await }
        });
        let outcomes = [first.await.unwrap(), second.await.unwrap()];

        let generated = outcomes
            .iter()
            .filter(|o| matches!(o, JobOutcome::Completed(JobCompletion::Generated { .. })))
            .count();
        assert_eq!(generated, 1);
        assert!(outcomes.iter().all(|o| matches!(o, JobOutcome::Completed(_))));

        assert_eq!(harness.store.media_count().await, 1);
        // Both uploads targeted the same key
        assert!(harness
            .artifacts
            .uploads()
            .iter()
            .all(|(key, _)| key == "location_1"));
    }

    #[tokio::test]
    async fn test_single_url_output_is_persisted() {
        let harness = Harness::new(ScriptedGenerator::returning(GenerationOutput::Single(
            "https://replicate.delivery/pbxt/nd/out.webp".to_string(),
        )));
        let location = harness
            .location("Notre-Dame de Paris", 48.852968, 2.349902)
            .await;

        let outcome = harness.job(quick_policy()).run(location.id, 1).await;

        assert!(matches!(
            outcome,
            JobOutcome::Completed(JobCompletion::Generated { .. })
        ));
        assert_eq!(
            harness.fetcher.urls(),
            vec!["https://replicate.delivery/pbxt/nd/out.webp".to_string()]
        );

        let stored = harness.store.list_for_location(location.id).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].kind, MediaKind::Image);
        assert_eq!(stored[0].url, "https://cdn.example/explora/location_1.png");
    }

    #[tokio::test]
    async fn test_slow_download_is_retryable() {
        let harness = Harness::with_collaborators(
            ScriptedGenerator::succeeding(),
            StaticFetcher::png().with_delay(Duration::from_millis(500)),
            RecordingStore::new(),
        );
        let location = harness.location("Sainte-Chapelle", 48.855392, 2.345003).await;
        let settings = JobSettings {
            download_timeout: Duration::from_millis(20),
            ..harness.settings()
        };

        let outcome = harness
            .job_with_settings(RetryPolicy::default(), settings)
            .run(location.id, 1)
            .await;

        match outcome {
            JobOutcome::RetryScheduled {
                next_attempt,
                error,
                ..
            } => {
                assert_eq!(next_attempt, 2);
                assert_eq!(error.kind(), "download_timeout");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(harness.artifacts.uploads().is_empty());
        assert_eq!(harness.staged_files(), 0);
    }

    #[tokio::test]
    async fn test_client_timeout_during_download_is_retryable() {
        let harness = Harness::with_collaborators(
            ScriptedGenerator::succeeding(),
            StaticFetcher::timing_out(),
            RecordingStore::new(),
        );
        let location = harness.location("Sainte-Chapelle", 48.855392, 2.345003).await;

        let outcome = harness.job(RetryPolicy::default()).run(location.id, 1).await;

        assert!(matches!(
            outcome,
            JobOutcome::RetryScheduled {
                error: JobError::DownloadTimeout(_),
                ..
            }
        ));
    }

    /// Location storage whose reads always fail
    struct UnreachableLocations;

    #[async_trait::async_trait]
    impl LocationStorage for UnreachableLocations {
        async fn create_location(&self, _: crate::models::NewLocation) -> crate::Result<crate::models::Location> {
            Err(ExploraError::Internal("connection refused".to_string()))
        }

        async fn get_location(&self, _: LocationId) -> crate::Result<Option<crate::models::Location>> {
            Err(ExploraError::Internal("connection refused".to_string()))
        }

        async fn locations_within(
            &self,
            _: crate::models::GeoPoint,
            _: f64,
        ) -> crate::Result<Vec<crate::engine::storage::NearbyLocation>> {
            Err(ExploraError::Internal("connection refused".to_string()))
        }

        async fn add_snippet(
            &self,
            _: LocationId,
            _: crate::models::NewSnippet,
        ) -> crate::Result<crate::models::ContextSnippet> {
            Err(ExploraError::Internal("connection refused".to_string()))
        }

        async fn list_snippets(&self, _: LocationId) -> crate::Result<Vec<crate::models::ContextSnippet>> {
            Err(ExploraError::Internal("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_location_lookup_failure_has_its_own_kind() {
        let harness = Harness::new(ScriptedGenerator::succeeding());
        let job = ImageGenerationJob::new(
            Arc::new(UnreachableLocations),
            harness.store.clone(),
            harness.generator.clone(),
            harness.fetcher.clone(),
            harness.artifacts.clone(),
        )
        .with_policy(quick_policy());

        match job.run(LocationId(1), 1).await {
            JobOutcome::Failed { error } => {
                assert_eq!(error.kind(), "location_lookup_failure");
                assert!(error.to_string().contains("connection refused"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(harness.generator.calls(), 0);
    }
}

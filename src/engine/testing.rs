//! In-process doubles for the remote collaborators, shared by engine and API tests

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use super::dispatcher::{JobHandle, JobQueue};
use super::job::{ImageGenerationJob, JobSettings};
use super::retry::RetryPolicy;
use super::storage::{InMemoryStore, LocationStorage};
use crate::models::{Location, LocationId, NewLocation};
use crate::providers::{
    ArtifactStore, GenerationOutput, ImageFetcher, ImageGenerationClient, ProviderError,
    ProviderResult,
};

pub const GENERATED_URL: &str = "https://replicate.delivery/pbxt/abc/out-0.webp";

/// Generation client that replays a script, then repeats a fallback
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<ProviderResult<GenerationOutput>>>,
    fallback: ProviderResult<GenerationOutput>,
    delay: Duration,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    fn with_script(
        script: Vec<ProviderResult<GenerationOutput>>,
        fallback: ProviderResult<GenerationOutput>,
    ) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            delay: Duration::ZERO,
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn succeeding() -> Self {
        Self::with_script(
            Vec::new(),
            Ok(GenerationOutput::Many(vec![GENERATED_URL.to_string()])),
        )
    }

    /// Fail `times` times with a provider error, then succeed
    pub fn failing_then_succeeding(times: usize) -> Self {
        let script = (0..times)
            .map(|i| {
                Err(ProviderError::Http {
                    status: 503,
                    body: format!("overloaded #{}", i + 1),
                })
            })
            .collect();
        Self::with_script(
            script,
            Ok(GenerationOutput::Many(vec![GENERATED_URL.to_string()])),
        )
    }

    pub fn always_failing() -> Self {
        Self::with_script(
            Vec::new(),
            Err(ProviderError::Prediction("NSFW content detected".to_string())),
        )
    }

    pub fn returning(output: GenerationOutput) -> Self {
        Self::with_script(Vec::new(), Ok(output))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageGenerationClient for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> ProviderResult<GenerationOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }

    fn provider_name(&self) -> &str {
        "scripted"
    }
}

/// Fetcher that writes fixed bytes, or fails
pub struct StaticFetcher {
    body: Bytes,
    failure: Option<ProviderError>,
    delay: Duration,
    urls: Mutex<Vec<String>>,
}

impl StaticFetcher {
    pub fn png() -> Self {
        Self {
            body: Bytes::from_static(b"\x89PNG\r\n\x1a\nfake-image"),
            failure: None,
            delay: Duration::ZERO,
            urls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            failure: Some(ProviderError::Network("connection reset".to_string())),
            ..Self::png()
        }
    }

    /// Fails the way the HTTP client reports its own request timeout
    pub fn timing_out() -> Self {
        Self {
            failure: Some(ProviderError::Timeout("operation timed out".to_string())),
            ..Self::png()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageFetcher for StaticFetcher {
    async fn fetch_into(&self, url: &str, sink: &mut tokio::fs::File) -> ProviderResult<u64> {
        self.urls.lock().unwrap().push(url.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        sink.write_all(&self.body).await?;
        sink.flush().await?;
        Ok(self.body.len() as u64)
    }
}

/// Artifact store that records uploads in memory
pub struct RecordingStore {
    uploads: Mutex<Vec<(String, Bytes)>>,
    failure: Option<ProviderError>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            uploads: Mutex::new(Vec::new()),
            failure: None,
        }
    }

    pub fn failing() -> Self {
        Self {
            uploads: Mutex::new(Vec::new()),
            failure: Some(ProviderError::AuthenticationFailed("bad signature".to_string())),
        }
    }

    pub fn uploads(&self) -> Vec<(String, Bytes)> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn url_for(key: &str) -> String {
        format!("https://cdn.example/explora/{}.png", key)
    }
}

#[async_trait]
impl ArtifactStore for RecordingStore {
    async fn upload(&self, bytes: Bytes, key: &str) -> ProviderResult<String> {
        if let Some(failure) = &self.failure {
            return Err(failure.clone());
        }
        self.uploads.lock().unwrap().push((key.to_string(), bytes));
        Ok(Self::url_for(key))
    }
}

/// Queue that only records which locations were enqueued
#[derive(Default)]
pub struct RecordingQueue {
    enqueued: Mutex<Vec<LocationId>>,
}

impl RecordingQueue {
    pub fn enqueued(&self) -> Vec<LocationId> {
        self.enqueued.lock().unwrap().clone()
    }
}

impl JobQueue for RecordingQueue {
    fn enqueue(&self, location_id: LocationId) -> crate::Result<JobHandle> {
        self.enqueued.lock().unwrap().push(location_id);
        Ok(JobHandle::detached(location_id))
    }
}

/// Wires an [`ImageGenerationJob`] to in-memory storage and the doubles above
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub generator: Arc<ScriptedGenerator>,
    pub fetcher: Arc<StaticFetcher>,
    pub artifacts: Arc<RecordingStore>,
    pub staging_dir: tempfile::TempDir,
}

impl Harness {
    pub fn new(generator: ScriptedGenerator) -> Self {
        Self::with_collaborators(generator, StaticFetcher::png(), RecordingStore::new())
    }

    pub fn with_collaborators(
        generator: ScriptedGenerator,
        fetcher: StaticFetcher,
        artifacts: RecordingStore,
    ) -> Self {
        Self {
            store: Arc::new(InMemoryStore::new()),
            generator: Arc::new(generator),
            fetcher: Arc::new(fetcher),
            artifacts: Arc::new(artifacts),
            staging_dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn settings(&self) -> JobSettings {
        JobSettings {
            staging_dir: Some(PathBuf::from(self.staging_dir.path())),
            ..JobSettings::default()
        }
    }

    pub fn job(&self, policy: RetryPolicy) -> ImageGenerationJob {
        self.job_with_settings(policy, self.settings())
    }

    pub fn job_with_settings(&self, policy: RetryPolicy, settings: JobSettings) -> ImageGenerationJob {
        ImageGenerationJob::new(
            self.store.clone(),
            self.store.clone(),
            self.generator.clone(),
            self.fetcher.clone(),
            self.artifacts.clone(),
        )
        .with_policy(policy)
        .with_settings(settings)
    }

    pub async fn location(&self, name: &str, lat: f64, lng: f64) -> Location {
        self.store
            .create_location(NewLocation::new(name, lat, lng))
            .await
            .unwrap()
    }

    pub fn staged_files(&self) -> usize {
        std::fs::read_dir(self.staging_dir.path()).unwrap().count()
    }
}

/// One event seen by [`LogCapture`]
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub level: tracing::Level,
    pub message: String,
    pub fields: HashMap<String, String>,
}

/// `tracing` layer that keeps every event for assertions
#[derive(Clone, Default)]
pub struct LogCapture {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl LogCapture {
    /// Install as the thread's default subscriber until the guard drops
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        use tracing_subscriber::layer::SubscriberExt;
        tracing::subscriber::set_default(tracing_subscriber::registry().with(self.clone()))
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn at_level(&self, level: tracing::Level) -> Vec<LogRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.level == level)
            .collect()
    }
}

impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for LogCapture {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        struct FieldVisitor(HashMap<String, String>);

        impl tracing::field::Visit for FieldVisitor {
            fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
                self.0.insert(field.name().to_string(), format!("{:?}", value));
            }

            fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
                self.0.insert(field.name().to_string(), value.to_string());
            }
        }

        let mut visitor = FieldVisitor(HashMap::new());
        event.record(&mut visitor);
        let message = visitor.0.remove("message").unwrap_or_default();

        self.records.lock().unwrap().push(LogRecord {
            level: *event.metadata().level(),
            message,
            fields: visitor.0,
        });
    }
}

// Explora - Rust Edition
// A location-context service with asynchronous, idempotent image generation

//! # Explora Library
//!
//! This is the main library crate for Explora, a service that, given geographic
//! coordinates, returns nearby points of interest together with knowledge
//! snippets and media. This file serves as the **library root** and defines the
//! public API that the `server` and `admin` binaries build on.
//!
//! ## Core Components
//!
//! ### Domain Models
//! - [`Location`]: A named point of interest with WGS84 coordinates
//! - [`MediaRecord`]: A persisted reference to a generated asset for a location
//! - [`ContextSnippet`]: A knowledge snippet attached to a location
//!
//! ### Image Generation Pipeline
//!
//! #### [`ImageGenerationJob`] - The Generation State Machine
//!
//! Runs one attempt of the pipeline for a single location:
//! fetch → idempotency check → prompt → remote generation → download →
//! upload → persist. Only the remote generation step is retried by default.
//!
//! #### [`Dispatcher`] - Asynchronous Job Execution
//!
//! An in-process worker pool that executes jobs off the request path,
//! schedules retries with a fixed delay and routes jobs that cannot complete
//! into a dead-letter registry for operator action.
//!
//! #### [`TriggerPolicy`] - When To Generate
//!
//! Decides which locations need a job when a location is created or a user
//! reports their position.
//!
//! ### Storage Layer
//! [`LocationStorage`] and [`MediaRepository`] abstract persistence, with an
//! in-memory implementation and a PostgreSQL implementation. The media
//! repository's insert is the single authority for the
//! one-image-per-location invariant. [`UserStorage`] holds accounts.
//!
//! ## Rust Learning Notes:
//!
//! ### Re-exports
//! `pub use` statements create shortcuts so users don't need to know the internal
//! module structure. Instead of `use explora::engine::job::ImageGenerationJob`,
//! users can write `use explora::ImageGenerationJob`.

// Core domain models
pub mod models;

// Job pipeline, dispatcher, trigger policy and storage
pub mod engine;

// Remote collaborators: generation provider, artifact store, image fetcher
pub mod providers;

// HTTP API (axum)
pub mod api;

// Layered application configuration
pub mod config;

// Service wiring shared by the binaries
pub mod app;

pub use models::{
    ContextSnippet, GeoPoint, Location, LocationId, MediaKind, MediaRecord, NewLocation,
    NewMediaRecord, NewSnippet, NewUser, User, UserId,
};

pub use engine::{
    dispatcher::{AbandonedJob, Dispatcher, DispatcherConfig, JobHandle, JobQueue, JobStatus},
    job::{build_prompt, ImageGenerationJob, JobCompletion, JobError, JobOutcome},
    postgres::PostgresStore,
    retry::RetryPolicy,
    storage::{InMemoryStore, LocationStorage, MediaRepository, UserStorage},
    trigger::{PositionUpdateReport, TriggerPolicy, TriggeredLocation},
};

pub use providers::{
    ArtifactStore, GenerationOutput, ImageFetcher, ImageGenerationClient, ProviderError,
    ProviderResult,
};

pub use api::{ApiServer, ApiServerBuilder, AppState};

pub use config::AppConfig;

// Core error types
use thiserror::Error;

/// Custom error types for Explora operations
///
/// ## Rust Learning Notes:
///
/// ### The `thiserror` Crate
/// - `#[derive(Error)]` implements the `std::error::Error` trait
/// - `#[error("...")]` provides human-readable error messages
/// - `#[from]` enables automatic conversion from other error types
#[derive(Error, Debug)]
pub enum ExploraError {
    /// Error when a resource cannot be found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Error when invalid input is provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A media record of this kind already exists for the location.
    /// Raised only by `MediaRepository::insert`.
    #[error("Media of kind {kind} already exists for location {location_id}")]
    DuplicateMedia {
        location_id: LocationId,
        kind: MediaKind,
    },

    /// A username or email is already registered
    #[error("{0}")]
    DuplicateUser(String),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),

    /// Database driver errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Missing or invalid credentials
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Forbidden access error
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Configuration could not be loaded or is incomplete
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for ExploraError {
    fn from(err: std::io::Error) -> Self {
        ExploraError::Internal(err.to_string())
    }
}

impl From<::config::ConfigError> for ExploraError {
    fn from(err: ::config::ConfigError) -> Self {
        ExploraError::Config(err.to_string())
    }
}

/// Type alias for Results that use our custom error type
pub type Result<T> = std::result::Result<T, ExploraError>;

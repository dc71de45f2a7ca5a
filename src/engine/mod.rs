// Explora Engine
// Storage, the image generation pipeline and its dispatcher

//! # Engine Module
//!
//! This module contains everything between the domain models and the outside
//! world: persistence, the image generation job, the dispatcher that runs it
//! asynchronously, and the trigger policy that decides when to run it.
//!
//! ## Architecture Overview
//!
//! - **Domain Models**: Pure data and geospatial math (in `models/`)
//! - **Engine Layer**: Pipeline and persistence (this module)
//! - **Providers**: Remote collaborators behind traits (in `providers/`)
//! - **API Layer**: HTTP handlers (in `api/`)
//!
//! ## Engine Components
//!
//! ### Storage (`storage`, `postgres` modules)
//! - `LocationStorage`, `MediaRepository` and `UserStorage` traits
//! - In-memory implementation for development and testing
//! - PostgreSQL implementation with a uniqueness constraint on media
//!
//! ### Generation Job (`job` module)
//! - One attempt of fetch → check → prompt → generate → download → upload → persist
//! - Folds failures into a `JobOutcome` using the `retry` policy
//! - Stages downloads in a scoped temporary file (`staging` module)
//!
//! ### Dispatcher (`dispatcher` module)
//! - Bounded-concurrency worker pool fed by an unbounded queue
//! - Fixed-delay retries and a dead-letter registry
//!
//! ### Trigger Policy (`trigger` module)
//! - Enqueues work on location creation and on user position updates
//!
//! ### Context Query (`context` module)
//! - Nearby locations with their snippets and media
//!
//! ## Rust Learning Notes:
//!
//! ### Module Organization Pattern
//! 1. Create a directory with the module name (`engine/`)
//! 2. Add a `mod.rs` file as the module root
//! 3. Declare submodules in `mod.rs`
//! 4. Re-export important types for clean API

pub mod context;
pub mod dispatcher;
pub mod job;
pub mod postgres;
pub mod retry;
pub mod staging;
pub mod storage;
pub mod trigger;

#[cfg(test)]
pub(crate) mod testing;

pub use context::{context_near, LocationContext, MediaView, SnippetView};
pub use dispatcher::{AbandonedJob, Dispatcher, DispatcherConfig, JobHandle, JobQueue, JobStatus};
pub use job::{build_prompt, ImageGenerationJob, JobCompletion, JobError, JobOutcome, JobSettings};
pub use postgres::PostgresStore;
pub use retry::{RetryDecision, RetryPolicy};
pub use staging::StagedImage;
pub use storage::{InMemoryStore, LocationStorage, MediaRepository, NearbyLocation, UserStorage};
pub use trigger::{PositionUpdateReport, TriggerPolicy, TriggeredLocation};

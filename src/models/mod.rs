// Core domain models for Explora
// These are plain data structures shared by the engine, storage and API layers

//! # Domain Models Module
//!
//! This module contains the core domain models for Explora.
//!
//! ## Rust Learning Notes:
//!
//! ### Module Organization
//! This `mod.rs` file serves as the **module root** for the `models` directory.
//! Each `pub mod` declaration pulls in the sibling `.rs` file as a submodule.
//!
//! ### Re-exports for Clean APIs
//! The `pub use` statements at the bottom create a clean, flat API.
//! Users can import `use explora::models::Location` instead of
//! `use explora::models::location::Location`.

// Contains LocationId, GeoPoint and Location - the points of interest
pub mod location;

// Contains MediaKind and MediaRecord - generated assets per location
pub mod media;

// Contains ContextSnippet - knowledge snippets per location
pub mod snippet;

// Contains User and password hashing - accounts and their credentials
pub mod user;

pub use location::{BoundingBox, GeoPoint, Location, LocationId, NewLocation};
pub use media::{MediaKind, MediaRecord, NewMediaRecord};
pub use snippet::{ContextSnippet, NewSnippet};
pub use user::{NewUser, User, UserId};

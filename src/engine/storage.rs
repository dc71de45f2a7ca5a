// Storage abstraction for locations, snippets and media
// This defines the persistence boundary the generation pipeline talks to

//! # Storage Abstraction Layer
//!
//! This module provides the storage abstraction that allows Explora to persist
//! locations, knowledge snippets and media records using different backends.
//!
//! ## Storage Architecture
//!
//! The storage layer follows the **Repository Pattern**:
//! - **LocationStorage trait**: key lookups and radius queries for locations
//!   and their snippets
//! - **MediaRepository trait**: existence checks and the atomic insert that
//!   enforces one media record per (location, kind)
//! - **UserStorage trait**: accounts with unique usernames and emails
//! - **InMemoryStore**: implementation for development and testing
//! - **PostgresStore** (`postgres` module): production implementation
//!
//! ## The Media Invariant
//!
//! Two generation jobs for the same location may both pass the `exists`
//! pre-check before either writes. `MediaRepository::insert` is therefore the
//! only authority for the invariant: it must check and insert atomically and
//! return [`ExploraError::DuplicateMedia`] when it loses the race.
//!
//! ## Rust Learning Notes:
//!
//! ### Async Traits
//! The `async-trait` crate provides a macro to enable async trait methods,
//! and the `Send + Sync` bounds let trait objects be shared across tasks
//! as `Arc<dyn MediaRepository>`.
//!
//! ### Interior Mutability
//! `InMemoryStore` has no `mut` fields yet can be modified through its
//! `RwLock`s. Holding a single write guard across "check then insert" is what
//! makes the media insert atomic.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use tokio::sync::RwLock;

use crate::models::{
    ContextSnippet, GeoPoint, Location, LocationId, MediaKind, MediaRecord, NewLocation,
    NewMediaRecord, NewSnippet, NewUser, User, UserId,
};
use crate::{ExploraError, Result};

/// A location returned by a radius query together with its distance
#[derive(Debug, Clone, PartialEq)]
pub struct NearbyLocation {
    pub location: Location,
    pub distance_m: f64,
}

/// Exact radius filter shared by the storage backends
///
/// Keeps locations whose great-circle distance from `origin` is at most
/// `radius_m`, ordered nearest first.
pub fn filter_within<I>(origin: &GeoPoint, radius_m: f64, candidates: I) -> Vec<NearbyLocation>
where
    I: IntoIterator<Item = Location>,
{
    let mut nearby: Vec<NearbyLocation> = candidates
        .into_iter()
        .map(|location| {
            let distance_m = location.distance_from(origin);
            NearbyLocation {
                location,
                distance_m,
            }
        })
        .filter(|n| n.distance_m <= radius_m)
        .collect();

    nearby.sort_by(|a, b| {
        a.distance_m
            .partial_cmp(&b.distance_m)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.location.id.cmp(&b.location.id))
    });
    nearby
}

/// Persistence for locations and their knowledge snippets
#[async_trait::async_trait]
pub trait LocationStorage: Send + Sync {
    /// Create a location; the backend assigns the id
    async fn create_location(&self, location: NewLocation) -> Result<Location>;

    /// Get a location by id
    ///
    /// - `Ok(Some(location))`: found
    /// - `Ok(None)`: no location with that id (not an error)
    /// - `Err(error)`: the lookup itself failed
    async fn get_location(&self, id: LocationId) -> Result<Option<Location>>;

    /// All locations within `radius_m` metres of `origin`, nearest first
    async fn locations_within(&self, origin: GeoPoint, radius_m: f64)
        -> Result<Vec<NearbyLocation>>;

    /// Attach a snippet to an existing location
    ///
    /// ## Errors
    /// - `NotFound` when the location does not exist
    async fn add_snippet(&self, location_id: LocationId, snippet: NewSnippet)
        -> Result<ContextSnippet>;

    /// Snippets for a location, in insertion order
    async fn list_snippets(&self, location_id: LocationId) -> Result<Vec<ContextSnippet>>;
}

/// Persistence boundary for "a location has media of a given kind"
#[async_trait::async_trait]
pub trait MediaRepository: Send + Sync {
    /// Whether a record of `kind` exists for the location
    ///
    /// Advisory only: a `false` answer can be stale by the time the caller acts.
    async fn exists(&self, location_id: LocationId, kind: MediaKind) -> Result<bool>;

    /// Atomically insert a record
    ///
    /// ## Errors
    /// - `DuplicateMedia` when a record of the same kind already exists for the
    ///   location, including one inserted concurrently
    /// - `NotFound` when the location does not exist
    async fn insert(&self, record: NewMediaRecord) -> Result<MediaRecord>;

    /// All media for a location
    async fn list_for_location(&self, location_id: LocationId) -> Result<Vec<MediaRecord>>;
}

pub(crate) const USERNAME_TAKEN: &str = "Username already taken";
pub(crate) const EMAIL_TAKEN: &str = "Email already registered";

/// Persistence for user accounts
#[async_trait::async_trait]
pub trait UserStorage: Send + Sync {
    /// Create an account; the backend assigns the id
    ///
    /// ## Errors
    /// - `DuplicateUser` when the username or the email is already registered
    async fn create_user(&self, user: NewUser) -> Result<User>;

    async fn get_user(&self, id: UserId) -> Result<Option<User>>;

    /// Exact, case-sensitive email match
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// All accounts, newest first
    async fn list_users(&self) -> Result<Vec<User>>;

    /// Grant or revoke admin; `Ok(None)` when the user does not exist
    async fn set_admin(&self, id: UserId, is_admin: bool) -> Result<Option<User>>;

    /// Delete an account; `Ok(false)` when it did not exist
    async fn delete_user(&self, id: UserId) -> Result<bool>;
}

/// In-memory storage implementation for development and testing
///
/// ## Limitations
///
/// - **Not persistent**: Data is lost when process restarts
/// - **Not distributed**: Cannot share data across multiple processes
/// - **Linear radius scans**: every query walks all locations
#[derive(Debug)]
pub struct InMemoryStore {
    next_location_id: AtomicI64,
    locations: RwLock<HashMap<LocationId, Location>>,
    snippets: RwLock<HashMap<LocationId, Vec<ContextSnippet>>>,
    /// Keyed by (location, kind) so the map itself carries the uniqueness constraint
    media: RwLock<HashMap<(LocationId, MediaKind), MediaRecord>>,
    next_user_id: AtomicI64,
    users: RwLock<HashMap<UserId, User>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self {
            next_location_id: AtomicI64::new(1),
            locations: RwLock::new(HashMap::new()),
            snippets: RwLock::new(HashMap::new()),
            media: RwLock::new(HashMap::new()),
            next_user_id: AtomicI64::new(1),
            users: RwLock::new(HashMap::new()),
        }
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of media records across all locations
    pub async fn media_count(&self) -> usize {
        self.media.read().await.len()
    }
}

#[async_trait::async_trait]
impl LocationStorage for InMemoryStore {
    async fn create_location(&self, location: NewLocation) -> Result<Location> {
        let location = location.validate()?;
        let id = LocationId(self.next_location_id.fetch_add(1, Ordering::SeqCst));

        let created = Location {
            id,
            name: location.name,
            latitude: location.latitude,
            longitude: location.longitude,
            created_at: Utc::now(),
        };

        self.locations.write().await.insert(id, created.clone());
        Ok(created)
    }

    async fn get_location(&self, id: LocationId) -> Result<Option<Location>> {
        Ok(self.locations.read().await.get(&id).cloned())
    }

    async fn locations_within(
        &self,
        origin: GeoPoint,
        radius_m: f64,
    ) -> Result<Vec<NearbyLocation>> {
        let bbox = origin.bounding_box(radius_m);
        let locations = self.locations.read().await;

        let candidates = locations
            .values()
            .filter(|location| bbox.contains(&location.point()))
            .cloned();

        Ok(filter_within(&origin, radius_m, candidates))
    }

    async fn add_snippet(
        &self,
        location_id: LocationId,
        snippet: NewSnippet,
    ) -> Result<ContextSnippet> {
        let snippet = snippet.validate()?;
        if !self.locations.read().await.contains_key(&location_id) {
            return Err(ExploraError::NotFound(format!("Location {}", location_id)));
        }

        let snippet = snippet.into_snippet(location_id);
        self.snippets
            .write()
            .await
            .entry(location_id)
            .or_default()
            .push(snippet.clone());
        Ok(snippet)
    }

    async fn list_snippets(&self, location_id: LocationId) -> Result<Vec<ContextSnippet>> {
        Ok(self
            .snippets
            .read()
            .await
            .get(&location_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl MediaRepository for InMemoryStore {
    async fn exists(&self, location_id: LocationId, kind: MediaKind) -> Result<bool> {
        Ok(self.media.read().await.contains_key(&(location_id, kind)))
    }

    async fn insert(&self, record: NewMediaRecord) -> Result<MediaRecord> {
        if !self.locations.read().await.contains_key(&record.location_id) {
            return Err(ExploraError::NotFound(format!(
                "Location {}",
                record.location_id
            )));
        }

        // Check and insert under one write guard
        let mut media = self.media.write().await;
        match media.entry((record.location_id, record.kind)) {
            Entry::Occupied(_) => Err(ExploraError::DuplicateMedia {
                location_id: record.location_id,
                kind: record.kind,
            }),
            Entry::Vacant(slot) => {
                let created = record.into_record();
                slot.insert(created.clone());
                Ok(created)
            }
        }
    }

    async fn list_for_location(&self, location_id: LocationId) -> Result<Vec<MediaRecord>> {
        let media = self.media.read().await;
        let mut records: Vec<MediaRecord> = media
            .values()
            .filter(|record| record.location_id == location_id)
            .cloned()
            .collect();
        records.sort_by_key(|record| record.created_at);
        Ok(records)
    }
}

#[async_trait::async_trait]
impl UserStorage for InMemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User> {
        // Uniqueness checks and insert under one write guard
        let mut users = self.users.write().await;
        if users.values().any(|u| u.username == user.username) {
            return Err(ExploraError::DuplicateUser(USERNAME_TAKEN.to_string()));
        }
        if users.values().any(|u| u.email == user.email) {
            return Err(ExploraError::DuplicateUser(EMAIL_TAKEN.to_string()));
        }

        let id = UserId(self.next_user_id.fetch_add(1, Ordering::SeqCst));
        let created = user.into_user(id);
        users.insert(id, created.clone());
        Ok(created)
    }

    async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let mut users: Vec<User> = self.users.read().await.values().cloned().collect();
        users.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(users)
    }

    async fn set_admin(&self, id: UserId, is_admin: bool) -> Result<Option<User>> {
        let mut users = self.users.write().await;
        Ok(users.get_mut(&id).map(|user| {
            user.is_admin = is_admin;
            user.clone()
        }))
    }

    async fn delete_user(&self, id: UserId) -> Result<bool> {
        Ok(self.users.write().await.remove(&id).is_some())
    }
}

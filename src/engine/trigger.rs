//! Trigger policy: decides when a location needs an image
//!
//! Two events lead to generation work:
//! - a location is created (it cannot have media yet)
//! - a user reports a position and nearby locations lack an image

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::dispatcher::{JobHandle, JobQueue};
use super::storage::{LocationStorage, MediaRepository};
use crate::models::{GeoPoint, LocationId, MediaKind};
use crate::Result;

/// A location for which a job was enqueued
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriggeredLocation {
    pub id: LocationId,
    pub name: String,
}

/// What a position update examined and triggered
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionUpdateReport {
    pub nearby_locations: usize,
    pub generation_triggered_for: Vec<TriggeredLocation>,
}

pub struct TriggerPolicy {
    locations: Arc<dyn LocationStorage>,
    media: Arc<dyn MediaRepository>,
    queue: Arc<dyn JobQueue>,
    radius_m: f64,
}

impl TriggerPolicy {
    pub fn new(
        locations: Arc<dyn LocationStorage>,
        media: Arc<dyn MediaRepository>,
        queue: Arc<dyn JobQueue>,
        radius_m: f64,
    ) -> Self {
        Self {
            locations,
            media,
            queue,
            radius_m,
        }
    }

    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    /// Always enqueue one job for a freshly created location
    pub fn on_location_created(&self, location_id: LocationId) -> Result<JobHandle> {
        info!("Location {} created, scheduling image generation", location_id);
        self.queue.enqueue(location_id)
    }

    /// Enqueue one job per nearby location without an image
    ///
    /// Duplicates are only suppressed by the existence check; two updates in
    /// quick succession may both enqueue, which the media repository absorbs.
    pub async fn on_user_position_update(&self, lat: f64, lng: f64) -> Result<PositionUpdateReport> {
        let origin = GeoPoint::new(lat, lng)?;
        let nearby = self.locations.locations_within(origin, self.radius_m).await?;

        let mut triggered = Vec::new();
        for candidate in &nearby {
            let location = &candidate.location;
            if self.media.exists(location.id, MediaKind::Image).await? {
                continue;
            }

            match self.queue.enqueue(location.id) {
                Ok(_) => triggered.push(TriggeredLocation {
                    id: location.id,
                    name: location.name.clone(),
                }),
                Err(e) => warn!("Could not enqueue generation for location {}: {}", location.id, e),
            }
        }

        if !triggered.is_empty() {
            info!(
                "Position ({}, {}) triggered generation for {} of {} nearby locations",
                lat,
                lng,
                triggered.len(),
                nearby.len()
            );
        }

        Ok(PositionUpdateReport {
            nearby_locations: nearby.len(),
            generation_triggered_for: triggered,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::storage::InMemoryStore;
    use crate::engine::testing::RecordingQueue;
    use crate::models::{NewLocation, NewMediaRecord};
    use crate::ExploraError;

    fn policy(store: &Arc<InMemoryStore>, queue: &Arc<RecordingQueue>) -> TriggerPolicy {
        TriggerPolicy::new(store.clone(), store.clone(), queue.clone(), 500.0)
    }

    #[tokio::test]
    async fn test_location_created_always_enqueues() {
        let store = Arc::new(InMemoryStore::new());
        let queue = Arc::new(RecordingQueue::default());

        let handle = policy(&store, &queue)
            .on_location_created(LocationId(7))
            .unwrap();

        assert_eq!(handle.location_id, LocationId(7));
        assert_eq!(queue.enqueued(), vec![LocationId(7)]);
    }

    #[tokio::test]
    async fn test_position_update_skips_locations_with_images() {
        let store = Arc::new(InMemoryStore::new());
        let queue = Arc::new(RecordingQueue::default());

        let notre_dame = store
            .create_location(NewLocation::new("Notre-Dame de Paris", 48.852968, 2.349902))
            .await
            .unwrap();
        let sainte_chapelle = store
            .create_location(NewLocation::new("Sainte-Chapelle", 48.855392, 2.345003))
            .await
            .unwrap();
        store
            .create_location(NewLocation::new("Eiffel Tower", 48.858370, 2.294481))
            .await
            .unwrap();
        store
            .insert(NewMediaRecord::image(notre_dame.id, "https://cdn.example/nd.png"))
            .await
            .unwrap();

        let report = policy(&store, &queue)
            .on_user_position_update(48.8537, 2.3480)
            .await
            .unwrap();

        assert_eq!(report.nearby_locations, 2);
        assert_eq!(
            report.generation_triggered_for,
            vec![TriggeredLocation {
                id: sainte_chapelle.id,
                name: "Sainte-Chapelle".to_string()
            }]
        );
        assert_eq!(queue.enqueued(), vec![sainte_chapelle.id]);
    }

    #[tokio::test]
    async fn test_position_update_with_nothing_nearby() {
        let store = Arc::new(InMemoryStore::new());
        let queue = Arc::new(RecordingQueue::default());

        let report = policy(&store, &queue)
            .on_user_position_update(0.0, 0.0)
            .await
            .unwrap();

        assert_eq!(report.nearby_locations, 0);
        assert!(report.generation_triggered_for.is_empty());
        assert!(queue.enqueued().is_empty());
    }

    #[tokio::test]
    async fn test_position_update_rejects_invalid_coordinates() {
        let store = Arc::new(InMemoryStore::new());
        let queue = Arc::new(RecordingQueue::default());

        let result = policy(&store, &queue).on_user_position_update(91.0, 0.0).await;
        assert!(matches!(result, Err(ExploraError::InvalidInput(_))));
    }
}

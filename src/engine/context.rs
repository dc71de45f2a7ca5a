//! Location context query
//!
//! Assembles what the client shows for a position: nearby locations with
//! their knowledge snippets and media.

use serde::Serialize;

use super::storage::{LocationStorage, MediaRepository};
use crate::models::{GeoPoint, LocationId, MediaKind};
use crate::Result;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnippetView {
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub snippet_type: String,
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MediaView {
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationContext {
    pub id: LocationId,
    pub name: String,
    pub coordinates: GeoPoint,
    pub distance_m: f64,
    pub snippets: Vec<SnippetView>,
    pub media: Vec<MediaView>,
}

/// Everything within `radius_m` metres of (`lat`, `lng`), nearest first
pub async fn context_near(
    locations: &dyn LocationStorage,
    media: &dyn MediaRepository,
    lat: f64,
    lng: f64,
    radius_m: f64,
) -> Result<Vec<LocationContext>> {
    let origin = GeoPoint::new(lat, lng)?;
    let nearby = locations.locations_within(origin, radius_m).await?;

    let mut results = Vec::with_capacity(nearby.len());
    for candidate in nearby {
        let location = candidate.location;

        let snippets = locations
            .list_snippets(location.id)
            .await?
            .into_iter()
            .map(|s| SnippetView {
                title: s.title,
                description: s.description,
                snippet_type: s.snippet_type,
                source: s.source_url,
            })
            .collect();

        let media = media
            .list_for_location(location.id)
            .await?
            .into_iter()
            .map(|m| MediaView {
                kind: m.kind,
                url: m.url,
            })
            .collect();

        results.push(LocationContext {
            id: location.id,
            coordinates: location.point(),
            name: location.name,
            distance_m: candidate.distance_m,
            snippets,
            media,
        });
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::storage::InMemoryStore;
    use crate::models::{NewLocation, NewMediaRecord, NewSnippet};

    #[tokio::test]
    async fn test_context_includes_snippets_and_media() {
        let store = InMemoryStore::new();
        let notre_dame = store
            .create_location(NewLocation::new("Notre-Dame de Paris", 48.852968, 2.349902))
            .await
            .unwrap();
        store
            .create_location(NewLocation::new("Eiffel Tower", 48.858370, 2.294481))
            .await
            .unwrap();
        store
            .add_snippet(
                notre_dame.id,
                NewSnippet {
                    title: "Medieval Marvel".to_string(),
                    description: "Construction began in 1163.".to_string(),
                    snippet_type: "history".to_string(),
                    source_url: None,
                    photo_url: None,
                },
            )
            .await
            .unwrap();
        store
            .insert(NewMediaRecord::image(notre_dame.id, "https://cdn.example/nd.png"))
            .await
            .unwrap();

        let context = context_near(&store, &store, 48.8530, 2.3499, 1000.0)
            .await
            .unwrap();

        assert_eq!(context.len(), 1);
        assert_eq!(context[0].name, "Notre-Dame de Paris");
        assert_eq!(context[0].snippets[0].snippet_type, "history");
        assert_eq!(context[0].media[0].kind, MediaKind::Image);
        assert!(context[0].distance_m < 50.0);

        let json = serde_json::to_value(&context[0]).unwrap();
        assert_eq!(json["media"][0]["type"], "image");
        assert_eq!(json["snippets"][0]["type"], "history");
    }
}

// Media records - persisted references to generated or uploaded assets

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::location::LocationId;
use crate::ExploraError;

/// Kind of media attached to a location
///
/// The generation pipeline only ever produces [`MediaKind::Image`]. At most one
/// record of each kind may exist per location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MediaKind {
    type Err = ExploraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(MediaKind::Image),
            "video" => Ok(MediaKind::Video),
            "audio" => Ok(MediaKind::Audio),
            other => Err(ExploraError::InvalidInput(format!(
                "unknown media kind: {}",
                other
            ))),
        }
    }
}

/// A persisted media reference
///
/// Created exactly once by a successful generation job and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub id: Uuid,
    pub location_id: LocationId,
    pub kind: MediaKind,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for the media repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMediaRecord {
    pub location_id: LocationId,
    pub kind: MediaKind,
    pub url: String,
}

impl NewMediaRecord {
    pub fn image<S: Into<String>>(location_id: LocationId, url: S) -> Self {
        Self {
            location_id,
            kind: MediaKind::Image,
            url: url.into(),
        }
    }

    /// Materialize the record with a fresh id and timestamp
    pub fn into_record(self) -> MediaRecord {
        MediaRecord {
            id: Uuid::new_v4(),
            location_id: self.location_id,
            kind: self.kind,
            url: self.url,
            created_at: Utc::now(),
        }
    }
}

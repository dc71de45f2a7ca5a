// Knowledge snippets attached to locations

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::location::LocationId;
use crate::{ExploraError, Result};

/// A short piece of knowledge about a location (history, trivia, ...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnippet {
    pub id: Uuid,
    pub location_id: LocationId,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub snippet_type: String,
    pub source_url: Option<String>,
    pub photo_url: Option<String>,
}

/// Input for attaching a snippet to a location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSnippet {
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub snippet_type: String,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

impl NewSnippet {
    pub fn validate(self) -> Result<Self> {
        for (field, value) in [
            ("title", &self.title),
            ("description", &self.description),
            ("type", &self.snippet_type),
        ] {
            if value.trim().is_empty() {
                return Err(ExploraError::InvalidInput(format!(
                    "snippet {} must not be empty",
                    field
                )));
            }
        }
        Ok(self)
    }

    pub fn into_snippet(self, location_id: LocationId) -> ContextSnippet {
        ContextSnippet {
            id: Uuid::new_v4(),
            location_id,
            title: self.title,
            description: self.description,
            snippet_type: self.snippet_type,
            source_url: self.source_url,
            photo_url: self.photo_url,
        }
    }
}

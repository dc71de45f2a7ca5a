// HTTP API types
// Request/response bodies and the JSON error envelope

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use crate::engine::{PositionUpdateReport, TriggeredLocation};
use crate::models::{LocationId, User, UserId};
use crate::ExploraError;

/// Error envelope: `{ "error": { "message", "type" } }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,

    #[serde(rename = "type")]
    pub error_type: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>, error_type: &str) -> Self {
        Self {
            error: ErrorDetail {
                message: message.into(),
                error_type: error_type.to_string(),
            },
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(message, "invalid_request_error")
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(message, "authentication_error")
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(message, "permission_error")
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(message, "not_found_error")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.error_type.as_str() {
            "invalid_request_error" => StatusCode::BAD_REQUEST,
            "authentication_error" => StatusCode::UNAUTHORIZED,
            "permission_error" => StatusCode::FORBIDDEN,
            "not_found_error" => StatusCode::NOT_FOUND,
            "conflict_error" => StatusCode::CONFLICT,
            "internal_error" => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<ExploraError> for ErrorResponse {
    fn from(err: ExploraError) -> Self {
        match err {
            ExploraError::NotFound(msg) => Self::not_found(msg),
            ExploraError::InvalidInput(msg) => Self::invalid_request(msg),
            ExploraError::Unauthorized(msg) => Self::unauthorized(msg),
            ExploraError::Forbidden(msg) => Self::forbidden(msg),
            err @ ExploraError::DuplicateMedia { .. } => Self::new(err.to_string(), "conflict_error"),
            ExploraError::DuplicateUser(msg) => Self::invalid_request(msg),
            other => {
                // Internals stay in the log, not in the response
                error!("Request failed: {}", other);
                Self::new("Internal server error", "internal_error")
            }
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

/// Query for `GET /api/context`
#[derive(Debug, Deserialize)]
pub struct ContextQuery {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    /// Metres; defaults to the configured context radius
    pub radius: Option<f64>,
}

/// Body for `POST /api/user/location`
#[derive(Debug, Deserialize)]
pub struct PositionUpdate {
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PositionUpdateResponse {
    pub msg: String,
    pub nearby_locations: usize,
    pub generation_triggered_for: Vec<TriggeredLocationView>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TriggeredLocationView {
    pub id: LocationId,
    pub name: String,
}

impl From<TriggeredLocation> for TriggeredLocationView {
    fn from(location: TriggeredLocation) -> Self {
        Self {
            id: location.id,
            name: location.name,
        }
    }
}

impl From<PositionUpdateReport> for PositionUpdateResponse {
    fn from(report: PositionUpdateReport) -> Self {
        Self {
            msg: "Location processed".to_string(),
            nearby_locations: report.nearby_locations,
            generation_triggered_for: report
                .generation_triggered_for
                .into_iter()
                .map(Into::into)
                .collect(),
        }
    }
}

/// Response for `POST /api/admin/locations`
#[derive(Debug, Serialize, Deserialize)]
pub struct LocationCreated {
    pub id: LocationId,
    pub message: String,
    pub job_id: Uuid,
}

/// Response for endpoints that enqueue a job
#[derive(Debug, Serialize, Deserialize)]
pub struct JobAccepted {
    pub job_id: Uuid,
    pub location_id: LocationId,
}

/// Plain `{ "message" }` acknowledgement
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Body for `POST /api/register`
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Body for `POST /api/login`
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub user_id: UserId,
    pub is_admin: bool,
}

/// A user as admins see it; never carries the password digest
#[derive(Debug, Serialize, Deserialize)]
pub struct UserView {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
}

impl From<User> for UserView {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            is_admin: user.is_admin,
        }
    }
}

/// Response for `GET /api/admin/users`
#[derive(Debug, Serialize, Deserialize)]
pub struct UserList {
    pub users: Vec<UserView>,
    pub total: usize,
}

/// Body for `PATCH /api/admin/users/:id`; absent fields are left unchanged
#[derive(Debug, Default, Deserialize)]
pub struct UserUpdate {
    pub is_admin: Option<bool>,
}

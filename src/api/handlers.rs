// HTTP API handlers
// Thin adapters between axum extractors and the engine

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::{debug, info};

use super::auth::{AdminUser, AuthUser, Claims, JwtKeys};
use super::types::{
    ContextQuery, ErrorResponse, JobAccepted, LocationCreated, LoginRequest, LoginResponse,
    MessageResponse, PositionUpdate, PositionUpdateResponse, RegisterRequest, UserList,
    UserUpdate, UserView,
};
use crate::engine::{
    context_near, AbandonedJob, Dispatcher, LocationContext, LocationStorage, MediaRepository,
    TriggerPolicy, UserStorage,
};
use crate::models::{
    ContextSnippet, Location, LocationId, NewLocation, NewSnippet, NewUser, UserId,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub locations: Arc<dyn LocationStorage>,
    pub media: Arc<dyn MediaRepository>,
    pub users: Arc<dyn UserStorage>,
    pub dispatcher: Arc<Dispatcher>,
    pub trigger: Arc<TriggerPolicy>,
    pub jwt: Arc<JwtKeys>,
    pub context_radius_m: f64,
}

impl AppState {
    pub fn new(
        locations: Arc<dyn LocationStorage>,
        media: Arc<dyn MediaRepository>,
        users: Arc<dyn UserStorage>,
        dispatcher: Arc<Dispatcher>,
        jwt: JwtKeys,
        trigger_radius_m: f64,
        context_radius_m: f64,
    ) -> Self {
        let trigger = Arc::new(TriggerPolicy::new(
            locations.clone(),
            media.clone(),
            dispatcher.clone(),
            trigger_radius_m,
        ));

        Self {
            locations,
            media,
            users,
            dispatcher,
            trigger,
            jwt: Arc::new(jwt),
            context_radius_m,
        }
    }
}

/// Health check endpoint - GET /health
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "explora",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Nearby locations with snippets and media - GET /api/context
pub async fn get_context(
    State(state): State<AppState>,
    Query(query): Query<ContextQuery>,
) -> Result<Json<Vec<LocationContext>>, ErrorResponse> {
    let (lat, lng) = match (query.lat, query.lng) {
        (Some(lat), Some(lng)) => (lat, lng),
        _ => return Err(ErrorResponse::invalid_request("Provide lat and lng parameters")),
    };
    let radius = query.radius.unwrap_or(state.context_radius_m);
    if !(radius.is_finite() && radius > 0.0) {
        return Err(ErrorResponse::invalid_request("radius must be a positive number of metres"));
    }

    debug!("Context query at ({}, {}) within {}m", lat, lng, radius);
    let context = context_near(
        state.locations.as_ref(),
        state.media.as_ref(),
        lat,
        lng,
        radius,
    )
    .await?;
    Ok(Json(context))
}

/// Report the caller's position - POST /api/user/location
pub async fn update_user_location(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(body): Json<PositionUpdate>,
) -> Result<Json<PositionUpdateResponse>, ErrorResponse> {
    let (lat, lng) = match (body.lat, body.lng) {
        (Some(lat), Some(lng)) => (lat, lng),
        _ => return Err(ErrorResponse::invalid_request("Missing lat/lng")),
    };

    debug!("User {} reported position ({}, {})", claims.sub, lat, lng);
    let report = state.trigger.on_user_position_update(lat, lng).await?;
    Ok(Json(report.into()))
}

/// Create a location and schedule its image - POST /api/admin/locations
pub async fn create_location(
    State(state): State<AppState>,
    AdminUser(claims): AdminUser,
    Json(body): Json<NewLocation>,
) -> Result<(StatusCode, Json<LocationCreated>), ErrorResponse> {
    let location = state.locations.create_location(body).await?;
    info!(
        "Admin {} created location {} ({})",
        claims.sub, location.id, location.name
    );

    let handle = state.trigger.on_location_created(location.id)?;
    Ok((
        StatusCode::CREATED,
        Json(LocationCreated {
            id: location.id,
            message: "Location created, image generation scheduled".to_string(),
            job_id: handle.job_id,
        }),
    ))
}

/// GET /api/admin/locations/:id
pub async fn get_location(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<Location>, ErrorResponse> {
    let id = LocationId(id);
    state
        .locations
        .get_location(id)
        .await?
        .map(Json)
        .ok_or_else(|| ErrorResponse::not_found(format!("Location {} not found", id)))
}

/// POST /api/admin/locations/:id/snippets
pub async fn add_snippet(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
    Json(body): Json<NewSnippet>,
) -> Result<(StatusCode, Json<ContextSnippet>), ErrorResponse> {
    let snippet = state.locations.add_snippet(LocationId(id), body).await?;
    Ok((StatusCode::CREATED, Json(snippet)))
}

/// GET /api/admin/jobs/abandoned
pub async fn list_abandoned_jobs(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Json<Vec<AbandonedJob>> {
    Json(state.dispatcher.abandoned_jobs())
}

/// POST /api/admin/jobs/abandoned/:location_id/retry
pub async fn retry_abandoned_job(
    State(state): State<AppState>,
    AdminUser(claims): AdminUser,
    Path(location_id): Path<i64>,
) -> Result<(StatusCode, Json<JobAccepted>), ErrorResponse> {
    let handle = state.dispatcher.retry_abandoned(LocationId(location_id))?;
    info!(
        "Admin {} re-enqueued abandoned job for location {}",
        claims.sub, location_id
    );
    Ok((
        StatusCode::ACCEPTED,
        Json(JobAccepted {
            job_id: handle.job_id,
            location_id: handle.location_id,
        }),
    ))
}

/// Create an account - POST /api/register
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), ErrorResponse> {
    let (Some(username), Some(email), Some(password)) = (body.username, body.email, body.password)
    else {
        return Err(ErrorResponse::invalid_request(
            "Missing username, email or password",
        ));
    };

    let user = state
        .users
        .create_user(NewUser::with_password(username, email, &password)?)
        .await?;
    info!(user_id = %user.id, "Registered user {}", user.username);

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("User created successfully")),
    ))
}

/// Exchange email and password for a bearer token - POST /api/login
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ErrorResponse> {
    let (email, password) = match (body.email, body.password) {
        (Some(email), Some(password)) if !email.trim().is_empty() && !password.is_empty() => {
            (email, password)
        }
        _ => return Err(ErrorResponse::invalid_request("Missing email or password")),
    };

    // Unknown email and wrong password are indistinguishable to the caller
    let user = state
        .users
        .find_user_by_email(email.trim())
        .await?
        .filter(|user| user.check_password(&password))
        .ok_or_else(|| ErrorResponse::unauthorized("Invalid email or password"))?;

    let access_token = state.jwt.issue(&user.id.to_string(), user.is_admin)?;
    debug!(user_id = %user.id, "User logged in");

    Ok(Json(LoginResponse {
        access_token,
        user_id: user.id,
        is_admin: user.is_admin,
    }))
}

fn is_caller(claims: &Claims, id: UserId) -> bool {
    claims.sub == id.to_string()
}

fn user_not_found() -> ErrorResponse {
    ErrorResponse::not_found("User not found")
}

/// GET /api/admin/users
pub async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<UserList>, ErrorResponse> {
    let users: Vec<UserView> = state
        .users
        .list_users()
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(Json(UserList {
        total: users.len(),
        users,
    }))
}

/// GET /api/admin/users/:id
pub async fn get_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<UserView>, ErrorResponse> {
    let user = state
        .users
        .get_user(UserId(id))
        .await?
        .ok_or_else(user_not_found)?;
    Ok(Json(user.into()))
}

/// PATCH /api/admin/users/:id
pub async fn update_user(
    State(state): State<AppState>,
    AdminUser(claims): AdminUser,
    Path(id): Path<i64>,
    Json(body): Json<UserUpdate>,
) -> Result<Json<UserView>, ErrorResponse> {
    let id = UserId(id);
    let user = state.users.get_user(id).await?.ok_or_else(user_not_found)?;

    let Some(is_admin) = body.is_admin else {
        return Ok(Json(user.into()));
    };
    if is_caller(&claims, id) {
        return Err(ErrorResponse::invalid_request(
            "Cannot change your own admin status",
        ));
    }

    let user = state
        .users
        .set_admin(id, is_admin)
        .await?
        .ok_or_else(user_not_found)?;
    info!(
        user_id = %id,
        "Admin {} set is_admin={} for {}",
        claims.sub, is_admin, user.username
    );
    Ok(Json(user.into()))
}

/// DELETE /api/admin/users/:id
pub async fn delete_user(
    State(state): State<AppState>,
    AdminUser(claims): AdminUser,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, ErrorResponse> {
    let id = UserId(id);
    let user = state.users.get_user(id).await?.ok_or_else(user_not_found)?;
    if is_caller(&claims, id) {
        return Err(ErrorResponse::invalid_request("Cannot delete yourself"));
    }

    if !state.users.delete_user(id).await? {
        return Err(user_not_found());
    }
    info!(user_id = %id, "Admin {} deleted user {}", claims.sub, user.username);
    Ok(Json(MessageResponse::new(format!(
        "User {} deleted",
        user.username
    ))))
}

/// Error handler for invalid routes
pub async fn not_found() -> ErrorResponse {
    ErrorResponse::not_found("Not found")
}

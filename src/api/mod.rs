// Explora HTTP API
// Context queries, accounts, position updates and the admin surface over axum

pub mod auth;
pub mod handlers;
pub mod types;

use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use auth::{AdminUser, AuthUser, Claims, JwtKeys};
pub use handlers::AppState;
pub use types::{ErrorDetail, ErrorResponse};

use crate::{ExploraError, Result};
use handlers::{
    add_snippet, create_location, delete_user, get_context, get_location, get_user, health_check,
    list_abandoned_jobs, list_users, login, not_found, register, retry_abandoned_job,
    update_user, update_user_location,
};

/// API server configuration
#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub port: u16,
    pub host: String,
    pub cors_enabled: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            host: "0.0.0.0".to_string(),
            cors_enabled: true,
        }
    }
}

/// Explora API Server
pub struct ApiServer {
    config: ApiConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: ApiConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Create the Axum router with all routes
    pub fn create_router(&self) -> Router {
        let router = Router::new()
            .route("/health", get(health_check))
            // Public
            .route("/api/context", get(get_context))
            .route("/api/register", post(register))
            .route("/api/login", post(login))
            // Authenticated users
            .route("/api/user/location", post(update_user_location))
            // Admin
            .route("/api/admin/locations", post(create_location))
            .route("/api/admin/locations/:id", get(get_location))
            .route("/api/admin/locations/:id/snippets", post(add_snippet))
            .route("/api/admin/users", get(list_users))
            .route(
                "/api/admin/users/:id",
                get(get_user).patch(update_user).delete(delete_user),
            )
            .route("/api/admin/jobs/abandoned", get(list_abandoned_jobs))
            .route(
                "/api/admin/jobs/abandoned/:location_id/retry",
                post(retry_abandoned_job),
            )
            .fallback(not_found)
            .with_state(self.state.clone())
            .layer(TraceLayer::new_for_http());

        if self.config.cors_enabled {
            router.layer(CorsLayer::permissive())
        } else {
            router
        }
    }

    /// Run the server until Ctrl-C
    pub async fn run(self) -> Result<()> {
        self.run_until(async {
            // An error here means no signal handler; run until killed instead
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run the server until `shutdown` resolves, then drain in-flight requests
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let app = self.create_router();
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .map_err(|e| ExploraError::Config(format!("invalid bind address: {}", e)))?;

        info!("🌍 Explora API server starting");
        info!("📡 Server address: http://{}", addr);
        info!("🔗 API endpoints:");
        info!("   GET  http://{}/api/context?lat=&lng=&radius=", addr);
        info!("   POST http://{}/api/register", addr);
        info!("   POST http://{}/api/login", addr);
        info!("   POST http://{}/api/user/location", addr);
        info!("   POST http://{}/api/admin/locations", addr);
        info!("   GET  http://{}/api/admin/users", addr);
        info!("   GET  http://{}/api/admin/jobs/abandoned", addr);
        info!("   GET  http://{}/health", addr);
        info!("   CORS enabled: {}", self.config.cors_enabled);

        axum::Server::bind(&addr)
            .serve(app.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ExploraError::Internal(format!("server error: {}", e)))?;

        info!("Server stopped");
        Ok(())
    }
}

/// Builder pattern for the API server
pub struct ApiServerBuilder {
    config: ApiConfig,
    state: Option<AppState>,
}

impl ApiServerBuilder {
    pub fn new() -> Self {
        Self {
            config: ApiConfig::default(),
            state: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn with_host(mut self, host: String) -> Self {
        self.config.host = host;
        self
    }

    pub fn with_cors(mut self, enabled: bool) -> Self {
        self.config.cors_enabled = enabled;
        self
    }

    pub fn with_state(mut self, state: AppState) -> Self {
        self.state = Some(state);
        self
    }

    pub fn build(self) -> Result<ApiServer> {
        let state = self
            .state
            .ok_or_else(|| ExploraError::Config("API server requires application state".to_string()))?;
        Ok(ApiServer::new(self.config, state))
    }
}

impl Default for ApiServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

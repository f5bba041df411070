//! HTTP API application wiring (Axum router + collaborators).
//!
//! - `routes/`: HTTP routes + handlers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Extension, Router,
};
use tower::ServiceBuilder;

use bioboxsys_auth::{AdminAuthService, ProfileStore};

use crate::middleware;

pub mod errors;
pub mod routes;

/// Collaborators shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<dyn AdminAuthService>,
    pub profiles: Arc<dyn ProfileStore>,
}

impl AppState {
    pub fn new(auth: Arc<dyn AdminAuthService>, profiles: Arc<dyn ProfileStore>) -> Self {
        Self { auth, profiles }
    }
}

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .route("/api/admin/users", post(routes::admin::create_user))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(middleware::trace_requests))
                .layer(Extension(Arc::new(state))),
        )
}

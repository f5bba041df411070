//! Admin routes for account provisioning.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};

use bioboxsys_auth::{provision_user, NewUserRequest};

use crate::app::{errors, AppState};
use crate::middleware::extract_bearer;

/// `POST /api/admin/users`
///
/// The body is parsed leniently: authorization is checked before field
/// validation, so an unreadable body surfaces as `missing_fields` only once
/// the requester is known to be an admin.
pub async fn create_user(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> axum::response::Response {
    let request = serde_json::from_slice::<NewUserRequest>(&body).unwrap_or_else(|err| {
        tracing::debug!(error = %err, "unreadable provisioning body");
        NewUserRequest::default()
    });

    match provision_user(
        state.auth.as_ref(),
        state.profiles.as_ref(),
        extract_bearer(&headers),
        request,
    )
    .await
    {
        Ok(user) => (StatusCode::CREATED, Json(user)).into_response(),
        Err(err) => errors::provision_error_to_response(err),
    }
}

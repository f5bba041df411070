use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use bioboxsys_auth::ProvisionError;

pub fn provision_error_to_response(err: ProvisionError) -> axum::response::Response {
    match &err {
        ProvisionError::MissingToken | ProvisionError::InvalidToken => {
            json_error(StatusCode::UNAUTHORIZED, err.code(), err.to_string())
        }
        ProvisionError::Forbidden => json_error(StatusCode::FORBIDDEN, err.code(), err.to_string()),
        ProvisionError::MissingFields | ProvisionError::InvalidRole(_) => {
            json_error(StatusCode::BAD_REQUEST, err.code(), err.to_string())
        }
        ProvisionError::CreateUserFailed(details) | ProvisionError::ProfileUpsertFailed(details) => {
            json_error_with_details(
                StatusCode::INTERNAL_SERVER_ERROR,
                err.code(),
                err.to_string(),
                details.clone(),
            )
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// [`json_error`] plus the upstream failure text under `details`.
pub fn json_error_with_details(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
    details: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
            "details": details.into(),
        })),
    )
        .into_response()
}

//! Request/response bodies of the hosted auth and REST endpoints, and the
//! mapping from HTTP outcomes to the auth crate's error types.

use std::collections::HashMap;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use bioboxsys_auth::{AuthServiceError, Principal, ProfileStoreError};

#[derive(Debug, Serialize)]
pub(crate) struct PasswordGrant<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct RefreshGrant<'a> {
    pub refresh_token: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct AdminCreateUser<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub email_confirm: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct UserPayload {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: HashMap<String, serde_json::Value>,
}

impl From<UserPayload> for Principal {
    fn from(user: UserPayload) -> Self {
        Principal {
            id: user.id.into(),
            email: user.email.filter(|e| !e.trim().is_empty()),
            metadata: user.user_metadata,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub user: UserPayload,
}

/// Error bodies differ between endpoints; take the first human message.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

pub(crate) fn error_message(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    [parsed.error_description, parsed.msg, parsed.message, parsed.error]
        .into_iter()
        .flatten()
        .map(|m| m.trim().to_string())
        .find(|m| !m.is_empty())
}

/// Non-success auth response: 5xx and 429 mean the service is unavailable,
/// anything else is a rejection.
pub(crate) fn auth_error(status: StatusCode, body: &str) -> AuthServiceError {
    let message = error_message(body);
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        AuthServiceError::unavailable(message.unwrap_or_else(|| status.to_string()))
    } else {
        AuthServiceError::Rejected { message }
    }
}

pub(crate) fn profile_error(status: StatusCode, body: &str) -> ProfileStoreError {
    let message = error_message(body).unwrap_or_else(|| status.to_string());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProfileStoreError::AccessDenied(message),
        _ => ProfileStoreError::Unavailable(message),
    }
}

pub(crate) fn transport_auth_error(err: reqwest::Error) -> AuthServiceError {
    AuthServiceError::unavailable(err.to_string())
}

pub(crate) fn transport_profile_error(err: reqwest::Error) -> ProfileStoreError {
    ProfileStoreError::Unavailable(err.to_string())
}

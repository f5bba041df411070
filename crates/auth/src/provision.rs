//! Admin-only account provisioning.
//!
//! Creates a credential-service account and its profile row in one step. The
//! requester is identified by an access token and must hold the admin role in
//! its own profile row.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use bioboxsys_core::UserId;

use crate::identity::ProfileRow;
use crate::remote::{AdminAuthService, AuthServiceError, ProfileStore};
use crate::{Permission, Role};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewUserRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Role name, matched case-insensitively; absent means seller.
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub permissions: Option<Vec<Permission>>,
}

/// Account created by [`provision_user`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionedUser {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub permissions: Vec<Permission>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProvisionError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("invalid bearer token")]
    InvalidToken,

    #[error("requester is not an admin")]
    Forbidden,

    #[error("email, password and name are required")]
    MissingFields,

    #[error("unknown role '{0}'")]
    InvalidRole(String),

    #[error("failed to create account: {0}")]
    CreateUserFailed(String),

    #[error("failed to store profile: {0}")]
    ProfileUpsertFailed(String),
}

impl ProvisionError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ProvisionError::MissingToken => "missing_token",
            ProvisionError::InvalidToken => "invalid_token",
            ProvisionError::Forbidden => "forbidden",
            ProvisionError::MissingFields => "missing_fields",
            ProvisionError::InvalidRole(_) => "invalid_role",
            ProvisionError::CreateUserFailed(_) => "create_user_failed",
            ProvisionError::ProfileUpsertFailed(_) => "profile_upsert_failed",
        }
    }
}

fn required(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Create an account on behalf of an admin requester.
pub async fn provision_user(
    auth: &dyn AdminAuthService,
    profiles: &dyn ProfileStore,
    bearer_token: Option<&str>,
    request: NewUserRequest,
) -> Result<ProvisionedUser, ProvisionError> {
    let token = bearer_token
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ProvisionError::MissingToken)?;

    let requester = auth.get_user(token).await.map_err(|err| {
        tracing::info!(error = %err, "provisioning token rejected");
        ProvisionError::InvalidToken
    })?;

    let requester_is_admin = match profiles.get_profile_by_id(&requester.id).await {
        Ok(Some(profile)) => profile.parsed_role().is_some_and(|r| r.is_admin()),
        Ok(None) => false,
        Err(err) => {
            tracing::warn!(user_id = %requester.id, error = %err, "requester profile unreadable");
            false
        }
    };
    if !requester_is_admin {
        tracing::warn!(user_id = %requester.id, "non-admin attempted to provision an account");
        return Err(ProvisionError::Forbidden);
    }

    let (Some(email), Some(password), Some(name)) = (
        required(request.email),
        request.password.filter(|p| !p.is_empty()),
        required(request.name),
    ) else {
        return Err(ProvisionError::MissingFields);
    };
    let role = match required(request.role) {
        Some(raw) => raw
            .parse::<Role>()
            .map_err(|_| ProvisionError::InvalidRole(raw.clone()))?,
        None => Role::default(),
    };
    let permissions = request.permissions.unwrap_or_default();

    let created = auth
        .create_user(&email, &password)
        .await
        .map_err(|err| ProvisionError::CreateUserFailed(error_details(err)))?;

    let now = Utc::now();
    let row = ProfileRow {
        id: created.id.clone(),
        email: Some(email.clone()),
        name: Some(name.clone()),
        role: Some(role.as_str().to_string()),
        permissions: Some(permissions.clone()),
        created_at: Some(now),
        updated_at: Some(now),
    };
    profiles
        .upsert_profile(row)
        .await
        .map_err(|err| ProvisionError::ProfileUpsertFailed(err.to_string()))?;

    tracing::info!(
        requester = %requester.id,
        user_id = %created.id,
        role = %role,
        "account provisioned"
    );

    Ok(ProvisionedUser {
        id: created.id,
        email,
        name,
        role,
        permissions,
    })
}

fn error_details(err: AuthServiceError) -> String {
    match err {
        AuthServiceError::Rejected { message } => message.unwrap_or_else(|| "rejected".to_string()),
        AuthServiceError::Unavailable(details) => details,
    }
}

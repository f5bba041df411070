//! Principal → Identity enrichment from the profile store.

use std::sync::Arc;
use std::time::Duration;

use crate::config::AuthConfig;
use crate::identity::{Identity, Principal, ProfileRow};
use crate::remote::{ProfileStore, ProfileStoreError};

/// Builds a full [`Identity`] from a verified principal.
///
/// Resolution never fails: a missing, unreadable or unreachable profile row
/// only degrades the result to the configured defaults.
#[derive(Clone)]
pub struct IdentityResolver {
    profiles: Arc<dyn ProfileStore>,
    config: Arc<AuthConfig>,
}

impl IdentityResolver {
    pub fn new(profiles: Arc<dyn ProfileStore>, config: Arc<AuthConfig>) -> Self {
        Self { profiles, config }
    }

    /// Resolve `principal`; `login_email` is the address typed at login, used
    /// when neither the principal nor the profile carries one.
    pub async fn resolve(&self, principal: &Principal, login_email: Option<&str>) -> Identity {
        let profile = self.fetch_profile(principal).await;
        build_identity(&self.config, principal, profile.as_ref(), login_email)
    }

    async fn fetch_profile(&self, principal: &Principal) -> Option<ProfileRow> {
        let lookup = self.profiles.get_profile_by_id(&principal.id);
        let result = match tokio::time::timeout(self.config.remote_timeout, lookup).await {
            Ok(result) => result,
            Err(_) => Err(timeout_error(self.config.remote_timeout)),
        };

        match result {
            Ok(Some(row)) => Some(row),
            Ok(None) => {
                tracing::warn!(user_id = %principal.id, "no profile row; applying defaults");
                None
            }
            Err(ProfileStoreError::AccessDenied(details)) => {
                tracing::warn!(
                    user_id = %principal.id,
                    %details,
                    "profile read denied by access policy; applying defaults"
                );
                None
            }
            Err(err) => {
                tracing::warn!(user_id = %principal.id, error = %err, "profile lookup failed; applying defaults");
                None
            }
        }
    }
}

fn timeout_error(after: Duration) -> ProfileStoreError {
    ProfileStoreError::Unavailable(format!("timed out after {}s", after.as_secs()))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn email_local_part(email: &str) -> Option<&str> {
    non_blank(email.split('@').next())
}

/// Pure fallback chain shared by every resolution path.
pub(crate) fn build_identity(
    config: &AuthConfig,
    principal: &Principal,
    profile: Option<&ProfileRow>,
    login_email: Option<&str>,
) -> Identity {
    let email = non_blank(principal.email.as_deref())
        .or_else(|| non_blank(profile.and_then(|p| p.email.as_deref())))
        .or_else(|| non_blank(login_email))
        .unwrap_or_default()
        .to_string();

    let display_name = non_blank(profile.and_then(|p| p.name.as_deref()))
        .or_else(|| principal.metadata_name())
        .or_else(|| email_local_part(&email))
        .unwrap_or(config.fallback_display_name.as_str())
        .to_string();

    let role = match profile {
        Some(p) => p.parsed_role().unwrap_or_else(|| {
            if let Some(raw) = p.role.as_deref() {
                tracing::warn!(user_id = %principal.id, role = raw, "unrecognized profile role");
            }
            config.default_role
        }),
        None => config.default_role,
    };

    let permissions = profile
        .and_then(|p| p.permissions.clone())
        .unwrap_or_else(|| config.default_permissions_on_missing_profile.clone());

    Identity {
        id: principal.id.clone(),
        display_name,
        email,
        role,
        permissions,
    }
}

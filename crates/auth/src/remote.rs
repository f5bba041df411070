//! Contracts of the remote collaborators (credential service, profile store).
//!
//! The wire format is owned by the hosted service; adapters implement these
//! traits (see `bioboxsys-supabase`), and [`crate::memory`] provides in-process
//! versions for tests and offline development.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use bioboxsys_core::UserId;

use crate::identity::{Principal, ProfileRow};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthServiceError {
    /// The service answered and refused (bad credentials, unconfirmed email, ...).
    #[error("credentials rejected: {}", .message.as_deref().unwrap_or("no message"))]
    Rejected { message: Option<String> },

    /// The service could not be reached, timed out, or is not configured.
    #[error("credential service unavailable: {0}")]
    Unavailable(String),
}

impl AuthServiceError {
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected {
            message: Some(message.into()),
        }
    }

    pub fn unavailable(details: impl Into<String>) -> Self {
        Self::Unavailable(details.into())
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProfileStoreError {
    /// Row-level access policy refused the read or write.
    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("profile store unavailable: {0}")]
    Unavailable(String),
}

/// Session change pushed by the credential service.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    SignedIn(Principal),
    TokenRefreshed(Principal),
    UserUpdated(Principal),
    SignedOut,
}

impl SessionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::SignedIn(_) => "signed_in",
            SessionEvent::TokenRefreshed(_) => "token_refreshed",
            SessionEvent::UserUpdated(_) => "user_updated",
            SessionEvent::SignedOut => "signed_out",
        }
    }

    pub fn principal(&self) -> Option<&Principal> {
        match self {
            SessionEvent::SignedIn(p)
            | SessionEvent::TokenRefreshed(p)
            | SessionEvent::UserUpdated(p) => Some(p),
            SessionEvent::SignedOut => None,
        }
    }
}

/// Credential service as seen by a single client.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Exchange email + password for a verified principal.
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Principal, AuthServiceError>;

    /// Principal of the session currently held by this client, if any.
    async fn get_session(&self) -> Result<Option<Principal>, AuthServiceError>;

    /// Invalidate the server-side session.
    async fn sign_out(&self) -> Result<(), AuthServiceError>;

    /// Stream of future session changes.
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;
}

/// Privileged credential operations (service-role access).
#[async_trait]
pub trait AdminAuthService: Send + Sync {
    /// Principal owning `access_token`.
    async fn get_user(&self, access_token: &str) -> Result<Principal, AuthServiceError>;

    /// Create a confirmed account.
    async fn create_user(&self, email: &str, password: &str) -> Result<Principal, AuthServiceError>;
}

/// Remote `users` table.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile_by_id(&self, id: &UserId) -> Result<Option<ProfileRow>, ProfileStoreError>;

    /// Insert or merge a row keyed by `row.id`.
    async fn upsert_profile(&self, row: ProfileRow) -> Result<ProfileRow, ProfileStoreError>;
}

/// Credential service placeholder used when no backend is configured.
///
/// Every call reports [`AuthServiceError::Unavailable`], which is what lets the
/// demo fallback engage.
#[derive(Debug)]
pub struct UnconfiguredAuthService {
    events: broadcast::Sender<SessionEvent>,
}

impl UnconfiguredAuthService {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(1);
        Self { events }
    }
}

impl Default for UnconfiguredAuthService {
    fn default() -> Self {
        Self::new()
    }
}

const NOT_CONFIGURED: &str = "no credential service configured";

#[async_trait]
impl AuthService for UnconfiguredAuthService {
    async fn sign_in_with_password(&self, _: &str, _: &str) -> Result<Principal, AuthServiceError> {
        Err(AuthServiceError::unavailable(NOT_CONFIGURED))
    }

    async fn get_session(&self) -> Result<Option<Principal>, AuthServiceError> {
        Err(AuthServiceError::unavailable(NOT_CONFIGURED))
    }

    async fn sign_out(&self) -> Result<(), AuthServiceError> {
        Err(AuthServiceError::unavailable(NOT_CONFIGURED))
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

#[async_trait]
impl AdminAuthService for UnconfiguredAuthService {
    async fn get_user(&self, _: &str) -> Result<Principal, AuthServiceError> {
        Err(AuthServiceError::unavailable(NOT_CONFIGURED))
    }

    async fn create_user(&self, _: &str, _: &str) -> Result<Principal, AuthServiceError> {
        Err(AuthServiceError::unavailable(NOT_CONFIGURED))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_message_rendering() {
        assert_eq!(
            AuthServiceError::rejected("Invalid login credentials").to_string(),
            "credentials rejected: Invalid login credentials"
        );
        assert_eq!(
            AuthServiceError::Rejected { message: None }.to_string(),
            "credentials rejected: no message"
        );
    }

    #[test]
    fn signed_out_has_no_principal() {
        assert!(SessionEvent::SignedOut.principal().is_none());
        let p = Principal::new("1", "a@b.com");
        assert_eq!(SessionEvent::SignedIn(p.clone()).principal(), Some(&p));
    }

    #[tokio::test]
    async fn unconfigured_service_is_always_unavailable() {
        let svc = UnconfiguredAuthService::new();
        assert!(svc.sign_in_with_password("a", "b").await.unwrap_err().is_unavailable());
        assert!(svc.get_session().await.unwrap_err().is_unavailable());
        assert!(svc.sign_out().await.unwrap_err().is_unavailable());
        assert!(svc.get_user("token").await.unwrap_err().is_unavailable());
    }
}

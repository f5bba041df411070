//! Credential service client for the hosted auth endpoints.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use tokio::sync::broadcast;

use bioboxsys_auth::{
    AdminAuthService, AuthService, AuthServiceError, LocalSlot, Principal, SessionEvent,
};
use serde::{Deserialize, Serialize};

use crate::config::SupabaseConfig;
use crate::wire::{
    auth_error, transport_auth_error, AdminCreateUser, PasswordGrant, RefreshGrant, TokenResponse,
    UserPayload,
};

const EVENT_CAPACITY: usize = 32;

/// Slot key holding the token pair, next to the cached identity.
pub const AUTH_SESSION_KEY: &str = "bioboxsys_auth_session";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredSession {
    access_token: String,
    refresh_token: Option<String>,
    principal: Principal,
}

/// Holds the client's session tokens and pushes session changes to
/// subscribers.
///
/// With a slot attached the tokens survive restarts, so the next process can
/// pick the session up again.
pub struct SupabaseAuth {
    config: SupabaseConfig,
    http: Client,
    session: Mutex<Option<StoredSession>>,
    slot: Option<Arc<dyn LocalSlot>>,
    events: broadcast::Sender<SessionEvent>,
}

impl core::fmt::Debug for SupabaseAuth {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SupabaseAuth")
            .field("config", &self.config)
            .field("signed_in", &self.access_token().is_some())
            .finish_non_exhaustive()
    }
}

impl SupabaseAuth {
    pub fn new(config: SupabaseConfig) -> Self {
        Self::with_client(config, Client::new())
    }

    pub fn with_client(config: SupabaseConfig, http: Client) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            http,
            session: Mutex::new(None),
            slot: None,
            events,
        }
    }

    /// Client whose session is kept in `slot` under [`AUTH_SESSION_KEY`].
    /// A session stored by an earlier process is loaded right away.
    pub fn with_slot(config: SupabaseConfig, slot: Arc<dyn LocalSlot>) -> Self {
        let mut auth = Self::new(config);
        auth.session = Mutex::new(load_session(slot.as_ref()));
        auth.slot = Some(slot);
        auth
    }

    pub fn config(&self) -> &SupabaseConfig {
        &self.config
    }

    /// Access token of the held session, if signed in.
    pub fn access_token(&self) -> Option<String> {
        self.lock().as_ref().map(|s| s.access_token.clone())
    }

    /// Exchange the held refresh token for a new session.
    ///
    /// A rejected refresh ends the session and notifies subscribers.
    pub async fn refresh_session(&self) -> Result<Option<Principal>, AuthServiceError> {
        let Some(refresh_token) = self.lock().as_ref().and_then(|s| s.refresh_token.clone()) else {
            return Ok(None);
        };

        let response = self
            .anon(self.http.post(self.config.endpoint("/auth/v1/token")))
            .query(&[("grant_type", "refresh_token")])
            .json(&RefreshGrant {
                refresh_token: &refresh_token,
            })
            .send()
            .await
            .map_err(transport_auth_error)?;

        match read_json::<TokenResponse>(response).await {
            Ok(token) => {
                let principal = self.store(token);
                tracing::debug!(user_id = %principal.id, "session refreshed");
                self.notify(SessionEvent::TokenRefreshed(principal.clone()));
                Ok(Some(principal))
            }
            Err(AuthServiceError::Rejected { message }) => {
                tracing::info!(message = message.as_deref().unwrap_or("-"), "refresh rejected; session ended");
                self.end_session();
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<StoredSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn anon(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("apikey", &self.config.anon_key)
    }

    fn store(&self, token: TokenResponse) -> Principal {
        let principal = Principal::from(token.user);
        let session = StoredSession {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            principal: principal.clone(),
        };
        self.save(Some(&session));
        *self.lock() = Some(session);
        principal
    }

    fn end_session(&self) -> Option<String> {
        let ended = self.lock().take();
        self.save(None);
        if ended.is_some() {
            self.notify(SessionEvent::SignedOut);
        }
        ended.map(|s| s.access_token)
    }

    fn save(&self, session: Option<&StoredSession>) {
        let Some(slot) = &self.slot else {
            return;
        };
        let result = match session.map(serde_json::to_string).transpose() {
            Ok(Some(raw)) => slot.set(AUTH_SESSION_KEY, &raw),
            Ok(None) => slot.remove(AUTH_SESSION_KEY),
            Err(err) => {
                tracing::warn!(error = %err, "failed to encode auth session");
                return;
            }
        };
        if let Err(err) = result {
            tracing::warn!(error = %err, "failed to persist auth session");
        }
    }

    fn notify(&self, event: SessionEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    async fn fetch_user(&self, access_token: &str) -> Result<Principal, AuthServiceError> {
        let response = self
            .anon(self.http.get(self.config.endpoint("/auth/v1/user")))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport_auth_error)?;
        read_json::<UserPayload>(response).await.map(Principal::from)
    }
}

fn load_session(slot: &dyn LocalSlot) -> Option<StoredSession> {
    let raw = match slot.get(AUTH_SESSION_KEY) {
        Ok(raw) => raw?,
        Err(err) => {
            tracing::warn!(error = %err, "failed to read stored auth session");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(session) => Some(session),
        Err(err) => {
            tracing::warn!(error = %err, "discarding malformed stored auth session");
            if let Err(err) = slot.remove(AUTH_SESSION_KEY) {
                tracing::warn!(error = %err, "failed to remove malformed auth session");
            }
            None
        }
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, AuthServiceError> {
    let status = response.status();
    let body = response.text().await.map_err(transport_auth_error)?;
    if !status.is_success() {
        return Err(auth_error(status, &body));
    }
    serde_json::from_str(&body)
        .map_err(|err| AuthServiceError::unavailable(format!("unexpected response body: {err}")))
}

#[async_trait]
impl AuthService for SupabaseAuth {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Principal, AuthServiceError> {
        let response = self
            .anon(self.http.post(self.config.endpoint("/auth/v1/token")))
            .query(&[("grant_type", "password")])
            .json(&PasswordGrant { email, password })
            .send()
            .await
            .map_err(transport_auth_error)?;

        let token = read_json::<TokenResponse>(response).await?;
        let principal = self.store(token);
        self.notify(SessionEvent::SignedIn(principal.clone()));
        Ok(principal)
    }

    async fn get_session(&self) -> Result<Option<Principal>, AuthServiceError> {
        let Some(access_token) = self.access_token() else {
            return Ok(None);
        };

        match self.fetch_user(&access_token).await {
            Ok(principal) => {
                let updated = self.lock().as_mut().map(|session| {
                    session.principal = principal.clone();
                    session.clone()
                });
                self.save(updated.as_ref());
                Ok(Some(principal))
            }
            // Expired access token: one refresh attempt.
            Err(AuthServiceError::Rejected { .. }) => self.refresh_session().await,
            Err(err) => Err(err),
        }
    }

    async fn sign_out(&self) -> Result<(), AuthServiceError> {
        let Some(access_token) = self.end_session() else {
            return Ok(());
        };

        let response = self
            .anon(self.http.post(self.config.endpoint("/auth/v1/logout")))
            .bearer_auth(&access_token)
            .send()
            .await
            .map_err(transport_auth_error)?;

        let status = response.status();
        // Already revoked server side counts as signed out.
        if status.is_success() || status == StatusCode::UNAUTHORIZED || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(auth_error(status, &body))
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

#[async_trait]
impl AdminAuthService for SupabaseAuth {
    async fn get_user(&self, access_token: &str) -> Result<Principal, AuthServiceError> {
        self.fetch_user(access_token).await
    }

    async fn create_user(&self, email: &str, password: &str) -> Result<Principal, AuthServiceError> {
        let Some(service_key) = self.config.service_role_key.as_deref() else {
            return Err(AuthServiceError::unavailable("service role key not configured"));
        };

        let response = self
            .http
            .post(self.config.endpoint("/auth/v1/admin/users"))
            .header("apikey", service_key)
            .bearer_auth(service_key)
            .json(&AdminCreateUser {
                email,
                password,
                email_confirm: true,
            })
            .send()
            .await
            .map_err(transport_auth_error)?;

        let user = read_json::<UserPayload>(response).await?;
        tracing::info!(user_id = %user.id, "account created");
        Ok(Principal::from(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use bioboxsys_auth::MemorySlot;

    fn config() -> SupabaseConfig {
        SupabaseConfig::new("http://127.0.0.1:9", "anon").unwrap()
    }

    fn client() -> SupabaseAuth {
        SupabaseAuth::new(config())
    }

    fn token(access: &str) -> TokenResponse {
        TokenResponse {
            access_token: access.into(),
            refresh_token: Some("refresh".into()),
            user: UserPayload {
                id: "u-1".into(),
                email: Some("carlos@bioboxsys.com".into()),
                user_metadata: Default::default(),
            },
        }
    }

    #[tokio::test]
    async fn no_session_without_sign_in() {
        let auth = client();
        assert_eq!(auth.get_session().await.unwrap(), None);
        assert_eq!(auth.refresh_session().await.unwrap(), None);
        assert!(auth.sign_out().await.is_ok());
    }

    #[tokio::test]
    async fn admin_create_requires_service_key() {
        let err = client().create_user("a@bioboxsys.com", "pw").await.unwrap_err();
        assert!(err.is_unavailable());
    }

    #[tokio::test]
    async fn sign_out_clears_local_session_and_notifies() {
        let auth = client();
        let mut rx = auth.subscribe();
        auth.store(token("a"));

        // Nothing listens on the port, so the remote call fails.
        assert!(auth.sign_out().await.unwrap_err().is_unavailable());
        assert_eq!(auth.access_token(), None);
        assert_eq!(rx.recv().await.unwrap(), SessionEvent::SignedOut);
    }

    #[test]
    fn session_survives_a_new_client_on_the_same_slot() {
        let slot = Arc::new(MemorySlot::new());

        let first = SupabaseAuth::with_slot(config(), slot.clone());
        first.store(token("access-1"));

        let second = SupabaseAuth::with_slot(config(), slot.clone());
        assert_eq!(second.access_token().as_deref(), Some("access-1"));
        assert_eq!(
            second.lock().as_ref().and_then(|s| s.refresh_token.clone()).as_deref(),
            Some("refresh")
        );
    }

    #[tokio::test]
    async fn ending_the_session_clears_the_slot() {
        let slot = Arc::new(MemorySlot::new());
        let auth = SupabaseAuth::with_slot(config(), slot.clone());
        auth.store(token("access-1"));

        let _ = auth.sign_out().await;

        assert_eq!(slot.get(AUTH_SESSION_KEY).unwrap(), None);
        assert_eq!(SupabaseAuth::with_slot(config(), slot).access_token(), None);
    }

    #[test]
    fn malformed_stored_session_is_dropped() {
        let slot = Arc::new(MemorySlot::new());
        slot.set(AUTH_SESSION_KEY, "{oops").unwrap();

        let auth = SupabaseAuth::with_slot(config(), slot.clone());
        assert_eq!(auth.access_token(), None);
        assert_eq!(slot.get(AUTH_SESSION_KEY).unwrap(), None);
    }
}

//! Session lifecycle: bootstrap, login, logout and remote session changes.
//!
//! `SessionManager` owns the only mutable session value. Consumers receive it
//! as an `Arc<SessionManager>` and read it through snapshots or the
//! synchronous permission checks; it is only ever changed by the operations
//! below.
//!
//! Ordering: bootstrap, login and session-change notifications take a ticket
//! when they start; logout takes its ticket when it commits. A commit only
//! lands if its ticket is newer than the last applied one, so a slow bootstrap
//! never overwrites a newer login, a notification received during a login
//! wins over it, and nothing that started before a logout lands after it.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::authorize::{evaluate, PermissionDecision};
use crate::config::AuthConfig;
use crate::demo::DemoDirectory;
use crate::identity::Identity;
use crate::modules::{self, Module, VIEW_ACTION};
use crate::remote::{AuthService, AuthServiceError, ProfileStore, SessionEvent};
use crate::resolve::IdentityResolver;
use crate::slot::{LocalSlot, CACHED_IDENTITY_KEY};

/// Message used when the credential service rejects a login without saying why.
pub const GENERIC_LOGIN_ERROR: &str = "invalid email or password";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoginError {
    #[error("email and password are required")]
    MissingCredentials,

    #[error("{0}")]
    InvalidCredentials(String),

    #[error("authentication service unavailable: {0}")]
    ServiceUnavailable(String),

    /// A newer session change (logout, or a sign-in elsewhere) landed first.
    #[error("login superseded by a newer session change")]
    Superseded,
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub identity: Option<Identity>,
    pub is_loading: bool,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }
}

#[derive(Debug)]
struct Inner {
    identity: Option<Identity>,
    bootstrap_pending: bool,
    logins_in_flight: u32,
    applied_ticket: u64,
}

impl Inner {
    fn is_loading(&self) -> bool {
        self.bootstrap_pending || self.logins_in_flight > 0
    }
}

/// Whole-value replacement of the current identity.
#[derive(Debug)]
enum Transition {
    /// Authenticated; the cached copy is rewritten.
    SignIn(Identity),
    /// Authenticated from the cached copy itself; the slot is left as is.
    Restore(Identity),
    /// Not authenticated; the cached copy is removed.
    SignOut,
    /// Not authenticated and nothing cached; the slot is left as is.
    Anonymous,
}

pub struct SessionManager {
    auth: Arc<dyn AuthService>,
    resolver: IdentityResolver,
    slot: Arc<dyn LocalSlot>,
    demo: DemoDirectory,
    config: Arc<AuthConfig>,
    state: RwLock<Inner>,
    tickets: AtomicU64,
}

impl core::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    pub fn new(
        auth: Arc<dyn AuthService>,
        profiles: Arc<dyn ProfileStore>,
        slot: Arc<dyn LocalSlot>,
        config: AuthConfig,
    ) -> Self {
        let config = Arc::new(config);
        Self {
            auth,
            resolver: IdentityResolver::new(profiles, Arc::clone(&config)),
            slot,
            demo: DemoDirectory::builtin(),
            config,
            state: RwLock::new(Inner {
                identity: None,
                bootstrap_pending: true,
                logins_in_flight: 0,
                applied_ticket: 0,
            }),
            tickets: AtomicU64::new(0),
        }
    }

    /// Replace the accounts accepted by the demo fallback.
    pub fn with_demo_directory(mut self, demo: DemoDirectory) -> Self {
        self.demo = demo;
        self
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> SessionState {
        let inner = self.state.read().unwrap_or_else(PoisonError::into_inner);
        SessionState {
            identity: inner.identity.clone(),
            is_loading: inner.is_loading(),
        }
    }

    pub fn identity(&self) -> Option<Identity> {
        self.snapshot().identity
    }

    pub fn is_authenticated(&self) -> bool {
        let inner = self.state.read().unwrap_or_else(PoisonError::into_inner);
        inner.identity.is_some()
    }

    pub fn is_loading(&self) -> bool {
        let inner = self.state.read().unwrap_or_else(PoisonError::into_inner);
        inner.is_loading()
    }

    /// Which rule decides `(module, action)` for the current identity.
    pub fn explain_permission(&self, module: &str, action: &str) -> PermissionDecision {
        let inner = self.state.read().unwrap_or_else(PoisonError::into_inner);
        evaluate(inner.identity.as_ref(), module, action, &self.config.compat)
    }

    /// May the current identity perform `action` on `module`? No I/O.
    pub fn check_permission(&self, module: &str, action: &str) -> bool {
        self.explain_permission(module, action).is_granted()
    }

    /// Modules the current identity may view, in catalog order.
    pub fn visible_modules(&self) -> Vec<Module> {
        modules::visible_modules(|m| self.check_permission(m.as_str(), VIEW_ACTION))
    }

    /// Where to send the current identity when it lands somewhere it may not view.
    pub fn landing_module(&self) -> Option<Module> {
        modules::landing_module(|m| self.check_permission(m.as_str(), VIEW_ACTION))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Subscribe to remote session changes, then bootstrap.
    ///
    /// Subscribing first means a change that happens while bootstrap is in
    /// flight is still observed. Returns the listener task.
    pub async fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let listener = self.spawn_listener();
        self.bootstrap().await;
        listener
    }

    /// Establish the initial session without asking for credentials.
    ///
    /// Remote session first, then the cached copy, else anonymous. Never fails;
    /// the loading flag is cleared exactly once, as the last step.
    pub async fn bootstrap(&self) {
        let ticket = self.next_ticket();

        let transition = match self.remote(self.auth.get_session()).await {
            Ok(Some(principal)) => {
                let identity = self.resolver.resolve(&principal, None).await;
                tracing::info!(user_id = %identity.id, "session restored from credential service");
                Transition::SignIn(identity)
            }
            Ok(None) => self.restore_cached(),
            Err(err) => {
                tracing::warn!(error = %err, "session lookup failed; falling back to cached identity");
                self.restore_cached()
            }
        };

        let mut inner = self.write_state();
        if !self.apply_locked(&mut inner, ticket, transition) {
            tracing::debug!(ticket, "bootstrap result superseded");
        }
        inner.bootstrap_pending = false;
    }

    /// Exchange credentials for an identity.
    ///
    /// Only a failed login surfaces an error; on error the session is unchanged.
    pub async fn login(&self, email: &str, password: &str) -> Result<Identity, LoginError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(LoginError::MissingCredentials);
        }

        let ticket = self.next_ticket();
        let _loading = LoadingGuard::enter(self);

        let identity = match self.remote(self.auth.sign_in_with_password(email, password)).await {
            Ok(principal) => self.resolver.resolve(&principal, Some(email)).await,
            Err(AuthServiceError::Rejected { message }) => {
                let message = message
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| GENERIC_LOGIN_ERROR.to_string());
                tracing::info!(%email, %message, "login rejected");
                return Err(LoginError::InvalidCredentials(message));
            }
            Err(AuthServiceError::Unavailable(details)) => self.demo_login(email, password, details)?,
        };

        let mut inner = self.write_state();
        if self.apply_locked(&mut inner, ticket, Transition::SignIn(identity.clone())) {
            tracing::info!(user_id = %identity.id, role = %identity.role, "login succeeded");
            return Ok(identity);
        }

        // A newer change landed first; fine if it signed in the same account.
        match inner.identity.as_ref() {
            Some(current) if current.id == identity.id => Ok(current.clone()),
            _ => {
                tracing::info!(user_id = %identity.id, "login superseded");
                Err(LoginError::Superseded)
            }
        }
    }

    /// End the session. Always leaves the client signed out with an empty slot.
    pub async fn logout(&self) {
        if let Err(err) = self.remote(self.auth.sign_out()).await {
            tracing::warn!(error = %err, "remote sign-out failed; clearing local session anyway");
        }

        let ticket = self.next_ticket();
        let mut inner = self.write_state();
        let user_id = inner.identity.as_ref().map(|i| i.id.to_string());
        self.apply_locked(&mut inner, ticket, Transition::SignOut);
        tracing::info!(user_id = user_id.as_deref().unwrap_or("-"), "logged out");
    }

    /// Apply a session change pushed by the credential service.
    pub async fn handle_session_event(&self, event: SessionEvent) {
        let ticket = self.next_ticket();
        tracing::debug!(kind = event.kind(), ticket, "session change received");

        let transition = match event.principal() {
            Some(principal) => Transition::SignIn(self.resolver.resolve(principal, None).await),
            None => Transition::SignOut,
        };

        let mut inner = self.write_state();
        if !self.apply_locked(&mut inner, ticket, transition) {
            tracing::debug!(ticket, "session change superseded");
        }
    }

    /// Forward remote session changes to [`Self::handle_session_event`] until
    /// the credential service drops its sender.
    pub fn spawn_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.auth.subscribe();
        let manager = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => manager.handle_session_event(event).await,
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "session change stream lagged; resynchronizing");
                        manager.resync().await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    async fn resync(&self) {
        match self.remote(self.auth.get_session()).await {
            Ok(Some(principal)) => {
                self.handle_session_event(SessionEvent::UserUpdated(principal)).await
            }
            Ok(None) => self.handle_session_event(SessionEvent::SignedOut).await,
            Err(err) => tracing::warn!(error = %err, "resynchronization failed; keeping current session"),
        }
    }

    fn demo_login(&self, email: &str, password: &str, details: String) -> Result<Identity, LoginError> {
        if !self.config.demo_login_enabled {
            tracing::warn!(%details, "credential service unavailable");
            return Err(LoginError::ServiceUnavailable(details));
        }

        match self.demo.authenticate(email, password) {
            Some(identity) => {
                tracing::warn!(%details, %email, "credential service unavailable; using demo account");
                Ok(identity)
            }
            None => Err(LoginError::InvalidCredentials(GENERIC_LOGIN_ERROR.to_string())),
        }
    }

    fn restore_cached(&self) -> Transition {
        let raw = match self.slot.get(CACHED_IDENTITY_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Transition::Anonymous,
            Err(err) => {
                tracing::warn!(error = %err, "failed to read cached identity");
                return Transition::Anonymous;
            }
        };

        match Identity::from_json(&raw) {
            Ok(identity) => {
                tracing::info!(user_id = %identity.id, "session restored from cached identity");
                Transition::Restore(identity)
            }
            Err(err) => {
                tracing::warn!(error = %err, "discarding malformed cached identity");
                if let Err(err) = self.slot.remove(CACHED_IDENTITY_KEY) {
                    tracing::warn!(error = %err, "failed to remove malformed cached identity");
                }
                Transition::Anonymous
            }
        }
    }

    /// Run a remote call under the configured timeout; a timeout counts as
    /// the service being unavailable.
    async fn remote<T>(
        &self,
        call: impl Future<Output = Result<T, AuthServiceError>>,
    ) -> Result<T, AuthServiceError> {
        match tokio::time::timeout(self.config.remote_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(AuthServiceError::unavailable(format!(
                "timed out after {}s",
                self.config.remote_timeout.as_secs()
            ))),
        }
    }

    fn next_ticket(&self) -> u64 {
        self.tickets.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, Inner> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `transition` if `ticket` is newer than the last applied one.
    ///
    /// The slot is updated under the same lock so it always mirrors the
    /// applied state. Slot calls are synchronous and run on the async worker
    /// while the lock is held; slots must stay small and local.
    fn apply_locked(&self, inner: &mut Inner, ticket: u64, transition: Transition) -> bool {
        if ticket <= inner.applied_ticket {
            return false;
        }
        inner.applied_ticket = ticket;

        match transition {
            Transition::SignIn(identity) => {
                self.persist(&identity);
                inner.identity = Some(identity);
            }
            Transition::Restore(identity) => inner.identity = Some(identity),
            Transition::SignOut => {
                if let Err(err) = self.slot.remove(CACHED_IDENTITY_KEY) {
                    tracing::warn!(error = %err, "failed to clear cached identity");
                }
                inner.identity = None;
            }
            Transition::Anonymous => inner.identity = None,
        }
        true
    }

    fn persist(&self, identity: &Identity) {
        let raw = match identity.to_json() {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(error = %err, "failed to encode identity for caching");
                return;
            }
        };
        if let Err(err) = self.slot.set(CACHED_IDENTITY_KEY, &raw) {
            tracing::warn!(error = %err, "failed to cache identity");
        }
    }
}

/// Marks a login round trip in flight; dropping it (including on
/// cancellation) settles the loading flag.
struct LoadingGuard<'a> {
    manager: &'a SessionManager,
}

impl<'a> LoadingGuard<'a> {
    fn enter(manager: &'a SessionManager) -> Self {
        manager.write_state().logins_in_flight += 1;
        Self { manager }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.manager.write_state();
        inner.logins_in_flight = inner.logins_in_flight.saturating_sub(1);
    }
}

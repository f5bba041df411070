//! In-memory collaborators for tests and offline development.
//!
//! Intended for tests/dev. Not optimized for performance.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;

use bioboxsys_core::UserId;

use crate::identity::{Principal, ProfileRow};
use crate::remote::{
    AdminAuthService, AuthService, AuthServiceError, ProfileStore, ProfileStoreError, SessionEvent,
};

const INVALID_CREDENTIALS: &str = "Invalid login credentials";

#[derive(Debug, Clone)]
struct Account {
    principal: Principal,
    password: String,
}

/// In-memory profile table.
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    rows: RwLock<HashMap<UserId, ProfileRow>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, row: ProfileRow) {
        if let Ok(mut rows) = self.rows.write() {
            rows.insert(row.id.clone(), row);
        }
    }

    pub fn get(&self, id: &UserId) -> Option<ProfileRow> {
        self.rows.read().ok().and_then(|rows| rows.get(id).cloned())
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get_profile_by_id(&self, id: &UserId) -> Result<Option<ProfileRow>, ProfileStoreError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| ProfileStoreError::Unavailable("lock poisoned".into()))?;
        Ok(rows.get(id).cloned())
    }

    async fn upsert_profile(&self, row: ProfileRow) -> Result<ProfileRow, ProfileStoreError> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| ProfileStoreError::Unavailable("lock poisoned".into()))?;
        let merged = match rows.get(&row.id) {
            Some(existing) => ProfileRow {
                created_at: existing.created_at.or(row.created_at),
                ..row
            },
            None => row,
        };
        rows.insert(merged.id.clone(), merged.clone());
        Ok(merged)
    }
}

/// In-memory credential service holding accounts, one client session, and
/// issued access tokens.
#[derive(Debug)]
pub struct InMemoryAuthService {
    accounts: RwLock<HashMap<String, Account>>,
    tokens: RwLock<HashMap<String, UserId>>,
    session: Mutex<Option<Principal>>,
    offline: Mutex<bool>,
    events: broadcast::Sender<SessionEvent>,
}

impl Default for InMemoryAuthService {
    fn default() -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            accounts: RwLock::new(HashMap::new()),
            tokens: RwLock::new(HashMap::new()),
            session: Mutex::new(None),
            offline: Mutex::new(false),
            events,
        }
    }
}

impl InMemoryAuthService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account (emails compare case-insensitively).
    pub fn add_account(&self, principal: Principal, password: impl Into<String>) {
        let Some(email) = principal.email.as_deref().map(str::to_ascii_lowercase) else {
            return;
        };
        if let Ok(mut accounts) = self.accounts.write() {
            accounts.insert(
                email,
                Account {
                    principal,
                    password: password.into(),
                },
            );
        }
    }

    /// Mint an access token for an existing account.
    pub fn issue_token(&self, id: &UserId) -> String {
        let token = format!("tok-{}", uuid::Uuid::now_v7());
        if let Ok(mut tokens) = self.tokens.write() {
            tokens.insert(token.clone(), id.clone());
        }
        token
    }

    /// Simulate an outage: every call reports `Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        if let Ok(mut flag) = self.offline.lock() {
            *flag = offline;
        }
    }

    /// Set the held session without notifying (as if restored from storage).
    pub fn set_session(&self, principal: Option<Principal>) {
        if let Ok(mut session) = self.session.lock() {
            *session = principal;
        }
    }

    /// Push a session change to subscribers, updating the held session.
    pub fn emit(&self, event: SessionEvent) {
        self.set_session(event.principal().cloned());
        let _ = self.events.send(event);
    }

    fn ensure_online(&self) -> Result<(), AuthServiceError> {
        let offline = self.offline.lock().map(|f| *f).unwrap_or(true);
        if offline {
            Err(AuthServiceError::unavailable("connection refused"))
        } else {
            Ok(())
        }
    }

    fn account_by_id(&self, id: &UserId) -> Option<Principal> {
        let accounts = self.accounts.read().ok()?;
        accounts
            .values()
            .find(|a| &a.principal.id == id)
            .map(|a| a.principal.clone())
    }
}

#[async_trait]
impl AuthService for InMemoryAuthService {
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Principal, AuthServiceError> {
        self.ensure_online()?;

        let account = {
            let accounts = self
                .accounts
                .read()
                .map_err(|_| AuthServiceError::unavailable("lock poisoned"))?;
            accounts.get(&email.trim().to_ascii_lowercase()).cloned()
        };

        match account {
            Some(account) if account.password == password => {
                self.set_session(Some(account.principal.clone()));
                let _ = self.events.send(SessionEvent::SignedIn(account.principal.clone()));
                Ok(account.principal)
            }
            _ => Err(AuthServiceError::rejected(INVALID_CREDENTIALS)),
        }
    }

    async fn get_session(&self) -> Result<Option<Principal>, AuthServiceError> {
        self.ensure_online()?;
        Ok(self.session.lock().ok().and_then(|s| s.clone()))
    }

    async fn sign_out(&self) -> Result<(), AuthServiceError> {
        self.ensure_online()?;
        self.set_session(None);
        let _ = self.events.send(SessionEvent::SignedOut);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

#[async_trait]
impl AdminAuthService for InMemoryAuthService {
    async fn get_user(&self, access_token: &str) -> Result<Principal, AuthServiceError> {
        self.ensure_online()?;
        let id = self
            .tokens
            .read()
            .ok()
            .and_then(|tokens| tokens.get(access_token).cloned())
            .ok_or_else(|| AuthServiceError::rejected("invalid JWT"))?;
        self.account_by_id(&id)
            .ok_or_else(|| AuthServiceError::rejected("user not found"))
    }

    async fn create_user(&self, email: &str, password: &str) -> Result<Principal, AuthServiceError> {
        self.ensure_online()?;
        let key = email.trim().to_ascii_lowercase();
        let exists = self
            .accounts
            .read()
            .map(|accounts| accounts.contains_key(&key))
            .unwrap_or(false);
        if exists {
            return Err(AuthServiceError::rejected(
                "A user with this email address has already been registered",
            ));
        }

        let principal = Principal::new(uuid::Uuid::now_v7().to_string(), email.trim())
            .with_metadata("created_at", serde_json::json!(Utc::now().to_rfc3339()));
        self.add_account(principal.clone(), password);
        Ok(principal)
    }
}

//! Profile table access through the REST endpoint.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};

use bioboxsys_auth::{ProfileRow, ProfileStore, ProfileStoreError};
use bioboxsys_core::UserId;

use crate::auth::SupabaseAuth;
use crate::config::SupabaseConfig;
use crate::wire::{profile_error, transport_profile_error};

const USERS_TABLE: &str = "/rest/v1/users";

/// Whose authority row-level policies see.
#[derive(Debug, Clone)]
enum Bearer {
    /// The signed-in client session; anon key when signed out.
    Session(Arc<SupabaseAuth>),
    /// Bypasses row-level policies. Server side only.
    ServiceRole(String),
}

#[derive(Debug, Clone)]
pub struct SupabaseProfileStore {
    config: SupabaseConfig,
    http: Client,
    bearer: Bearer,
}

impl SupabaseProfileStore {
    /// Store acting as the user signed in through `auth`.
    pub fn for_session(auth: Arc<SupabaseAuth>) -> Self {
        Self {
            config: auth.config().clone(),
            http: Client::new(),
            bearer: Bearer::Session(auth),
        }
    }

    /// Store acting with the service-role key, if one is configured.
    pub fn service_role(config: SupabaseConfig) -> Option<Self> {
        let key = config.service_role_key.clone()?;
        Some(Self {
            config,
            http: Client::new(),
            bearer: Bearer::ServiceRole(key),
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.bearer {
            Bearer::Session(auth) => {
                let token = auth.access_token().unwrap_or_else(|| self.config.anon_key.clone());
                request.header("apikey", &self.config.anon_key).bearer_auth(token)
            }
            Bearer::ServiceRole(key) => request.header("apikey", key).bearer_auth(key),
        }
    }
}

async fn read_rows(response: reqwest::Response) -> Result<Vec<ProfileRow>, ProfileStoreError> {
    let status = response.status();
    let body = response.text().await.map_err(transport_profile_error)?;
    if !status.is_success() {
        return Err(profile_error(status, &body));
    }
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&body)
        .map_err(|err| ProfileStoreError::Unavailable(format!("unexpected response body: {err}")))
}

#[async_trait]
impl ProfileStore for SupabaseProfileStore {
    async fn get_profile_by_id(&self, id: &UserId) -> Result<Option<ProfileRow>, ProfileStoreError> {
        let response = self
            .authorize(self.http.get(self.config.endpoint(USERS_TABLE)))
            .query(&[("id", format!("eq.{id}")), ("select", "*".to_string())])
            .send()
            .await
            .map_err(transport_profile_error)?;

        Ok(read_rows(response).await?.into_iter().next())
    }

    async fn upsert_profile(&self, row: ProfileRow) -> Result<ProfileRow, ProfileStoreError> {
        let response = self
            .authorize(self.http.post(self.config.endpoint(USERS_TABLE)))
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&[&row])
            .send()
            .await
            .map_err(transport_profile_error)?;

        let stored = read_rows(response).await?.into_iter().next();
        Ok(stored.unwrap_or(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_role_store_needs_key() {
        let config = SupabaseConfig::new("https://x.supabase.co", "anon").unwrap();
        assert!(SupabaseProfileStore::service_role(config.clone()).is_none());
        assert!(SupabaseProfileStore::service_role(config.with_service_role_key("svc")).is_some());
    }

    #[tokio::test]
    async fn unreachable_backend_is_unavailable() {
        let config = SupabaseConfig::new("http://127.0.0.1:9", "anon").unwrap();
        let store = SupabaseProfileStore::for_session(Arc::new(SupabaseAuth::new(config)));
        let err = store.get_profile_by_id(&UserId::new("u-1")).await.unwrap_err();
        assert!(matches!(err, ProfileStoreError::Unavailable(_)));
    }
}

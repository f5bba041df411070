//! Identity records: raw principals, stored profiles, and the resolved identity.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bioboxsys_core::UserId;

use crate::{Permission, Role};

/// Raw identity returned by the credential service, before enrichment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
    /// Free-form user metadata kept by the credential service.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Principal {
    pub fn new(id: impl Into<UserId>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: Some(email.into()),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Display name carried in metadata (`name`, then `full_name`), if any.
    pub fn metadata_name(&self) -> Option<&str> {
        ["name", "full_name"]
            .iter()
            .filter_map(|key| self.metadata.get(*key))
            .filter_map(|v| v.as_str())
            .map(str::trim)
            .find(|s| !s.is_empty())
    }
}

/// Row of the hosted `users` table (role/permission metadata per user).
///
/// Columns may be null in historical rows; `role` is kept as the raw string
/// because older rows carry values outside the current [`Role`] set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRow {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub permissions: Option<Vec<Permission>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProfileRow {
    /// Parsed role, `None` when absent or unrecognized.
    pub fn parsed_role(&self) -> Option<Role> {
        self.role.as_deref().and_then(|r| r.parse().ok())
    }
}

/// The resolved, authenticated user.
///
/// Identity values are replaced whole on every session transition; nothing
/// mutates one in place after construction. The serialized form is the cached
/// copy kept in the local slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    #[serde(rename = "name")]
    pub display_name: String,
    pub email: String,
    pub role: Role,
    pub permissions: Vec<Permission>,
}

impl Identity {
    pub fn has_token(&self, token: &str) -> bool {
        self.permissions.iter().any(|p| p.as_str() == token)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a cached copy; blank ids are rejected as malformed.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let identity: Identity = serde_json::from_str(raw)?;
        if identity.id.as_str().trim().is_empty() {
            return Err(serde::de::Error::custom("identity id is empty"));
        }
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn metadata_name_prefers_name_then_full_name() {
        let p = Principal::new("1", "a@b.com").with_metadata("full_name", json!("Ana Souza"));
        assert_eq!(p.metadata_name(), Some("Ana Souza"));

        let p = p.with_metadata("name", json!("Ana"));
        assert_eq!(p.metadata_name(), Some("Ana"));

        let blank = Principal::new("1", "a@b.com").with_metadata("name", json!("  "));
        assert_eq!(blank.metadata_name(), None);
    }

    #[test]
    fn cached_identity_uses_name_key() {
        let identity = Identity {
            id: UserId::new("1"),
            display_name: "Administrator".into(),
            email: "admin@bioboxsys.com".into(),
            role: Role::Admin,
            permissions: vec![Permission::universal()],
        };
        let raw = identity.to_json().unwrap();
        assert!(raw.contains("\"name\":\"Administrator\""));
        assert_eq!(Identity::from_json(&raw).unwrap(), identity);
    }

    #[test]
    fn malformed_cache_is_rejected() {
        assert!(Identity::from_json("not json").is_err());
        assert!(Identity::from_json(r#"{"id":"1"}"#).is_err());
        assert!(
            Identity::from_json(
                r#"{"id":"","name":"x","email":"x@y","role":"seller","permissions":[]}"#
            )
            .is_err()
        );
        assert!(
            Identity::from_json(
                r#"{"id":"1","name":"x","email":"x@y","role":"root","permissions":[]}"#
            )
            .is_err()
        );
    }

    #[test]
    fn profile_row_tolerates_nulls_and_unknown_roles() {
        let row: ProfileRow = serde_json::from_value(json!({
            "id": "abc",
            "email": null,
            "name": "Carlos",
            "role": "manager",
            "permissions": null
        }))
        .unwrap();
        assert_eq!(row.parsed_role(), None);
        assert!(row.permissions.is_none());
    }
}

//! Resolver configuration.
//!
//! Defaults are usable as-is; `from_env` overlays `BIOBOX_*` variables.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::compat::{CompatTableError, CompatibilityTable};
use crate::permissions::{parse_token_list, Permission};
use crate::roles::{Role, UnknownRole};

pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

/// Display name used when neither profile, metadata nor email yield one.
pub const DEFAULT_DISPLAY_NAME: &str = "Usuário";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse environment variable '{key}': {details}")]
    Parse { key: String, details: String },

    #[error(transparent)]
    InvalidRole(#[from] UnknownRole),

    #[error(transparent)]
    CompatTable(#[from] CompatTableError),
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Role given to identities whose profile row is missing or has no usable role.
    pub default_role: Role,

    /// Permissions given to identities whose profile row is missing or has no
    /// permission list. Empty unless configured.
    pub default_permissions_on_missing_profile: Vec<Permission>,

    pub fallback_display_name: String,

    /// Accept demo users when the credential service is unavailable.
    pub demo_login_enabled: bool,

    /// Upper bound for every remote call.
    pub remote_timeout: Duration,

    pub compat: CompatibilityTable,

    /// Directory of the file-backed local slot; `None` means the platform
    /// data directory.
    pub slot_dir: Option<PathBuf>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            default_role: Role::Seller,
            default_permissions_on_missing_profile: Vec::new(),
            fallback_display_name: DEFAULT_DISPLAY_NAME.to_string(),
            demo_login_enabled: false,
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
            compat: CompatibilityTable::v1(),
            slot_dir: None,
        }
    }
}

impl AuthConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (the environment, in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(role) = lookup("BIOBOX_DEFAULT_ROLE") {
            config.default_role = role.parse()?;
        }
        if let Some(perms) = lookup("BIOBOX_DEFAULT_PERMISSIONS") {
            config.default_permissions_on_missing_profile = parse_token_list(&perms);
        }
        if let Some(name) = lookup("BIOBOX_FALLBACK_NAME") {
            if !name.trim().is_empty() {
                config.fallback_display_name = name.trim().to_string();
            }
        }
        if let Some(flag) = lookup("BIOBOX_DEMO_LOGIN") {
            config.demo_login_enabled = parse_bool("BIOBOX_DEMO_LOGIN", &flag)?;
        }
        if let Some(secs) = lookup("BIOBOX_REMOTE_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::Parse {
                    key: "BIOBOX_REMOTE_TIMEOUT_SECS".to_string(),
                    details: e.to_string(),
                }
            })?;
            config.remote_timeout = Duration::from_secs(secs);
        }
        if let Some(path) = lookup("BIOBOX_PERMISSION_COMPAT_PATH") {
            config.compat = CompatibilityTable::load(path.trim())?;
        }
        if let Some(dir) = lookup("BIOBOX_SLOT_DIR") {
            config.slot_dir = Some(PathBuf::from(dir));
        }

        Ok(config)
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::Parse {
            key: key.to_string(),
            details: format!("expected a boolean, got '{other}'"),
        }),
    }
}

//! Permission evaluation over a resolved identity.
//!
//! - No IO
//! - No panics
//! - Pure function of (identity, module, action, compatibility table)

use serde::Serialize;

use crate::compat::CompatibilityTable;
use crate::identity::Identity;
use crate::permissions::{MODULE_FULL_SUFFIX, UNIVERSAL_TOKEN};

/// Which rule decided a permission check.
///
/// Rules are evaluated in declaration order and the first match wins:
/// cheap, specific checks first, the compatibility table lookup last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", content = "token", rename_all = "snake_case")]
pub enum PermissionDecision {
    /// Nobody is signed in.
    NoIdentity,
    /// Admin role satisfies every check.
    AdminRole,
    /// Exact `"{module}:{action}"` token.
    ExactToken(String),
    /// Legacy `"{module}-full"` token.
    ModuleFull(String),
    /// Universal `"all"` token.
    Universal,
    /// Alternate token from the compatibility table.
    LegacyAlias(String),
    /// No rule matched.
    Denied,
}

impl PermissionDecision {
    pub fn is_granted(&self) -> bool {
        !matches!(self, PermissionDecision::NoIdentity | PermissionDecision::Denied)
    }
}

/// Decide whether `identity` may perform `action` on `module`.
pub fn evaluate(
    identity: Option<&Identity>,
    module: &str,
    action: &str,
    compat: &CompatibilityTable,
) -> PermissionDecision {
    let Some(identity) = identity else {
        return PermissionDecision::NoIdentity;
    };

    if identity.role.is_admin() {
        return PermissionDecision::AdminRole;
    }

    let exact = format!("{module}:{action}");
    if identity.has_token(&exact) {
        return PermissionDecision::ExactToken(exact);
    }

    let full = format!("{module}{MODULE_FULL_SUFFIX}");
    if identity.has_token(&full) {
        return PermissionDecision::ModuleFull(full);
    }

    if identity.has_token(UNIVERSAL_TOKEN) {
        return PermissionDecision::Universal;
    }

    if let Some(alt) = compat
        .alternates(module, action)
        .iter()
        .find(|alt| identity.has_token(alt.as_str()))
    {
        return PermissionDecision::LegacyAlias(alt.as_str().to_string());
    }

    PermissionDecision::Denied
}

/// Boolean form of [`evaluate`].
pub fn check_permission(
    identity: Option<&Identity>,
    module: &str,
    action: &str,
    compat: &CompatibilityTable,
) -> bool {
    evaluate(identity, module, action, compat).is_granted()
}

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Universal grant understood by every permission check.
pub const UNIVERSAL_TOKEN: &str = "all";

/// Suffix of the legacy whole-module grant (`"orders-full"`).
pub const MODULE_FULL_SUFFIX: &str = "-full";

/// Permission token.
///
/// Tokens are opaque strings as stored in profile rows. Three historical
/// schemes coexist and are all accepted indefinitely:
/// - `"{module}:{action}"` (e.g. `"orders:create"`)
/// - `"{module}-full"` (every action on a module)
/// - `"all"` (every action on every module)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(Cow<'static, str>);

impl Permission {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    /// `"{module}:{action}"`.
    pub fn action(module: &str, action: &str) -> Self {
        Self(Cow::Owned(format!("{module}:{action}")))
    }

    /// `"{module}-full"`.
    pub fn module_full(module: &str) -> Self {
        Self(Cow::Owned(format!("{module}{MODULE_FULL_SUFFIX}")))
    }

    pub fn universal() -> Self {
        Self(Cow::Borrowed(UNIVERSAL_TOKEN))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_universal(&self) -> bool {
        self.as_str() == UNIVERSAL_TOKEN
    }
}

impl core::fmt::Display for Permission {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for Permission {
    fn from(value: &'static str) -> Self {
        Self(Cow::Borrowed(value))
    }
}

impl From<String> for Permission {
    fn from(value: String) -> Self {
        Self(Cow::Owned(value))
    }
}

/// Parse a comma separated token list, dropping blanks.
pub fn parse_token_list(raw: &str) -> Vec<Permission> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| Permission::from(t.to_string()))
        .collect()
}

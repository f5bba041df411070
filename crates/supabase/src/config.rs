use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SupabaseConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("invalid project url: {0}")]
    InvalidUrl(String),
}

/// Project endpoint and keys.
#[derive(Clone)]
pub struct SupabaseConfig {
    /// Project base url, without trailing slash.
    pub url: String,
    pub anon_key: String,
    /// Needed for admin calls only.
    pub service_role_key: Option<String>,
}

impl core::fmt::Debug for SupabaseConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SupabaseConfig")
            .field("url", &self.url)
            .field("service_role_key", &self.service_role_key.as_ref().map(|_| "<redacted>"))
            .finish_non_exhaustive()
    }
}

impl SupabaseConfig {
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Result<Self, SupabaseConfigError> {
        let url = url.into().trim().trim_end_matches('/').to_string();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(SupabaseConfigError::InvalidUrl(url));
        }
        Ok(Self {
            url,
            anon_key: anon_key.into(),
            service_role_key: None,
        })
    }

    pub fn with_service_role_key(mut self, key: impl Into<String>) -> Self {
        self.service_role_key = Some(key.into());
        self
    }

    /// `SUPABASE_URL` and `SUPABASE_ANON_KEY` are required,
    /// `SUPABASE_SERVICE_ROLE_KEY` is optional.
    pub fn from_env() -> Result<Self, SupabaseConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SupabaseConfigError> {
        let get = |key: &'static str| lookup(key).filter(|v| !v.trim().is_empty());

        let url = get("SUPABASE_URL").ok_or(SupabaseConfigError::Missing("SUPABASE_URL"))?;
        let anon_key = get("SUPABASE_ANON_KEY").ok_or(SupabaseConfigError::Missing("SUPABASE_ANON_KEY"))?;

        let config = Self::new(url, anon_key.trim())?;
        Ok(match get("SUPABASE_SERVICE_ROLE_KEY") {
            Some(key) => config.with_service_role_key(key.trim()),
            None => config,
        })
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.url, path)
    }
}

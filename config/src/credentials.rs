use eyre::{
    Context as _,
    Result,
};
use url::Url;

pub const REMOTE_URL_VAR: &str = "SUPABASE_URL";
pub const REMOTE_KEY_VAR: &str = "SUPABASE_SERVICE_ROLE_KEY";

/// Access to the remote tables. Only ever read from the process environment.
#[derive(Clone)]
pub struct RemoteCredentials {
    pub url: Url,
    pub service_key: String,
}

impl std::fmt::Debug for RemoteCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCredentials")
            .field("url", &self.url.as_str())
            .field("service_key", &"<redacted>")
            .finish()
    }
}

impl RemoteCredentials {
    /// `Ok(None)` when either variable is unset or empty. A URL that is present but unparseable is an
    /// error since it can only be a typo.
    pub fn from_env() -> Result<Option<Self>> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>> {
        let url = lookup(REMOTE_URL_VAR).filter(|v| !v.trim().is_empty());
        let key = lookup(REMOTE_KEY_VAR).filter(|v| !v.trim().is_empty());
        let (Some(url), Some(service_key)) = (url, key) else {
            return Ok(None);
        };

        let url = Url::parse(url.trim_end_matches('/')).wrap_err_with(|| format!("{REMOTE_URL_VAR} is not a URL"))?;
        Ok(Some(Self { url, service_key }))
    }
}

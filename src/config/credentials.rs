use crate::error::ConfigError;
use std::fmt;

/// Environment variable holding the service API key
pub const API_KEY_VAR: &str = "DATADOG_API_KEY";

/// Environment variable holding the application key
pub const APP_KEY_VAR: &str = "KENNEL_APP_KEY";

/// API key and application key used to authenticate against the alert service
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    api_key: String,
    app_key: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, app_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            app_key: app_key.into(),
        }
    }

    /// Resolve credentials, preferring explicit values over the environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingCredential` naming the variable to set when
    /// a key is neither given nor present in the environment.
    pub fn resolve(api_key: Option<String>, app_key: Option<String>) -> Result<Self, ConfigError> {
        Self::from_lookup(api_key, app_key, |var| std::env::var(var).ok())
    }

    /// Resolve credentials with a custom variable lookup
    pub fn from_lookup<F>(
        api_key: Option<String>,
        app_key: Option<String>,
        lookup: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |explicit: Option<String>, var: &str| {
            explicit
                .or_else(|| lookup(var))
                .filter(|key| !key.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingCredential(var.to_string()))
        };

        Ok(Self {
            api_key: pick(api_key, API_KEY_VAR)?,
            app_key: pick(app_key, APP_KEY_VAR)?,
        })
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn app_key(&self) -> &str {
        &self.app_key
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("app_key", &"<redacted>")
            .finish()
    }
}

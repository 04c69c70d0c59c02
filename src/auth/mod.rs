//! Bearer credential handling.

use crate::errors::{CanvasError, CanvasErrorKind, CanvasResult};
use secrecy::{ExposeSecret, SecretString};

/// Bearer access token for the Canvas API.
#[derive(Clone)]
pub struct BearerToken(SecretString);

impl BearerToken {
    /// Wraps a raw access token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::new(token.into()))
    }

    /// Reads the token from an environment variable.
    pub fn from_env_var(var_name: &str) -> CanvasResult<Self> {
        let token = std::env::var(var_name).map_err(|_| {
            CanvasError::new(
                CanvasErrorKind::MissingCredential,
                format!("{} environment variable not set", var_name),
            )
        })?;
        Ok(Self::new(token))
    }

    /// Returns true if the token is empty or whitespace.
    pub fn is_blank(&self) -> bool {
        self.0.expose_secret().trim().is_empty()
    }

    /// Builds the `Authorization` header value.
    pub fn header_value(&self) -> String {
        format!("Bearer {}", self.0.expose_secret())
    }

    /// Gets a redacted token hint for logging.
    pub fn hint(&self) -> String {
        let exposed = self.0.expose_secret();
        match exposed.split_once('~') {
            Some((account, _)) => format!("{}~***", account),
            None => "***".to_string(),
        }
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BearerToken").field(&"[REDACTED]").finish()
    }
}

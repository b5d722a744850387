//! Upstream shared secret in `id.secret` form

use std::fmt;
use std::str::FromStr;

use zeroize::Zeroize;

use crate::ConfigError;

/// Long-lived shared secret issued by the upstream provider.
///
/// The `id` half identifies the account and travels inside every credential;
/// the `secret` half only ever keys the signature.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey {
    id: String,
    secret: String,
}

impl ApiKey {
    /// Parse `id.secret`. Exactly one `.` with text on both sides.
    pub fn parse(material: &str) -> Result<Self, ConfigError> {
        let material = material.trim();

        let (id, secret) = material.split_once('.').ok_or_else(|| {
            ConfigError::MalformedApiKey("expected the form 'id.secret'".to_string())
        })?;

        if id.is_empty() || secret.is_empty() {
            return Err(ConfigError::MalformedApiKey(
                "both the id and the secret must be non-empty".to_string(),
            ));
        }

        if secret.contains('.') {
            return Err(ConfigError::MalformedApiKey(
                "expected exactly one '.' delimiter".to_string(),
            ));
        }

        Ok(Self {
            id: id.to_string(),
            secret: secret.to_string(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl FromStr for ApiKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiKey")
            .field("id", &self.id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl Drop for ApiKey {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

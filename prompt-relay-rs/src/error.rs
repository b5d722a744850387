//! Error taxonomy for the relay pipeline
//!
//! Every failure is terminal for the request it belongs to. The variants
//! separate whose fault it was, which decides what the caller gets to see.

use relay_config::{ConfigError, Environment};
use thiserror::Error;

/// Result type for relay operations
pub type Result<T> = std::result::Result<T, RelayError>;

/// Generic message surfaced for dependent-service faults in production
pub const GENERIC_UPSTREAM_MESSAGE: &str = "Upstream service error, please retry later";

/// Generic message surfaced for deployment faults in production
pub const GENERIC_INTERNAL_MESSAGE: &str = "Internal server error";

#[derive(Error, Debug)]
pub enum RelayError {
    /// Caller supplied unusable input; no network call was made
    #[error("{0}")]
    Validation(String),

    /// Secret material is missing or malformed, or signing failed
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Non-2xx response or transport failure talking to the model API
    #[error("Upstream error{}: {body}", .status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Upstream { status: Option<u16>, body: String },

    /// The model API did not answer within the configured timeout
    #[error("Upstream request timed out after {0} seconds")]
    Timeout(u64),

    /// 2xx response in a shape we do not recognize
    #[error("Unrecognized upstream response: {0}")]
    Parse(String),
}

impl RelayError {
    pub fn validation(message: impl Into<String>) -> Self {
        RelayError::Validation(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        RelayError::Configuration(message.into())
    }

    pub fn upstream(status: Option<u16>, body: impl Into<String>) -> Self {
        RelayError::Upstream {
            status,
            body: body.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        RelayError::Parse(message.into())
    }

    /// Short machine-readable label, used as a log field
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Validation(_) => "validation",
            RelayError::Configuration(_) => "configuration",
            RelayError::Upstream { .. } => "upstream",
            RelayError::Timeout(_) => "timeout",
            RelayError::Parse(_) => "parse",
        }
    }

    /// The caller is at fault
    pub fn is_client_error(&self) -> bool {
        matches!(self, RelayError::Validation(_))
    }

    /// The model API is at fault, including responses we could not read
    pub fn is_upstream_fault(&self) -> bool {
        matches!(
            self,
            RelayError::Upstream { .. } | RelayError::Timeout(_) | RelayError::Parse(_)
        )
    }

    /// Upstream HTTP status, when the failure carried one
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            RelayError::Upstream { status, .. } => *status,
            _ => None,
        }
    }

    /// Message safe to hand back to the caller.
    ///
    /// Validation messages are always actionable and returned verbatim.
    /// Service faults are generic in production.
    pub fn public_message(&self, environment: Environment) -> String {
        if self.is_client_error() || !environment.is_production() {
            return self.to_string();
        }

        if self.is_upstream_fault() {
            GENERIC_UPSTREAM_MESSAGE.to_string()
        } else {
            GENERIC_INTERNAL_MESSAGE.to_string()
        }
    }
}

impl From<ConfigError> for RelayError {
    fn from(err: ConfigError) -> Self {
        RelayError::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_display_includes_status() {
        let err = RelayError::upstream(Some(429), "slow down");
        assert_eq!(err.to_string(), "Upstream error (429): slow down");

        let err = RelayError::upstream(None, "connection refused");
        assert_eq!(err.to_string(), "Upstream error: connection refused");
        assert_eq!(err.upstream_status(), None);
    }

    #[test]
    fn test_classification() {
        assert!(RelayError::validation("empty").is_client_error());
        assert!(!RelayError::validation("empty").is_upstream_fault());
        assert!(RelayError::parse("{}").is_upstream_fault());
        assert!(RelayError::Timeout(30).is_upstream_fault());
        assert!(!RelayError::configuration("bad").is_upstream_fault());
        assert_eq!(RelayError::parse("x").kind(), "parse");
    }

    #[test]
    fn test_public_message_hides_detail_in_production() {
        let err = RelayError::upstream(Some(500), "stack trace from provider");

        assert_eq!(err.public_message(Environment::Production), GENERIC_UPSTREAM_MESSAGE);
        assert!(err
            .public_message(Environment::Development)
            .contains("stack trace from provider"));

        let err = RelayError::configuration("secret rejected");
        assert_eq!(err.public_message(Environment::Production), GENERIC_INTERNAL_MESSAGE);

        let err = RelayError::validation("Please provide the prompt to optimize");
        assert_eq!(
            err.public_message(Environment::Production),
            "Please provide the prompt to optimize"
        );
    }

    #[test]
    fn test_config_error_maps_to_configuration() {
        let err: RelayError = ConfigError::MalformedApiKey("no delimiter".to_string()).into();
        assert!(matches!(err, RelayError::Configuration(_)));
    }
}

//! config-rs/lib.rs
//! Start-up configuration for the prompt relay.
//!
//! The configuration is read once, validated, and then shared read-only by
//! the gateway and the relay. Anything malformed is a `ConfigError` and the
//! process must refuse to serve.

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

mod api_key;
mod source;

pub use api_key::ApiKey;
pub use source::{ConfigSource, EnvSource, MemorySource};

pub const DEFAULT_MODEL_NAME: &str = "glm-4-flash-250414";
pub const DEFAULT_UPSTREAM_URL: &str = "https://open.bigmodel.cn/api/paas/v4/chat/completions";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_CANDIDATE_COUNT: usize = 3;
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_RATE_LIMIT: u32 = 100;
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 15 * 60;
pub const DEFAULT_BODY_LIMIT_BYTES: usize = 1024 * 1024;

const API_KEY_VARS: &[&str] = &["API_KEY", "ZHIPU_API_KEY"];
const ENVIRONMENT_VARS: &[&str] = &["APP_ENV", "NODE_ENV"];

/// Deployment fault detected while loading configuration
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    MissingKey(String),

    #[error("malformed API key: {0}")]
    MalformedApiKey(String),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

/// Deployment mode, controls how much error detail callers see
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        matches!(self, Environment::Production)
    }

    /// Read `APP_ENV` (or `NODE_ENV`); unset means development
    pub fn detect(source: &dyn ConfigSource) -> Result<Self, ConfigError> {
        match source
            .get_first(ENVIRONMENT_VARS)
            .filter(|(_, value)| !value.trim().is_empty())
        {
            Some((key, value)) => value.parse().map_err(|reason| invalid(&key, reason)),
            None => Ok(Environment::default()),
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Environment::Production),
            "development" | "dev" | "test" | "local" => Ok(Environment::Development),
            other => Err(format!("unknown environment '{}'", other)),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Sampling parameters sent with every upstream request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub repetition_penalty: f32,
    pub do_sample: bool,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.7,
            max_tokens: 1000,
            repetition_penalty: 1.1,
            do_sample: true,
        }
    }
}

/// Per-client request budget for the `/api/` routes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: DEFAULT_RATE_LIMIT,
            window: Duration::from_secs(DEFAULT_RATE_LIMIT_WINDOW_SECS),
        }
    }
}

/// Immutable service configuration, built once at start-up
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub api_key: ApiKey,
    pub model_name: String,
    pub upstream_url: String,
    pub upstream_timeout: Duration,
    pub candidate_count: usize,
    pub generation: GenerationParams,
    pub bind_host: IpAddr,
    pub port: u16,
    /// Empty means any origin
    pub allowed_origins: Vec<String>,
    pub rate_limit: RateLimitConfig,
    pub body_limit_bytes: usize,
    pub environment: Environment,
}

impl RelayConfig {
    /// Defaults for everything but the secret
    pub fn with_api_key(api_key: ApiKey) -> Self {
        Self {
            api_key,
            model_name: DEFAULT_MODEL_NAME.to_string(),
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            upstream_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
            candidate_count: DEFAULT_CANDIDATE_COUNT,
            generation: GenerationParams::default(),
            bind_host: IpAddr::from([0, 0, 0, 0]),
            port: DEFAULT_PORT,
            allowed_origins: Vec::new(),
            rate_limit: RateLimitConfig::default(),
            body_limit_bytes: DEFAULT_BODY_LIMIT_BYTES,
            environment: Environment::default(),
        }
    }

    /// Load from the process environment (after `.env`)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(&EnvSource::with_dotenv())
    }

    /// Load and validate from any source
    pub fn from_source(source: &dyn ConfigSource) -> Result<Self, ConfigError> {
        let (_, material) = source
            .get_first(API_KEY_VARS)
            .filter(|(_, value)| !value.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingKey(API_KEY_VARS.join(" or ")))?;
        let api_key = ApiKey::parse(&material)?;

        let mut config = Self::with_api_key(api_key);

        if let Some(model) = non_empty(source, "MODEL_NAME") {
            config.model_name = model;
        }
        if let Some(url) = non_empty(source, "UPSTREAM_URL") {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(invalid("UPSTREAM_URL", "must be an http(s) URL"));
            }
            config.upstream_url = url;
        }

        let timeout_secs = parse_or(source, "UPSTREAM_TIMEOUT_SECS", DEFAULT_UPSTREAM_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            return Err(invalid("UPSTREAM_TIMEOUT_SECS", "must be at least 1"));
        }
        config.upstream_timeout = Duration::from_secs(timeout_secs);

        config.candidate_count = parse_or(source, "CANDIDATE_COUNT", DEFAULT_CANDIDATE_COUNT)?;
        if config.candidate_count == 0 {
            return Err(invalid("CANDIDATE_COUNT", "must be at least 1"));
        }

        let defaults = GenerationParams::default();
        config.generation = GenerationParams {
            temperature: parse_or(source, "TEMPERATURE", defaults.temperature)?,
            top_p: parse_or(source, "TOP_P", defaults.top_p)?,
            max_tokens: parse_or(source, "MAX_TOKENS", defaults.max_tokens)?,
            repetition_penalty: parse_or(source, "REPETITION_PENALTY", defaults.repetition_penalty)?,
            do_sample: defaults.do_sample,
        };
        if !(0.0..=2.0).contains(&config.generation.temperature) {
            return Err(invalid("TEMPERATURE", "must be within 0.0..=2.0"));
        }
        if !(0.0..=1.0).contains(&config.generation.top_p) {
            return Err(invalid("TOP_P", "must be within 0.0..=1.0"));
        }

        config.bind_host = parse_or(source, "BIND_HOST", config.bind_host)?;
        config.port = parse_or(source, "PORT", DEFAULT_PORT)?;

        if let Some(origins) = non_empty(source, "ALLOWED_ORIGIN") {
            config.allowed_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty() && *origin != "*")
                .map(str::to_string)
                .collect();
        }

        config.rate_limit = RateLimitConfig {
            max_requests: parse_or(source, "RATE_LIMIT", DEFAULT_RATE_LIMIT)?,
            window: Duration::from_secs(parse_or(
                source,
                "RATE_LIMIT_WINDOW_SECS",
                DEFAULT_RATE_LIMIT_WINDOW_SECS,
            )?),
        };
        if config.rate_limit.window.is_zero() {
            return Err(invalid("RATE_LIMIT_WINDOW_SECS", "must be at least 1"));
        }

        config.body_limit_bytes = parse_or(source, "BODY_LIMIT_BYTES", DEFAULT_BODY_LIMIT_BYTES)?;

        config.environment = Environment::detect(source)?;

        Ok(config)
    }

    pub fn bind_address(&self) -> SocketAddr {
        SocketAddr::new(self.bind_host, self.port)
    }
}

fn non_empty(source: &dyn ConfigSource, key: &str) -> Option<String> {
    source
        .get_string(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_or<T>(source: &dyn ConfigSource, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match non_empty(source, key) {
        Some(raw) => raw.parse::<T>().map_err(|e| invalid(key, e)),
        None => Ok(default),
    }
}

fn invalid(key: &str, reason: impl fmt::Display) -> ConfigError {
    ConfigError::Invalid {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> MemorySource {
        MemorySource::new().with("API_KEY", "account.secret")
    }

    #[test]
    fn test_defaults() {
        let config = RelayConfig::from_source(&base()).unwrap();

        assert_eq!(config.api_key.id(), "account");
        assert_eq!(config.model_name, DEFAULT_MODEL_NAME);
        assert_eq!(config.upstream_url, DEFAULT_UPSTREAM_URL);
        assert_eq!(config.upstream_timeout, Duration::from_secs(30));
        assert_eq!(config.candidate_count, 3);
        assert_eq!(config.generation, GenerationParams::default());
        assert_eq!(config.port, 3000);
        assert!(config.allowed_origins.is_empty());
        assert_eq!(config.rate_limit.max_requests, 100);
        assert_eq!(config.rate_limit.window, Duration::from_secs(900));
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.bind_address().to_string(), "0.0.0.0:3000");
    }

    #[test]
    fn test_missing_api_key() {
        let err = RelayConfig::from_source(&MemorySource::new()).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey(_)));

        let blank = MemorySource::new().with("API_KEY", "   ");
        let err = RelayConfig::from_source(&blank).unwrap_err();
        assert!(matches!(err, ConfigError::MissingKey(_)));
    }

    #[test]
    fn test_malformed_api_key_fails_fast() {
        let source = MemorySource::new().with("API_KEY", "abc");
        let err = RelayConfig::from_source(&source).unwrap_err();
        assert!(matches!(err, ConfigError::MalformedApiKey(_)));
    }

    #[test]
    fn test_legacy_api_key_name() {
        let source = MemorySource::new().with("ZHIPU_API_KEY", "legacy.secret");
        let config = RelayConfig::from_source(&source).unwrap();
        assert_eq!(config.api_key.id(), "legacy");
    }

    #[test]
    fn test_overrides() {
        let source = base()
            .with("MODEL_NAME", "glm-4-plus")
            .with("UPSTREAM_URL", "http://127.0.0.1:9999/v4/chat/completions")
            .with("UPSTREAM_TIMEOUT_SECS", "5")
            .with("CANDIDATE_COUNT", "5")
            .with("TEMPERATURE", "0.8")
            .with("MAX_TOKENS", "500")
            .with("PORT", "8080")
            .with("BIND_HOST", "127.0.0.1")
            .with("ALLOWED_ORIGIN", "https://a.example, https://b.example")
            .with("RATE_LIMIT", "10")
            .with("RATE_LIMIT_WINDOW_SECS", "60")
            .with("NODE_ENV", "production");

        let config = RelayConfig::from_source(&source).unwrap();

        assert_eq!(config.model_name, "glm-4-plus");
        assert_eq!(config.upstream_url, "http://127.0.0.1:9999/v4/chat/completions");
        assert_eq!(config.upstream_timeout, Duration::from_secs(5));
        assert_eq!(config.candidate_count, 5);
        assert_eq!(config.generation.temperature, 0.8);
        assert_eq!(config.generation.max_tokens, 500);
        assert_eq!(config.generation.top_p, 0.7);
        assert_eq!(config.bind_address().to_string(), "127.0.0.1:8080");
        assert_eq!(
            config.allowed_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert_eq!(config.rate_limit.max_requests, 10);
        assert_eq!(config.rate_limit.window, Duration::from_secs(60));
        assert!(config.environment.is_production());
    }

    #[test]
    fn test_wildcard_origin_means_any() {
        let config = RelayConfig::from_source(&base().with("ALLOWED_ORIGIN", "*")).unwrap();
        assert!(config.allowed_origins.is_empty());
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let cases = [
            ("PORT", "not-a-port"),
            ("CANDIDATE_COUNT", "0"),
            ("TEMPERATURE", "hot"),
            ("TOP_P", "1.5"),
            ("UPSTREAM_TIMEOUT_SECS", "0"),
            ("UPSTREAM_URL", "ftp://example.com"),
            ("RATE_LIMIT_WINDOW_SECS", "0"),
            ("APP_ENV", "staging-ish"),
        ];

        for (key, value) in cases {
            let err = RelayConfig::from_source(&base().with(key, value)).unwrap_err();
            match err {
                ConfigError::Invalid { key: reported, .. } => assert_eq!(reported, key),
                other => panic!("expected Invalid for {}={}, got {:?}", key, value, other),
            }
        }
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!("Production".parse::<Environment>(), Ok(Environment::Production));
        assert_eq!("dev".parse::<Environment>(), Ok(Environment::Development));
        assert!("qa".parse::<Environment>().is_err());

        let source = MemorySource::new().with("NODE_ENV", "production");
        assert_eq!(Environment::detect(&source), Ok(Environment::Production));
        assert_eq!(Environment::detect(&MemorySource::new()), Ok(Environment::Development));
        assert_eq!(Environment::Production.to_string(), "production");
    }
}

//! # Prompt Relay
//!
//! Backend core of the prompt optimizer:
//!
//! - `credential`: mints short-lived HS256 credentials from the `id.secret`
//!   shared key
//! - `relay`: validates a prompt, calls the upstream model API once with a
//!   fresh credential and normalizes the reply into up to N candidates
//! - `models`: upstream wire types, including the reply normalizer
//! - `error`: the `RelayError` taxonomy

pub mod credential;
pub mod error;
pub mod models;
pub mod relay;

pub use credential::{issue, Credential, CredentialIssuer, CREDENTIAL_TTL_SECS};
pub use error::{RelayError, Result};
pub use relay::{CandidateSet, OptimizationRequest, PromptRelay, EMPTY_PROMPT_MESSAGE};

pub use relay_config::{ApiKey, ConfigError, Environment, RelayConfig};

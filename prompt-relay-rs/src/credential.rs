// prompt-relay-rs/src/credential.rs
//
// Short-lived credentials for the upstream model API
//
// The upstream expects an HS256 JWS whose header carries a non-standard
// `sign_type` member, so the header and claims segments are assembled here
// and only the signature is delegated to jsonwebtoken.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{crypto, Algorithm, EncodingKey};
use relay_config::ApiKey;
use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};

/// Lifetime of every issued credential
pub const CREDENTIAL_TTL_SECS: u64 = 3600;

#[derive(Debug, Serialize)]
struct TokenHeader {
    alg: &'static str,
    sign_type: &'static str,
}

const TOKEN_HEADER: TokenHeader = TokenHeader {
    alg: "HS256",
    sign_type: "SIGN",
};

/// Claims understood by the upstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub api_key: String,   // Subject (account id half of the key)
    pub exp: u64,          // Expiration time (unix seconds)
    pub timestamp: u64,    // Issued at (unix seconds)
}

/// A signed, time-limited authorization token.
///
/// Owned by a single outbound call and never persisted.
#[derive(Clone)]
pub struct Credential {
    token: String,
    claims: Claims,
}

impl Credential {
    /// Compact token, sent verbatim as the `Authorization` header value
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    pub fn subject_id(&self) -> &str {
        &self.claims.api_key
    }

    pub fn issued_at(&self) -> u64 {
        self.claims.timestamp
    }

    pub fn expires_at(&self) -> u64 {
        self.claims.exp
    }

    pub fn is_expired_at(&self, unix_secs: u64) -> bool {
        unix_secs >= self.claims.exp
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("claims", &self.claims)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Mints credentials from the shared secret.
///
/// Built once at start-up; holds the signing key and the account id.
pub struct CredentialIssuer {
    subject_id: String,
    encoding_key: EncodingKey,
}

impl CredentialIssuer {
    pub fn new(api_key: &ApiKey) -> Self {
        Self {
            subject_id: api_key.id().to_string(),
            encoding_key: EncodingKey::from_secret(api_key.secret().as_bytes()),
        }
    }

    /// Parse `id.secret` material and build an issuer from it
    pub fn from_secret(material: &str) -> Result<Self> {
        let api_key = ApiKey::parse(material)?;
        Ok(Self::new(&api_key))
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    /// Issue a credential valid from now for `CREDENTIAL_TTL_SECS`
    pub fn issue(&self) -> Result<Credential> {
        self.issue_at(current_timestamp()?)
    }

    /// Issue a credential as if the clock read `now` (unix seconds)
    pub fn issue_at(&self, now: u64) -> Result<Credential> {
        let claims = Claims {
            api_key: self.subject_id.clone(),
            exp: now + CREDENTIAL_TTL_SECS,
            timestamp: now,
        };

        let header = encode_segment(&TOKEN_HEADER)?;
        let payload = encode_segment(&claims)?;
        let signing_input = format!("{}.{}", header, payload);

        let signature = crypto::sign(signing_input.as_bytes(), &self.encoding_key, Algorithm::HS256)
            .map_err(|e| RelayError::configuration(format!("Failed to sign credential: {}", e)))?;

        tracing::trace!(subject = %claims.api_key, exp = claims.exp, "Issued upstream credential");

        Ok(Credential {
            token: format!("{}.{}", signing_input, signature),
            claims,
        })
    }
}

impl fmt::Debug for CredentialIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialIssuer")
            .field("subject_id", &self.subject_id)
            .finish_non_exhaustive()
    }
}

/// Parse the secret material and issue one credential
pub fn issue(secret_material: &str) -> Result<Credential> {
    CredentialIssuer::from_secret(secret_material)?.issue()
}

fn encode_segment<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_vec(value)
        .map_err(|e| RelayError::configuration(format!("Failed to encode credential: {}", e)))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn current_timestamp() -> Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| RelayError::configuration(format!("System clock is before the epoch: {}", e)))
}

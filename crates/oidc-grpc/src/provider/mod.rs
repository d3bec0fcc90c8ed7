//! OIDC verifying client.
//!
//! [`OidcVerifier`] checks tokens against an OpenID Connect provider's published
//! signing keys and the registered claims the provider is expected to set.
//!
//! # Security
//!
//! - Only asymmetric algorithms are accepted; `HS*` and `none` are rejected
//! - When discovery advertises `id_token_signing_alg_values_supported`, only
//!   those algorithms are accepted
//! - A key is only used for the algorithm family it was published for
//! - `exp` is required; `exp`, `nbf` and `iat` are checked with clock skew
//! - `iss` must equal the configured issuer and `aud` must contain the client ID

pub mod discovery;
pub mod jwks;

pub use discovery::{fetch_provider_metadata, ProviderMetadata};
pub use jwks::{Jwk, JwksClient};

use crate::config::{validate_issuer_url, ConfigError, ProviderConfig};
use crate::error::VerifyError;
use crate::jwt::Jwt;
use crate::verify::JwtVerifier;
use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{crypto, Algorithm};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

/// Errors building an [`OidcVerifier`] from provider discovery.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Invalid provider configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("Discovery request failed: {0}")]
    DiscoveryUnavailable(String),

    #[error("Invalid discovery document: {0}")]
    InvalidDiscovery(String),

    #[error("Issuer mismatch: expected '{expected}', got '{actual}'")]
    IssuerMismatch { expected: String, actual: String },
}

/// Verifies tokens issued by one OIDC provider for one client.
pub struct OidcVerifier {
    issuer: String,
    client_id: String,
    jwks: Arc<JwksClient>,
    clock_skew: Duration,
    /// `None` accepts every asymmetric algorithm.
    supported_algorithms: Option<Vec<Algorithm>>,
}

impl OidcVerifier {
    /// Create a verifier that uses an existing JWKS client.
    pub fn new(config: &ProviderConfig, jwks: Arc<JwksClient>) -> Self {
        Self {
            issuer: config.issuer_url.clone(),
            client_id: config.client_id.clone(),
            jwks,
            clock_skew: config.clock_skew,
            supported_algorithms: None,
        }
    }

    /// Restrict accepted token algorithms to `algorithms`.
    ///
    /// Symmetric algorithms stay rejected even if listed.
    #[must_use]
    pub fn with_supported_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.supported_algorithms = Some(algorithms);
        self
    }

    /// Create a verifier by fetching the provider's discovery document.
    ///
    /// # Errors
    ///
    /// Returns a `ProviderError` if the issuer URL is invalid, discovery fails,
    /// or the provider reports a different issuer.
    #[instrument(skip_all, fields(issuer = %config.issuer_url))]
    pub async fn discover(config: &ProviderConfig) -> Result<Self, ProviderError> {
        validate_issuer_url(&config.issuer_url)?;

        let http_client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| ProviderError::HttpClient(e.to_string()))?;

        let metadata = fetch_provider_metadata(&http_client, &config.issuer_url).await?;

        tracing::info!(
            target: "oidc.provider.discovery",
            jwks_uri = %metadata.jwks_uri,
            "OIDC provider discovered"
        );

        let algorithms = metadata.signing_algorithms();
        let advertised = !metadata.id_token_signing_alg_values_supported.is_empty();
        if advertised && algorithms.is_empty() {
            tracing::warn!(
                target: "oidc.provider.discovery",
                "Provider advertises no asymmetric ID token algorithms; all tokens will be rejected"
            );
        }

        let jwks =
            JwksClient::with_http_client(metadata.jwks_uri, http_client, config.jwks_cache_ttl);
        let verifier = Self::new(config, Arc::new(jwks));

        Ok(if advertised {
            verifier.with_supported_algorithms(algorithms)
        } else {
            verifier
        })
    }

    /// Issuer tokens must come from.
    #[must_use]
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Client ID tokens must be issued for.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Check the signature of `jwt` against the provider's keys.
    async fn verify_signature(&self, jwt: &Jwt, alg: Algorithm) -> Result<(), VerifyError> {
        let candidates = match jwt.header().kid.as_deref() {
            Some(kid) => vec![self.jwks.get_key(kid).await?],
            None => self.jwks.signing_keys().await?,
        };

        let usable: Vec<&Jwk> = candidates.iter().filter(|key| key.supports(alg)).collect();
        if usable.is_empty() {
            tracing::debug!(
                target: "oidc.provider.verify",
                alg = %jwt.header().alg,
                "No signing key matches the token algorithm"
            );
            return Err(VerifyError::Rejected(
                "no signing key for token algorithm".to_string(),
            ));
        }

        if usable.into_iter().any(|key| signature_matches(jwt, key, alg)) {
            Ok(())
        } else {
            tracing::debug!(target: "oidc.provider.verify", "Token signature did not verify");
            Err(VerifyError::Rejected("invalid signature".to_string()))
        }
    }
}

#[async_trait]
impl JwtVerifier for OidcVerifier {
    #[instrument(skip_all, name = "oidc.provider.verify_jwt")]
    async fn verify_jwt(&self, jwt: &Jwt) -> Result<(), VerifyError> {
        let alg = asymmetric_algorithm(&jwt.header().alg)?;

        if let Some(supported) = &self.supported_algorithms {
            if !supported.contains(&alg) {
                tracing::debug!(
                    target: "oidc.provider.verify",
                    alg = %jwt.header().alg,
                    "Token algorithm not advertised by provider"
                );
                return Err(VerifyError::Rejected(format!(
                    "algorithm {} not supported by provider",
                    jwt.header().alg
                )));
            }
        }

        self.verify_signature(jwt, alg).await?;

        let claims: RegisteredClaims = serde_json::from_slice(jwt.payload()).map_err(|e| {
            tracing::debug!(target: "oidc.provider.verify", error = %e, "Invalid registered claims");
            VerifyError::Rejected("invalid registered claims".to_string())
        })?;

        let skew = i64::try_from(self.clock_skew.as_secs()).unwrap_or(i64::MAX);
        check_registered_claims(
            &claims,
            &self.issuer,
            &self.client_id,
            skew,
            Utc::now().timestamp(),
        )
    }
}

/// Parse a header `alg`, accepting only asymmetric signature algorithms.
pub(crate) fn asymmetric_algorithm(name: &str) -> Result<Algorithm, VerifyError> {
    let alg: Algorithm = name.parse().map_err(|_| {
        tracing::debug!(target: "oidc.provider.verify", alg = %name, "Unsupported token algorithm");
        VerifyError::Rejected(format!("unsupported algorithm {name}"))
    })?;

    if matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
        tracing::debug!(target: "oidc.provider.verify", alg = %name, "Symmetric token algorithm rejected");
        return Err(VerifyError::Rejected(format!(
            "symmetric algorithm {name} not accepted"
        )));
    }

    Ok(alg)
}

fn signature_matches(jwt: &Jwt, key: &Jwk, alg: Algorithm) -> bool {
    let Ok(decoding_key) = key.decoding_key() else {
        return false;
    };

    crypto::verify(
        jwt.signature(),
        jwt.signing_input().as_bytes(),
        &decoding_key,
        alg,
    )
    .unwrap_or(false)
}

/// Registered claims checked by the verifier.
#[derive(Debug, Deserialize)]
struct RegisteredClaims {
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    aud: Option<Audience>,
    #[serde(default)]
    exp: Option<i64>,
    #[serde(default)]
    nbf: Option<i64>,
    #[serde(default)]
    iat: Option<i64>,
}

/// `aud` may be a single string or an array of strings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Audience {
    Single(String),
    Multiple(Vec<String>),
}

impl Audience {
    fn contains(&self, client_id: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == client_id,
            Audience::Multiple(auds) => auds.iter().any(|aud| aud == client_id),
        }
    }
}

/// Check registered claims against `now` (Unix seconds).
fn check_registered_claims(
    claims: &RegisteredClaims,
    issuer: &str,
    client_id: &str,
    clock_skew_seconds: i64,
    now: i64,
) -> Result<(), VerifyError> {
    if claims.iss.as_deref() != Some(issuer) {
        tracing::debug!(target: "oidc.provider.verify", "Token issuer mismatch");
        return Err(VerifyError::Rejected("issuer mismatch".to_string()));
    }

    if !claims.aud.as_ref().is_some_and(|aud| aud.contains(client_id)) {
        tracing::debug!(target: "oidc.provider.verify", "Token audience mismatch");
        return Err(VerifyError::Rejected("audience mismatch".to_string()));
    }

    let exp = claims
        .exp
        .ok_or_else(|| VerifyError::Rejected("missing exp claim".to_string()))?;
    if exp.saturating_add(clock_skew_seconds) <= now {
        tracing::debug!(target: "oidc.provider.verify", exp = exp, now = now, "Token expired");
        return Err(VerifyError::Rejected("token expired".to_string()));
    }

    if let Some(nbf) = claims.nbf {
        if nbf > now.saturating_add(clock_skew_seconds) {
            tracing::debug!(target: "oidc.provider.verify", nbf = nbf, now = now, "Token not yet valid");
            return Err(VerifyError::Rejected("token not yet valid".to_string()));
        }
    }

    if let Some(iat) = claims.iat {
        if iat > now.saturating_add(clock_skew_seconds) {
            tracing::debug!(target: "oidc.provider.verify", iat = iat, now = now, "Token issued in the future");
            return Err(VerifyError::Rejected(
                "token issued in the future".to_string(),
            ));
        }
    }

    Ok(())
}

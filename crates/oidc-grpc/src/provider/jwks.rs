//! JWKS client for fetching and caching an OIDC provider's signing keys.
//!
//! Keys are fetched from the provider's `jwks_uri` and cached with a TTL so a
//! key rotation is picked up within one TTL period.
//!
//! # Security
//!
//! - Only keys meant for signatures (`use` absent or `"sig"`) are kept
//! - A key is only ever used with the algorithm family it was published for
//! - Fetch failures surface as `VerifyError::Unavailable`, never as a rejection

use crate::config::MAX_JWKS_CACHE_TTL_SECONDS;
use crate::error::VerifyError;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::instrument;

/// Default cache TTL in seconds (5 minutes).
const DEFAULT_CACHE_TTL_SECONDS: u64 = 300;

/// Longest time a fetched key set is trusted without refetching.
const MAX_CACHE_TTL: Duration = Duration::from_secs(MAX_JWKS_CACHE_TTL_SECONDS);

/// Default HTTP timeout for JWKS fetches.
const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 10;

/// JSON Web Key from a JWKS endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Jwk {
    /// Key type: "RSA", "EC" or "OKP".
    pub kty: String,

    /// Key ID, matched against the token header `kid`.
    #[serde(default)]
    pub kid: Option<String>,

    /// Algorithm the key is meant for.
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use; only "sig" keys are kept.
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,

    /// Curve name for EC and OKP keys.
    #[serde(default)]
    pub crv: Option<String>,

    /// EC x coordinate or OKP public key (base64url).
    #[serde(default)]
    pub x: Option<String>,

    /// EC y coordinate (base64url).
    #[serde(default)]
    pub y: Option<String>,

    /// RSA modulus (base64url).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent (base64url).
    #[serde(default)]
    pub e: Option<String>,
}

impl Jwk {
    /// Whether this key may be used to check signatures.
    #[must_use]
    pub fn is_signing_key(&self) -> bool {
        self.key_use.as_deref().map_or(true, |u| u == "sig")
    }

    /// Whether this key can check a signature made with `alg`.
    ///
    /// The key type (and curve, for EC and OKP keys) must fit the algorithm, and
    /// a published `alg` must name `alg` exactly.
    #[must_use]
    pub fn supports(&self, alg: Algorithm) -> bool {
        let family_matches = match alg {
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => self.kty == "RSA",
            Algorithm::ES256 => self.kty == "EC" && self.crv.as_deref() == Some("P-256"),
            Algorithm::ES384 => self.kty == "EC" && self.crv.as_deref() == Some("P-384"),
            Algorithm::EdDSA => self.kty == "OKP" && self.crv.as_deref() == Some("Ed25519"),
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => false,
        };

        family_matches
            && self
                .alg
                .as_deref()
                .map_or(true, |published| published == algorithm_name(alg))
    }

    /// Build the `jsonwebtoken` key for this JWK.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError::Rejected` if the key type is unsupported or its
    /// parameters are missing or undecodable.
    pub fn decoding_key(&self) -> Result<DecodingKey, VerifyError> {
        let key = match self.kty.as_str() {
            "RSA" => DecodingKey::from_rsa_components(
                required(self.n.as_deref(), "n")?,
                required(self.e.as_deref(), "e")?,
            ),
            "EC" => DecodingKey::from_ec_components(
                required(self.x.as_deref(), "x")?,
                required(self.y.as_deref(), "y")?,
            ),
            "OKP" => DecodingKey::from_ed_components(required(self.x.as_deref(), "x")?),
            other => {
                return Err(VerifyError::Rejected(format!(
                    "unsupported key type {other}"
                )))
            }
        };

        key.map_err(|e| {
            tracing::warn!(target: "oidc.provider.jwks", kid = ?self.kid, error = %e, "Invalid JWK key material");
            VerifyError::Rejected("invalid signing key material".to_string())
        })
    }
}

fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, VerifyError> {
    value.ok_or_else(|| VerifyError::Rejected(format!("signing key is missing '{name}'")))
}

/// Canonical JOSE name of an algorithm.
pub(crate) fn algorithm_name(alg: Algorithm) -> &'static str {
    match alg {
        Algorithm::HS256 => "HS256",
        Algorithm::HS384 => "HS384",
        Algorithm::HS512 => "HS512",
        Algorithm::ES256 => "ES256",
        Algorithm::ES384 => "ES384",
        Algorithm::RS256 => "RS256",
        Algorithm::RS384 => "RS384",
        Algorithm::RS512 => "RS512",
        Algorithm::PS256 => "PS256",
        Algorithm::PS384 => "PS384",
        Algorithm::PS512 => "PS512",
        Algorithm::EdDSA => "EdDSA",
    }
}

/// JWKS response body.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    /// List of JSON Web Keys.
    pub keys: Vec<Jwk>,
}

/// Cached signing keys with expiry time.
struct CachedJwks {
    keys: Vec<Jwk>,
    expires_at: Instant,
}

/// JWKS client for fetching and caching signing keys.
///
/// Thread-safe; share one instance behind an `Arc`.
pub struct JwksClient {
    /// URL to the JWKS endpoint.
    jwks_url: String,

    /// HTTP client for fetching JWKS.
    http_client: reqwest::Client,

    /// Cached signing keys.
    cache: Arc<RwLock<Option<CachedJwks>>>,

    /// Cache TTL duration.
    cache_ttl: Duration,
}

impl JwksClient {
    /// Create a new JWKS client with the default TTL and timeout.
    pub fn new(jwks_url: String) -> Self {
        Self::with_ttl(jwks_url, Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS))
    }

    /// Create a new JWKS client with a custom cache TTL.
    pub fn with_ttl(jwks_url: String, cache_ttl: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECONDS))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "oidc.provider.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self::with_http_client(jwks_url, http_client, cache_ttl)
    }

    /// Create a new JWKS client that reuses an existing HTTP client.
    ///
    /// TTLs above one day are clamped to one day.
    pub fn with_http_client(
        jwks_url: String,
        http_client: reqwest::Client,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            jwks_url,
            http_client,
            cache: Arc::new(RwLock::new(None)),
            cache_ttl: cache_ttl.min(MAX_CACHE_TTL),
        }
    }

    /// URL this client fetches keys from.
    #[must_use]
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    /// Get a signing key by key ID.
    ///
    /// Served from cache while it is fresh; otherwise the key set is refetched.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError::Unavailable` if the key set cannot be fetched.
    /// Returns `VerifyError::Rejected` if no signing key has this ID.
    #[instrument(skip_all)]
    pub async fn get_key(&self, kid: &str) -> Result<Jwk, VerifyError> {
        let keys = self.signing_keys().await?;

        keys.into_iter()
            .find(|key| key.kid.as_deref() == Some(kid))
            .ok_or_else(|| {
                tracing::debug!(target: "oidc.provider.jwks", kid = %kid, "Key not found in JWKS");
                VerifyError::Rejected("unknown signing key".to_string())
            })
    }

    /// All current signing keys.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError::Unavailable` if the key set cannot be fetched.
    pub async fn signing_keys(&self) -> Result<Vec<Jwk>, VerifyError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.expires_at > Instant::now() {
                    tracing::debug!(target: "oidc.provider.jwks", "JWKS cache hit");
                    return Ok(cached.keys.clone());
                }
            }
        }

        self.refresh_cache().await
    }

    /// Fetch the key set and replace the cache, returning the new keys.
    #[instrument(skip_all)]
    async fn refresh_cache(&self) -> Result<Vec<Jwk>, VerifyError> {
        tracing::debug!(target: "oidc.provider.jwks", url = %self.jwks_url, "Fetching JWKS");

        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "oidc.provider.jwks", error = %e, "Failed to fetch JWKS");
                VerifyError::Unavailable("signing keys unavailable".to_string())
            })?;

        if !response.status().is_success() {
            tracing::error!(
                target: "oidc.provider.jwks",
                status = %response.status(),
                "JWKS endpoint returned error"
            );
            return Err(VerifyError::Unavailable(
                "signing keys unavailable".to_string(),
            ));
        }

        let jwks: JwksResponse = response.json().await.map_err(|e| {
            tracing::error!(target: "oidc.provider.jwks", error = %e, "Failed to parse JWKS response");
            VerifyError::Unavailable("signing keys unavailable".to_string())
        })?;

        let keys: Vec<Jwk> = jwks
            .keys
            .into_iter()
            .filter(Jwk::is_signing_key)
            .collect();

        tracing::info!(
            target: "oidc.provider.jwks",
            key_count = keys.len(),
            "JWKS cache refreshed"
        );

        let now = Instant::now();
        let expires_at = now
            .checked_add(self.cache_ttl)
            .or_else(|| now.checked_add(MAX_CACHE_TTL))
            .unwrap_or(now);

        let mut cache = self.cache.write().await;
        *cache = Some(CachedJwks {
            keys: keys.clone(),
            expires_at,
        });

        Ok(keys)
    }

    /// Refetch the key set regardless of cache state.
    ///
    /// # Errors
    ///
    /// Returns `VerifyError::Unavailable` if the key set cannot be fetched.
    pub async fn force_refresh(&self) -> Result<(), VerifyError> {
        self.refresh_cache().await.map(|_| ())
    }

    /// Clear the cache.
    #[cfg(test)]
    pub async fn clear_cache(&self) {
        let mut cache = self.cache.write().await;
        *cache = None;
    }
}

//! Server-side identity verification.
//!
//! [`verified_identity`] takes a request context and a [`JwtVerifier`] and runs,
//! in order, stopping at the first failure:
//!
//! 1. metadata present in the context, else `MissingCredentials`
//! 2. `jwt` key present, else `MissingCredentials`
//! 3. exactly one value under `jwt`, else `MalformedCredentials`
//! 4. value decodes as a compact JWT, else `MalformedCredentials`
//! 5. the verifier accepts the token, else `VerificationFailed`
//! 6. claims decode from the verified token, else `MalformedCredentials`
//! 7. claims convert into an [`Identity`], else `MalformedCredentials`
//!
//! # Security
//!
//! - A credential sent more than once is rejected outright; there is no "first
//!   value wins" fallback
//! - Claims are never read before step 5. [`VerifiedJwt`] and [`VerifiedClaims`]
//!   have no public constructor, so an [`Identity`] cannot be built from an
//!   unverified token

use crate::error::{CredentialError, VerifyError};
use crate::identity::Identity;
use crate::jwt::{Claims, Jwt, TokenError};
use crate::JWT_METADATA_KEY;
use async_trait::async_trait;
use std::ops::Deref;
use std::sync::Arc;
use tonic::metadata::{AsciiMetadataValue, MetadataMap};
use tonic::Request;
use tracing::instrument;

/// A capability that checks a decoded token against trusted key material.
///
/// Implementations validate signature, expiry and issuer; see
/// [`OidcVerifier`](crate::provider::OidcVerifier) for the OIDC one.
#[async_trait]
pub trait JwtVerifier: Send + Sync {
    /// Verify `jwt`, returning `Ok(())` only if it is trustworthy.
    async fn verify_jwt(&self, jwt: &Jwt) -> Result<(), VerifyError>;
}

#[async_trait]
impl<V: JwtVerifier + ?Sized> JwtVerifier for Arc<V> {
    async fn verify_jwt(&self, jwt: &Jwt) -> Result<(), VerifyError> {
        (**self).verify_jwt(jwt).await
    }
}

/// Anything that may carry request metadata.
pub trait RequestContext {
    /// The metadata bag attached to this request, if any.
    fn metadata_bag(&self) -> Option<&MetadataMap>;
}

impl<T> RequestContext for Request<T> {
    fn metadata_bag(&self) -> Option<&MetadataMap> {
        Some(self.metadata())
    }
}

impl RequestContext for MetadataMap {
    fn metadata_bag(&self) -> Option<&MetadataMap> {
        Some(self)
    }
}

impl<C: RequestContext> RequestContext for Option<C> {
    fn metadata_bag(&self) -> Option<&MetadataMap> {
        self.as_ref().and_then(RequestContext::metadata_bag)
    }
}

/// A token that a [`JwtVerifier`] has accepted.
#[derive(Debug, Clone)]
pub struct VerifiedJwt {
    jwt: Jwt,
}

impl VerifiedJwt {
    /// Submit `jwt` to `verifier`, wrapping it only on success.
    ///
    /// # Errors
    ///
    /// Returns whatever the verifier rejected the token with.
    pub async fn verify<V>(verifier: &V, jwt: Jwt) -> Result<Self, VerifyError>
    where
        V: JwtVerifier + ?Sized,
    {
        verifier.verify_jwt(&jwt).await?;
        Ok(Self { jwt })
    }

    /// The verified token.
    #[must_use]
    pub fn jwt(&self) -> &Jwt {
        &self.jwt
    }

    /// Decode the claim set of the verified token.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClaims` if the payload is not a JSON object.
    pub fn claims(&self) -> Result<VerifiedClaims, TokenError> {
        self.jwt.claims().map(VerifiedClaims)
    }
}

/// Claims read from a [`VerifiedJwt`].
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedClaims(Claims);

impl VerifiedClaims {
    /// Unwrap into the plain claim map.
    #[must_use]
    pub fn into_inner(self) -> Claims {
        self.0
    }
}

impl Deref for VerifiedClaims {
    type Target = Claims;

    fn deref(&self) -> &Claims {
        &self.0
    }
}

/// Pull the single encoded token out of the request metadata and decode it.
///
/// Covers steps 1-4. Nothing in the returned token has been verified.
///
/// # Errors
///
/// - `MissingCredentials` - no metadata, or no `jwt` entry
/// - `MalformedCredentials` - not exactly one value, a non-ASCII value, or a
///   value that is not a compact JWT
pub fn extract_jwt<C>(ctx: &C) -> Result<Jwt, CredentialError>
where
    C: RequestContext + ?Sized,
{
    let metadata = ctx.metadata_bag().ok_or_else(|| {
        tracing::debug!(target: "oidc.grpc.verify", "Request carries no metadata");
        CredentialError::MissingCredentials("missing request metadata".to_string())
    })?;

    if !metadata.contains_key(JWT_METADATA_KEY) {
        tracing::debug!(target: "oidc.grpc.verify", "Missing jwt metadata entry");
        return Err(CredentialError::MissingCredentials(
            "missing identity token".to_string(),
        ));
    }

    let values: Vec<&AsciiMetadataValue> = metadata.get_all(JWT_METADATA_KEY).iter().collect();
    let [value] = values.as_slice() else {
        tracing::debug!(
            target: "oidc.grpc.verify",
            value_count = values.len(),
            "Rejected jwt metadata with wrong cardinality"
        );
        return Err(CredentialError::MalformedCredentials(format!(
            "expected exactly one {JWT_METADATA_KEY} value, got {}",
            values.len()
        )));
    };

    let encoded = value.to_str().map_err(|_| {
        tracing::debug!(target: "oidc.grpc.verify", "jwt metadata value is not visible ASCII");
        CredentialError::MalformedCredentials("identity token is not ASCII".to_string())
    })?;

    Jwt::decode(encoded).map_err(|e| {
        tracing::debug!(target: "oidc.grpc.verify", error = %e, "Failed to decode identity token");
        CredentialError::MalformedCredentials(e.to_string())
    })
}

/// Extract, verify and convert the caller's token into an [`Identity`].
///
/// # Errors
///
/// See the module docs for which [`CredentialError`] each step returns.
/// A verifier that cannot reach a decision yields `VerifierUnavailable`.
#[instrument(skip_all, name = "oidc.grpc.verified_identity")]
pub async fn verified_identity<V, C>(verifier: &V, ctx: &C) -> Result<Identity, CredentialError>
where
    V: JwtVerifier + ?Sized,
    C: RequestContext + ?Sized,
{
    let jwt = extract_jwt(ctx)?;

    let verified = VerifiedJwt::verify(verifier, jwt).await.map_err(|e| {
        tracing::debug!(target: "oidc.grpc.verify", error = %e, "Identity token verification failed");
        CredentialError::from(e)
    })?;

    let claims = verified.claims().map_err(|e| {
        tracing::debug!(target: "oidc.grpc.verify", error = %e, "Verified token has undecodable claims");
        CredentialError::MalformedCredentials(e.to_string())
    })?;

    let identity = Identity::from_claims(&claims).map_err(|e| {
        tracing::debug!(target: "oidc.grpc.verify", error = %e, "Claims do not describe an identity");
        CredentialError::MalformedCredentials(e.to_string())
    })?;

    tracing::debug!(target: "oidc.grpc.verify", "Identity token verified");
    Ok(identity)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Verifier with a fixed answer that counts how often it was asked.
    struct StaticVerifier {
        answer: Result<(), VerifyError>,
        calls: AtomicUsize,
    }

    impl StaticVerifier {
        fn accepting() -> Self {
            Self {
                answer: Ok(()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(err: VerifyError) -> Self {
            Self {
                answer: Err(err),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl JwtVerifier for StaticVerifier {
        async fn verify_jwt(&self, _jwt: &Jwt) -> Result<(), VerifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.clone()
        }
    }

    fn token_with_payload(payload: &str) -> String {
        format!(
            "{}.{}.{}",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256","typ":"JWT"}"#),
            URL_SAFE_NO_PAD.encode(payload),
            URL_SAFE_NO_PAD.encode("sig")
        )
    }

    fn user_token() -> String {
        token_with_payload(r#"{"sub":"user-1","iss":"https://idp.example"}"#)
    }

    fn request_with(values: &[&str]) -> Request<()> {
        let mut request = Request::new(());
        for value in values {
            request
                .metadata_mut()
                .append(JWT_METADATA_KEY, value.parse().unwrap());
        }
        request
    }

    #[tokio::test]
    async fn test_no_metadata_bag() {
        let verifier = StaticVerifier::accepting();
        let ctx: Option<MetadataMap> = None;

        let result = verified_identity(&verifier, &ctx).await;

        assert!(matches!(
            result,
            Err(CredentialError::MissingCredentials(_))
        ));
        assert_eq!(verifier.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_jwt_key() {
        let verifier = StaticVerifier::accepting();
        let mut request = Request::new(());
        request
            .metadata_mut()
            .insert("authorization", "Bearer abc".parse().unwrap());

        let result = verified_identity(&verifier, &request).await;

        assert!(matches!(
            result,
            Err(CredentialError::MissingCredentials(_))
        ));
        assert_eq!(verifier.calls(), 0);
    }

    #[tokio::test]
    async fn test_two_values_rejected() {
        let verifier = StaticVerifier::accepting();
        let token = user_token();
        let request = request_with(&[&token, &token]);

        let result = verified_identity(&verifier, &request).await;

        assert!(matches!(
            result,
            Err(CredentialError::MalformedCredentials(_))
        ));
        assert_eq!(verifier.calls(), 0, "must not pick the first value");
    }

    #[tokio::test]
    async fn test_three_values_rejected() {
        let verifier = StaticVerifier::accepting();
        let token = user_token();
        let request = request_with(&[&token, "not-a-token", &token]);

        let result = verified_identity(&verifier, &request).await;

        let err = result.expect_err("expected error");
        assert_eq!(
            err,
            CredentialError::MalformedCredentials("expected exactly one jwt value, got 3".to_string())
        );
    }

    #[tokio::test]
    async fn test_undecodable_token() {
        let verifier = StaticVerifier::accepting();
        let request = request_with(&["not-a-token"]);

        let result = verified_identity(&verifier, &request).await;

        assert!(matches!(
            result,
            Err(CredentialError::MalformedCredentials(_))
        ));
        assert_eq!(verifier.calls(), 0);
    }

    #[tokio::test]
    async fn test_verifier_rejection() {
        let verifier = StaticVerifier::failing(VerifyError::Rejected("token expired".to_string()));
        let request = request_with(&[&user_token()]);

        let result = verified_identity(&verifier, &request).await;

        assert_eq!(
            result,
            Err(CredentialError::VerificationFailed("token expired".to_string()))
        );
        assert_eq!(verifier.calls(), 1);
    }

    #[tokio::test]
    async fn test_rejection_precedes_claim_parsing() {
        // The payload is garbage: if claims were read first this would be
        // MalformedCredentials instead.
        let verifier = StaticVerifier::failing(VerifyError::Rejected("bad signature".to_string()));
        let request = request_with(&[&token_with_payload("not json at all")]);

        let result = verified_identity(&verifier, &request).await;

        assert!(matches!(
            result,
            Err(CredentialError::VerificationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_verifier_unavailable() {
        let verifier =
            StaticVerifier::failing(VerifyError::Unavailable("jwks unreachable".to_string()));
        let request = request_with(&[&user_token()]);

        let result = verified_identity(&verifier, &request).await;

        assert_eq!(
            result,
            Err(CredentialError::VerifierUnavailable("jwks unreachable".to_string()))
        );
    }

    #[tokio::test]
    async fn test_verified_but_undecodable_claims() {
        let verifier = StaticVerifier::accepting();
        let request = request_with(&[&token_with_payload("[\"not\",\"an\",\"object\"]")]);

        let result = verified_identity(&verifier, &request).await;

        assert!(matches!(
            result,
            Err(CredentialError::MalformedCredentials(_))
        ));
        assert_eq!(verifier.calls(), 1);
    }

    #[tokio::test]
    async fn test_verified_but_missing_subject() {
        let verifier = StaticVerifier::accepting();
        let request = request_with(&[&token_with_payload(r#"{"iss":"https://idp.example"}"#)]);

        let result = verified_identity(&verifier, &request).await;

        assert_eq!(
            result,
            Err(CredentialError::MalformedCredentials(
                "missing required claim: sub".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn test_success() {
        let verifier = StaticVerifier::accepting();
        let request = request_with(&[&user_token()]);

        let identity = verified_identity(&verifier, &request).await.unwrap();

        assert_eq!(identity.subject(), "user-1");
        assert_eq!(identity.issuer(), Some("https://idp.example"));
    }

    #[tokio::test]
    async fn test_metadata_map_context() {
        let verifier = StaticVerifier::accepting();
        let mut metadata = MetadataMap::new();
        metadata.insert(JWT_METADATA_KEY, user_token().parse().unwrap());

        let identity = verified_identity(&verifier, &metadata).await.unwrap();
        assert_eq!(identity.subject(), "user-1");

        let some_ctx = Some(metadata);
        let identity = verified_identity(&verifier, &some_ctx).await.unwrap();
        assert_eq!(identity.subject(), "user-1");
    }

    #[tokio::test]
    async fn test_arc_dyn_verifier() {
        let verifier: Arc<dyn JwtVerifier> = Arc::new(StaticVerifier::accepting());
        let request = request_with(&[&user_token()]);

        let identity = verified_identity(&verifier, &request).await.unwrap();
        assert_eq!(identity.subject(), "user-1");
    }

    #[tokio::test]
    async fn test_verified_jwt_keeps_token() {
        let verifier = StaticVerifier::accepting();
        let token = user_token();
        let jwt = Jwt::decode(&token).unwrap();

        let verified = VerifiedJwt::verify(&verifier, jwt).await.unwrap();

        assert_eq!(verified.jwt().encode(), token);
        let claims = verified.claims().unwrap();
        assert_eq!(
            claims.get("sub").and_then(serde_json::Value::as_str),
            Some("user-1")
        );
    }

    #[test]
    fn test_extract_jwt_single_value() {
        let token = user_token();
        let request = request_with(&[&token]);

        let jwt = extract_jwt(&request).unwrap();
        assert_eq!(jwt.encode(), token);
    }
}

//! Compact JWT codec.
//!
//! [`Jwt::decode`] checks the structure of a compact JWS (`header.payload.signature`)
//! and decodes the header, but it does **not** parse the payload. Claims are only
//! parsed on demand through [`Jwt::claims`], which the verification pipeline calls
//! after the signature has been checked.
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE any decoding (DoS prevention)
//! - Every segment must be unpadded base64url; the signature must be non-empty
//! - Token contents never appear in Debug output

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum accepted encoded token size in bytes (8KB).
///
/// ID tokens are typically well under 2KB. Anything larger is rejected before
/// base64 decoding or JSON parsing allocates for it.
pub const MAX_JWT_SIZE_BYTES: usize = 8192;

/// Default clock skew tolerance for time-based claims (5 minutes).
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Upper bound on configurable clock skew tolerance (10 minutes).
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Types
// =============================================================================

/// Claim set of a token: claim name to JSON value.
pub type Claims = serde_json::Map<String, Value>;

/// Errors from decoding a token or its claims.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Encoded token exceeds [`MAX_JWT_SIZE_BYTES`].
    #[error("token exceeds maximum size of {MAX_JWT_SIZE_BYTES} bytes")]
    TooLarge,

    /// Token is not a well-formed compact JWS.
    #[error("malformed token: {0}")]
    Malformed(String),

    /// Payload does not decode to a JSON object.
    #[error("invalid claims: {0}")]
    InvalidClaims(String),
}

/// Decoded JOSE header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoseHeader {
    /// Signing algorithm name as sent by the issuer (e.g. `RS256`).
    pub alg: String,

    /// Media type, usually `JWT`.
    pub typ: Option<String>,

    /// Key ID used to select the verification key.
    pub kid: Option<String>,
}

/// A signed token in compact serialization.
///
/// Immutable once decoded. The canonical string form is kept as received so that
/// [`Jwt::encode`] reproduces exactly what the issuer signed.
#[derive(Clone, PartialEq, Eq)]
pub struct Jwt {
    encoded: String,
    header: JoseHeader,
    payload: Vec<u8>,
}

impl fmt::Debug for Jwt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jwt")
            .field("header", &self.header)
            .field("payload", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl Jwt {
    /// Decode a compact JWS string.
    ///
    /// # Errors
    ///
    /// - `TooLarge` - token exceeds `MAX_JWT_SIZE_BYTES`
    /// - `Malformed` - wrong segment count, empty segment, bad base64url, or a
    ///   header that is not a JSON object with a string `alg`
    pub fn decode(token: &str) -> Result<Self, TokenError> {
        if token.len() > MAX_JWT_SIZE_BYTES {
            tracing::debug!(
                target: "oidc.jwt",
                token_size = token.len(),
                max_size = MAX_JWT_SIZE_BYTES,
                "Token rejected: size exceeds maximum allowed"
            );
            return Err(TokenError::TooLarge);
        }

        let mut parts = token.split('.');
        let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed(
                "expected three dot-separated segments".to_string(),
            ));
        };

        if header_b64.is_empty() || payload_b64.is_empty() || signature_b64.is_empty() {
            return Err(TokenError::Malformed("empty segment".to_string()));
        }

        let header_bytes = decode_segment(header_b64, "header")?;
        let header = parse_header(&header_bytes)?;
        let payload = decode_segment(payload_b64, "payload")?;
        decode_segment(signature_b64, "signature")?;

        Ok(Self {
            encoded: token.to_string(),
            header,
            payload,
        })
    }

    /// Canonical compact serialization, exactly as it travels on the wire.
    #[must_use]
    pub fn encode(&self) -> &str {
        &self.encoded
    }

    /// Decoded JOSE header.
    #[must_use]
    pub fn header(&self) -> &JoseHeader {
        &self.header
    }

    /// The `header.payload` portion covered by the signature.
    #[must_use]
    pub fn signing_input(&self) -> &str {
        self.encoded
            .rsplit_once('.')
            .map_or("", |(input, _)| input)
    }

    /// The base64url-encoded signature segment.
    #[must_use]
    pub fn signature(&self) -> &str {
        self.encoded
            .rsplit_once('.')
            .map_or("", |(_, signature)| signature)
    }

    /// Raw (base64url-decoded) payload bytes.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Parse the payload into a claim set.
    ///
    /// Nothing in the returned map should be trusted unless the token has been
    /// verified first.
    ///
    /// # Errors
    ///
    /// Returns `InvalidClaims` if the payload is not a JSON object.
    pub fn claims(&self) -> Result<Claims, TokenError> {
        let value: Value = serde_json::from_slice(&self.payload)
            .map_err(|e| TokenError::InvalidClaims(e.to_string()))?;

        match value {
            Value::Object(map) => Ok(map),
            _ => Err(TokenError::InvalidClaims(
                "payload is not a JSON object".to_string(),
            )),
        }
    }
}

impl FromStr for Jwt {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}

fn decode_segment(segment: &str, name: &str) -> Result<Vec<u8>, TokenError> {
    URL_SAFE_NO_PAD.decode(segment).map_err(|e| {
        tracing::debug!(target: "oidc.jwt", segment = name, error = %e, "Failed to decode JWT segment");
        TokenError::Malformed(format!("{name} is not valid base64url"))
    })
}

fn parse_header(bytes: &[u8]) -> Result<JoseHeader, TokenError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| {
        tracing::debug!(target: "oidc.jwt", error = %e, "Failed to parse JWT header JSON");
        TokenError::Malformed("header is not valid JSON".to_string())
    })?;

    let Value::Object(header) = value else {
        return Err(TokenError::Malformed(
            "header is not a JSON object".to_string(),
        ));
    };

    let alg = header
        .get("alg")
        .and_then(Value::as_str)
        .filter(|alg| !alg.is_empty())
        .ok_or_else(|| TokenError::Malformed("header is missing alg".to_string()))?
        .to_string();

    Ok(JoseHeader {
        alg,
        typ: optional_string(&header, "typ")?,
        kid: optional_string(&header, "kid")?,
    })
}

fn optional_string(
    header: &serde_json::Map<String, Value>,
    name: &str,
) -> Result<Option<String>, TokenError> {
    match header.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(TokenError::Malformed(format!(
            "header field {name} is not a string"
        ))),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn b64(s: &str) -> String {
        URL_SAFE_NO_PAD.encode(s)
    }

    fn token(header: &str, payload: &str) -> String {
        format!("{}.{}.{}", b64(header), b64(payload), b64("signature"))
    }

    const HEADER: &str = r#"{"alg":"RS256","typ":"JWT","kid":"key-1"}"#;
    const PAYLOAD: &str = r#"{"sub":"user-1","iss":"https://idp.example"}"#;

    #[test]
    fn test_decode_valid_token() {
        let encoded = token(HEADER, PAYLOAD);
        let jwt = Jwt::decode(&encoded).unwrap();

        assert_eq!(jwt.header().alg, "RS256");
        assert_eq!(jwt.header().typ.as_deref(), Some("JWT"));
        assert_eq!(jwt.header().kid.as_deref(), Some("key-1"));
        assert_eq!(jwt.encode(), encoded);
        assert_eq!(jwt.payload(), PAYLOAD.as_bytes());
    }

    #[test]
    fn test_signing_input_and_signature() {
        let encoded = token(HEADER, PAYLOAD);
        let jwt = Jwt::decode(&encoded).unwrap();

        assert_eq!(
            jwt.signing_input(),
            format!("{}.{}", b64(HEADER), b64(PAYLOAD))
        );
        assert_eq!(jwt.signature(), b64("signature"));
    }

    #[test]
    fn test_decode_not_a_token() {
        assert!(matches!(
            Jwt::decode("not-a-token"),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_wrong_segment_count() {
        assert!(matches!(Jwt::decode(""), Err(TokenError::Malformed(_))));
        assert!(matches!(Jwt::decode("a.b"), Err(TokenError::Malformed(_))));
        assert!(matches!(
            Jwt::decode("a.b.c.d"),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_empty_signature() {
        let encoded = format!("{}.{}.", b64(HEADER), b64(PAYLOAD));
        assert!(matches!(
            Jwt::decode(&encoded),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_invalid_base64() {
        let encoded = format!("!!!invalid!!!.{}.{}", b64(PAYLOAD), b64("sig"));
        assert!(matches!(
            Jwt::decode(&encoded),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_header_not_json() {
        let encoded = token("not json", PAYLOAD);
        assert!(matches!(
            Jwt::decode(&encoded),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_header_array_rejected() {
        let encoded = token(r#"["RS256"]"#, PAYLOAD);
        assert!(matches!(
            Jwt::decode(&encoded),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_header_missing_alg() {
        let encoded = token(r#"{"typ":"JWT"}"#, PAYLOAD);
        assert!(matches!(
            Jwt::decode(&encoded),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_header_numeric_kid() {
        let encoded = token(r#"{"alg":"RS256","kid":12345}"#, PAYLOAD);
        assert!(matches!(
            Jwt::decode(&encoded),
            Err(TokenError::Malformed(_))
        ));
    }

    #[test]
    fn test_decode_header_without_kid() {
        let encoded = token(r#"{"alg":"EdDSA"}"#, PAYLOAD);
        let jwt = Jwt::decode(&encoded).unwrap();
        assert!(jwt.header().kid.is_none());
        assert!(jwt.header().typ.is_none());
    }

    #[test]
    fn test_decode_oversized_token() {
        let oversized = "a".repeat(MAX_JWT_SIZE_BYTES + 1);
        assert_eq!(Jwt::decode(&oversized), Err(TokenError::TooLarge));
    }

    #[test]
    fn test_decode_does_not_parse_payload() {
        // Garbage payload still decodes; claims() is where it fails.
        let encoded = token(HEADER, "definitely not json");
        let jwt = Jwt::decode(&encoded).unwrap();

        assert!(matches!(jwt.claims(), Err(TokenError::InvalidClaims(_))));
    }

    #[test]
    fn test_claims() {
        let jwt = Jwt::decode(&token(HEADER, PAYLOAD)).unwrap();
        let claims = jwt.claims().unwrap();

        assert_eq!(claims.get("sub").and_then(Value::as_str), Some("user-1"));
        assert_eq!(
            claims.get("iss").and_then(Value::as_str),
            Some("https://idp.example")
        );
    }

    #[test]
    fn test_claims_not_an_object() {
        let jwt = Jwt::decode(&token(HEADER, "[1,2,3]")).unwrap();
        assert!(matches!(jwt.claims(), Err(TokenError::InvalidClaims(_))));
    }

    #[test]
    fn test_from_str() {
        let encoded = token(HEADER, PAYLOAD);
        let jwt: Jwt = encoded.parse().unwrap();
        assert_eq!(jwt.encode(), encoded);
    }

    #[test]
    fn test_debug_redacts_payload() {
        let jwt = Jwt::decode(&token(HEADER, PAYLOAD)).unwrap();
        let debug_str = format!("{jwt:?}");

        assert!(!debug_str.contains("user-1"));
        assert!(!debug_str.contains(jwt.signature()));
        assert!(debug_str.contains("[REDACTED]"));
    }

    #[test]
    fn test_clock_skew_constants() {
        assert_eq!(DEFAULT_CLOCK_SKEW, Duration::from_secs(300));
        assert_eq!(MAX_CLOCK_SKEW, Duration::from_secs(600));
    }
}

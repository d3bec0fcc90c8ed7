//! Verified caller identity.
//!
//! An [`Identity`] can only be built from [`VerifiedClaims`], which in turn only
//! exist for a token that passed verification. The subject and email are
//! redacted in Debug output to keep them out of logs.

use crate::jwt::Claims;
use crate::verify::VerifiedClaims;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Errors converting a claim set into an [`Identity`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// A required claim is absent.
    #[error("missing required claim: {0}")]
    MissingClaim(&'static str),

    /// A claim is present but has the wrong shape.
    #[error("invalid claim: {0}")]
    InvalidClaim(&'static str),
}

/// Identity of an authenticated caller.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    subject: String,
    issuer: Option<String>,
    email: Option<String>,
    name: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("subject", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("email", &self.email.as_ref().map(|_| "[REDACTED]"))
            .field("name", &self.name)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Identity {
    /// Build an identity from the claims of a verified token.
    ///
    /// # Errors
    ///
    /// - `MissingClaim("sub")` if there is no subject
    /// - `InvalidClaim(..)` if `sub`, `iss`, `email` or `name` is not a string,
    ///   `sub` is empty, or `exp` is not an integer timestamp
    pub fn from_claims(claims: &VerifiedClaims) -> Result<Self, IdentityError> {
        Self::from_claim_map(claims)
    }

    fn from_claim_map(claims: &Claims) -> Result<Self, IdentityError> {
        let subject = string_claim(claims, "sub")?.ok_or(IdentityError::MissingClaim("sub"))?;
        if subject.is_empty() {
            return Err(IdentityError::InvalidClaim("sub"));
        }

        let expires_at = match claims.get("exp") {
            None | Some(Value::Null) => None,
            Some(value) => {
                let secs = value.as_i64().ok_or(IdentityError::InvalidClaim("exp"))?;
                Some(DateTime::from_timestamp(secs, 0).ok_or(IdentityError::InvalidClaim("exp"))?)
            }
        };

        Ok(Self {
            subject,
            issuer: string_claim(claims, "iss")?,
            email: string_claim(claims, "email")?,
            name: string_claim(claims, "name")?,
            expires_at,
        })
    }

    /// Subject identifier (`sub`), unique within the issuer.
    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Issuer (`iss`) that minted the token.
    #[must_use]
    pub fn issuer(&self) -> Option<&str> {
        self.issuer.as_deref()
    }

    /// Email address, when the provider includes one.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Display name, when the provider includes one.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Expiry of the token this identity came from.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }
}

fn string_claim(claims: &Claims, name: &'static str) -> Result<Option<String>, IdentityError> {
    match claims.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(IdentityError::InvalidClaim(name)),
    }
}

//! Error types for credential verification.
//!
//! [`CredentialError`] is what [`verified_identity`](crate::verify::verified_identity)
//! returns. It maps onto a gRPC status via `From<CredentialError> for Status`.
//! Status messages sent back to the caller are intentionally generic; the
//! detailed reason stays in the error value for server-side diagnostics.

use thiserror::Error;
use tonic::{Code, Status};

/// Generic message returned to callers for any rejected credential.
pub(crate) const INVALID_CREDENTIALS_MESSAGE: &str = "The identity token is invalid or expired";

/// Errors produced while extracting and verifying request credentials.
///
/// Every variant is scoped to the single request being verified.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// No metadata bag in the request context, or no `jwt` entry in it.
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    /// Credential present but structurally wrong.
    #[error("Malformed credentials: {0}")]
    MalformedCredentials(String),

    /// Credential well-formed but rejected by the verifying client.
    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    /// The verifying client could not reach a decision (e.g. key set unreachable).
    #[error("Verifier unavailable: {0}")]
    VerifierUnavailable(String),
}

impl CredentialError {
    /// Returns the gRPC code this error is surfaced as.
    #[must_use]
    pub fn code(&self) -> Code {
        match self {
            CredentialError::MissingCredentials(_)
            | CredentialError::MalformedCredentials(_)
            | CredentialError::VerificationFailed(_) => Code::Unauthenticated,
            CredentialError::VerifierUnavailable(_) => Code::Unavailable,
        }
    }
}

impl From<CredentialError> for Status {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::MissingCredentials(_) => {
                Status::unauthenticated("Missing identity token")
            }
            CredentialError::MalformedCredentials(_) | CredentialError::VerificationFailed(_) => {
                Status::unauthenticated(INVALID_CREDENTIALS_MESSAGE)
            }
            CredentialError::VerifierUnavailable(_) => {
                Status::unavailable("Identity provider temporarily unavailable")
            }
        }
    }
}

/// Outcome of a failed [`JwtVerifier::verify_jwt`](crate::verify::JwtVerifier::verify_jwt) call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// Signature, expiry, issuer or audience check failed.
    #[error("Token rejected: {0}")]
    Rejected(String),

    /// The verifier could not obtain what it needs to decide.
    #[error("Verifier unavailable: {0}")]
    Unavailable(String),
}

impl From<VerifyError> for CredentialError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::Rejected(reason) => CredentialError::VerificationFailed(reason),
            VerifyError::Unavailable(reason) => CredentialError::VerifierUnavailable(reason),
        }
    }
}

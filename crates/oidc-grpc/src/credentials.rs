//! Client-side credential attachment.
//!
//! [`OidcCredentials`] holds a signed token and contributes exactly one metadata
//! entry, `jwt: <compact token>`, to every outgoing call. Plug it into a
//! generated client with `with_interceptor`:
//!
//! ```rust,ignore
//! let credentials = OidcCredentials::new(&jwt)?;
//! let mut client = GreeterClient::with_interceptor(channel, credentials);
//! ```

use crate::error::CredentialError;
use crate::jwt::Jwt;
use crate::JWT_METADATA_KEY;
use std::fmt;
use tonic::metadata::{AsciiMetadataValue, MetadataMap};
use tonic::service::Interceptor;
use tonic::{Request, Status};

/// Per-call OIDC credentials for a gRPC client.
///
/// The metadata value is built once at construction; each call only clones it.
#[derive(Clone)]
pub struct OidcCredentials {
    value: AsciiMetadataValue,
}

impl fmt::Debug for OidcCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OidcCredentials")
            .field("value", &"[REDACTED]")
            .finish()
    }
}

impl OidcCredentials {
    /// Create credentials carrying `token`.
    ///
    /// # Errors
    ///
    /// Returns `MalformedCredentials` if the encoded token cannot be carried as an
    /// ASCII metadata value. Tokens produced by [`Jwt::decode`] only contain
    /// base64url characters and dots, so this does not happen for them.
    pub fn new(token: &Jwt) -> Result<Self, CredentialError> {
        let value = token.encode().parse::<AsciiMetadataValue>().map_err(|_| {
            tracing::warn!(target: "oidc.grpc.credentials", "Token is not a valid metadata value");
            CredentialError::MalformedCredentials(
                "token cannot be sent as request metadata".to_string(),
            )
        })?;

        Ok(Self { value })
    }

    /// Metadata this credential contributes to a single call.
    ///
    /// Always exactly one entry: [`JWT_METADATA_KEY`] mapped to the encoded token.
    #[must_use]
    pub fn request_metadata(&self) -> MetadataMap {
        let mut metadata = MetadataMap::new();
        metadata.insert(JWT_METADATA_KEY, self.value.clone());
        metadata
    }
}

impl Interceptor for OidcCredentials {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        // insert, not append: the wire must carry exactly one value
        request
            .metadata_mut()
            .insert(JWT_METADATA_KEY, self.value.clone());

        Ok(request)
    }
}

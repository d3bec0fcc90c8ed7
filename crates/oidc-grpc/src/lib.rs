//! OIDC identity tokens for gRPC.
//!
//! Client side, [`OidcCredentials`] attaches a signed OIDC token to every
//! outgoing call under the `jwt` metadata key. Server side,
//! [`verified_identity`] pulls that token back out of the request metadata,
//! has a [`JwtVerifier`] check it, and only then turns its claims into an
//! [`Identity`].
//!
//! # Components
//!
//! - `credentials` - per-call metadata contribution (client interceptor)
//! - `verify` - metadata extraction and the verify-then-trust pipeline
//! - `jwt` - compact JWT codec
//! - `identity` - typed identity built from verified claims
//! - `provider` - OIDC discovery, JWKS cache and the `OidcVerifier`
//! - `layer` - tower layer running verification in front of a tonic server
//! - `config` - provider configuration from environment variables
//!
//! # Example
//!
//! ```rust,ignore
//! use oidc_grpc::{verified_identity, Jwt, OidcCredentials, OidcVerifier, ProviderConfig};
//!
//! // Client
//! let token = Jwt::decode(&id_token)?;
//! let credentials = OidcCredentials::new(&token)?;
//! let client = GreeterClient::with_interceptor(channel, credentials);
//!
//! // Server
//! let verifier = OidcVerifier::discover(&ProviderConfig::from_env()?).await?;
//! let identity = verified_identity(&verifier, &request).await?;
//! ```

pub mod config;
pub mod credentials;
pub mod error;
pub mod identity;
pub mod jwt;
pub mod layer;
pub mod provider;
pub mod verify;

pub use config::ProviderConfig;
pub use credentials::OidcCredentials;
pub use error::{CredentialError, VerifyError};
pub use identity::Identity;
pub use jwt::{Claims, Jwt};
pub use layer::{IdentityExt, OidcAuthLayer};
pub use provider::{JwksClient, OidcVerifier};
pub use verify::{verified_identity, JwtVerifier, RequestContext, VerifiedJwt};

/// Metadata key carrying the encoded token on every authenticated call.
pub const JWT_METADATA_KEY: &str = "jwt";

//! Tower layer that verifies OIDC credentials on a tonic server.
//!
//! Verification needs async I/O (JWKS fetches), which tonic's synchronous
//! `Interceptor` cannot do, so it runs as a tower service in front of the
//! generated gRPC services:
//!
//! ```rust,ignore
//! let verifier = Arc::new(OidcVerifier::discover(&config).await?);
//! Server::builder()
//!     .layer(OidcAuthLayer::new(verifier))
//!     .add_service(GreeterServer::new(greeter))
//!     .serve(addr)
//!     .await?;
//! ```
//!
//! Handlers read the caller with [`IdentityExt::identity`].

use crate::error::CredentialError;
use crate::identity::Identity;
use crate::verify::{verified_identity, JwtVerifier};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tonic::body::BoxBody;
use tonic::metadata::MetadataMap;
use tonic::{Request, Status};
use tower::{Layer, Service};

/// Tower layer for OIDC credential verification.
#[derive(Clone)]
pub struct OidcAuthLayer {
    verifier: Arc<dyn JwtVerifier>,
}

impl OidcAuthLayer {
    /// Create a layer that verifies every request with `verifier`.
    pub fn new(verifier: Arc<dyn JwtVerifier>) -> Self {
        Self { verifier }
    }
}

impl<S> Layer<S> for OidcAuthLayer {
    type Service = OidcAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        OidcAuthService {
            inner,
            verifier: self.verifier.clone(),
        }
    }
}

/// Tower service produced by [`OidcAuthLayer`].
#[derive(Clone)]
pub struct OidcAuthService<S> {
    inner: S,
    verifier: Arc<dyn JwtVerifier>,
}

impl<S, ReqBody> Service<http::Request<ReqBody>> for OidcAuthService<S>
where
    S: Service<http::Request<ReqBody>, Response = http::Response<BoxBody>>
        + Clone
        + Send
        + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: http::Request<ReqBody>) -> Self::Future {
        // Call the instance that was polled ready; leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let verifier = self.verifier.clone();

        Box::pin(async move {
            let metadata = MetadataMap::from_headers(req.headers().clone());

            let identity = match verified_identity(verifier.as_ref(), &metadata).await {
                Ok(identity) => identity,
                Err(e) => {
                    tracing::debug!(target: "oidc.grpc.layer", error = %e, "Request credentials rejected");
                    return Ok(rejection_response(e));
                }
            };

            let (mut parts, body) = req.into_parts();
            parts.extensions.insert(identity);
            let req = http::Request::from_parts(parts, body);

            inner.call(req).await
        })
    }
}

fn rejection_response(err: CredentialError) -> http::Response<BoxBody> {
    Status::from(err).into_http()
}

/// Access to the verified caller from a gRPC handler.
pub trait IdentityExt {
    /// The caller's identity.
    ///
    /// # Errors
    ///
    /// Returns `Status::unauthenticated` if the request did not pass through
    /// [`OidcAuthLayer`].
    fn identity(&self) -> Result<&Identity, Status>;
}

impl<T> IdentityExt for Request<T> {
    fn identity(&self) -> Result<&Identity, Status> {
        self.extensions().get::<Identity>().ok_or_else(|| {
            tracing::warn!(target: "oidc.grpc.layer", "Handler reached without a verified identity");
            Status::unauthenticated("Missing identity token")
        })
    }
}

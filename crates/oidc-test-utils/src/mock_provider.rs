//! Mock OIDC provider served by wiremock.
//!
//! Serves a discovery document at `/.well-known/openid-configuration` whose
//! issuer is the mock server's own URI, and a JWKS at `/keys`.
//!
//! Unless told otherwise the discovery document advertises every algorithm the
//! fixtures can sign with.

use crate::TestKeypair;
use oidc_grpc::ProviderConfig;
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Path the mock serves its JWKS on.
pub const JWKS_PATH: &str = "/keys";

/// Algorithms advertised by default in `id_token_signing_alg_values_supported`.
pub const DEFAULT_SIGNING_ALGS: &[&str] = &["EdDSA", "RS256", "ES256"];

pub struct MockOidcProvider {
    server: MockServer,
}

impl MockOidcProvider {
    /// Start a provider publishing `keys`.
    pub async fn start(keys: &[&TestKeypair]) -> Self {
        Self::start_with_jwks(keys.iter().map(|key| key.jwk_json()).collect()).await
    }

    /// Start a provider publishing the given JWKS entries.
    pub async fn start_with_jwks(jwks: Vec<Value>) -> Self {
        Self::start_with_algorithms(DEFAULT_SIGNING_ALGS, jwks).await
    }

    /// Start a provider that advertises only `algs` and publishes `jwks`.
    pub async fn start_with_algorithms(algs: &[&str], jwks: Vec<Value>) -> Self {
        let body = json!({ "keys": jwks });
        Self::serve(algs, ResponseTemplate::new(200).set_body_json(body)).await
    }

    /// Start a provider whose discovery works but whose JWKS endpoint fails.
    pub async fn start_with_failing_jwks() -> Self {
        Self::start_with_jwks_response(ResponseTemplate::new(503)).await
    }

    /// Start a provider whose JWKS endpoint answers with `response`.
    pub async fn start_with_jwks_response(response: ResponseTemplate) -> Self {
        Self::serve(DEFAULT_SIGNING_ALGS, response).await
    }

    async fn serve(algs: &[&str], response: ResponseTemplate) -> Self {
        let server = MockServer::start().await;
        let issuer = server.uri();

        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": issuer,
                "jwks_uri": format!("{issuer}{JWKS_PATH}"),
                "id_token_signing_alg_values_supported": algs,
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(response)
            .mount(&server)
            .await;

        Self { server }
    }

    /// Issuer URL, as tokens from this provider must carry in `iss`.
    pub fn issuer(&self) -> String {
        self.server.uri()
    }

    /// Full JWKS URL.
    pub fn jwks_uri(&self) -> String {
        format!("{}{JWKS_PATH}", self.server.uri())
    }

    /// Provider configuration accepting tokens for `client_id`.
    pub fn config(&self, client_id: &str) -> ProviderConfig {
        ProviderConfig::new(self.issuer(), client_id).expect("mock issuer should be valid")
    }

    /// Requests received by the mock so far.
    pub async fn received_request_count(&self) -> usize {
        self.server
            .received_requests()
            .await
            .map_or(0, |requests| requests.len())
    }
}

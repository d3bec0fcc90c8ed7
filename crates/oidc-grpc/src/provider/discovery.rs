//! OpenID Connect discovery.

use super::{asymmetric_algorithm, ProviderError};
use jsonwebtoken::Algorithm;
use serde::Deserialize;
use tracing::instrument;

/// Path of the discovery document relative to the issuer URL.
pub const DISCOVERY_PATH: &str = "/.well-known/openid-configuration";

/// The parts of a provider's discovery document this crate uses.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub jwks_uri: String,
    #[serde(default)]
    pub id_token_signing_alg_values_supported: Vec<String>,
}

impl ProviderMetadata {
    /// Advertised ID token algorithms this crate will verify.
    ///
    /// Unknown names and symmetric algorithms are dropped.
    #[must_use]
    pub fn signing_algorithms(&self) -> Vec<Algorithm> {
        self.id_token_signing_alg_values_supported
            .iter()
            .filter_map(|name| asymmetric_algorithm(name).ok())
            .collect()
    }
}

/// Fetch and check the discovery document for `issuer`.
///
/// The document's `issuer` must equal `issuer` exactly; a provider that
/// claims to be someone else is not trusted.
///
/// # Errors
///
/// - `DiscoveryUnavailable` if the request fails or returns a non-success status
/// - `InvalidDiscovery` if the body is not a discovery document
/// - `IssuerMismatch` if the document names a different issuer
#[instrument(skip_all, fields(issuer = %issuer))]
pub async fn fetch_provider_metadata(
    http: &reqwest::Client,
    issuer: &str,
) -> Result<ProviderMetadata, ProviderError> {
    let url = format!("{}{DISCOVERY_PATH}", issuer.trim_end_matches('/'));

    tracing::debug!(target: "oidc.provider.discovery", url = %url, "Fetching discovery document");

    let response = http.get(&url).send().await.map_err(|e| {
        tracing::error!(target: "oidc.provider.discovery", error = %e, "Failed to fetch discovery document");
        ProviderError::DiscoveryUnavailable(e.to_string())
    })?;

    if !response.status().is_success() {
        tracing::error!(
            target: "oidc.provider.discovery",
            status = %response.status(),
            "Discovery endpoint returned error"
        );
        return Err(ProviderError::DiscoveryUnavailable(format!(
            "HTTP {}",
            response.status()
        )));
    }

    let metadata: ProviderMetadata = response.json().await.map_err(|e| {
        tracing::error!(target: "oidc.provider.discovery", error = %e, "Failed to parse discovery document");
        ProviderError::InvalidDiscovery(e.to_string())
    })?;

    if metadata.issuer != issuer {
        tracing::error!(
            target: "oidc.provider.discovery",
            expected = %issuer,
            actual = %metadata.issuer,
            "Discovery document names a different issuer"
        );
        return Err(ProviderError::IssuerMismatch {
            expected: issuer.to_string(),
            actual: metadata.issuer,
        });
    }

    Ok(metadata)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn serve_document(body: serde_json::Value) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_fetch_provider_metadata() {
        let server = MockServer::start().await;
        let issuer = server.uri();
        Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": issuer,
                "jwks_uri": format!("{issuer}/keys"),
                "id_token_signing_alg_values_supported": ["RS256", "EdDSA"],
                "token_endpoint": format!("{issuer}/token"),
            })))
            .mount(&server)
            .await;

        let metadata = fetch_provider_metadata(&reqwest::Client::new(), &issuer)
            .await
            .unwrap();

        assert_eq!(metadata.issuer, issuer);
        assert_eq!(metadata.jwks_uri, format!("{issuer}/keys"));
        assert_eq!(
            metadata.id_token_signing_alg_values_supported,
            vec!["RS256".to_string(), "EdDSA".to_string()]
        );
    }

    #[test]
    fn test_signing_algorithms_drops_unusable_names() {
        let metadata = ProviderMetadata {
            issuer: "https://idp.example".to_string(),
            jwks_uri: "https://idp.example/keys".to_string(),
            id_token_signing_alg_values_supported: ["RS256", "HS256", "none", "ES256", "XYZ"]
                .map(String::from)
                .to_vec(),
        };

        assert_eq!(
            metadata.signing_algorithms(),
            vec![Algorithm::RS256, Algorithm::ES256]
        );
    }

    #[tokio::test]
    async fn test_issuer_mismatch() {
        let server = serve_document(json!({
            "issuer": "https://someone-else.example",
            "jwks_uri": "https://someone-else.example/keys",
        }))
        .await;

        let result = fetch_provider_metadata(&reqwest::Client::new(), &server.uri()).await;

        assert!(matches!(result, Err(ProviderError::IssuerMismatch { .. })));
    }

    #[tokio::test]
    async fn test_missing_jwks_uri() {
        let server = MockServer::start().await;
        let issuer = server.uri();
        Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "issuer": issuer })))
            .mount(&server)
            .await;

        let result = fetch_provider_metadata(&reqwest::Client::new(), &issuer).await;

        assert!(matches!(result, Err(ProviderError::InvalidDiscovery(_))));
    }

    #[tokio::test]
    async fn test_not_found() {
        let server = MockServer::start().await;

        let result = fetch_provider_metadata(&reqwest::Client::new(), &server.uri()).await;

        assert!(matches!(result, Err(ProviderError::DiscoveryUnavailable(_))));
    }
}

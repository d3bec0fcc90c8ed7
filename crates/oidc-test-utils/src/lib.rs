//! # OIDC Test Utilities
//!
//! Shared test utilities for `oidc-grpc`.
//!
//! This crate provides:
//! - Deterministic crypto fixtures (seeded Ed25519 keys, fixed RSA and P-256
//!   keys, signed tokens, JWKs)
//! - Claim builders (TestTokenBuilder)
//! - A fake verifying client with a fixed answer (FakeVerifier)
//! - A wiremock-backed OIDC provider (MockOidcProvider)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use oidc_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let keypair = TestKeypair::new(1, TEST_KID);
//!     let provider = MockOidcProvider::start(&[&keypair]).await;
//!
//!     let claims = TestTokenBuilder::new()
//!         .issued_by(provider.issuer())
//!         .for_user("alice")
//!         .build();
//!     let token = keypair.sign_token(&claims);
//! }
//! ```

pub mod crypto_fixtures;
pub mod fake_verifier;
pub mod mock_provider;
pub mod token_builders;

// Re-export commonly used items
pub use crypto_fixtures::*;
pub use fake_verifier::*;
pub use mock_provider::*;
pub use token_builders::*;

/// Client ID used as the expected audience in tests.
pub const TEST_CLIENT_ID: &str = "test-client";

/// Key ID of the default test signing key.
pub const TEST_KID: &str = "test-key-01";

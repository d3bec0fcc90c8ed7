//! Fake verifying client for tests that do not need real signatures.

use async_trait::async_trait;
use oidc_grpc::{Jwt, JwtVerifier, VerifyError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A [`JwtVerifier`] with a fixed answer.
///
/// Records every token it was asked about so tests can assert on what reached
/// the verifier.
pub struct FakeVerifier {
    answer: Result<(), VerifyError>,
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
}

impl FakeVerifier {
    /// Accepts every token.
    pub fn accepting() -> Self {
        Self::with_answer(Ok(()))
    }

    /// Rejects every token with `reason`.
    pub fn rejecting(reason: &str) -> Self {
        Self::with_answer(Err(VerifyError::Rejected(reason.to_string())))
    }

    /// Cannot decide on any token.
    pub fn unavailable(reason: &str) -> Self {
        Self::with_answer(Err(VerifyError::Unavailable(reason.to_string())))
    }

    fn with_answer(answer: Result<(), VerifyError>) -> Self {
        Self {
            answer,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Number of verification requests received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Encoded tokens received, in order.
    pub fn seen_tokens(&self) -> Vec<String> {
        self.seen.lock().expect("seen lock poisoned").clone()
    }
}

#[async_trait]
impl JwtVerifier for FakeVerifier {
    async fn verify_jwt(&self, jwt: &Jwt) -> Result<(), VerifyError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen
            .lock()
            .expect("seen lock poisoned")
            .push(jwt.encode().to_string());
        self.answer.clone()
    }
}

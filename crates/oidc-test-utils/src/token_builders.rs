//! Builder patterns for test claim sets

use crate::TEST_CLIENT_ID;
use chrono::{Duration, Utc};
use serde_json::{Map, Value};

/// Builder for creating test ID token claims
///
/// # Example
/// ```rust,ignore
/// let claims = TestTokenBuilder::new()
///     .issued_by("https://idp.example")
///     .for_user("alice")
///     .with_email("alice@example.com")
///     .expires_in(3600)
///     .build();
/// ```
pub struct TestTokenBuilder {
    iss: String,
    sub: Option<String>,
    aud: Value,
    email: Option<String>,
    name: Option<String>,
    exp: Option<i64>,
    iat: i64,
    nbf: Option<i64>,
}

impl TestTokenBuilder {
    /// Create a new builder with defaults: one hour of validity, audience
    /// [`TEST_CLIENT_ID`].
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            iss: "https://idp.example".to_string(),
            sub: Some("test-subject".to_string()),
            aud: Value::String(TEST_CLIENT_ID.to_string()),
            email: None,
            name: None,
            exp: Some((now + Duration::seconds(3600)).timestamp()),
            iat: now.timestamp(),
            nbf: None,
        }
    }

    /// Set the issuer
    pub fn issued_by(mut self, issuer: &str) -> Self {
        self.iss = issuer.to_string();
        self
    }

    /// Set the subject
    pub fn for_user(mut self, subject: &str) -> Self {
        self.sub = Some(subject.to_string());
        self
    }

    /// Drop the subject claim
    pub fn without_subject(mut self) -> Self {
        self.sub = None;
        self
    }

    /// Set a single audience
    pub fn for_audience(mut self, audience: &str) -> Self {
        self.aud = Value::String(audience.to_string());
        self
    }

    /// Set several audiences
    pub fn for_audiences(mut self, audiences: &[&str]) -> Self {
        self.aud = Value::Array(
            audiences
                .iter()
                .map(|aud| Value::String((*aud).to_string()))
                .collect(),
        );
        self
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// Set expiration in seconds from now (negative for an expired token)
    pub fn expires_in(mut self, seconds: i64) -> Self {
        self.exp = Some((Utc::now() + Duration::seconds(seconds)).timestamp());
        self
    }

    /// Drop the expiration claim
    pub fn without_expiry(mut self) -> Self {
        self.exp = None;
        self
    }

    /// Set issued-at timestamp
    pub fn issued_at(mut self, timestamp: i64) -> Self {
        self.iat = timestamp;
        self
    }

    /// Set not-before in seconds from now
    pub fn not_before_in(mut self, seconds: i64) -> Self {
        self.nbf = Some((Utc::now() + Duration::seconds(seconds)).timestamp());
        self
    }

    /// Build the claims as a JSON value
    pub fn build(self) -> Value {
        let mut claims = Map::new();
        claims.insert("iss".to_string(), Value::String(self.iss));
        claims.insert("aud".to_string(), self.aud);
        claims.insert("iat".to_string(), Value::from(self.iat));

        if let Some(sub) = self.sub {
            claims.insert("sub".to_string(), Value::String(sub));
        }
        if let Some(email) = self.email {
            claims.insert("email".to_string(), Value::String(email));
        }
        if let Some(name) = self.name {
            claims.insert("name".to_string(), Value::String(name));
        }
        if let Some(exp) = self.exp {
            claims.insert("exp".to_string(), Value::from(exp));
        }
        if let Some(nbf) = self.nbf {
            claims.insert("nbf".to_string(), Value::from(nbf));
        }

        Value::Object(claims)
    }
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

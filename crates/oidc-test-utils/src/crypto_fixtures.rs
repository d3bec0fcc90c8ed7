//! Deterministic cryptographic fixtures for testing
//!
//! Provides reproducible Ed25519 keypairs, their JWKs, and tokens signed with
//! them. All fixtures are deterministic based on seed values.
//!
//! RSA and P-256 keys cannot be derived from a seed with `ring`, so those are
//! fixed PEM files checked in under `fixtures/`.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use ring::signature::{Ed25519KeyPair, KeyPair};
use serde_json::{json, Value};

/// Ed25519 keypair with a key ID, as an OIDC provider would publish it.
#[derive(Clone)]
pub struct TestKeypair {
    pub kid: String,
    pub public_key_bytes: Vec<u8>,
    pub private_key_pkcs8: Vec<u8>,
}

impl TestKeypair {
    /// Generate a deterministic keypair.
    ///
    /// The same seed always produces the same keypair.
    pub fn new(seed: u8, kid: &str) -> Self {
        let seed_bytes = seed_bytes(seed);

        let key_pair = Ed25519KeyPair::from_seed_unchecked(&seed_bytes)
            .expect("Failed to create test keypair");

        Self {
            kid: kid.to_string(),
            public_key_bytes: key_pair.public_key().as_ref().to_vec(),
            private_key_pkcs8: build_pkcs8_from_seed(&seed_bytes),
        }
    }

    /// Sign `claims` as an EdDSA token with this key's `kid` in the header.
    pub fn sign_token(&self, claims: &Value) -> String {
        let mut header = Header::new(Algorithm::EdDSA);
        header.typ = Some("JWT".to_string());
        header.kid = Some(self.kid.clone());

        self.sign_with_header(&header, claims)
    }

    /// Sign `claims` without a `kid`, forcing the verifier to try every key.
    pub fn sign_token_without_kid(&self, claims: &Value) -> String {
        self.sign_with_header(&Header::new(Algorithm::EdDSA), claims)
    }

    fn sign_with_header(&self, header: &Header, claims: &Value) -> String {
        let encoding_key = EncodingKey::from_ed_der(&self.private_key_pkcs8);
        encode(header, claims, &encoding_key).expect("Failed to sign token")
    }

    /// This key as a JWKS entry.
    pub fn jwk_json(&self) -> Value {
        json!({
            "kty": "OKP",
            "kid": self.kid,
            "crv": "Ed25519",
            "x": URL_SAFE_NO_PAD.encode(&self.public_key_bytes),
            "alg": "EdDSA",
            "use": "sig"
        })
    }
}

const RSA_PRIVATE_PEM: &str = include_str!("fixtures/rsa_private.pem");
const RSA_MODULUS: &str = "4kj5FVkLDsAs5cqqjkKKwRIqNsHWjLhpnuYuoQlZ2w2BpIZVkJeRiyX5cSwbojxHhOHYOPoZcNQU0rQBh2nc9q_KqbuEc-BsPcOF9Kf5etadNZ1B-lXFOINkiaJcCrL_9WYAOMbBDwhZ6s9Lt-SZqUbB9jSCI_IyO_VAA6xOuWiB-f1RzBHknVNzcufNU8HTK0q--TAWN0NB75NXl1YW9mLnKxaAFiDr0MHDi6xDKtzkQen4cmmYQ98hoXRDCuEZtWmjlozEVPi7yyPQKiNUJl1ZuKrjPn_dC3KWHN3y4twVcLumfzL-IkXALweQCpX_SENYB10gqW93tNyrPXm83Q";
const RSA_EXPONENT: &str = "AQAB";

const EC_PRIVATE_PEM: &str = include_str!("fixtures/ec_private.pem");
const EC_X: &str = "7rpEx2hdJ0yV-WtF9H7RfYEtFeqeRCaZwtEE3ZiRCBU";
const EC_Y: &str = "Q-y0Cn7rrdSLXQ5oFofX0MD4chALD84htk-HqwHqHFI";

/// Fixed RSA (RS256) or P-256 (ES256) key with a key ID.
#[derive(Clone)]
pub struct TestPemKey {
    pub kid: String,
    pub algorithm: Algorithm,
}

impl TestPemKey {
    /// The fixed 2048-bit RSA key, signing RS256.
    pub fn rsa(kid: &str) -> Self {
        Self {
            kid: kid.to_string(),
            algorithm: Algorithm::RS256,
        }
    }

    /// The fixed P-256 key, signing ES256.
    pub fn ec(kid: &str) -> Self {
        Self {
            kid: kid.to_string(),
            algorithm: Algorithm::ES256,
        }
    }

    /// Sign `claims` with this key's algorithm and `kid` in the header.
    pub fn sign_token(&self, claims: &Value) -> String {
        let mut header = Header::new(self.algorithm);
        header.typ = Some("JWT".to_string());
        header.kid = Some(self.kid.clone());

        encode(&header, claims, &self.encoding_key()).expect("Failed to sign token")
    }

    fn encoding_key(&self) -> EncodingKey {
        match self.algorithm {
            Algorithm::ES256 => EncodingKey::from_ec_pem(EC_PRIVATE_PEM.as_bytes()),
            _ => EncodingKey::from_rsa_pem(RSA_PRIVATE_PEM.as_bytes()),
        }
        .expect("Failed to load fixture key")
    }

    /// This key as a JWKS entry.
    pub fn jwk_json(&self) -> Value {
        match self.algorithm {
            Algorithm::ES256 => json!({
                "kty": "EC",
                "kid": self.kid,
                "crv": "P-256",
                "x": EC_X,
                "y": EC_Y,
                "alg": "ES256",
                "use": "sig"
            }),
            _ => json!({
                "kty": "RSA",
                "kid": self.kid,
                "n": RSA_MODULUS,
                "e": RSA_EXPONENT,
                "alg": "RS256",
                "use": "sig"
            }),
        }
    }
}

/// Sign `claims` with a shared secret (HS256), using `kid` in the header.
///
/// Verifiers that only trust published asymmetric keys must reject these.
pub fn sign_hs256_token(secret: &[u8], kid: &str, claims: &Value) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(kid.to_string());

    encode(&header, claims, &EncodingKey::from_secret(secret)).expect("Failed to sign token")
}

fn seed_bytes(seed: u8) -> [u8; 32] {
    let mut seed_bytes = [0u8; 32];
    seed_bytes[0] = seed;
    for (i, byte) in seed_bytes.iter_mut().enumerate().skip(1) {
        *byte = seed.wrapping_mul(i as u8).wrapping_add(i as u8);
    }
    seed_bytes
}

/// Build PKCS#8 v1 document from Ed25519 seed.
///
/// Ring does not expose PKCS#8 for a seeded keypair, so it is assembled here.
fn build_pkcs8_from_seed(seed: &[u8; 32]) -> Vec<u8> {
    let mut pkcs8 = Vec::with_capacity(48);

    // SEQUENCE, 46 bytes
    pkcs8.extend_from_slice(&[0x30, 0x2e]);
    // version INTEGER 0
    pkcs8.extend_from_slice(&[0x02, 0x01, 0x00]);
    // AlgorithmIdentifier SEQUENCE { OID 1.3.101.112 }
    pkcs8.extend_from_slice(&[0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70]);
    // privateKey OCTET STRING { OCTET STRING seed }
    pkcs8.extend_from_slice(&[0x04, 0x22, 0x04, 0x20]);
    pkcs8.extend_from_slice(seed);

    pkcs8
}

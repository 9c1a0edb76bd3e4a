// ABOUTME: PKCE (Proof Key for Code Exchange) implementation for the Google OAuth flow
// ABOUTME: Generates random verifiers and state nonces and derives S256 challenges per RFC 7636

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::oauth::types::PkceChallenge;

/// Number of random bytes behind a verifier or state nonce
const RANDOM_BYTES: usize = 32;

impl PkceChallenge {
    /// Generate a fresh verifier and its S256 challenge
    pub fn generate() -> Self {
        let code_verifier = generate_verifier();
        let code_challenge = derive_challenge(&code_verifier);

        Self {
            code_verifier,
            code_challenge,
            code_challenge_method: "S256".to_string(),
        }
    }
}

/// Generate a code verifier: URL-safe base64 (no padding) of 32 random bytes.
///
/// The result is always 43 characters from the unreserved set, which sits
/// inside the 43-128 range RFC 7636 requires.
pub fn generate_verifier() -> String {
    random_url_safe()
}

/// Generate an unguessable state nonce for CSRF protection
pub fn generate_state() -> String {
    random_url_safe()
}

/// Derive the S256 code challenge for a verifier.
///
/// Hashes the ASCII bytes of the encoded verifier string, not the raw random
/// bytes behind it, as RFC 7636 section 4.2 defines.
pub fn derive_challenge(verifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Verify that a code verifier matches a code challenge
///
/// This is what the authorization server does at exchange time; useful for
/// tests and diagnostics.
pub fn verify_pkce_challenge(verifier: &str, challenge: &str) -> bool {
    derive_challenge(verifier) == challenge
}

fn random_url_safe() -> String {
    let mut bytes = [0u8; RANDOM_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

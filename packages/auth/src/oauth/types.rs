// ABOUTME: Core type definitions for Google Calendar authentication
// ABOUTME: Includes the persisted token record, PKCE challenge, and token endpoint payloads

use serde::{Deserialize, Serialize};

/// The three persisted values behind every authenticated call.
///
/// Values are kept as the raw strings the store holds; the expiry in
/// particular may be missing or unparsable and is only interpreted on read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenRecord {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<String>, // Epoch milliseconds, decimal
}

impl TokenRecord {
    /// Expiry as epoch milliseconds, if present and numeric
    pub fn expires_at_ms(&self) -> Option<i64> {
        self.expires_at.as_deref()?.trim().parse::<i64>().ok()
    }

    /// The access token if it is non-empty and its expiry lies strictly after `now_ms`
    pub fn valid_access_token_at(&self, now_ms: i64) -> Option<&str> {
        let token = self.access_token.as_deref().filter(|t| !t.is_empty())?;
        let expires_at = self.expires_at_ms()?;
        if expires_at > now_ms {
            Some(token)
        } else {
            None
        }
    }

    pub fn is_valid_at(&self, now_ms: i64) -> bool {
        self.valid_access_token_at(now_ms).is_some()
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// PKCE challenge for OAuth flow
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    pub code_verifier: String,
    pub code_challenge: String,
    pub code_challenge_method: String, // Always "S256"
}

/// Code exchange body sent to the broker, which adds the client secret itself
#[derive(Debug, Serialize, Deserialize)]
pub struct BrokerTokenRequest {
    pub client_id: String,
    pub code_verifier: String,
    pub code: String,
    pub state: String,
}

/// Form body for the authorization_code grant against Google directly
#[derive(Debug, Serialize)]
pub struct AuthorizationCodeForm {
    pub grant_type: String, // "authorization_code"
    pub client_id: String,
    pub client_secret: String,
    pub code_verifier: String,
    pub code: String,
    pub state: String,
    pub redirect_uri: String,
}

/// Refresh grant body; JSON for the broker, form-encoded for Google
#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshTokenRequest {
    pub grant_type: String, // "refresh_token"
    pub client_id: String,
    pub client_secret: Option<String>,
    pub refresh_token: String,
}

/// Token payload returned by Google or the broker.
///
/// Every field is optional: the broker relays whatever Google returned and a
/// refresh response never carries a refresh token.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>, // Seconds
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Absolute expiry for a token issued at `now_ms`.
    ///
    /// `None` when `expires_in` is missing, not positive, or out of range.
    pub fn expires_at_ms(&self, now_ms: i64) -> Option<i64> {
        self.expires_in
            .filter(|secs| *secs > 0)
            .and_then(|secs| secs.checked_mul(1000))
            .and_then(|ms| now_ms.checked_add(ms))
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|t| !t.is_empty())
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }
}

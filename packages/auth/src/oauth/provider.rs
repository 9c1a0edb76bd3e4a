// ABOUTME: Google OAuth endpoint definitions, scopes, and the public client used via the broker
// ABOUTME: Builds the consent-screen authorization URL carrying the PKCE challenge and state

use url::Url;

use crate::{
    error::{AuthError, AuthResult},
    oauth::types::PkceChallenge,
};

/// Fixed local port registered as the redirect URI with Google
pub const CALLBACK_PORT: u16 = 42813;

/// Path the browser is redirected to after consent
pub const CALLBACK_PATH: &str = "/callback";

/// Client id shared by everyone who logs in through the broker
pub const PUBLIC_CLIENT_ID: &str =
    "783376961232-v90b17gr1mj1s2mnmdauvkp77u6htpke.apps.googleusercontent.com";

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Broker paths, relative to the configured broker base URL
pub const BROKER_TOKEN_PATH: &str = "/api/google/token";
pub const BROKER_REFRESH_PATH: &str = "/api/google/refresh";

/// Scopes requested at consent time
pub const SCOPES: &[&str] = &[
    "email",
    "profile",
    "https://www.googleapis.com/auth/calendar",
];

/// Redirect URI for a listener on `port`
pub fn callback_url(port: u16) -> String {
    format!("http://localhost:{}{}", port, CALLBACK_PATH)
}

/// Authorization and token endpoints of the authorization server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleEndpoints {
    pub auth_url: String,
    pub token_url: String,
}

impl Default for GoogleEndpoints {
    fn default() -> Self {
        Self {
            auth_url: GOOGLE_AUTH_URL.to_string(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
        }
    }
}

impl GoogleEndpoints {
    pub fn new(auth_url: impl Into<String>, token_url: impl Into<String>) -> Self {
        Self {
            auth_url: auth_url.into(),
            token_url: token_url.into(),
        }
    }

    /// Build the consent URL with PKCE challenge, state, and offline access
    pub fn authorization_url(
        &self,
        client_id: &str,
        redirect_uri: &str,
        state: &str,
        pkce: &PkceChallenge,
    ) -> AuthResult<String> {
        let mut url = Url::parse(&self.auth_url)
            .map_err(|e| AuthError::Configuration(format!("Invalid auth URL: {}", e)))?;

        url.query_pairs_mut()
            .append_pair("client_id", client_id)
            .append_pair("response_type", "code")
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("prompt", "consent")
            .append_pair("access_type", "offline")
            .append_pair("state", state)
            .append_pair("code_challenge", &pkce.code_challenge)
            .append_pair("code_challenge_method", &pkce.code_challenge_method)
            .append_pair("scope", &SCOPES.join(" "));

        Ok(url.to_string())
    }
}

/// Join a broker base URL and one of the broker paths
pub fn broker_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

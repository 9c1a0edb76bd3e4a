// ABOUTME: HTTP contract with the token endpoint for code exchange and refresh
// ABOUTME: Talks JSON to the hosted broker or form-encoded requests to Google directly

use std::time::Duration;

use reqwest::{Client, Response};
use tracing::{debug, error, warn};

use crate::{
    error::{AuthError, AuthResult},
    oauth::{
        provider::{broker_url, GoogleEndpoints, BROKER_REFRESH_PATH, BROKER_TOKEN_PATH},
        settings::ClientMode,
        types::{AuthorizationCodeForm, BrokerTokenRequest, RefreshTokenRequest, TokenResponse},
    },
};

/// Upper bound for one token endpoint round trip; refreshes hold a lock across it
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Token endpoint client
#[derive(Clone)]
pub struct TokenExchange {
    client: Client,
    endpoints: GoogleEndpoints,
}

impl Default for TokenExchange {
    fn default() -> Self {
        Self::new(GoogleEndpoints::default())
    }
}

impl TokenExchange {
    pub fn new(endpoints: GoogleEndpoints) -> Self {
        Self {
            client: build_client(REQUEST_TIMEOUT),
            endpoints,
        }
    }

    pub fn with_client(client: Client, endpoints: GoogleEndpoints) -> Self {
        Self { client, endpoints }
    }

    pub fn endpoints(&self) -> &GoogleEndpoints {
        &self.endpoints
    }

    /// Exchange an authorization code for tokens
    pub async fn exchange_code(
        &self,
        mode: &ClientMode,
        code: &str,
        code_verifier: &str,
        state: &str,
        redirect_uri: &str,
    ) -> AuthResult<TokenResponse> {
        let request = match mode {
            ClientMode::Broker { server } => {
                let url = broker_url(server, BROKER_TOKEN_PATH);
                debug!("Exchanging authorization code through broker {}", url);
                self.client.post(url).json(&BrokerTokenRequest {
                    client_id: mode.client_id().to_string(),
                    code_verifier: code_verifier.to_string(),
                    code: code.to_string(),
                    state: state.to_string(),
                })
            }
            ClientMode::Custom {
                client_id,
                client_secret,
            } => {
                debug!("Exchanging authorization code with {}", self.endpoints.token_url);
                self.client
                    .post(&self.endpoints.token_url)
                    .form(&AuthorizationCodeForm {
                        grant_type: "authorization_code".to_string(),
                        client_id: client_id.clone(),
                        client_secret: client_secret.clone(),
                        code_verifier: code_verifier.to_string(),
                        code: code.to_string(),
                        state: state.to_string(),
                        redirect_uri: redirect_uri.to_string(),
                    })
            }
        };

        let response = request
            .send()
            .await
            .map_err(|e| AuthError::Network(format!("Failed to exchange code: {}", e)))?;

        read_token_response(response, "Token exchange").await
    }

    /// Mint a new access token from a refresh token
    pub async fn refresh(&self, mode: &ClientMode, refresh_token: &str) -> AuthResult<TokenResponse> {
        let body = RefreshTokenRequest {
            grant_type: "refresh_token".to_string(),
            client_id: mode.client_id().to_string(),
            client_secret: match mode {
                ClientMode::Broker { .. } => None,
                ClientMode::Custom { client_secret, .. } => Some(client_secret.clone()),
            },
            refresh_token: refresh_token.to_string(),
        };

        let request = match mode {
            ClientMode::Broker { server } => self
                .client
                .post(broker_url(server, BROKER_REFRESH_PATH))
                .json(&body),
            ClientMode::Custom { .. } => self.client.post(&self.endpoints.token_url).form(&body),
        };

        let response = request
            .send()
            .await
            .map_err(|e| AuthError::Network(format!("Failed to refresh token: {}", e)))?;

        read_token_response(response, "Token refresh").await
    }
}

fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .unwrap_or_else(|e| {
            warn!("Failed to build HTTP client, using defaults: {}", e);
            Client::new()
        })
}

/// Check status and parse the body; an empty body is its own error
async fn read_token_response(response: Response, operation: &str) -> AuthResult<TokenResponse> {
    let status = response.status();
    if !status.is_success() {
        // Don't leak full response body - only log status for security
        error!("{} failed with status {}", operation, status);
        return Err(AuthError::TokenExchange(format!(
            "{} failed with status {}",
            operation, status
        )));
    }

    let body = response.text().await?;
    if body.trim().is_empty() {
        error!("{} returned an empty body", operation);
        return Err(AuthError::EmptyResponse);
    }

    serde_json::from_str(&body).map_err(|e| {
        AuthError::TokenExchange(format!("Failed to parse token response: {}", e))
    })
}

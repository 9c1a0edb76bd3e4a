// ABOUTME: Error types for Google Calendar authentication
// ABOUTME: Covers configuration gaps, callback validation, token exchange and refresh failures

use thiserror::Error;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Authentication is not configured: {0}")]
    NotConfigured(String),

    #[error("OAuth authentication failed: {0}")]
    OAuthFailed(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Callback server error: {0}")]
    CallbackServer(String),

    #[error("Failed to open browser: {0}")]
    BrowserOpen(String),

    #[error("State mismatch: CSRF protection failed")]
    StateMismatch,

    #[error("Token endpoint returned an empty response")]
    EmptyResponse,

    #[error("Token response did not contain a refresh token")]
    MissingRefreshToken,

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    #[error("Login was not completed within {0} seconds")]
    LoginTimedOut(u64),

    #[error("Login was cancelled")]
    LoginCancelled,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AuthError {
    pub fn not_configured(msg: impl Into<String>) -> Self {
        Self::NotConfigured(msg.into())
    }

    /// Whether the error means the user has to finish setup or log in again,
    /// as opposed to a transient failure worth retrying later.
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::NotConfigured(_) | Self::MissingRefreshToken)
    }
}

// ABOUTME: Google Calendar authentication library for the desktop client
// ABOUTME: OAuth2 PKCE login through a localhost callback plus access token refresh

pub mod error;
pub mod oauth;

// Re-export main types
pub use error::{AuthError, AuthResult};
pub use oauth::{
    AuthManager, AuthSettings, AuthStatus, LoginAttempt, LoginStatus, MemoryTokenStore,
    SqliteTokenStore, TokenRecord, TokenStore,
};

// ABOUTME: Authentication settings consumed from the environment
// ABOUTME: Resolves broker vs custom-client mode and validates that login can be attempted

use std::env;
use std::time::Duration;

use gcal_config::constants;

use crate::{
    error::{AuthError, AuthResult},
    oauth::provider::{CALLBACK_PORT, PUBLIC_CLIENT_ID},
};

/// Abandoned logins are torn down after this long
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 300;

/// Settings that drive the login flow and token refresh
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub use_custom_client: bool,
    pub google_client_id: String,
    pub google_client_secret: String,
    pub google_oauth_server: String,
    pub callback_port: u16,
    pub session_timeout: Duration,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            use_custom_client: false,
            google_client_id: String::new(),
            google_client_secret: String::new(),
            google_oauth_server: String::new(),
            callback_port: CALLBACK_PORT,
            session_timeout: Duration::from_secs(DEFAULT_SESSION_TIMEOUT_SECS),
        }
    }
}

/// Which party holds the client secret
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMode {
    /// The hosted broker adds the shared secret; we only know the public client id
    Broker { server: String },
    /// The user registered their own OAuth client and talks to Google directly
    Custom {
        client_id: String,
        client_secret: String,
    },
}

impl ClientMode {
    pub fn client_id(&self) -> &str {
        match self {
            Self::Broker { .. } => PUBLIC_CLIENT_ID,
            Self::Custom { client_id, .. } => client_id,
        }
    }
}

impl AuthSettings {
    /// Load settings from process environment variables
    pub fn from_env() -> AuthResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load settings through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> AuthResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let use_custom_client = match lookup(constants::GCAL_USE_CUSTOM_CLIENT) {
            Some(value) => parse_bool(&value).ok_or_else(|| {
                AuthError::Configuration(format!(
                    "{} must be true or false, got '{}'",
                    constants::GCAL_USE_CUSTOM_CLIENT,
                    value
                ))
            })?,
            None => defaults.use_custom_client,
        };

        let callback_port = match lookup(constants::GCAL_CALLBACK_PORT) {
            Some(value) => value.trim().parse::<u16>().map_err(|e| {
                AuthError::Configuration(format!("Invalid callback port '{}': {}", value, e))
            })?,
            None => defaults.callback_port,
        };

        let session_timeout = match lookup(constants::GCAL_LOGIN_TIMEOUT_SECS) {
            Some(value) => {
                let secs = value.trim().parse::<u64>().map_err(|e| {
                    AuthError::Configuration(format!("Invalid login timeout '{}': {}", value, e))
                })?;
                if secs == 0 {
                    return Err(AuthError::Configuration(
                        "Login timeout must be at least one second".to_string(),
                    ));
                }
                Duration::from_secs(secs)
            }
            None => defaults.session_timeout,
        };

        Ok(Self {
            use_custom_client,
            google_client_id: lookup(constants::GCAL_GOOGLE_CLIENT_ID).unwrap_or_default(),
            google_client_secret: lookup(constants::GCAL_GOOGLE_CLIENT_SECRET)
                .unwrap_or_default(),
            google_oauth_server: lookup(constants::GCAL_OAUTH_SERVER).unwrap_or_default(),
            callback_port,
            session_timeout,
        })
    }

    /// Resolve the client mode, trimming user-supplied values.
    ///
    /// Fails with `NotConfigured` when the selected mode lacks what it needs.
    pub fn client_mode(&self) -> AuthResult<ClientMode> {
        if self.use_custom_client {
            let client_id = self.google_client_id.trim();
            let client_secret = self.google_client_secret.trim();
            if client_id.is_empty() || client_secret.is_empty() {
                return Err(AuthError::not_configured(
                    "custom client mode needs a client id and client secret",
                ));
            }
            Ok(ClientMode::Custom {
                client_id: client_id.to_string(),
                client_secret: client_secret.to_string(),
            })
        } else {
            let server = self.google_oauth_server.trim();
            if server.is_empty() {
                return Err(AuthError::not_configured("no OAuth broker server is set"));
            }
            Ok(ClientMode::Broker {
                server: server.to_string(),
            })
        }
    }

    pub fn is_complete(&self) -> bool {
        self.client_mode().is_ok()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

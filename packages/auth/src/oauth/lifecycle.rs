// ABOUTME: Access token lifecycle: validity checks, on-demand refresh, and token persistence
// ABOUTME: Serializes refreshes so overlapping callers share a single refresh request

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::{
    error::{AuthError, AuthResult},
    oauth::{
        exchange::TokenExchange,
        notify::Notifier,
        settings::{AuthSettings, ClientMode},
        storage::{TokenKey, TokenStore},
        types::TokenResponse,
    },
};

/// Notice shown when a refresh attempt fails
pub const REFRESH_FAILED_NOTICE: &str = "Error while refreshing authentication";

pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Keeps a usable access token available for API calls
pub struct TokenLifecycle {
    store: Arc<dyn TokenStore>,
    exchange: TokenExchange,
    settings: AuthSettings,
    notifier: Arc<dyn Notifier>,
    refresh_guard: Mutex<()>,
}

impl TokenLifecycle {
    pub fn new(
        store: Arc<dyn TokenStore>,
        exchange: TokenExchange,
        settings: AuthSettings,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            exchange,
            settings,
            notifier,
            refresh_guard: Mutex::new(()),
        }
    }

    /// The cached access token, if present and not yet expired.
    ///
    /// Never fails: a storage error reads as "no valid token".
    pub async fn get_valid_access_token(&self) -> Option<String> {
        match self.store.load_record().await {
            Ok(record) => record.valid_access_token_at(now_ms()).map(str::to_string),
            Err(e) => {
                warn!("Could not read token store: {}", e);
                None
            }
        }
    }

    /// Return a valid access token, refreshing it if needed.
    ///
    /// Short-circuits with `NotConfigured` and no network I/O when settings are
    /// incomplete or no refresh token has been stored yet.
    pub async fn ensure_access_token(&self) -> AuthResult<String> {
        let mode = self.settings.client_mode()?;

        let record = self.store.load_record().await?;
        if !record.has_refresh_token() {
            return Err(AuthError::not_configured("not logged in to Google"));
        }

        if let Some(token) = record.valid_access_token_at(now_ms()) {
            return Ok(token.to_string());
        }

        debug!("Access token missing or expired, refreshing");
        self.refresh_serialized(&mode, true).await
    }

    /// Refresh the access token unconditionally
    pub async fn refresh(&self) -> AuthResult<String> {
        let mode = self.settings.client_mode()?;
        self.refresh_serialized(&mode, false).await
    }

    /// Persist the tokens from a successful code exchange.
    ///
    /// A response without a refresh token is rejected and nothing is written.
    pub async fn store_exchanged_tokens(&self, response: &TokenResponse) -> AuthResult<()> {
        let refresh_token = response
            .refresh_token()
            .ok_or(AuthError::MissingRefreshToken)?;
        let (access_token, expires_at) = access_and_expiry(response)
            .map_err(AuthError::TokenExchange)?;

        self.store
            .set_many(&[
                (TokenKey::RefreshToken, refresh_token.to_string()),
                (TokenKey::AccessToken, access_token),
                (TokenKey::ExpirationTime, expires_at.to_string()),
            ])
            .await?;

        info!("✅ Stored Google tokens");
        Ok(())
    }

    /// Remove every stored token.
    ///
    /// Waits for an in-flight refresh so it cannot write a token back afterwards.
    pub async fn clear(&self) -> AuthResult<()> {
        let _guard = self.refresh_guard.lock().await;
        self.store.clear().await
    }

    async fn refresh_serialized(&self, mode: &ClientMode, reuse_fresh: bool) -> AuthResult<String> {
        let _guard = self.refresh_guard.lock().await;

        let record = self.store.load_record().await?;

        // Another caller may have refreshed while we waited on the guard
        if reuse_fresh {
            if let Some(token) = record.valid_access_token_at(now_ms()) {
                debug!("Using access token refreshed by a concurrent caller");
                return Ok(token.to_string());
            }
        }

        let refresh_token = record
            .refresh_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthError::not_configured("no refresh token stored"))?;

        match self.request_refresh(mode, &refresh_token).await {
            Ok(token) => {
                info!("✅ Refreshed Google access token");
                Ok(token)
            }
            Err(e) => {
                error!("Failed to refresh access token: {}", e);
                self.notifier.notify(REFRESH_FAILED_NOTICE);
                Err(e)
            }
        }
    }

    async fn request_refresh(&self, mode: &ClientMode, refresh_token: &str) -> AuthResult<String> {
        let response = self.exchange.refresh(mode, refresh_token).await?;
        let (access_token, expires_at) =
            access_and_expiry(&response).map_err(AuthError::RefreshFailed)?;

        // The refresh token is left as is
        self.store
            .set_many(&[
                (TokenKey::AccessToken, access_token.clone()),
                (TokenKey::ExpirationTime, expires_at.to_string()),
            ])
            .await?;

        Ok(access_token)
    }
}

fn access_and_expiry(response: &TokenResponse) -> Result<(String, i64), String> {
    let access_token = response
        .access_token()
        .ok_or_else(|| "response has no access_token".to_string())?;
    let expires_at = response
        .expires_at_ms(now_ms())
        .ok_or_else(|| "response has no usable expires_in".to_string())?;
    Ok((access_token.to_string(), expires_at))
}

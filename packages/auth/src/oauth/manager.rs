// ABOUTME: Auth manager orchestrating Google login, logout, token access, and status
// ABOUTME: Owns the session slot, token store, token endpoint client, and UI seams

use std::sync::Arc;

use tracing::info;

use crate::{
    error::AuthResult,
    oauth::{
        exchange::TokenExchange,
        lifecycle::{now_ms, TokenLifecycle},
        notify::{BrowserLauncher, Notifier, SystemBrowser, TracingNotifier},
        provider::GoogleEndpoints,
        session::{AuthorizationSession, LoginAttempt, SessionDeps, SessionInfo},
        settings::AuthSettings,
        storage::{SqliteTokenStore, TokenStore},
    },
};

/// Authentication manager for the Google Calendar client
pub struct AuthManager {
    settings: AuthSettings,
    store: Arc<dyn TokenStore>,
    exchange: TokenExchange,
    lifecycle: Arc<TokenLifecycle>,
    session: AuthorizationSession,
    notifier: Arc<dyn Notifier>,
    browser: Arc<dyn BrowserLauncher>,
}

impl AuthManager {
    /// Manager with Google's endpoints, the system browser, and log notices
    pub fn new(settings: AuthSettings, store: Arc<dyn TokenStore>) -> Self {
        Self::builder(settings, store).build()
    }

    /// Settings from the environment and the default SQLite token store
    pub async fn new_default() -> AuthResult<Self> {
        let settings = AuthSettings::from_env()?;
        let store = SqliteTokenStore::open_default().await?;
        Ok(Self::new(settings, Arc::new(store)))
    }

    pub fn builder(settings: AuthSettings, store: Arc<dyn TokenStore>) -> AuthManagerBuilder {
        AuthManagerBuilder {
            settings,
            store,
            endpoints: GoogleEndpoints::default(),
            client: None,
            notifier: Arc::new(TracingNotifier),
            browser: Arc::new(SystemBrowser),
        }
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    /// Start the browser login, or reopen the consent page if one is pending.
    ///
    /// Returns as soon as the listener is up; await the returned attempt to
    /// learn how the login ended.
    pub async fn login(&self) -> AuthResult<LoginAttempt> {
        info!("Starting Google OAuth login");
        self.session
            .start(
                &self.settings,
                SessionDeps {
                    exchange: self.exchange.clone(),
                    lifecycle: self.lifecycle.clone(),
                    notifier: self.notifier.clone(),
                    browser: self.browser.clone(),
                },
            )
            .await
    }

    /// Abandon a pending login; false if none was pending
    pub fn cancel_login(&self) -> bool {
        self.session.cancel()
    }

    /// The pending login session, if any
    pub fn pending_session(&self) -> Option<SessionInfo> {
        self.session.info()
    }

    /// Forget all stored tokens and abandon any pending login
    pub async fn logout(&self) -> AuthResult<()> {
        info!("Logging out from Google");
        self.cancel_login();
        self.lifecycle.clear().await?;
        info!("✅ Successfully logged out");
        Ok(())
    }

    /// The cached access token if still valid; never refreshes
    pub async fn get_valid_access_token(&self) -> Option<String> {
        self.lifecycle.get_valid_access_token().await
    }

    /// A usable access token for an API call, refreshing if needed
    pub async fn ensure_access_token(&self) -> AuthResult<String> {
        self.lifecycle.ensure_access_token().await
    }

    /// Force a refresh of the access token
    pub async fn refresh(&self) -> AuthResult<String> {
        self.lifecycle.refresh().await
    }

    /// Snapshot of configuration and token state
    pub async fn status(&self) -> AuthResult<AuthStatus> {
        let record = self.store.load_record().await?;
        Ok(AuthStatus {
            configured: self.settings.is_complete(),
            use_custom_client: self.settings.use_custom_client,
            logged_in: record.has_refresh_token(),
            access_token_valid: record.is_valid_at(now_ms()),
            expires_at_ms: record.expires_at_ms(),
            login_pending: self.session.is_pending(),
        })
    }
}

/// Builder for swapping endpoints and UI seams, mostly in tests
pub struct AuthManagerBuilder {
    settings: AuthSettings,
    store: Arc<dyn TokenStore>,
    endpoints: GoogleEndpoints,
    client: Option<reqwest::Client>,
    notifier: Arc<dyn Notifier>,
    browser: Arc<dyn BrowserLauncher>,
}

impl AuthManagerBuilder {
    pub fn endpoints(mut self, endpoints: GoogleEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn browser(mut self, browser: Arc<dyn BrowserLauncher>) -> Self {
        self.browser = browser;
        self
    }

    pub fn build(self) -> AuthManager {
        let exchange = match self.client {
            Some(client) => TokenExchange::with_client(client, self.endpoints),
            None => TokenExchange::new(self.endpoints),
        };
        let lifecycle = Arc::new(TokenLifecycle::new(
            self.store.clone(),
            exchange.clone(),
            self.settings.clone(),
            self.notifier.clone(),
        ));

        AuthManager {
            settings: self.settings,
            store: self.store,
            exchange,
            lifecycle,
            session: AuthorizationSession::new(),
            notifier: self.notifier,
            browser: self.browser,
        }
    }
}

/// Authentication status for display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthStatus {
    pub configured: bool,
    pub use_custom_client: bool,
    pub logged_in: bool,
    pub access_token_valid: bool,
    pub expires_at_ms: Option<i64>,
    pub login_pending: bool,
}

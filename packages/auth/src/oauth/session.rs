// ABOUTME: The single in-flight authorization session and its callback state machine
// ABOUTME: Owns the listener task, validates state, exchanges the code, and always tears down

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::{
    error::{AuthError, AuthResult},
    oauth::{
        exchange::TokenExchange,
        lifecycle::TokenLifecycle,
        notify::{BrowserLauncher, Notifier},
        pkce::generate_state,
        server::{CallbackRequest, CallbackServer},
        settings::{AuthSettings, ClientMode},
        types::PkceChallenge,
    },
};

pub const LOGIN_SUCCESS_NOTICE: &str = "Google Calendar login successful";

/// Observable progress of a login
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginStatus {
    Pending,
    /// Tokens were stored
    Completed,
    /// A callback arrived with a foreign state nonce
    Rejected,
    Failed(String),
    TimedOut,
    Cancelled,
}

impl LoginStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// What callers may see of the pending session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub state: String,
    pub code_challenge: String,
    pub auth_url: String,
    pub redirect_uri: String,
    pub listener_addr: SocketAddr,
}

/// Handle returned by a login request
#[derive(Debug)]
pub struct LoginAttempt {
    pub auth_url: String,
    /// True when an already pending session was reused
    pub reused: bool,
    timeout: Duration,
    status_rx: watch::Receiver<LoginStatus>,
}

impl LoginAttempt {
    pub fn status(&self) -> LoginStatus {
        self.status_rx.borrow().clone()
    }

    /// Wait for the session to reach a terminal status
    pub async fn wait(mut self) -> LoginStatus {
        let result = self
            .status_rx
            .wait_for(LoginStatus::is_terminal)
            .await
            .map(|status| (*status).clone());

        match result {
            Ok(status) => status,
            Err(_) => self.status_rx.borrow().clone(),
        }
    }

    /// Wait and translate the terminal status into a result
    pub async fn finish(self) -> AuthResult<()> {
        let timeout = self.timeout;
        match self.wait().await {
            LoginStatus::Completed => Ok(()),
            LoginStatus::Rejected => Err(AuthError::StateMismatch),
            LoginStatus::TimedOut => Err(AuthError::LoginTimedOut(timeout.as_secs())),
            LoginStatus::Cancelled => Err(AuthError::LoginCancelled),
            LoginStatus::Failed(msg) => Err(AuthError::OAuthFailed(msg)),
            LoginStatus::Pending => Err(AuthError::OAuthFailed(
                "login session ended without a result".to_string(),
            )),
        }
    }
}

struct PendingSession {
    id: u64,
    info: SessionInfo,
    timeout: Duration,
    status_rx: watch::Receiver<LoginStatus>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

type Slot = Arc<Mutex<Option<PendingSession>>>;

fn lock(slot: &Slot) -> MutexGuard<'_, Option<PendingSession>> {
    // A panic while holding the lock leaves plain data behind; keep using it
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Collaborators the session task needs to finish a login
pub(crate) struct SessionDeps {
    pub exchange: TokenExchange,
    pub lifecycle: Arc<TokenLifecycle>,
    pub notifier: Arc<dyn Notifier>,
    pub browser: Arc<dyn BrowserLauncher>,
}

/// Holder of the at-most-one pending login
pub struct AuthorizationSession {
    slot: Slot,
    next_id: AtomicU64,
    start_lock: tokio::sync::Mutex<()>,
}

impl Default for AuthorizationSession {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthorizationSession {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(1),
            start_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.slot).is_some()
    }

    pub fn info(&self) -> Option<SessionInfo> {
        lock(&self.slot).as_ref().map(|s| s.info.clone())
    }

    /// Start a login, or reopen the consent page of the one already pending
    pub(crate) async fn start(
        &self,
        settings: &AuthSettings,
        deps: SessionDeps,
    ) -> AuthResult<LoginAttempt> {
        let mode = settings.client_mode()?;
        let _starting = self.start_lock.lock().await;

        let existing = lock(&self.slot).as_ref().map(|s| LoginAttempt {
            auth_url: s.info.auth_url.clone(),
            reused: true,
            timeout: s.timeout,
            status_rx: s.status_rx.clone(),
        });
        if let Some(attempt) = existing {
            info!("Login already in progress, reopening consent page");
            open_browser(&deps, &attempt.auth_url);
            return Ok(attempt);
        }

        let server = CallbackServer::bind(settings.callback_port).await?;
        let redirect_uri = server.callback_url();
        let state = generate_state();
        let pkce = PkceChallenge::generate();
        let auth_url = deps.exchange.endpoints().authorization_url(
            mode.client_id(),
            &redirect_uri,
            &state,
            &pkce,
        )?;
        debug!("Generated state and PKCE challenge");

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (status_tx, status_rx) = watch::channel(LoginStatus::Pending);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let timeout = settings.session_timeout;

        let info = SessionInfo {
            state: state.clone(),
            code_challenge: pkce.code_challenge.clone(),
            auth_url: auth_url.clone(),
            redirect_uri: redirect_uri.clone(),
            listener_addr: server.local_addr(),
        };
        *lock(&self.slot) = Some(PendingSession {
            id,
            info,
            timeout,
            status_rx: status_rx.clone(),
            cancel_tx: Some(cancel_tx),
        });

        let guard = TeardownGuard {
            slot: self.slot.clone(),
            id,
            status_tx,
            outcome: None,
        };
        let flow = CallbackFlow {
            state,
            code_verifier: pkce.code_verifier,
            redirect_uri,
            mode,
            exchange: deps.exchange.clone(),
            lifecycle: deps.lifecycle.clone(),
            notifier: deps.notifier.clone(),
        };
        tokio::spawn(async move {
            let mut guard = guard;
            let status = flow.drive(server, cancel_rx, timeout).await;
            guard.outcome = Some(status);
        });

        open_browser(&deps, &auth_url);

        Ok(LoginAttempt {
            auth_url,
            reused: false,
            timeout,
            status_rx,
        })
    }

    /// Cancel the pending login; false if none was pending
    pub fn cancel(&self) -> bool {
        let cancel_tx = lock(&self.slot).as_mut().and_then(|s| s.cancel_tx.take());
        match cancel_tx {
            Some(tx) => {
                info!("Cancelling pending login");
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }
}

fn open_browser(deps: &SessionDeps, auth_url: &str) {
    if let Err(e) = deps.browser.open(auth_url) {
        warn!("{}", e);
        deps.notifier.notify(&e.to_string());
    }
}

/// Resets the slot and publishes the outcome exactly once, on every exit path
struct TeardownGuard {
    slot: Slot,
    id: u64,
    status_tx: watch::Sender<LoginStatus>,
    outcome: Option<LoginStatus>,
}

impl Drop for TeardownGuard {
    fn drop(&mut self) {
        {
            let mut slot = lock(&self.slot);
            if slot.as_ref().is_some_and(|s| s.id == self.id) {
                *slot = None;
            }
        }

        let status = self
            .outcome
            .take()
            .unwrap_or_else(|| LoginStatus::Failed("login session aborted".to_string()));
        debug!("Login session {} ended: {:?}", self.id, status);
        self.status_tx.send_replace(status);
    }
}

/// Everything the listener task needs to complete a login
struct CallbackFlow {
    state: String,
    code_verifier: String,
    redirect_uri: String,
    mode: ClientMode,
    exchange: TokenExchange,
    lifecycle: Arc<TokenLifecycle>,
    notifier: Arc<dyn Notifier>,
}

impl CallbackFlow {
    /// Run until a callback resolves the session, the timeout fires, or the
    /// login is cancelled. The listener is dropped when this returns.
    async fn drive(
        &self,
        server: CallbackServer,
        cancel_rx: oneshot::Receiver<()>,
        timeout: Duration,
    ) -> LoginStatus {
        tokio::select! {
            status = self.serve(&server) => status,
            _ = tokio::time::sleep(timeout) => {
                warn!("Login not completed within {}s, closing callback server", timeout.as_secs());
                LoginStatus::TimedOut
            }
            _ = cancel_rx => LoginStatus::Cancelled,
        }
    }

    async fn serve(&self, server: &CallbackServer) -> LoginStatus {
        let request = match server.next_callback().await {
            Ok(request) => request,
            Err(e) => {
                error!("Callback server failed: {}", e);
                self.notifier.notify(&e.to_string());
                return LoginStatus::Failed(e.to_string());
            }
        };

        // Forged or stale redirect: drop the connection without answering
        if request.params.state.as_deref() != Some(self.state.as_str()) {
            warn!("Callback state does not match the pending session, rejecting");
            return LoginStatus::Rejected;
        }
        info!("✅ State validated successfully");

        if let Some(provider_error) = request.params.error.clone() {
            return self
                .fail(request, format!("Google returned an error: {}", provider_error))
                .await;
        }

        let Some(code) = request.params.code.clone() else {
            return self
                .fail(request, "No authorization code in callback".to_string())
                .await;
        };

        match self.complete(&code).await {
            Ok(()) => {
                request.respond_success().await;
                info!("✅ Successfully authenticated with Google");
                self.notifier.notify(LOGIN_SUCCESS_NOTICE);
                LoginStatus::Completed
            }
            Err(e) => self.fail(request, e.to_string()).await,
        }
    }

    async fn complete(&self, code: &str) -> AuthResult<()> {
        info!("Received authorization code, exchanging for token");
        let response = self
            .exchange
            .exchange_code(
                &self.mode,
                code,
                &self.code_verifier,
                &self.state,
                &self.redirect_uri,
            )
            .await?;

        self.lifecycle.store_exchanged_tokens(&response).await
    }

    async fn fail(&self, request: CallbackRequest, message: String) -> LoginStatus {
        error!("Login failed: {}", message);
        request.respond_error(&message).await;
        self.notifier.notify(&format!("Google login failed: {}", message));
        LoginStatus::Failed(message)
    }
}

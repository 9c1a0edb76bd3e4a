// ABOUTME: OAuth module providing the Google Calendar login flow and token lifecycle
// ABOUTME: Includes PKCE, callback server, session state machine, token exchange, and storage

pub mod exchange;
pub mod lifecycle;
pub mod manager;
pub mod notify;
pub mod pkce;
pub mod provider;
pub mod server;
pub mod session;
pub mod settings;
pub mod storage;
pub mod types;

pub use exchange::TokenExchange;
pub use lifecycle::TokenLifecycle;
pub use manager::{AuthManager, AuthManagerBuilder, AuthStatus};
pub use notify::{BrowserLauncher, Notifier, SystemBrowser, TracingNotifier};
pub use provider::GoogleEndpoints;
pub use server::CallbackServer;
pub use session::{AuthorizationSession, LoginAttempt, LoginStatus, SessionInfo};
pub use settings::{AuthSettings, ClientMode};
pub use storage::{MemoryTokenStore, SqliteTokenStore, TokenKey, TokenStore};
pub use types::{PkceChallenge, TokenRecord, TokenResponse};

// ABOUTME: Seams for user-visible notices and launching the system browser
// ABOUTME: Default implementations log through tracing and open URLs with the `open` crate

use tracing::{info, warn};

use crate::error::{AuthError, AuthResult};

/// Shows short messages to the user (a toast, a status line, stderr)
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str);
}

/// Notifier that writes notices to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, message: &str) {
        warn!("{}", message);
    }
}

/// Opens the authorization page
pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &str) -> AuthResult<()>;
}

/// Launches the platform default browser
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> AuthResult<()> {
        info!("Opening browser for Google consent");
        open::that(url).map_err(|e| {
            AuthError::BrowserOpen(format!(
                "{}. Please manually visit: {}",
                e, url
            ))
        })
    }
}

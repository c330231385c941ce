//! Hook for sending the user back to the login entry point

/// Route the host should show once the session can no longer be renewed
pub const LOGIN_ROUTE: &str = "/login";

/// Receives the forced-logout signal.
///
/// Called after the stored tokens have been cleared because the refresh token
/// was expired or rejected. Browser hosts navigate; terminal hosts print a
/// prompt.
pub trait Navigator: Send + Sync {
    fn redirect(&self, route: &str);
}

/// Default navigator: records the redirect in the log and nothing else
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNavigator;

impl Navigator for LogNavigator {
    fn redirect(&self, route: &str) {
        warn!(route, "session ended, login required");
    }
}

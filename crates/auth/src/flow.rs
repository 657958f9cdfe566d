//! Interactive browser login driver.

use std::time::Duration;
use wifassist_config::CallbackConfig;
use wifassist_types::{FederatedCredential, traits::Result};

use crate::{broker::CredentialBroker, callback::RedirectCapture};

/// Run the full interactive login for `(app, user)` and cache the result.
///
/// Binds the callback port, opens the system browser on the login URL, waits
/// for the redirect, then runs both exchanges through the broker.
///
/// # Errors
///
/// Returns [`WifError::Listener`](wifassist_types::WifError::Listener) if the
/// port is taken or the user does not come back within
/// `callback.timeout_secs`, otherwise whatever
/// [`CredentialBroker::complete_login`] returns.
pub async fn interactive_login(
    broker: &CredentialBroker,
    app: &str,
    user: &str,
    callback: &CallbackConfig,
) -> Result<FederatedCredential> {
    let capture = RedirectCapture::bind(callback.port).await?;
    login_with_capture(
        broker,
        app,
        user,
        capture,
        Duration::from_secs(callback.timeout_secs),
        open_browser,
    )
    .await
}

/// Same as [`interactive_login`] with an already bound listener and a custom
/// way of presenting the login URL.
///
/// # Errors
///
/// See [`interactive_login`].
pub async fn login_with_capture<F>(
    broker: &CredentialBroker,
    app: &str,
    user: &str,
    capture: RedirectCapture,
    timeout: Duration,
    present: F,
) -> Result<FederatedCredential>
where
    F: FnOnce(&str),
{
    let ticket = broker.begin_login(app, user);
    // Listener must be serving before the user agent can come back.
    let pending = capture.spawn(timeout);
    present(&ticket.authorization_url);

    let event = match pending.wait().await {
        Ok(event) => event,
        Err(e) => {
            broker.abandon_login(app, user);
            return Err(e);
        }
    };
    let credential = broker.complete_login(app, user, &event).await?;
    eprintln!("Login successful");
    Ok(credential)
}

/// Open `url` in the system browser, printing it when that is not possible.
pub fn open_browser(url: &str) {
    eprintln!("Opening browser: {url}");
    if let Err(e) = open::that(url) {
        tracing::warn!(error = %e, "failed to open browser");
        eprintln!("Please open the following URL manually to complete login:");
        eprintln!("{url}");
    }
}

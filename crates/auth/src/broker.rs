//! Login → exchange → cache → inject orchestration.
//!
//! Each `(app, user)` slot moves through
//! `NoCredential → AwaitingLogin → Exchanging → Injected`. A missing
//! credential is reported as [`CredentialCheck::AuthRequired`], a normal
//! branch the caller acts on by sending the user to the login URL.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use wifassist_config::Config;
use wifassist_types::{
    AuthDescriptor, CacheKey, CredentialStore, FederatedCredential, FederationTarget,
    StreamAssistRequest, traits::Result,
};

use crate::{callback::CallbackEvent, entra, exchange::TokenExchangeClient};

/// Where one `(app, user)` slot is in the login cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BrokerState {
    #[default]
    NoCredential,
    AwaitingLogin,
    Exchanging,
    Injected,
}

impl fmt::Display for BrokerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoCredential => "NO_CREDENTIAL",
            Self::AwaitingLogin => "AWAITING_LOGIN",
            Self::Exchanging => "EXCHANGING",
            Self::Injected => "INJECTED",
        };
        f.write_str(s)
    }
}

/// Structured "please authenticate" signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthRequired {
    pub descriptor: AuthDescriptor,
    pub authorization_url: String,
}

/// Outcome of a cache check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialCheck {
    AuthRequired(AuthRequired),
    Ready(FederatedCredential),
}

impl CredentialCheck {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

/// Handed out when a login starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginTicket {
    pub key: CacheKey,
    pub authorization_url: String,
}

/// Drives interactive federated logins and attaches the resulting
/// credentials to outbound assistant requests.
pub struct CredentialBroker {
    store: Arc<dyn CredentialStore>,
    exchange: TokenExchangeClient,
    descriptor: AuthDescriptor,
    target: FederationTarget,
    states: Mutex<HashMap<CacheKey, BrokerState>>,
}

impl CredentialBroker {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        exchange: TokenExchangeClient,
        descriptor: AuthDescriptor,
        target: FederationTarget,
    ) -> Self {
        Self {
            store,
            exchange,
            descriptor,
            target,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Build a broker for the configured Entra tenant and workforce pool.
    ///
    /// # Errors
    ///
    /// Returns [`WifError::Config`](wifassist_types::WifError::Config) if any
    /// federation identifier or the client secret is missing.
    pub fn from_config(config: &Config, store: Arc<dyn CredentialStore>) -> Result<Self> {
        let descriptor = entra::descriptor(config)?;
        let target = entra::federation_target(&config.federation)?;
        let exchange = TokenExchangeClient::from_config(&config.federation)?;
        Ok(Self::new(store, exchange, descriptor, target))
    }

    #[must_use]
    pub fn descriptor(&self) -> &AuthDescriptor {
        &self.descriptor
    }

    #[must_use]
    pub fn target(&self) -> &FederationTarget {
        &self.target
    }

    /// Cache slot for `(app, user)` under the configured credential key.
    #[must_use]
    pub fn key(&self, app: &str, user: &str) -> CacheKey {
        CacheKey::new(app, user, &self.descriptor.credential_key)
    }

    #[must_use]
    pub fn state(&self, app: &str, user: &str) -> BrokerState {
        self.states()
            .get(&self.key(app, user))
            .copied()
            .unwrap_or_default()
    }

    /// Look up the cached credential for `(app, user)`.
    ///
    /// # Errors
    ///
    /// Only store failures are errors; a missing credential is
    /// [`CredentialCheck::AuthRequired`].
    pub async fn check(&self, app: &str, user: &str) -> Result<CredentialCheck> {
        let key = self.key(app, user);
        if let Some(credential) = self.store.get(&key).await? {
            self.set_state(&key, BrokerState::Injected);
            return Ok(CredentialCheck::Ready(credential));
        }
        {
            let mut states = self.states();
            let state = states.entry(key.clone()).or_default();
            if *state == BrokerState::Injected {
                *state = BrokerState::NoCredential;
            }
        }
        tracing::debug!(%key, "no cached credential, login required");
        Ok(CredentialCheck::AuthRequired(AuthRequired {
            descriptor: self.descriptor.clone(),
            authorization_url: self.descriptor.authorization_url(),
        }))
    }

    /// Mark `(app, user)` as waiting for the user to log in.
    #[must_use]
    pub fn begin_login(&self, app: &str, user: &str) -> LoginTicket {
        let key = self.key(app, user);
        self.set_state(&key, BrokerState::AwaitingLogin);
        tracing::info!(%key, "waiting for interactive login");
        LoginTicket {
            key,
            authorization_url: self.descriptor.authorization_url(),
        }
    }

    /// Give up on a started login.
    pub fn abandon_login(&self, app: &str, user: &str) {
        self.set_state(&self.key(app, user), BrokerState::NoCredential);
    }

    /// Redeem the captured redirect: extract the code, run both exchanges,
    /// and cache the federated credential.
    ///
    /// # Errors
    ///
    /// Returns [`WifError::Auth`](wifassist_types::WifError::Auth) if the
    /// callback has no code, or
    /// [`WifError::Exchange`](wifassist_types::WifError::Exchange) if either
    /// exchange fails. The slot is reset to `NoCredential` on any failure.
    pub async fn complete_login(
        &self,
        app: &str,
        user: &str,
        callback: &CallbackEvent,
    ) -> Result<FederatedCredential> {
        let key = self.key(app, user);
        self.set_state(&key, BrokerState::Exchanging);
        match self.exchange_and_store(&key, callback).await {
            Ok(credential) => {
                self.set_state(&key, BrokerState::Injected);
                Ok(credential)
            }
            Err(e) => {
                tracing::warn!(error = %e, %key, "login failed");
                self.set_state(&key, BrokerState::NoCredential);
                Err(e)
            }
        }
    }

    async fn exchange_and_store(
        &self,
        key: &CacheKey,
        callback: &CallbackEvent,
    ) -> Result<FederatedCredential> {
        let code = callback.authorization_code()?;
        let provider_token = self
            .exchange
            .exchange_code_for_provider_token(&code, &self.descriptor)
            .await?;
        let credential = self
            .exchange
            .exchange_provider_token_for_cloud_credential(&provider_token, &self.target)
            .await?;
        self.store.put(key, &credential).await?;
        tracing::info!(%key, "federated credential cached");
        Ok(credential)
    }

    /// Attach the cached credential for `(app, user)` to `request`.
    ///
    /// Leaves the request untouched and returns
    /// [`CredentialCheck::AuthRequired`] when nothing is cached.
    ///
    /// # Errors
    ///
    /// Returns an error only if the store fails.
    pub async fn authorize(
        &self,
        app: &str,
        user: &str,
        request: &mut StreamAssistRequest,
    ) -> Result<CredentialCheck> {
        let check = self.check(app, user).await?;
        if let CredentialCheck::Ready(credential) = &check {
            request.credential.clone_from(&credential.bearer);
        }
        Ok(check)
    }

    /// Drop the cached credential for `(app, user)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn logout(&self, app: &str, user: &str) -> Result<()> {
        let key = self.key(app, user);
        self.store.remove(&key).await?;
        self.set_state(&key, BrokerState::NoCredential);
        tracing::info!(%key, "credential removed");
        Ok(())
    }

    fn states(&self) -> MutexGuard<'_, HashMap<CacheKey, BrokerState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, key: &CacheKey, state: BrokerState) {
        self.states().insert(key.clone(), state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use wifassist_store::InMemoryCredentialStore;
    use wifassist_types::{ExchangeStep, WifError};

    async fn broker() -> (CredentialBroker, MockServer, Arc<InMemoryCredentialStore>) {
        let server = mock_server().await;
        let store = Arc::new(InMemoryCredentialStore::new());
        let broker = CredentialBroker::from_config(&server.config(), store.clone()).unwrap();
        (broker, server, store)
    }

    fn redirect(code: &str) -> CallbackEvent {
        CallbackEvent::new(format!("http://localhost:8080/auth/callback?code={code}&state=xyz"))
    }

    #[tokio::test]
    async fn test_from_config_carries_descriptor_and_target() {
        let (broker, _server, _) = broker().await;
        assert_eq!(broker.descriptor().client_id, "app-123");
        assert!(broker.descriptor().scope_string().contains("openid"));
        assert!(
            broker
                .target()
                .audience()
                .ends_with("/workforcePools/pool-1/providers/entra")
        );
    }

    #[tokio::test]
    async fn test_missing_credential_is_auth_required_not_error() {
        let (broker, server, _) = broker().await;
        let check = broker.check("weather_app", "user1").await.unwrap();
        let CredentialCheck::AuthRequired(signal) = check else {
            panic!("expected AuthRequired");
        };
        assert_eq!(signal.descriptor.credential_key, "microsoft_credentials");
        assert_eq!(signal.descriptor.scopes.len(), 4);
        assert!(signal.authorization_url.contains("response_type=code"));
        assert_eq!(broker.state("weather_app", "user1"), BrokerState::NoCredential);
        assert_eq!(server.token_calls(), 0);
    }

    #[test]
    fn test_from_config_fails_fast_on_missing_ids() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let err = CredentialBroker::from_config(&Config::default(), store)
            .err()
            .unwrap();
        assert!(matches!(err, WifError::Config(_)));
    }

    #[tokio::test]
    async fn test_full_login_cycle() {
        let (broker, server, store) = broker().await;

        let ticket = broker.begin_login("weather_app", "user1");
        assert_eq!(ticket.key.to_string(), "weather_app/user1/microsoft_credentials");
        assert_eq!(broker.state("weather_app", "user1"), BrokerState::AwaitingLogin);

        let cred = broker
            .complete_login("weather_app", "user1", &redirect("abc123"))
            .await
            .unwrap();
        assert_eq!(server.last_token_form()["code"], "abc123");
        assert_eq!(cred.subject_token, "entra-id");
        assert_eq!(broker.state("weather_app", "user1"), BrokerState::Injected);
        assert_eq!(store.len(), 1);

        let mut request = StreamAssistRequest {
            query: "hi".into(),
            ..Default::default()
        };
        let check = broker
            .authorize("weather_app", "user1", &mut request)
            .await
            .unwrap();
        assert!(check.is_ready());
        assert_eq!(
            request.credential.unwrap().access_token,
            cred.access_token().unwrap()
        );
    }

    #[tokio::test]
    async fn test_credentials_are_scoped_per_user() {
        let (broker, _server, _) = broker().await;
        broker
            .complete_login("weather_app", "user1", &redirect("abc"))
            .await
            .unwrap();
        assert!(broker.check("weather_app", "user1").await.unwrap().is_ready());
        assert!(!broker.check("weather_app", "user2").await.unwrap().is_ready());
        assert!(!broker.check("other_app", "user1").await.unwrap().is_ready());
    }

    #[tokio::test]
    async fn test_callback_without_code_fails_before_exchange() {
        let (broker, server, store) = broker().await;
        let _ticket = broker.begin_login("weather_app", "user1");
        let err = broker
            .complete_login(
                "weather_app",
                "user1",
                &CallbackEvent::new("http://localhost:8080/cb?state=xyz"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WifError::Auth(_)));
        assert_eq!(server.token_calls(), 0);
        assert!(store.is_empty());
        assert_eq!(broker.state("weather_app", "user1"), BrokerState::NoCredential);
    }

    #[tokio::test]
    async fn test_provider_token_failure_resets_slot() {
        let (broker, server, store) = broker().await;
        let err = broker
            .complete_login("weather_app", "user1", &redirect(BAD_CODE))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WifError::Exchange { step: ExchangeStep::ProviderToken, .. }
        ));
        assert_eq!(server.sts_calls(), 0);
        assert!(store.is_empty());
        assert_eq!(broker.state("weather_app", "user1"), BrokerState::NoCredential);
    }

    #[tokio::test]
    async fn test_federation_failure_caches_nothing() {
        let (broker, _server, store) = broker().await;
        let err = broker
            .complete_login("weather_app", "user1", &redirect("reject-at-sts"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WifError::Exchange { step: ExchangeStep::Federation, .. }
        ));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_relogin_overwrites() {
        let (broker, _server, store) = broker().await;
        let first = broker
            .complete_login("weather_app", "user1", &redirect("a"))
            .await
            .unwrap();
        let second = broker
            .complete_login("weather_app", "user1", &redirect("b"))
            .await
            .unwrap();
        assert_ne!(first.access_token(), second.access_token());
        assert_eq!(store.len(), 1);
        let CredentialCheck::Ready(cached) = broker.check("weather_app", "user1").await.unwrap()
        else {
            panic!("expected Ready");
        };
        assert_eq!(cached, second);
    }

    #[tokio::test]
    async fn test_authorize_without_credential_leaves_request() {
        let (broker, _server, _) = broker().await;
        let mut request = StreamAssistRequest::default();
        let check = broker
            .authorize("weather_app", "user1", &mut request)
            .await
            .unwrap();
        assert!(!check.is_ready());
        assert!(request.credential.is_none());
    }

    #[tokio::test]
    async fn test_logout_and_abandon() {
        let (broker, _server, _) = broker().await;
        broker
            .complete_login("weather_app", "user1", &redirect("a"))
            .await
            .unwrap();
        broker.logout("weather_app", "user1").await.unwrap();
        assert!(!broker.check("weather_app", "user1").await.unwrap().is_ready());

        let _ticket = broker.begin_login("weather_app", "user1");
        broker.abandon_login("weather_app", "user1");
        assert_eq!(broker.state("weather_app", "user1"), BrokerState::NoCredential);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(BrokerState::AwaitingLogin.to_string(), "AWAITING_LOGIN");
        assert_eq!(
            serde_json::to_string(&BrokerState::NoCredential).unwrap(),
            "\"NO_CREDENTIAL\""
        );
    }
}

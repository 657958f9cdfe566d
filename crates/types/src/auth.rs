//! Static login descriptors and credential cache keys.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Federation service that owns workforce pools.
pub const IAM_SERVICE: &str = "iam.googleapis.com";

/// Everything needed to start an authorization-code login with the identity
/// provider. Built once from static provider configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthDescriptor {
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub client_id: String,
    pub redirect_uri: String,
    /// Requested scopes, in the order they are sent.
    pub scopes: Vec<String>,
    /// Cache slot the resulting federated credential is stored under.
    pub credential_key: String,
}

impl AuthDescriptor {
    /// Space-joined scope list, as sent on the wire.
    #[must_use]
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }

    /// The URL a user agent must open to log in.
    ///
    /// Appends `client_id`, `redirect_uri`, `response_type=code` and the
    /// space-joined `scope` to the authorization endpoint.
    #[must_use]
    pub fn authorization_url(&self) -> String {
        let scope = self.scope_string();
        let query = serde_urlencoded::to_string([
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", scope.as_str()),
        ])
        .unwrap_or_default();
        let sep = if self.authorization_endpoint.contains('?') {
            '&'
        } else {
            '?'
        };
        format!("{}{sep}{query}", self.authorization_endpoint)
    }
}

/// Workforce pool provider a subject token is exchanged against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationTarget {
    pub pool_id: String,
    pub provider_id: String,
    /// Project number billed for the exchange (`userProject`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_project: Option<String>,
}

impl FederationTarget {
    /// Canonical STS audience for this pool provider.
    #[must_use]
    pub fn audience(&self) -> String {
        format!(
            "//{IAM_SERVICE}/locations/global/workforcePools/{}/providers/{}",
            self.pool_id, self.provider_id
        )
    }
}

/// Scope of one cached federated credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub app: String,
    pub user: String,
    pub credential_key: String,
}

impl CacheKey {
    pub fn new(
        app: impl Into<String>,
        user: impl Into<String>,
        credential_key: impl Into<String>,
    ) -> Self {
        Self {
            app: app.into(),
            user: user.into(),
            credential_key: credential_key.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.app, self.user, self.credential_key)
    }
}

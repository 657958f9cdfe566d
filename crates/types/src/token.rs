//! Provider tokens, bearer material, and federated credentials.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Subject token type sent to the security token service.
pub const ID_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:id_token";

/// Seconds of clock skew tolerated before a bearer token counts as expired.
const EXPIRY_SKEW_SECS: u64 = 60;

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

/// Token returned by the identity provider's token endpoint.
///
/// Expiry is opaque here: a rejected token is simply fetched again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderToken {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl ProviderToken {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            id_token: None,
        }
    }

    #[must_use]
    pub fn with_id_token(mut self, id_token: impl Into<String>) -> Self {
        self.id_token = Some(id_token.into());
        self
    }

    /// The token presented to the federation exchange: the ID token when the
    /// provider issued one, otherwise the access token.
    #[must_use]
    pub fn subject_token(&self) -> &str {
        self.id_token.as_deref().unwrap_or(&self.access_token)
    }
}

/// A short-lived bearer token with optional expiry tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BearerToken {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl BearerToken {
    /// Create a new token with the given access token and `Bearer` type.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: None,
            token_type: Some("Bearer".to_string()),
        }
    }

    /// Set the expiry to `expires_in_secs` seconds from now.
    #[must_use]
    pub fn with_expiry(mut self, expires_in_secs: u64) -> Self {
        self.expires_at = Some(now_secs() + expires_in_secs);
        self
    }

    /// Return `true` if the token expires within 60 seconds.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        let Some(expires_at) = self.expires_at else {
            return false;
        };
        now_secs() + EXPIRY_SKEW_SECS >= expires_at
    }

    /// Value for an HTTP `Authorization` header.
    #[must_use]
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

/// A cloud credential obtained by exchanging an identity-provider token.
///
/// Besides the bearer material it keeps everything needed to re-run the
/// exchange, which is what makes it refreshable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederatedCredential {
    /// Workforce pool provider resource the subject token is exchanged against.
    pub audience: String,
    pub subject_token_type: String,
    /// The identity-provider token presented as the exchange subject.
    pub subject_token: String,
    /// Security token service endpoint.
    pub token_url: String,
    pub scopes: Vec<String>,
    /// Project billed for the exchange (workforce pools only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_project: Option<String>,
    /// Materialized bearer token; `None` until the first refresh.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer: Option<BearerToken>,
}

impl FederatedCredential {
    /// Current access token, if the credential has been materialized.
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.bearer.as_ref().map(|b| b.access_token.as_str())
    }

    /// `true` when there is no bearer token yet or it is about to expire.
    #[must_use]
    pub fn needs_refresh(&self) -> bool {
        self.bearer.as_ref().is_none_or(BearerToken::is_expired)
    }

    /// `true` when the credential still holds a subject token to re-exchange.
    #[must_use]
    pub fn can_refresh(&self) -> bool {
        !self.subject_token.is_empty()
    }
}

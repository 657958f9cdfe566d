//! The two token exchanges of a federated login.
//!
//! 1. Authorization code → identity-provider token (`authorization_code` grant).
//! 2. Identity-provider token → federated cloud credential (RFC 8693 token
//!    exchange against the security token service), refreshed once eagerly.
//!
//! Neither step retries; every failure is returned as
//! [`WifError::Exchange`] tagged with the step that failed.

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use wifassist_config::FederationConfig;
use wifassist_types::{
    AuthDescriptor, BearerToken, ExchangeStep, FederatedCredential, FederationTarget,
    ProviderToken, WifError, token::ID_TOKEN_TYPE, traits::Result,
};

/// Default security token service endpoint.
pub const STS_URL: &str = "https://sts.googleapis.com/v1/token";

pub const TOKEN_EXCHANGE_GRANT: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
pub const ACCESS_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:access_token";
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// HTTP client for the identity provider's token endpoint and the STS.
pub struct TokenExchangeClient {
    http: reqwest::Client,
    client_secret: SecretString,
    sts_url: String,
}

impl std::fmt::Debug for TokenExchangeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenExchangeClient")
            .field("sts_url", &self.sts_url)
            .finish_non_exhaustive()
    }
}

impl TokenExchangeClient {
    pub fn new(client_secret: SecretString) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_secret,
            sts_url: STS_URL.to_string(),
        }
    }

    /// Build from the federation section.
    ///
    /// # Errors
    ///
    /// Returns [`WifError::Config`] if no client secret is configured.
    pub fn from_config(fed: &FederationConfig) -> Result<Self> {
        let secret = fed
            .client_secret
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                WifError::Config("missing required setting: federation.client_secret".into())
            })?;
        Ok(Self::new(SecretString::from(secret.to_string())).with_sts_url(&fed.sts_url))
    }

    #[must_use]
    pub fn with_sts_url(mut self, url: &str) -> Self {
        self.sts_url = url.to_string();
        self
    }

    /// Form fields for the `authorization_code` grant.
    #[must_use]
    pub fn token_form_params(
        &self,
        code: &str,
        desc: &AuthDescriptor,
    ) -> Vec<(&'static str, String)> {
        vec![
            ("client_id", desc.client_id.clone()),
            ("client_secret", self.client_secret.expose_secret().to_string()),
            ("code", code.to_string()),
            ("grant_type", "authorization_code".to_string()),
            ("redirect_uri", desc.redirect_uri.clone()),
            ("scope", desc.scope_string()),
        ]
    }

    /// Step 1: redeem an authorization code at the descriptor's token endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`WifError::Exchange`] (step `ProviderToken`) if the request
    /// fails, the endpoint answers with an error, or the response has no
    /// `access_token`.
    pub async fn exchange_code_for_provider_token(
        &self,
        code: &str,
        desc: &AuthDescriptor,
    ) -> Result<ProviderToken> {
        let step = ExchangeStep::ProviderToken;
        let json = self
            .post_form(&desc.token_endpoint, &self.token_form_params(code, desc), step)
            .await?;
        let token = parse_token_response(&json)?;
        tracing::debug!(has_id_token = token.id_token.is_some(), "provider token received");
        Ok(token)
    }

    /// Step 2: exchange a provider token for a federated credential, then
    /// refresh it once so it carries usable bearer material.
    ///
    /// # Errors
    ///
    /// Returns [`WifError::Exchange`] (step `Federation`) if the STS rejects
    /// the subject token or answers without an access token.
    pub async fn exchange_provider_token_for_cloud_credential(
        &self,
        token: &ProviderToken,
        target: &FederationTarget,
    ) -> Result<FederatedCredential> {
        let mut credential = FederatedCredential {
            audience: target.audience(),
            subject_token_type: ID_TOKEN_TYPE.to_string(),
            subject_token: token.subject_token().to_string(),
            token_url: self.sts_url.clone(),
            scopes: vec![CLOUD_PLATFORM_SCOPE.to_string()],
            user_project: target.user_project.clone(),
            bearer: None,
        };
        self.refresh(&mut credential).await?;
        tracing::info!(audience = %credential.audience, "federated credential issued");
        Ok(credential)
    }

    /// Re-run the STS exchange for `credential` and replace its bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`WifError::Exchange`] (step `Federation`) on any failure; the
    /// credential is left untouched.
    pub async fn refresh(&self, credential: &mut FederatedCredential) -> Result<()> {
        let step = ExchangeStep::Federation;
        if !credential.can_refresh() {
            return Err(WifError::exchange(step, "credential has no subject token"));
        }
        let json = self
            .post_form(&credential.token_url, &sts_form_params(credential), step)
            .await?;
        credential.bearer = Some(parse_sts_response(&json)?);
        Ok(())
    }

    async fn post_form(
        &self,
        url: &str,
        form: &[(&'static str, String)],
        step: ExchangeStep,
    ) -> Result<Value> {
        let resp = self
            .http
            .post(url)
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await
            .map_err(|e| WifError::exchange(step, e.to_string()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| WifError::exchange(step, e.to_string()))?;
        let json: Option<Value> = serde_json::from_str(&text).ok();

        if !status.is_success() {
            let detail = json.as_ref().map_or_else(|| text.clone(), oauth_error_detail);
            tracing::warn!(%step, status = status.as_u16(), "token endpoint rejected request");
            return Err(WifError::exchange(step, format!("HTTP {status}: {detail}")));
        }
        json.ok_or_else(|| WifError::exchange(step, format!("invalid JSON response: {text}")))
    }
}

/// Form fields for the STS token exchange of `credential`.
#[must_use]
pub fn sts_form_params(credential: &FederatedCredential) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("grant_type", TOKEN_EXCHANGE_GRANT.to_string()),
        ("audience", credential.audience.clone()),
        ("scope", credential.scopes.join(" ")),
        ("requested_token_type", ACCESS_TOKEN_TYPE.to_string()),
        ("subject_token", credential.subject_token.clone()),
        ("subject_token_type", credential.subject_token_type.clone()),
    ];
    if let Some(project) = &credential.user_project {
        params.push((
            "options",
            serde_json::json!({ "userProject": project }).to_string(),
        ));
    }
    params
}

/// Parse the identity provider's token response.
///
/// # Errors
///
/// Returns [`WifError::Exchange`] if `access_token` is missing.
pub fn parse_token_response(json: &Value) -> Result<ProviderToken> {
    let access_token = json
        .get("access_token")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            WifError::exchange(
                ExchangeStep::ProviderToken,
                "missing access_token in response",
            )
        })?;
    let mut token = ProviderToken::new(access_token);
    if let Some(id) = json.get("id_token").and_then(Value::as_str) {
        token = token.with_id_token(id);
    }
    Ok(token)
}

/// Parse the STS response into bearer material.
///
/// # Errors
///
/// Returns [`WifError::Exchange`] if `access_token` is missing.
pub fn parse_sts_response(json: &Value) -> Result<BearerToken> {
    let access_token = json
        .get("access_token")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            WifError::exchange(ExchangeStep::Federation, "missing access_token in response")
        })?;
    let mut bearer = BearerToken::new(access_token);
    if let Some(kind) = json.get("token_type").and_then(Value::as_str) {
        bearer.token_type = Some(kind.to_string());
    }
    if let Some(expires_in) = json.get("expires_in").and_then(Value::as_u64) {
        bearer = bearer.with_expiry(expires_in);
    }
    Ok(bearer)
}

fn oauth_error_detail(json: &Value) -> String {
    let error = json.get("error").and_then(Value::as_str).unwrap_or("unknown_error");
    match json.get("error_description").and_then(Value::as_str) {
        Some(desc) => format!("{error}: {desc}"),
        None => error.to_string(),
    }
}

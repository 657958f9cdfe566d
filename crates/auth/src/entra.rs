//! Microsoft Entra ID (Azure AD v2.0) as the upstream identity provider.
//!
//! Authorization code flow against `/{tenant}/oauth2/v2.0/{authorize,token}`
//! with a confidential client. No PKCE: the client secret authenticates the
//! token request.

use wifassist_config::{Config, FederationConfig};
use wifassist_types::{AuthDescriptor, FederationTarget, WifError, traits::Result};

/// Default login host.
pub const AUTHORITY: &str = "https://login.microsoftonline.com";

fn required<'a>(value: Option<&'a String>, name: &str) -> Result<&'a str> {
    value
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| WifError::Config(format!("missing required setting: {name}")))
}

/// Authorization endpoint for `tenant` under `authority`.
#[must_use]
pub fn authorize_url(authority: &str, tenant: &str) -> String {
    format!(
        "{}/{tenant}/oauth2/v2.0/authorize",
        authority.trim_end_matches('/')
    )
}

/// Token endpoint for `tenant` under `authority`.
#[must_use]
pub fn token_url(authority: &str, tenant: &str) -> String {
    format!(
        "{}/{tenant}/oauth2/v2.0/token",
        authority.trim_end_matches('/')
    )
}

/// Build the login descriptor from configuration.
///
/// # Errors
///
/// Returns [`WifError::Config`] if the federation section is incomplete.
pub fn descriptor(config: &Config) -> Result<AuthDescriptor> {
    let fed = &config.federation;
    let missing = fed.missing();
    if !missing.is_empty() {
        return Err(WifError::Config(format!(
            "missing required settings: {}",
            missing.join(", ")
        )));
    }
    let tenant = required(fed.tenant_id.as_ref(), "federation.tenant_id")?;
    let client_id = required(fed.client_id.as_ref(), "federation.client_id")?;
    let authority = fed.authority.as_deref().unwrap_or(AUTHORITY);

    Ok(AuthDescriptor {
        authorization_endpoint: authorize_url(authority, tenant),
        token_endpoint: token_url(authority, tenant),
        client_id: client_id.to_string(),
        redirect_uri: config.callback.redirect_uri(),
        scopes: fed.scopes.clone(),
        credential_key: fed.credential_key.clone(),
    })
}

/// The workforce pool provider Entra tokens are exchanged against.
///
/// # Errors
///
/// Returns [`WifError::Config`] if the pool or provider id is missing.
pub fn federation_target(fed: &FederationConfig) -> Result<FederationTarget> {
    Ok(FederationTarget {
        pool_id: required(fed.pool_id.as_ref(), "federation.pool_id")?.to_string(),
        provider_id: required(fed.provider_id.as_ref(), "federation.provider_id")?.to_string(),
        user_project: fed
            .project_number
            .clone()
            .filter(|p| !p.trim().is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config::from_yaml(
            r#"
federation:
  tenant_id: "contoso"
  client_id: "app-123"
  client_secret: "s3cret"
  pool_id: "pool-1"
  provider_id: "entra"
  project_number: "42"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_descriptor_endpoints() {
        let d = descriptor(&config()).unwrap();
        assert_eq!(
            d.authorization_endpoint,
            "https://login.microsoftonline.com/contoso/oauth2/v2.0/authorize"
        );
        assert_eq!(
            d.token_endpoint,
            "https://login.microsoftonline.com/contoso/oauth2/v2.0/token"
        );
        assert_eq!(d.client_id, "app-123");
        assert_eq!(d.redirect_uri, "http://localhost:8080/auth/callback");
        assert_eq!(d.scopes, vec!["openid", "email", "profile", "offline_access"]);
        assert_eq!(d.credential_key, "microsoft_credentials");
    }

    #[test]
    fn test_descriptor_authority_override() {
        let mut c = config();
        c.federation.authority = Some("http://127.0.0.1:9999/".into());
        let d = descriptor(&c).unwrap();
        assert_eq!(d.token_endpoint, "http://127.0.0.1:9999/contoso/oauth2/v2.0/token");
    }

    #[test]
    fn test_descriptor_requires_tenant() {
        let mut c = config();
        c.federation.tenant_id = None;
        let err = descriptor(&c).unwrap_err();
        assert!(matches!(err, WifError::Config(_)));
        assert!(err.to_string().contains("federation.tenant_id"));
    }

    #[test]
    fn test_federation_target() {
        let t = federation_target(&config().federation).unwrap();
        assert_eq!(t.pool_id, "pool-1");
        assert_eq!(t.provider_id, "entra");
        assert_eq!(t.user_project.as_deref(), Some("42"));
        assert_eq!(
            t.audience(),
            "//iam.googleapis.com/locations/global/workforcePools/pool-1/providers/entra"
        );
    }

    #[test]
    fn test_federation_target_requires_pool() {
        let mut fed = config().federation;
        fed.pool_id = Some(String::new());
        assert!(federation_target(&fed).is_err());
    }
}

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use wifassist_types::{ToolExtraction, WifError};

/// Environment variables honoured on top of the file, and the config key each
/// one sets.
pub const ENV_KEYS: &[(&str, &str)] = &[
    ("AZURE_TENANT_ID", "federation.tenant_id"),
    ("AZURE_CLIENT_ID", "federation.client_id"),
    ("WIF_CLIENT_SECRET", "federation.client_secret"),
    ("WIF_POOL_ID", "federation.pool_id"),
    ("WIF_PROVIDER_ID", "federation.provider_id"),
    ("GOOGLE_PROJECT_NUMBER", "federation.project_number"),
    ("GOOGLE_CLOUD_PROJECT", "assistant.project_id"),
    ("GEMINI_ENTERPRISE_ENGINE_ID", "assistant.engine_id"),
    ("GEMINI_ENTERPRISE_LOCATION", "assistant.location"),
];

/// Identifiers may arrive as bare numbers (project numbers, numeric engine
/// ids), especially from the environment.
fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(u64),
    }
    Ok(Option::<Raw>::deserialize(d)?.map(|raw| match raw {
        Raw::Str(s) => s,
        Raw::Int(n) => n.to_string(),
    }))
}

fn present(v: Option<&String>) -> bool {
    v.is_some_and(|s| !s.trim().is_empty())
}

// ── Federation ────────────────────────────────────────────────────────────────

fn default_scopes() -> Vec<String> {
    ["openid", "email", "profile", "offline_access"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_credential_key() -> String {
    "microsoft_credentials".to_string()
}
fn default_sts_url() -> String {
    "https://sts.googleapis.com/v1/token".to_string()
}

/// Identity provider and workforce pool settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct FederationConfig {
    /// Entra ID tenant.
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Entra ID application (client) id.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Confidential client secret. Never serialized.
    #[serde(default, skip_serializing)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub pool_id: Option<String>,
    #[serde(default)]
    pub provider_id: Option<String>,
    /// Project number billed for the STS exchange.
    #[serde(default, deserialize_with = "lenient_string")]
    pub project_number: Option<String>,
    /// Cache slot for the federated credential.
    #[serde(default = "default_credential_key")]
    pub credential_key: String,
    /// Scopes requested from the identity provider, in order.
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// Security token service endpoint.
    #[serde(default = "default_sts_url")]
    pub sts_url: String,
    /// Overrides the identity provider's host (`https://login.microsoftonline.com`).
    #[serde(default)]
    pub authority: Option<String>,
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            tenant_id: None,
            client_id: None,
            client_secret: None,
            pool_id: None,
            provider_id: None,
            project_number: None,
            credential_key: default_credential_key(),
            scopes: default_scopes(),
            sts_url: default_sts_url(),
            authority: None,
        }
    }
}

impl fmt::Debug for FederationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FederationConfig")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "<redacted>"),
            )
            .field("pool_id", &self.pool_id)
            .field("provider_id", &self.provider_id)
            .field("project_number", &self.project_number)
            .field("credential_key", &self.credential_key)
            .field("scopes", &self.scopes)
            .field("sts_url", &self.sts_url)
            .field("authority", &self.authority)
            .finish()
    }
}

impl FederationConfig {
    /// Names of the required identifiers that are missing.
    #[must_use]
    pub fn missing(&self) -> Vec<&'static str> {
        [
            ("federation.tenant_id", present(self.tenant_id.as_ref())),
            ("federation.client_id", present(self.client_id.as_ref())),
            ("federation.pool_id", present(self.pool_id.as_ref())),
            ("federation.provider_id", present(self.provider_id.as_ref())),
        ]
        .into_iter()
        .filter_map(|(name, ok)| (!ok).then_some(name))
        .collect()
    }
}

// ── Callback listener ─────────────────────────────────────────────────────────

fn default_callback_port() -> u16 {
    8080
}
fn default_callback_path() -> String {
    "/auth/callback".to_string()
}
fn default_callback_timeout() -> u64 {
    300
}

/// Local redirect listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackConfig {
    /// Listen port (defaults to 8080).
    #[serde(default = "default_callback_port")]
    pub port: u16,
    /// Path registered as the redirect URI.
    #[serde(default = "default_callback_path")]
    pub path: String,
    /// Seconds to wait for the browser to come back (defaults to 300).
    #[serde(default = "default_callback_timeout")]
    pub timeout_secs: u64,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            port: default_callback_port(),
            path: default_callback_path(),
            timeout_secs: default_callback_timeout(),
        }
    }
}

impl CallbackConfig {
    /// The redirect URI registered with the identity provider.
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };
        format!("http://localhost:{}{path}", self.port)
    }
}

// ── Assistant ─────────────────────────────────────────────────────────────────

fn default_location() -> String {
    "global".to_string()
}
fn default_collection() -> String {
    "default_collection".to_string()
}
fn default_assistant() -> String {
    "default_assistant".to_string()
}

/// Remote assistant (StreamAssist) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    #[serde(default, deserialize_with = "lenient_string")]
    pub project_id: Option<String>,
    /// Data store location: `global`, `us`, `eu`.
    #[serde(default = "default_location")]
    pub location: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub engine_id: Option<String>,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_assistant")]
    pub assistant: String,
    /// Project charged for quota (`x-goog-user-project`).
    #[serde(default)]
    pub quota_project: Option<String>,
    /// Overrides the service base URL derived from `location`.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub tool_extraction: ToolExtraction,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            location: default_location(),
            engine_id: None,
            collection: default_collection(),
            assistant: default_assistant(),
            quota_project: None,
            endpoint: None,
            tool_extraction: ToolExtraction::default(),
        }
    }
}

impl AssistantConfig {
    /// Names of the required identifiers that are missing.
    #[must_use]
    pub fn missing(&self) -> Vec<&'static str> {
        [
            ("assistant.project_id", present(self.project_id.as_ref())),
            ("assistant.engine_id", present(self.engine_id.as_ref())),
        ]
        .into_iter()
        .filter_map(|(name, ok)| (!ok).then_some(name))
        .collect()
    }

    /// Full assistant resource name.
    ///
    /// # Errors
    ///
    /// Returns [`WifError::Config`] if the project or engine id is missing.
    pub fn resource_name(&self) -> Result<String, WifError> {
        match (&self.project_id, &self.engine_id) {
            (Some(project), Some(engine)) if self.missing().is_empty() => Ok(format!(
                "projects/{project}/locations/{}/collections/{}/engines/{engine}/assistants/{}",
                self.location, self.collection, self.assistant
            )),
            _ => Err(missing_error(&self.missing())),
        }
    }

    /// Service base URL: the regional host unless the location is `global`.
    #[must_use]
    pub fn base_url(&self) -> String {
        if let Some(endpoint) = &self.endpoint {
            return endpoint.trim_end_matches('/').to_string();
        }
        if self.location == "global" {
            "https://discoveryengine.googleapis.com".to_string()
        } else {
            format!("https://{}-discoveryengine.googleapis.com", self.location)
        }
    }
}

// ── Top level ─────────────────────────────────────────────────────────────────

fn default_app_name() -> String {
    "wifassist".to_string()
}
fn default_user_id() -> String {
    "default".to_string()
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application scope of cached credentials.
    #[serde(default = "default_app_name")]
    pub app_name: String,
    /// User scope of cached credentials.
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default)]
    pub federation: FederationConfig,
    #[serde(default)]
    pub callback: CallbackConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
            user_id: default_user_id(),
            federation: FederationConfig::default(),
            callback: CallbackConfig::default(),
            assistant: AssistantConfig::default(),
        }
    }
}

fn missing_error(missing: &[&str]) -> WifError {
    WifError::Config(format!("missing required settings: {}", missing.join(", ")))
}

fn env_provider() -> figment::providers::Env {
    use figment::providers::Env;
    let names: Vec<&str> = ENV_KEYS.iter().map(|(env, _)| *env).collect();
    Env::raw().only(&names).map(|key| {
        ENV_KEYS
            .iter()
            .find(|(env, _)| key.as_str().eq_ignore_ascii_case(env))
            .map_or_else(|| key.as_str().to_string(), |(_, path)| (*path).to_string())
            .into()
    })
}

impl Config {
    /// Parses configuration from a YAML string, merged with defaults.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the YAML is invalid or extraction fails.
    #[allow(clippy::result_large_err)]
    pub fn from_yaml(yaml: &str) -> Result<Self, figment::Error> {
        use figment::{
            Figment,
            providers::{Format as _, Serialized, Yaml},
        };
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::string(yaml))
            .extract()
    }

    /// Loads defaults, then the optional YAML file, then the environment.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the file cannot be parsed or a value has
    /// the wrong type.
    #[allow(clippy::result_large_err)]
    pub fn load(path: Option<&std::path::Path>) -> Result<Self, figment::Error> {
        use figment::{
            Figment,
            providers::{Format as _, Serialized, Yaml},
        };
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment.merge(env_provider()).extract()
    }

    /// Checks every identifier the login and the assistant call need.
    ///
    /// # Errors
    ///
    /// Returns [`WifError::Config`] naming all missing settings at once.
    pub fn validate(&self) -> Result<(), WifError> {
        let mut missing = self.federation.missing();
        missing.extend(self.assistant.missing());
        if missing.is_empty() {
            Ok(())
        } else {
            Err(missing_error(&missing))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_YAML: &str = r#"
app_name: weather_app
user_id: user1
federation:
  tenant_id: "tenant-1"
  client_id: "client-1"
  client_secret: "s3cret"
  pool_id: "pool-1"
  provider_id: "entra"
  project_number: 123456789
callback:
  port: 9090
assistant:
  project_id: "proj"
  engine_id: "engine-1"
  location: "eu"
  tool_extraction: when_tools_declared
"#;

    #[test]
    fn test_default_config() {
        let c = Config::default();
        assert_eq!(c.app_name, "wifassist");
        assert_eq!(c.callback.port, 8080);
        assert_eq!(c.callback.timeout_secs, 300);
        assert_eq!(c.federation.credential_key, "microsoft_credentials");
        assert_eq!(
            c.federation.scopes,
            vec!["openid", "email", "profile", "offline_access"]
        );
        assert_eq!(c.assistant.location, "global");
        assert_eq!(c.assistant.tool_extraction, ToolExtraction::Always);
    }

    #[test]
    fn test_from_yaml_values() {
        let c = Config::from_yaml(SAMPLE_YAML).unwrap();
        assert_eq!(c.app_name, "weather_app");
        assert_eq!(c.user_id, "user1");
        assert_eq!(c.federation.tenant_id.as_deref(), Some("tenant-1"));
        assert_eq!(c.federation.client_secret.as_deref(), Some("s3cret"));
        assert_eq!(c.federation.project_number.as_deref(), Some("123456789"));
        assert_eq!(c.callback.port, 9090);
        assert_eq!(c.assistant.location, "eu");
        assert_eq!(
            c.assistant.tool_extraction,
            ToolExtraction::WhenToolsDeclared
        );
    }

    #[test]
    fn test_from_yaml_defaults_applied() {
        let c = Config::from_yaml("user_id: someone").unwrap();
        assert_eq!(c.user_id, "someone");
        assert_eq!(c.callback.path, "/auth/callback");
        assert_eq!(c.assistant.collection, "default_collection");
        assert_eq!(c.assistant.assistant, "default_assistant");
    }

    #[test]
    fn test_validate_names_all_missing() {
        let err = Config::default().validate().unwrap_err();
        let msg = err.to_string();
        for name in [
            "federation.tenant_id",
            "federation.client_id",
            "federation.pool_id",
            "federation.provider_id",
            "assistant.project_id",
            "assistant.engine_id",
        ] {
            assert!(msg.contains(name), "{name} missing from: {msg}");
        }
        assert!(matches!(err, WifError::Config(_)));
    }

    #[test]
    fn test_validate_ok() {
        assert!(Config::from_yaml(SAMPLE_YAML).unwrap().validate().is_ok());
    }

    #[test]
    fn test_blank_identifier_counts_as_missing() {
        let c = Config::from_yaml("federation:\n  tenant_id: \"  \"").unwrap();
        assert!(c.federation.missing().contains(&"federation.tenant_id"));
    }

    #[test]
    fn test_redirect_uri() {
        let mut cb = CallbackConfig::default();
        assert_eq!(cb.redirect_uri(), "http://localhost:8080/auth/callback");
        cb.path = "cb".into();
        cb.port = 9000;
        assert_eq!(cb.redirect_uri(), "http://localhost:9000/cb");
    }

    #[test]
    fn test_resource_name_and_base_url() {
        let c = Config::from_yaml(SAMPLE_YAML).unwrap();
        assert_eq!(
            c.assistant.resource_name().unwrap(),
            "projects/proj/locations/eu/collections/default_collection/engines/engine-1/assistants/default_assistant"
        );
        assert_eq!(
            c.assistant.base_url(),
            "https://eu-discoveryengine.googleapis.com"
        );
        assert_eq!(
            AssistantConfig::default().base_url(),
            "https://discoveryengine.googleapis.com"
        );
    }

    #[test]
    fn test_resource_name_requires_ids() {
        let err = AssistantConfig::default().resource_name().unwrap_err();
        assert!(err.to_string().contains("assistant.engine_id"));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let c = Config::from_yaml(SAMPLE_YAML).unwrap();
        let dbg = format!("{:?}", c.federation);
        assert!(!dbg.contains("s3cret"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn test_load_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "wifassist.yaml",
                "federation:\n  pool_id: from-file\n  tenant_id: file-tenant\n",
            )?;
            jail.set_env("WIF_POOL_ID", "from-env");
            jail.set_env("GOOGLE_PROJECT_NUMBER", "987654321");
            jail.set_env("GEMINI_ENTERPRISE_LOCATION", "us");

            let c = Config::load(Some(std::path::Path::new("wifassist.yaml")))?;
            assert_eq!(c.federation.pool_id.as_deref(), Some("from-env"));
            assert_eq!(c.federation.tenant_id.as_deref(), Some("file-tenant"));
            assert_eq!(c.federation.project_number.as_deref(), Some("987654321"));
            assert_eq!(c.assistant.location, "us");
            Ok(())
        });
    }
}

//! Connector configuration

use serde::Deserialize;

use core_kernel::{CoreError, DatatypeRegistry};
use domain_sync::session::DEFAULT_REFRESH_MINUTES;
use domain_sync::{CredentialDefaults, Credentials, Instance, LoginConfig, SyncError, ValueSetAliases};
use infra_salesforce::SalesforceConfig;

/// Connector configuration
///
/// Every field falls back to its default when the matching environment
/// variable is absent.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Log level
    pub log_level: String,
    /// CRM API version
    pub api_version: String,
    /// Global bulk threshold; 0 disables the bulk path
    pub default_bulk_switch_threshold: usize,
    /// Session refresh interval in minutes
    pub salesforce_service_refreshed_at_interval: i64,
    /// Per-datatype JSON configuration
    pub sf_objects_config: String,
    /// Value set alias to tooling path JSON mapping
    pub valueset_list: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub security_token: Option<String>,
    /// JSON `{USERNAME, PASSWORD, SECURITY_TOKEN}`
    pub login_config: Option<String>,
    /// `prod` or `sandbox`
    pub instance: String,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            log_level: "info".to_string(),
            api_version: "52.0".to_string(),
            default_bulk_switch_threshold: 0,
            salesforce_service_refreshed_at_interval: DEFAULT_REFRESH_MINUTES,
            sf_objects_config: "{}".to_string(),
            valueset_list: "{}".to_string(),
            username: None,
            password: None,
            security_token: None,
            login_config: None,
            instance: "prod".to_string(),
        }
    }
}

impl std::fmt::Debug for ConnectorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("api_version", &self.api_version)
            .field("default_bulk_switch_threshold", &self.default_bulk_switch_threshold)
            .field(
                "salesforce_service_refreshed_at_interval",
                &self.salesforce_service_refreshed_at_interval,
            )
            .field("username", &self.username)
            .field("instance", &self.instance)
            .finish_non_exhaustive()
    }
}

impl ConnectorConfig {
    /// Loads configuration from environment
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Returns the server address
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn instance(&self) -> Instance {
        self.instance.parse().unwrap_or_default()
    }

    /// Credentials used when a request carries none
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Unexpected` when `LOGIN_CONFIG` is not valid JSON
    pub fn credential_defaults(&self) -> Result<CredentialDefaults, SyncError> {
        let instance = self.instance();
        let login_config = self
            .login_config
            .as_deref()
            .filter(|json| !json.trim().is_empty())
            .map(LoginConfig::from_json)
            .transpose()?
            .map(|config| Credentials::from(config).with_instance(instance));

        let environment = match (&self.username, &self.password, &self.security_token) {
            (Some(username), Some(password), Some(token))
                if !username.is_empty() && !password.is_empty() && !token.is_empty() =>
            {
                Some(Credentials::new(username, password, token).with_instance(instance))
            }
            _ => None,
        };

        Ok(CredentialDefaults {
            login_config,
            environment,
        })
    }

    /// Per-datatype key fields and bulk thresholds
    pub fn registry(&self) -> Result<DatatypeRegistry, CoreError> {
        DatatypeRegistry::from_json(&self.sf_objects_config, self.default_bulk_switch_threshold)
    }

    pub fn value_set_aliases(&self) -> Result<ValueSetAliases, SyncError> {
        ValueSetAliases::from_json(&self.valueset_list)
    }

    pub fn refresh_interval(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.salesforce_service_refreshed_at_interval)
    }

    /// Transport settings for the Salesforce connector
    pub fn salesforce(&self) -> SalesforceConfig {
        SalesforceConfig::default().with_api_version(self.api_version.clone())
    }
}

//! Transport configuration

use std::time::Duration;

use domain_sync::Instance;

/// Production login host
pub const PRODUCTION_LOGIN_URL: &str = "https://login.salesforce.com";

/// Sandbox login host
pub const SANDBOX_LOGIN_URL: &str = "https://test.salesforce.com";

/// Configuration of the Salesforce transport
#[derive(Debug, Clone)]
pub struct SalesforceConfig {
    /// API version without the `v` prefix, e.g. `52.0`
    pub api_version: String,

    /// Login host override; when unset the instance picks the host
    pub login_url: Option<String>,

    /// Timeout of a single HTTP request
    pub request_timeout: Duration,

    /// Delay between bulk batch status polls
    pub bulk_poll_interval: Duration,

    /// Give up waiting for a bulk batch after this long
    pub bulk_timeout: Duration,
}

impl Default for SalesforceConfig {
    fn default() -> Self {
        Self {
            api_version: "52.0".to_string(),
            login_url: None,
            request_timeout: Duration::from_secs(120),
            bulk_poll_interval: Duration::from_secs(2),
            bulk_timeout: Duration::from_secs(30 * 60),
        }
    }
}

impl SalesforceConfig {
    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    pub fn with_login_url(mut self, url: impl Into<String>) -> Self {
        self.login_url = Some(url.into());
        self
    }

    pub fn with_bulk_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.bulk_poll_interval = interval;
        self.bulk_timeout = timeout;
        self
    }

    /// SOAP login endpoint for `instance`
    pub fn login_endpoint(&self, instance: Instance) -> String {
        let host = match (&self.login_url, instance) {
            (Some(url), _) => url.trim_end_matches('/'),
            (None, Instance::Sandbox) => SANDBOX_LOGIN_URL,
            (None, Instance::Prod) => PRODUCTION_LOGIN_URL,
        };
        format!("{}/services/Soap/u/{}", host, self.api_version)
    }
}

//! Salesforce connector
//!
//! Logs credentials in through the SOAP partner API and hands back a
//! [`SalesforceClient`] bound to the resulting session.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{info, instrument};

use core_kernel::{DomainPort, PortError};
use domain_sync::{CrmConnector, CrmPort, Credentials};

use crate::client::SalesforceClient;
use crate::config::SalesforceConfig;
use crate::login::login;

/// [`CrmConnector`] for Salesforce organizations
#[derive(Debug, Clone)]
pub struct SalesforceConnector {
    http: Client,
    config: SalesforceConfig,
}

impl SalesforceConnector {
    /// Creates a connector with its own HTTP client
    ///
    /// # Errors
    ///
    /// Returns `PortError::Internal` when the HTTP client cannot be built
    pub fn new(config: SalesforceConfig) -> Result<Self, PortError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| PortError::Internal {
                message: format!("failed to build HTTP client: {}", e),
                source: Some(Box::new(e)),
            })?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &SalesforceConfig {
        &self.config
    }
}

impl DomainPort for SalesforceConnector {}

#[async_trait]
impl CrmConnector for SalesforceConnector {
    #[instrument(skip(self, credentials), fields(instance = %credentials.instance))]
    async fn connect(&self, credentials: &Credentials) -> Result<Arc<dyn CrmPort>, PortError> {
        let endpoint = self.config.login_endpoint(credentials.instance);
        let session = login(&self.http, &endpoint, credentials).await?;
        info!(instance_url = %session.instance_url, "logged in to Salesforce");

        Ok(Arc::new(SalesforceClient::new(
            self.http.clone(),
            session,
            self.config.clone(),
        )))
    }
}

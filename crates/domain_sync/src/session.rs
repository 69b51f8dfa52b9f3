//! CRM session lifecycle
//!
//! The connector keeps one logged-in CRM client per process and replaces it
//! once it has been in use for longer than the refresh interval. Reading a
//! valid session takes no lock: the slot is an `ArcSwapOption` loaded
//! atomically. Refreshes are serialized by a gate so that concurrent
//! requests hitting an expired session trigger a single login, and the new
//! session is published with one atomic store.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use arc_swap::ArcSwapOption;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use core_kernel::PortError;

use crate::error::SyncError;
use crate::ports::{CrmConnector, CrmPort};

/// Separator between security token and username in basic-auth usernames
pub const TOKEN_SEPARATOR: char = '\\';

/// Default session lifetime in minutes
pub const DEFAULT_REFRESH_MINUTES: i64 = 45;

/// CRM login environment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Instance {
    #[default]
    Prod,
    Sandbox,
}

impl Instance {
    pub fn is_sandbox(&self) -> bool {
        matches!(self, Instance::Sandbox)
    }
}

impl FromStr for Instance {
    type Err = std::convert::Infallible;

    /// Anything other than `sandbox` selects production
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(if s.trim().eq_ignore_ascii_case("sandbox") {
            Instance::Sandbox
        } else {
            Instance::Prod
        })
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instance::Prod => f.write_str("prod"),
            Instance::Sandbox => f.write_str("sandbox"),
        }
    }
}

/// Login credentials for the CRM
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub security_token: String,
    pub instance: Instance,
}

impl Credentials {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        security_token: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            security_token: security_token.into(),
            instance: Instance::default(),
        }
    }

    /// Decodes basic-auth credentials whose username is `TOKEN\USERNAME`
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Authentication` when the username carries no
    /// token separator.
    pub fn from_basic_auth(username: &str, password: &str) -> Result<Self, SyncError> {
        let (token, username) = username.split_once(TOKEN_SEPARATOR).ok_or_else(|| {
            SyncError::authentication("username must have the form SECURITY_TOKEN\\USERNAME")
        })?;
        Ok(Self::new(username, password, token))
    }

    pub fn with_instance(mut self, instance: Instance) -> Self {
        self.instance = instance;
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("security_token", &"<redacted>")
            .field("instance", &self.instance)
            .finish()
    }
}

/// The `LOGIN_CONFIG` JSON document
#[derive(Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct LoginConfig {
    pub username: String,
    pub password: String,
    pub security_token: String,
}

impl LoginConfig {
    pub fn from_json(json: &str) -> Result<Self, SyncError> {
        serde_json::from_str(json)
            .map_err(|e| SyncError::unexpected(format!("invalid LOGIN_CONFIG: {}", e)))
    }
}

impl From<LoginConfig> for Credentials {
    fn from(config: LoginConfig) -> Self {
        Credentials::new(config.username, config.password, config.security_token)
    }
}

/// Credentials configured at startup, used when a request carries none
#[derive(Debug, Clone, Default)]
pub struct CredentialDefaults {
    /// Parsed `LOGIN_CONFIG`
    pub login_config: Option<Credentials>,
    /// `USERNAME` / `PASSWORD` / `SECURITY_TOKEN`
    pub environment: Option<Credentials>,
}

impl CredentialDefaults {
    pub fn is_configured(&self) -> bool {
        self.login_config.is_some() || self.environment.is_some()
    }

    /// Picks request credentials over `LOGIN_CONFIG` over the environment
    pub fn resolve(&self, request: Option<&Credentials>) -> Option<Credentials> {
        request
            .or(self.login_config.as_ref())
            .or(self.environment.as_ref())
            .cloned()
    }

    /// Username the service will log in as when requests carry no credentials
    pub fn default_username(&self) -> Option<&str> {
        self.login_config
            .as_ref()
            .or(self.environment.as_ref())
            .map(|c| c.username.as_str())
    }
}

/// A logged-in CRM client
pub struct Session {
    username: String,
    issued_at: DateTime<Utc>,
    refresh_interval: Duration,
    client: Arc<dyn CrmPort>,
}

impl Session {
    pub fn client(&self) -> &Arc<dyn CrmPort> {
        &self.client
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// True once the session has been alive for the full refresh interval
    pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        now - self.issued_at >= self.refresh_interval
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("username", &self.username)
            .field("issued_at", &self.issued_at)
            .field("refresh_interval", &self.refresh_interval)
            .finish_non_exhaustive()
    }
}

/// Owns the process-wide CRM session
pub struct SessionManager {
    connector: Arc<dyn CrmConnector>,
    defaults: CredentialDefaults,
    refresh_interval: Duration,
    current: ArcSwapOption<Session>,
    refresh_gate: Mutex<()>,
}

impl SessionManager {
    pub fn new(
        connector: Arc<dyn CrmConnector>,
        defaults: CredentialDefaults,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            connector,
            defaults,
            refresh_interval,
            current: ArcSwapOption::empty(),
            refresh_gate: Mutex::new(()),
        }
    }

    pub fn defaults(&self) -> &CredentialDefaults {
        &self.defaults
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Whether a session is published and within its refresh interval
    pub fn is_active(&self) -> bool {
        self.current_valid(Utc::now()).is_some()
    }

    /// The published session if it is still within its refresh interval
    fn current_valid(&self, now: DateTime<Utc>) -> Option<Arc<Session>> {
        self.current
            .load_full()
            .filter(|session| !session.is_stale_at(now))
    }

    async fn login(&self, credentials: Option<&Credentials>) -> Result<Arc<Session>, SyncError> {
        let credentials = self
            .defaults
            .resolve(credentials)
            .ok_or_else(|| SyncError::authentication("no credentials supplied or configured"))?;

        let client = self
            .connector
            .connect(&credentials)
            .await
            .map_err(|e| match e {
                PortError::Unauthorized { message } => SyncError::Authentication(message),
                other => {
                    warn!(error = %other, "CRM login failed");
                    SyncError::from(other)
                }
            })?;

        let session = Arc::new(Session {
            username: credentials.username.clone(),
            issued_at: Utc::now(),
            refresh_interval: self.refresh_interval,
            client,
        });
        info!(
            username = %credentials.username,
            instance = %credentials.instance,
            "CRM session refreshed"
        );
        Ok(session)
    }
}

impl SessionManager {
    /// Returns a valid session, logging in when none exists or it expired
    ///
    /// # Errors
    ///
    /// `SyncError::Authentication` when no credentials resolve or the CRM
    /// rejects them.
    pub async fn get_session(
        &self,
        credentials: Option<&Credentials>,
    ) -> Result<Arc<Session>, SyncError> {
        if let Some(session) = self.current_valid(Utc::now()) {
            return Ok(session);
        }

        let _gate = self.refresh_gate.lock().await;
        if let Some(session) = self.current_valid(Utc::now()) {
            debug!("session refreshed by a concurrent request");
            return Ok(session);
        }

        let session = self.login(credentials).await?;
        self.current.store(Some(session.clone()));
        Ok(session)
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("defaults", &self.defaults)
            .field("refresh_interval", &self.refresh_interval)
            .finish_non_exhaustive()
    }
}

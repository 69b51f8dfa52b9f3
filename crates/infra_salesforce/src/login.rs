//! SOAP partner login
//!
//! Exchanges a username, password and security token for a session id and
//! the instance the organization lives on. The password sent to the CRM is
//! the password with the security token appended.

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::{Client, Url};
use tracing::{debug, instrument};

use core_kernel::PortError;
use domain_sync::Credentials;

use crate::error::transport_error;

/// An authenticated session on one Salesforce instance
#[derive(Clone)]
pub struct LoginSession {
    /// Session id, sent as the bearer token
    pub session_id: String,
    /// Scheme and host of the organization's instance
    pub instance_url: String,
}

impl std::fmt::Debug for LoginSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginSession")
            .field("session_id", &"<redacted>")
            .field("instance_url", &self.instance_url)
            .finish()
    }
}

/// Builds the partner `login` request envelope
pub fn login_envelope(credentials: &Credentials) -> String {
    let password = format!("{}{}", credentials.password, credentials.security_token);
    format!(
        concat!(
            r#"<?xml version="1.0" encoding="utf-8"?>"#,
            r#"<env:Envelope xmlns:xsd="http://www.w3.org/2001/XMLSchema" "#,
            r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" "#,
            r#"xmlns:env="http://schemas.xmlsoap.org/soap/envelope/">"#,
            r#"<env:Body><n1:login xmlns:n1="urn:partner.soap.sforce.com">"#,
            r#"<n1:username>{}</n1:username><n1:password>{}</n1:password>"#,
            r#"</n1:login></env:Body></env:Envelope>"#
        ),
        escape(credentials.username.as_str()),
        escape(password.as_str())
    )
}

/// Interesting elements of a login response
#[derive(Debug, Default, PartialEq)]
struct LoginResponse {
    session_id: Option<String>,
    server_url: Option<String>,
    fault: Option<String>,
    exception_code: Option<String>,
}

fn parse_login_response(xml: &str) -> Result<LoginResponse, PortError> {
    let mut reader = Reader::from_str(xml);
    let mut response = LoginResponse::default();
    let mut current: Option<Vec<u8>> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) => {
                current = Some(element.local_name().as_ref().to_vec());
            }
            Ok(Event::Text(text)) => {
                let Some(name) = current.as_deref() else {
                    continue;
                };
                let value = text
                    .unescape()
                    .map_err(|e| PortError::transformation(format!("login response: {}", e)))?
                    .into_owned();
                match name {
                    b"sessionId" => response.session_id = Some(value),
                    b"serverUrl" => response.server_url = Some(value),
                    b"faultstring" => response.fault = Some(value),
                    b"exceptionCode" => response.exception_code = Some(value),
                    _ => {}
                }
            }
            Ok(Event::End(_)) => current = None,
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(PortError::transformation(format!(
                    "malformed login response at {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
        }
    }

    Ok(response)
}

/// Reduces a server url such as `https://na1.salesforce.com/services/Soap/u/52.0/00D...`
/// to its origin
fn instance_origin(server_url: &str) -> Result<String, PortError> {
    let url = Url::parse(server_url)
        .map_err(|e| PortError::transformation(format!("invalid serverUrl {}: {}", server_url, e)))?;
    Ok(url.origin().ascii_serialization())
}

/// Logs in at `endpoint`
#[instrument(skip(http, credentials), fields(username = %credentials.username))]
pub async fn login(
    http: &Client,
    endpoint: &str,
    credentials: &Credentials,
) -> Result<LoginSession, PortError> {
    let response = http
        .post(endpoint)
        .header("Content-Type", "text/xml; charset=UTF-8")
        .header("SOAPAction", "login")
        .body(login_envelope(credentials))
        .send()
        .await
        .map_err(|e| transport_error("login", e))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| transport_error("login", e))?;
    let parsed = parse_login_response(&body)?;

    if let Some(fault) = parsed.fault {
        debug!(status = %status, code = ?parsed.exception_code, "login rejected");
        return Err(PortError::unauthorized(fault));
    }
    if !status.is_success() {
        return Err(PortError::unauthorized(format!("login failed with status {}", status)));
    }

    let session_id = parsed
        .session_id
        .ok_or_else(|| PortError::transformation("login response carries no sessionId"))?;
    let server_url = parsed
        .server_url
        .ok_or_else(|| PortError::transformation("login response carries no serverUrl"))?;

    Ok(LoginSession {
        session_id,
        instance_url: instance_origin(&server_url)?,
    })
}

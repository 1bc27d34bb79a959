use arc_swap::ArcSwapOption;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::transport::{RequestBody, Transport};
use crate::error::{RedfishError, Result};

/// Well-known session collection, used when the service root does not link one.
pub const DEFAULT_SESSIONS_URI: &str = "/redfish/v1/SessionService/Sessions";

pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

#[derive(Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    #[default]
    NoAuth,
    Basic {
        username: String,
        password: String,
    },
    Token {
        token: String,
    },
    Session {
        username: String,
        password: String,
    },
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthConfig::NoAuth => write!(f, "NoAuth"),
            AuthConfig::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            AuthConfig::Token { .. } => f.debug_struct("Token").field("token", &"<redacted>").finish(),
            AuthConfig::Session { username, .. } => f
                .debug_struct("Session")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// An established login session.
#[derive(Clone)]
pub struct Session {
    pub token: String,
    /// Session resource, the target of the logout DELETE.
    pub location: String,
    pub created_at: DateTime<Utc>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("location", &self.location)
            .field("created_at", &self.created_at)
            .finish()
    }
}

#[derive(Serialize)]
struct SessionRequest<'a> {
    #[serde(rename = "UserName")]
    user_name: &'a str,
    #[serde(rename = "Password")]
    password: &'a str,
}

pub struct AuthManager {
    config: AuthConfig,
    session: ArcSwapOption<Session>,
}

impl AuthManager {
    pub fn new(config: AuthConfig) -> Self {
        Self {
            config,
            session: ArcSwapOption::empty(),
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.load_full()
    }

    /// Logs in for session auth; a no-op for every other kind.
    ///
    /// The session collection is taken from `Links.Sessions` of the
    /// unauthenticated service root at `root_uri`, falling back to
    /// [`DEFAULT_SESSIONS_URI`].
    pub async fn establish(&self, transport: &Transport, root_uri: &str) -> Result<()> {
        let (username, password) = match &self.config {
            AuthConfig::Session { username, password } => (username, password),
            AuthConfig::NoAuth | AuthConfig::Basic { .. } | AuthConfig::Token { .. } => {
                return Ok(())
            }
        };

        let sessions_uri = discover_sessions_uri(transport, root_uri).await?;
        debug!("Creating Redfish session at {}", sessions_uri);

        let body = serde_json::to_value(SessionRequest {
            user_name: username,
            password,
        })?;
        let response = transport
            .request(
                Method::POST,
                &sessions_uri,
                HeaderMap::new(),
                Some(RequestBody::Json(&body)),
            )
            .await?;

        if !response.is_success() {
            return Err(RedfishError::AuthError(format!(
                "session login rejected with status {}",
                response.status.as_u16()
            )));
        }

        let token = response
            .header(AUTH_TOKEN_HEADER)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| RedfishError::AuthError("No X-Auth-Token in session response".to_string()))?
            .to_string();

        let location = match response.header("Location") {
            Some(location) => location.to_string(),
            None => response
                .json()
                .ok()
                .and_then(|body| body.get("@odata.id").and_then(|id| id.as_str()).map(str::to_string))
                .ok_or_else(|| {
                    RedfishError::AuthError("Session response does not identify the session resource".to_string())
                })?,
        };

        info!("Redfish session established at {}", location);
        self.session.store(Some(Arc::new(Session {
            token,
            location,
            created_at: Utc::now(),
        })));
        Ok(())
    }

    /// Credential headers for the next request. Only reads shared state.
    pub fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        match &self.config {
            AuthConfig::NoAuth => {}
            AuthConfig::Basic { username, password } => {
                let encoded = BASE64.encode(format!("{}:{}", username, password));
                headers.insert(AUTHORIZATION, header_value(&format!("Basic {}", encoded))?);
            }
            AuthConfig::Token { token } => {
                headers.insert(AUTH_TOKEN_HEADER, header_value(token)?);
            }
            AuthConfig::Session { .. } => {
                if let Some(session) = &*self.session.load() {
                    headers.insert(AUTH_TOKEN_HEADER, header_value(&session.token)?);
                }
            }
        }
        Ok(headers)
    }

    /// Best-effort logout. Failures are logged, never returned; returns
    /// whether the server acknowledged the DELETE.
    pub async fn teardown(&self, transport: &Transport) -> bool {
        let Some(session) = self.session.swap(None) else {
            return false;
        };

        let mut headers = HeaderMap::new();
        match header_value(&session.token) {
            Ok(value) => {
                headers.insert(AUTH_TOKEN_HEADER, value);
            }
            Err(e) => {
                warn!("Skipping logout of {}: {}", session.location, e);
                return false;
            }
        }

        match transport
            .request(Method::DELETE, &session.location, headers, None)
            .await
        {
            Ok(response) if response.is_success() => {
                info!("Redfish session {} closed", session.location);
                true
            }
            Ok(response) => {
                warn!(
                    "Logout of {} returned status {}",
                    session.location,
                    response.status.as_u16()
                );
                false
            }
            Err(e) => {
                warn!("Logout of {} failed: {}", session.location, e);
                false
            }
        }
    }
}

async fn discover_sessions_uri(transport: &Transport, root_uri: &str) -> Result<String> {
    let response = transport
        .request(Method::GET, root_uri, HeaderMap::new(), None)
        .await?;
    if response.is_success() {
        if let Ok(root) = response.json() {
            if let Some(uri) = root
                .pointer("/Links/Sessions/@odata.id")
                .and_then(|id| id.as_str())
            {
                return Ok(uri.to_string());
            }
        }
    }
    debug!("Service root does not link a session collection, using {}", DEFAULT_SESSIONS_URI);
    Ok(DEFAULT_SESSIONS_URI.to_string())
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| RedfishError::ConfigError("credential is not a valid header value".to_string()))
}

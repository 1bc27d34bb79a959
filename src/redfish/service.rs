use reqwest::header::HeaderMap;
use reqwest::Method;
use serde_json::Value;
use std::collections::BTreeMap;
use std::ops::BitOr;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::auth::{AuthConfig, AuthManager, Session};
use super::payload::Payload;
use super::redpath::RedPath;
use super::transport::{RequestBody, Response, Transport, TransportOptions};
use crate::config::ServiceConfig;
use crate::error::{RedfishError, Result};

/// Service root used when no root URI is configured.
pub const DEFAULT_ROOT_URI: &str = "/redfish/v1";

const VERSION_DOC_URI: &str = "/redfish";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ServiceFlags(u32);

impl ServiceFlags {
    pub const NONE: ServiceFlags = ServiceFlags(0);
    /// The service does not publish the `/redfish` version document.
    pub const NO_VERSION_DOC: ServiceFlags = ServiceFlags(0x1);

    pub fn from_bits(bits: u32) -> Self {
        ServiceFlags(bits)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: ServiceFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ServiceFlags {
    type Output = ServiceFlags;

    fn bitor(self, rhs: ServiceFlags) -> ServiceFlags {
        ServiceFlags(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Uninitialized,
    Establishing,
    Ready,
    Closed,
}

pub(crate) struct ServiceInner {
    host: String,
    root_uri: String,
    flags: ServiceFlags,
    transport: Transport,
    auth: AuthManager,
    state: Mutex<ServiceState>,
    /// Held shared by in-flight requests and exclusively by `close`.
    gate: RwLock<()>,
}

impl ServiceInner {
    pub(crate) fn state(&self) -> ServiceState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: ServiceState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    pub(crate) fn root_uri(&self) -> &str {
        &self.root_uri
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        match self.state() {
            ServiceState::Closed => Err(RedfishError::UseAfterClose),
            _ => Ok(()),
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        match self.state() {
            ServiceState::Ready => Ok(()),
            ServiceState::Closed => Err(RedfishError::UseAfterClose),
            state => Err(RedfishError::StateError(format!(
                "service is {:?}, not Ready",
                state
            ))),
        }
    }

    /// Sends one request with the current credentials attached.
    pub(crate) async fn execute(
        &self,
        method: Method,
        uri: &str,
        extra_headers: HeaderMap,
        body: Option<RequestBody<'_>>,
    ) -> Result<Response> {
        let _gate = self.gate.read().await;
        self.ensure_ready()?;

        let mut headers = self.auth.headers()?;
        headers.extend(extra_headers);
        self.transport.request(method, uri, headers, body).await
    }

    /// `reference` resolved against `base`, e.g. a relative
    /// `Members@odata.nextLink` against the page it came from.
    pub(crate) fn resolve_uri(&self, base: &str, reference: &str) -> Result<String> {
        self.transport.resolve(base, reference)
    }

    pub(crate) async fn get_json(&self, uri: &str) -> Result<Value> {
        let response = self.execute(Method::GET, uri, HeaderMap::new(), None).await?;
        check_status(&response, uri)?;
        response.json()
    }

    async fn shutdown(&self) {
        let _gate = self.gate.write().await;
        if self.state() == ServiceState::Closed {
            return;
        }
        self.set_state(ServiceState::Closed);
        self.auth.teardown(&self.transport).await;
        info!("Redfish service {} closed", self.host);
    }
}

pub(crate) fn check_status(response: &Response, uri: &str) -> Result<()> {
    if response.is_success() {
        Ok(())
    } else {
        Err(RedfishError::HttpError {
            status: response.status.as_u16(),
            uri: uri.to_string(),
        })
    }
}

/// Builder for a [`RedfishService`].
#[derive(Debug)]
pub struct ServiceBuilder {
    host: String,
    root_uri: String,
    auth: AuthConfig,
    flags: ServiceFlags,
    options: TransportOptions,
}

impl ServiceBuilder {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            root_uri: String::new(),
            auth: AuthConfig::NoAuth,
            flags: ServiceFlags::NONE,
            options: TransportOptions::default(),
        }
    }

    /// Service root URI; empty means [`DEFAULT_ROOT_URI`].
    pub fn root_uri(mut self, root_uri: impl Into<String>) -> Self {
        self.root_uri = root_uri.into();
        self
    }

    pub fn auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    pub fn flags(mut self, flags: ServiceFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = timeout;
        self
    }

    pub fn max_redirects(mut self, max_redirects: usize) -> Self {
        self.options.max_redirects = max_redirects;
        self
    }

    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.options.accept_invalid_certs = accept;
        self
    }

    /// Builds the handle and runs authentication. On failure nothing is
    /// returned and no session is left behind.
    pub async fn connect(self) -> Result<RedfishService> {
        let transport = Transport::new(&self.host, &self.options)?;
        let root_uri = if self.root_uri.is_empty() {
            DEFAULT_ROOT_URI.to_string()
        } else {
            self.root_uri
        };

        let inner = Arc::new(ServiceInner {
            host: self.host,
            root_uri,
            flags: self.flags,
            transport,
            auth: AuthManager::new(self.auth),
            state: Mutex::new(ServiceState::Uninitialized),
            gate: RwLock::new(()),
        });

        inner.set_state(ServiceState::Establishing);
        if let Err(e) = inner.auth.establish(&inner.transport, &inner.root_uri).await {
            inner.set_state(ServiceState::Closed);
            return Err(e);
        }
        inner.set_state(ServiceState::Ready);

        info!("Redfish service {} ready (root {})", inner.host, inner.root_uri);
        Ok(RedfishService { inner })
    }
}

/// A connection to one Redfish service. Payloads derived from it hold a
/// non-owning reference and fail with `UseAfterClose` once it is closed or
/// dropped.
pub struct RedfishService {
    inner: Arc<ServiceInner>,
}

impl RedfishService {
    pub fn builder(host: impl Into<String>) -> ServiceBuilder {
        ServiceBuilder::new(host)
    }

    pub async fn create(
        host: &str,
        root_uri: &str,
        auth: AuthConfig,
        flags: ServiceFlags,
    ) -> Result<Self> {
        ServiceBuilder::new(host)
            .root_uri(root_uri)
            .auth(auth)
            .flags(flags)
            .connect()
            .await
    }

    pub async fn from_config(config: &ServiceConfig) -> Result<Self> {
        let flags = if config.no_version_doc {
            ServiceFlags::NO_VERSION_DOC
        } else {
            ServiceFlags::NONE
        };
        ServiceBuilder::new(config.host.clone())
            .root_uri(config.root_uri.clone())
            .auth(config.auth.clone())
            .flags(flags)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .max_redirects(config.max_redirects)
            .accept_invalid_certs(config.accept_invalid_certs)
            .connect()
            .await
    }

    pub fn host(&self) -> &str {
        &self.inner.host
    }

    pub fn root_uri(&self) -> &str {
        &self.inner.root_uri
    }

    pub fn flags(&self) -> ServiceFlags {
        self.inner.flags
    }

    pub fn state(&self) -> ServiceState {
        self.inner.state()
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        self.inner.auth.session()
    }

    pub(crate) fn downgrade(&self) -> Weak<ServiceInner> {
        Arc::downgrade(&self.inner)
    }

    /// GET `{root_uri}{version}`.
    pub async fn service_root(&self, version: &str) -> Result<Payload> {
        let uri = format!("{}{}", self.inner.root_uri, version);
        Payload::fetch_from(&self.inner, &uri).await
    }

    /// The version document, e.g. `{"v1": "/redfish/v1/"}`.
    pub async fn versions(&self) -> Result<BTreeMap<String, String>> {
        if self.inner.flags.contains(ServiceFlags::NO_VERSION_DOC) {
            return Ok(BTreeMap::from([("v1".to_string(), DEFAULT_ROOT_URI.to_string())]));
        }

        let mut uri = VERSION_DOC_URI.to_string();
        let mut response = self
            .inner
            .execute(Method::GET, &uri, HeaderMap::new(), None)
            .await?;
        if !response.is_success() {
            // Some services only answer with the trailing slash.
            debug!("{} returned {}, retrying with trailing slash", uri, response.status);
            uri.push('/');
            response = self
                .inner
                .execute(Method::GET, &uri, HeaderMap::new(), None)
                .await?;
        }
        check_status(&response, &uri)?;

        match response.json()? {
            Value::Object(map) => Ok(map
                .into_iter()
                .filter_map(|(version, url)| url.as_str().map(|url| (version, url.to_string())))
                .collect()),
            _ => Err(RedfishError::TypeError(format!(
                "version document at {} is not an object",
                uri
            ))),
        }
    }

    /// Resolves a RedPath starting from the service root.
    pub async fn payload_by_path(&self, path: &str) -> Result<Payload> {
        let path: RedPath = path.parse()?;
        let root = self.service_root("").await?;
        root.navigate(&path.segments).await
    }

    pub async fn fetch(&self, uri: &str) -> Result<Payload> {
        Payload::fetch_from(&self.inner, uri).await
    }

    pub fn payload_from_str(&self, content: &str) -> Result<Payload> {
        Payload::from_json_str(self, content)
    }

    /// Logs out (session auth) and marks the handle closed. Idempotent;
    /// logout failures are logged and do not fail the close.
    pub async fn close(&self) {
        self.inner.shutdown().await;
    }
}

impl Drop for RedfishService {
    fn drop(&mut self) {
        if self.inner.state() == ServiceState::Closed {
            return;
        }
        self.inner.set_state(ServiceState::Closed);
        if self.inner.auth.session().is_none() {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(
                    "Redfish service {} dropped without close; logging out in the background",
                    self.inner.host
                );
                let inner = self.inner.clone();
                handle.spawn(async move {
                    inner.auth.teardown(&inner.transport).await;
                });
            }
            Err(_) => warn!(
                "Redfish service {} dropped without close; session left open",
                self.inner.host
            ),
        }
    }
}

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use reqwest::{redirect, Client as HttpClient, Method, StatusCode};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

use crate::error::{RedfishError, Result};

/// Applied to every request, logout included.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_MAX_REDIRECTS: usize = 5;

#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub timeout: Duration,
    pub max_redirects: usize,
    pub accept_invalid_certs: bool,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            accept_invalid_certs: false,
        }
    }
}

/// Request content: a JSON document or raw bytes with their media type.
#[derive(Debug, Clone, Copy)]
pub enum RequestBody<'a> {
    Json(&'a Value),
    Raw {
        content: &'a [u8],
        content_type: &'a str,
    },
}

/// A completed HTTP exchange. 4xx/5xx statuses are values, not errors.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// True when the body holds nothing but whitespace.
    pub fn is_empty(&self) -> bool {
        self.body.iter().all(u8::is_ascii_whitespace)
    }

    pub fn json(&self) -> Result<Value> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

#[derive(Clone)]
pub struct Transport {
    http_client: HttpClient,
    base_url: Url,
    timeout: Duration,
}

impl Transport {
    pub fn new(host: &str, options: &TransportOptions) -> Result<Self> {
        let host = host.trim();
        if host.is_empty() {
            return Err(RedfishError::ConfigError("host is required".to_string()));
        }
        let host = if host.contains("://") {
            host.to_string()
        } else {
            format!("https://{}", host)
        };
        let base_url = Url::parse(&host)
            .map_err(|e| RedfishError::ConfigError(format!("invalid host {}: {}", host, e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert("OData-Version", HeaderValue::from_static("4.0"));

        let user_agent = format!("redfish-rs/{}", env!("CARGO_PKG_VERSION"));
        let user_agent = HeaderValue::from_str(&user_agent)
            .map_err(|e| RedfishError::ConfigError(e.to_string()))?;
        headers.insert(USER_AGENT, user_agent);

        let http_client = HttpClient::builder()
            .default_headers(headers)
            .timeout(options.timeout)
            .redirect(redirect_policy(options.max_redirects))
            .danger_accept_invalid_certs(options.accept_invalid_certs)
            .build()?;

        Ok(Self {
            http_client,
            base_url,
            timeout: options.timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Absolute URLs pass through; anything else is joined to the host.
    pub fn url_for(&self, uri: &str) -> Result<Url> {
        if let Ok(url) = Url::parse(uri) {
            return Ok(url);
        }
        self.base_url
            .join(uri)
            .map_err(|e| RedfishError::ConfigError(format!("invalid uri {}: {}", uri, e)))
    }

    /// Resolves `reference` against `base` the way a browser resolves a
    /// link. Results on this host come back root-relative.
    pub fn resolve(&self, base: &str, reference: &str) -> Result<String> {
        let url = self
            .url_for(base)?
            .join(reference)
            .map_err(|e| RedfishError::ConfigError(format!("invalid uri {}: {}", reference, e)))?;
        if !same_origin(&url, &self.base_url) {
            return Ok(url.to_string());
        }
        let mut uri = url.path().to_string();
        if let Some(query) = url.query() {
            uri.push('?');
            uri.push_str(query);
        }
        Ok(uri)
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        headers: HeaderMap,
        body: Option<RequestBody<'_>>,
    ) -> Result<Response> {
        let url = self.url_for(uri)?;
        let started = Instant::now();

        let mut request = self.http_client.request(method.clone(), url).headers(headers);
        match body {
            Some(RequestBody::Json(json)) => request = request.json(json),
            Some(RequestBody::Raw {
                content,
                content_type,
            }) => {
                request = request
                    .header(CONTENT_TYPE, content_type)
                    .body(content.to_vec());
            }
            None => {}
        }

        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();
        let elapsed = started.elapsed();

        metrics::counter!(
            "redfish_requests_total",
            "method" => method.to_string(),
            "status" => status.as_u16().to_string()
        )
        .increment(1);
        metrics::histogram!("redfish_request_duration_seconds", "method" => method.to_string())
            .record(elapsed.as_secs_f64());

        debug!(
            "{} {} -> {} ({} bytes, {:?})",
            method,
            uri,
            status.as_u16(),
            body.len(),
            elapsed
        );

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme()
        && a.host_str() == b.host_str()
        && a.port_or_known_default() == b.port_or_known_default()
}

/// Bounded like `Policy::limited`. A hop to another scheme, host or port
/// fails the request, so `X-Auth-Token` stays with the service.
fn redirect_policy(max_redirects: usize) -> redirect::Policy {
    redirect::Policy::custom(move |attempt| {
        let Some(first) = attempt.previous().first() else {
            return attempt.follow();
        };
        if !same_origin(first, attempt.url()) {
            let refused = format!("refusing redirect to another host: {}", attempt.url());
            attempt.error(refused)
        } else if attempt.previous().len() >= max_redirects {
            attempt.error("too many redirects")
        } else {
            attempt.follow()
        }
    })
}

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::redfish::auth::AuthConfig;
use crate::redfish::transport::{DEFAULT_MAX_REDIRECTS, DEFAULT_TIMEOUT};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub service: ServiceConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
    pub host: String,
    #[serde(default)]
    pub root_uri: String,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    #[serde(default)]
    pub accept_invalid_certs: bool,
    #[serde(default)]
    pub no_version_doc: bool,
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

fn default_max_redirects() -> usize {
    DEFAULT_MAX_REDIRECTS
}

impl ServiceConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            root_uri: String::new(),
            auth: AuthConfig::default(),
            timeout_seconds: default_timeout_seconds(),
            max_redirects: default_max_redirects(),
            accept_invalid_certs: false,
            no_version_doc: false,
        }
    }
}

impl Config {
    /// Loads a TOML file, then applies `REDFISH_*` environment overrides
    /// (`REDFISH_SERVICE__HOST`, `REDFISH_SERVICE__AUTH__TOKEN`, ...).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("REDFISH")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;
        let config: Config = settings.try_deserialize()?;
        Ok(config)
    }
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RedfishError {
    #[error("Network failure: {0}")]
    NetworkError(String),

    #[error("Malformed HTTP exchange: {0}")]
    ProtocolError(String),

    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Request to {uri} failed with status {status}")]
    HttpError {
        status: u16,
        uri: String,
    },

    #[error("Invalid JSON: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Wrong JSON shape: {0}")]
    TypeError(String),

    #[error("Value out of range: {0}")]
    RangeError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Index {index} out of bounds for collection of size {size}")]
    IndexError {
        index: usize,
        size: usize,
    },

    #[error("Invalid state: {0}")]
    StateError(String),

    #[error("Service handle used after close")]
    UseAfterClose,

    #[error("Invalid path expression: {0}")]
    InvalidPath(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),
}

impl RedfishError {
    /// True for navigation misses and 404 responses.
    pub fn is_not_found(&self) -> bool {
        matches!(self, RedfishError::NotFound(_))
            || matches!(self, RedfishError::HttpError { status: 404, .. })
    }

    pub fn is_auth_error(&self) -> bool {
        matches!(self, RedfishError::AuthError(_))
            || matches!(self, RedfishError::HttpError { status: 401, .. })
    }

    pub fn is_server_error(&self) -> bool {
        matches!(self, RedfishError::HttpError { status, .. } if *status >= 500)
    }
}

impl From<reqwest::Error> for RedfishError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_builder() {
            RedfishError::ConfigError(err.to_string())
        } else if err.is_redirect() || err.is_decode() || err.is_body() {
            RedfishError::ProtocolError(err.to_string())
        } else {
            RedfishError::NetworkError(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, RedfishError>;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Invalid endpoint '{endpoint}': {source}")]
    InvalidEndpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Request to '{endpoint}' failed: {source}")]
    Network {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("'{endpoint}' answered with HTTP {status}")]
    Status { endpoint: String, status: u16 },
    #[error("Malformed response from '{endpoint}': {source}")]
    Malformed {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    pub fn endpoint(&self) -> &str {
        match self {
            FetchError::InvalidEndpoint { endpoint, .. }
            | FetchError::Network { endpoint, .. }
            | FetchError::Status { endpoint, .. }
            | FetchError::Malformed { endpoint, .. } => endpoint,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Network { source, .. } if source.is_timeout())
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid backend URL '{url}': {source}")]
    BackendUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Backend URL '{0}' cannot carry a path")]
    NotABase(String),
    #[error("Invalid page URL '{url}': {source}")]
    PageUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Poll interval of {0}s is outside the supported 10-15s range")]
    PollInterval(u64),
    #[error("Could not build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

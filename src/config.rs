use crate::errors::ConfigError;
use crate::models::LineCatalog;
use std::ops::RangeInclusive;
use std::time::Duration;
use url::Url;

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;
pub const POLL_INTERVAL_RANGE_SECS: RangeInclusive<u64> = 10..=15;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const FLASH_DURATION: Duration = Duration::from_millis(2000);

#[derive(Clone, Debug)]
pub struct DashboardConfig {
    /// Base of the JSON API, always ending in `/` so endpoint names join below it.
    pub backend_url: Url,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub line_catalog: LineCatalog,
    pub flash_duration: Duration,
}

impl DashboardConfig {
    pub fn new(backend_url: &str, poll_interval_secs: u64) -> Result<Self, ConfigError> {
        if !POLL_INTERVAL_RANGE_SECS.contains(&poll_interval_secs) {
            return Err(ConfigError::PollInterval(poll_interval_secs));
        }

        Ok(Self {
            backend_url: normalize_base_url(backend_url)?,
            poll_interval: Duration::from_secs(poll_interval_secs),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            line_catalog: LineCatalog::default(),
            flash_duration: FLASH_DURATION,
        })
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_line_catalog(mut self, catalog: LineCatalog) -> Self {
        self.line_catalog = catalog;
        self
    }
}

pub fn normalize_base_url(raw: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(raw).map_err(|source| ConfigError::BackendUrl {
        url: raw.to_string(),
        source,
    })?;

    if url.cannot_be_a_base() {
        return Err(ConfigError::NotABase(raw.to_string()));
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);

    Ok(url)
}

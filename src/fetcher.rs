use crate::config::DashboardConfig;
use crate::errors::{ConfigError, FetchError};
use crate::models::{LineCatalog, MissingEntryRecord, VehicleQuery, VehicleSnapshotRecord};
use serde::de::DeserializeOwned;
use url::Url;

/// Where snapshots come from. One call per request, no caching.
#[allow(async_fn_in_trait)]
pub trait SnapshotSource {
    async fn lines(&self, catalog: LineCatalog) -> Result<Vec<String>, FetchError>;

    async fn courses(&self, line: &str) -> Result<Vec<String>, FetchError>;

    async fn vehicles(
        &self,
        query: &VehicleQuery,
    ) -> Result<Vec<VehicleSnapshotRecord>, FetchError>;

    async fn missing_courses(
        &self,
        line: Option<&str>,
    ) -> Result<Vec<MissingEntryRecord>, FetchError>;
}

#[derive(Clone, Debug)]
pub struct HttpSnapshotSource {
    client: reqwest::Client,
    base: Url,
}

impl HttpSnapshotSource {
    pub fn new(config: &DashboardConfig) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()?;

        Ok(Self {
            client,
            base: config.backend_url.clone(),
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<T, FetchError> {
        let url = endpoint_url(&self.base, endpoint, params)?;

        tracing::debug!(url = %url, "fetching snapshot");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Network {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| FetchError::Network {
                endpoint: endpoint.to_string(),
                source,
            })?;

        serde_json::from_slice(&body).map_err(|source| FetchError::Malformed {
            endpoint: endpoint.to_string(),
            source,
        })
    }
}

impl SnapshotSource for HttpSnapshotSource {
    async fn lines(&self, catalog: LineCatalog) -> Result<Vec<String>, FetchError> {
        let endpoint = match catalog {
            LineCatalog::All => "lines",
            LineCatalog::Core => "essen_lines",
        };
        self.get_json(endpoint, &[]).await
    }

    async fn courses(&self, line: &str) -> Result<Vec<String>, FetchError> {
        self.get_json("courses", &[("line", line)]).await
    }

    async fn vehicles(
        &self,
        query: &VehicleQuery,
    ) -> Result<Vec<VehicleSnapshotRecord>, FetchError> {
        let mut params = Vec::with_capacity(2);
        if let Some(line) = query.line.as_deref() {
            params.push(("line", line));
            // a course is only meaningful within its line
            if let Some(course) = query.course.as_deref() {
                params.push(("course", course));
            }
        }
        self.get_json("vehicles", &params).await
    }

    async fn missing_courses(
        &self,
        line: Option<&str>,
    ) -> Result<Vec<MissingEntryRecord>, FetchError> {
        match line {
            Some(line) => self.get_json("missing_courses", &[("line", line)]).await,
            None => self.get_json("missing_courses", &[]).await,
        }
    }
}

pub fn endpoint_url(base: &Url, endpoint: &str, params: &[(&str, &str)]) -> Result<Url, FetchError> {
    let mut url = base
        .join(endpoint)
        .map_err(|source| FetchError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            source,
        })?;

    if !params.is_empty() {
        url.query_pairs_mut().extend_pairs(params.iter().copied());
    }

    Ok(url)
}

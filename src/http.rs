//! HTTP backend for the trajectory web app.
//!
//! Talks to the Flask service that owns the GPS data:
//! - `GET  /dates/{person}` returns a JSON array of date strings
//! - `POST /geojsondata`, `/init_map`, `/preprocess` take form fields and
//!   return GeoJSON (often wrapped in a JSON string)
//!
//! Failures are returned, never retried; the caller keeps its current view.

use std::time::{Duration, Instant};

use log::{debug, info, warn};
use reqwest::{Client, Response, Url};

use crate::backend::{BackendConfig, TrajectoryBackend, TrajectoryRequest, DATES_ENDPOINT};
use crate::error::{Result, SyncError};

/// reqwest-backed [`TrajectoryBackend`].
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
}

impl HttpBackend {
    /// Create a backend for the given configuration.
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| SyncError::Config(format!("invalid base URL {}: {}", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::Config(format!("{} cannot be a base URL", config.base_url)));
        }

        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_keepalive(Duration::from_secs(30))
            .timeout(config.timeout)
            .build()?;

        Ok(Self { client, base_url })
    }

    /// Backend configured from the environment, see [`BackendConfig::from_env`].
    pub fn from_env() -> Result<Self> {
        Self::new(&BackendConfig::from_env()?)
    }

    /// Append path segments to the base URL (segments are percent-encoded).
    fn endpoint_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| SyncError::Config(format!("{} cannot be a base URL", self.base_url)))?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    fn check_status(endpoint: &str, response: &Response) -> Result<()> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        warn!("[HttpBackend] {} answered HTTP {}", endpoint, status);
        Err(SyncError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
        })
    }
}

impl TrajectoryBackend for HttpBackend {
    async fn fetch_dates(&self, person: &str) -> Result<Vec<String>> {
        let url = self.endpoint_url(&[DATES_ENDPOINT, person])?;
        let start = Instant::now();

        let response = self.client.get(url).send().await?;
        Self::check_status(DATES_ENDPOINT, &response)?;
        let dates: Vec<String> = response.json().await?;

        debug!(
            "[HttpBackend] {} dates for person {} in {:?}",
            dates.len(),
            person,
            start.elapsed()
        );
        Ok(dates)
    }

    async fn fetch_trajectory(&self, request: &TrajectoryRequest) -> Result<String> {
        let endpoint = request.endpoint();
        let url = self.endpoint_url(&[endpoint])?;
        let start = Instant::now();

        let response = self.client.post(url).form(&request.form()).send().await?;
        let headers_elapsed = start.elapsed();
        Self::check_status(endpoint, &response)?;

        let body = response.text().await?;

        info!(
            "[HttpBackend] /{} person={} date={} headers={:?} total={:?} ({:.1}KB)",
            endpoint,
            request.person(),
            request.date(),
            headers_elapsed,
            start.elapsed(),
            body.len() as f64 / 1024.0
        );
        Ok(body)
    }
}

//! Blocking HTTP client for the ingestion service.

use crate::error::{ApiError, Result};
use crate::types::{ConfirmRequest, IngestRequest, IngestResponse};
use reqwest::blocking::Body;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use std::fs::File;
use std::path::Path;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const POOL_MAX_IDLE_PER_HOST: usize = 100;

/// Client for the remote ingestion API.
///
/// Every request is bounded by the configured timeout. The connection pool
/// keeps idle connections warm so back-to-back uploads from the worker pool
/// do not pay the handshake cost each time.
pub struct Client {
    base_url: String,
    auth_token: Option<String>,
    http: reqwest::blocking::Client,
}

impl Client {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        auth_token: Option<String>,
    ) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .build()?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self {
            base_url,
            auth_token,
            http,
        })
    }

    fn authorize(
        &self,
        builder: reqwest::blocking::RequestBuilder,
    ) -> reqwest::blocking::RequestBuilder {
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Ask the service for permission to upload; returns the handshake id
    /// and the one-shot upload URL. Success is HTTP 201.
    pub fn ingest(&self, request: &IngestRequest) -> Result<IngestResponse> {
        let url = format!("{}/v1/ingest/request", self.base_url);
        let response = self.authorize(self.http.post(&url).json(request)).send()?;

        if response.status() != StatusCode::CREATED {
            return Err(status_error(response));
        }
        Ok(response.json()?)
    }

    /// Report the outcome of the upload. Success is HTTP 200.
    pub fn confirm(&self, request: &ConfirmRequest) -> Result<()> {
        let url = format!("{}/v1/ingest/confirm", self.base_url);
        let response = self.authorize(self.http.post(&url).json(request)).send()?;

        if response.status() != StatusCode::OK {
            return Err(status_error(response));
        }
        Ok(())
    }

    /// Stream the file bytes to the upload URL with an exact Content-Length.
    /// Success is any 2xx.
    pub fn upload(&self, upload_url: &str, path: &Path) -> Result<()> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();

        let response = self
            .http
            .put(upload_url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(Body::sized(file, len))
            .send()?;

        if !response.status().is_success() {
            return Err(status_error(response));
        }
        Ok(())
    }
}

fn status_error(response: reqwest::blocking::Response) -> ApiError {
    let status = response.status().as_u16();
    let body = response.text().unwrap_or_default();
    ApiError::Status { status, body }
}

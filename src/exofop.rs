use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use tracing::debug;

use crate::config::{DEFAULT_CATALOG_URL, EXOFOP_URL};
use crate::domain::TicId;
use crate::error::AtlasError;

pub trait ExofopClient: Send + Sync {
    /// Full TOI table as CSV text.
    fn download_catalog(&self) -> Result<String, AtlasError>;
}

#[derive(Clone)]
pub struct ExofopHttpClient {
    client: Client,
    catalog_url: String,
}

impl ExofopHttpClient {
    pub fn new() -> Result<Self, AtlasError> {
        Self::with_url(DEFAULT_CATALOG_URL)
    }

    pub fn with_url(catalog_url: &str) -> Result<Self, AtlasError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("tess-atlas/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| AtlasError::ExofopHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|err| AtlasError::ExofopHttp(err.to_string()))?;
        Ok(Self {
            client,
            catalog_url: catalog_url.to_string(),
        })
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, AtlasError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "ExoFOP request failed".to_string());
        Err(AtlasError::ExofopStatus { status, message })
    }
}

impl ExofopClient for ExofopHttpClient {
    fn download_catalog(&self) -> Result<String, AtlasError> {
        debug!(url = %self.catalog_url, "exofop.request");
        let response = self
            .client
            .get(&self.catalog_url)
            .send()
            .map_err(|err| AtlasError::ExofopHttp(err.to_string()))?;
        let response = Self::handle_status(response)?;
        response
            .text()
            .map_err(|err| AtlasError::ExofopHttp(err.to_string()))
    }
}

/// ExoFOP page describing a target.
pub fn tic_url(tic: TicId) -> String {
    format!("{EXOFOP_URL}target.php?id={tic}")
}

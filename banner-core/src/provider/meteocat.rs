use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{
    Client,
    header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue},
};

use crate::{config::SourceConfig, error::FetchError, model::StationConfig};

use super::StationSource;

/// XEMA station pages on meteo.cat.
#[derive(Debug, Clone)]
pub struct MeteocatSource {
    base_url: String,
    http: Client,
}

impl MeteocatSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("ca,en-US;q=0.7,en;q=0.3"));

        let http = Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .timeout(config.timeout())
            .build()
            .context("Failed to build HTTP client for meteo.cat")?;

        Ok(Self { base_url: config.base_url.trim_end_matches('?').to_string(), http })
    }
}

#[async_trait]
impl StationSource for MeteocatSource {
    fn station_url(&self, station: &StationConfig) -> String {
        format!("{}?codi={}", self.base_url, station.code)
    }

    async fn fetch_page(&self, station: &StationConfig) -> Result<String, FetchError> {
        let url = self.station_url(station);

        let res = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| FetchError::Network { url: url.clone(), source })?;

        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|source| FetchError::Network { url: url.clone(), source })?;

        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                url,
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        if body.trim().is_empty() {
            return Err(FetchError::EmptyBody(url));
        }

        Ok(body)
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

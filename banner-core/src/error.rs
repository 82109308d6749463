use std::path::PathBuf;

use thiserror::Error;

/// Failures while retrieving a station page.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network request failed for {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP request failed for {url} with status {status}: {body}")]
    HttpStatus {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Empty response body from {0}")]
    EmptyBody(String),
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network { .. } | FetchError::EmptyBody(_) => true,
            FetchError::HttpStatus { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

/// Failures while pulling readings out of fetched markup.
#[derive(Debug, Error, PartialEq)]
pub enum ExtractError {
    #[error("No recognizable TX/TN/PPT values in page")]
    NoData,
}

/// Failures reading or writing the JSON files on disk.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("File not found: '{0}'")]
    NotFound(PathBuf),

    #[error("Failed to read '{0}'")]
    Read(PathBuf, #[source] std::io::Error),

    #[error("Failed to write '{0}'")]
    Write(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse JSON in '{0}'")]
    Parse(PathBuf, #[source] serde_json::Error),

    #[error("Failed to encode JSON for '{0}'")]
    Encode(PathBuf, #[source] serde_json::Error),
}

/// Failures that abort a render without touching the output files.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Template not found: '{0}'")]
    TemplateMissing(PathBuf),

    #[error("Template marker '{0}' not found")]
    MarkerMissing(String),

    #[error("Template marker '{marker}' appears {count} times, expected exactly once")]
    MarkerRepeated { marker: String, count: usize },

    #[error("Template end marker appears before the begin marker")]
    MarkersOutOfOrder,

    #[error("UTC offset of {0} minutes is out of range")]
    InvalidOffset(i32),

    #[error(transparent)]
    Store(#[from] StoreError),
}

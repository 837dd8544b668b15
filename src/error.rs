// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: (C) 2025 Cranky Kernel <crankykernel@proton.me>

use reqwest::StatusCode;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures surfaced by the CMS fetchers and configuration.
#[derive(Debug, Error)]
pub enum Error {
    /// The request never completed (connect, timeout, body read).
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} failed with status: {status}")]
    HttpStatus { url: String, status: StatusCode },

    /// Body was empty, not JSON, or did not match the expected shape.
    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("configuration error: {0}")]
    Configuration(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    HttpStatus,
    Decode,
    Configuration,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. } => ErrorKind::Network,
            Self::HttpStatus { .. } => ErrorKind::HttpStatus,
            Self::Decode { .. } => ErrorKind::Decode,
            Self::Configuration(_) => ErrorKind::Configuration,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_classify_fetch_failures() {
        let status = Error::HttpStatus {
            url: "http://cms/api/shows".to_string(),
            status: StatusCode::NOT_FOUND,
        };
        assert_eq!(status.kind(), ErrorKind::HttpStatus);
        assert_eq!(status.status(), Some(StatusCode::NOT_FOUND));

        let config = Error::Configuration("API_URL is not set".to_string());
        assert_eq!(config.kind(), ErrorKind::Configuration);
        assert_eq!(config.status(), None);
    }

    #[test]
    fn display_includes_url() {
        let err = Error::Decode {
            url: "http://cms/api/genres".to_string(),
            message: "Empty response from server".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to decode response from http://cms/api/genres: Empty response from server"
        );
    }
}

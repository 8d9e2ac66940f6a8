use std::time::Duration;
use thiserror::Error;

use crate::validator::Rejection;

/// Why a page could not be turned into an article.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("parse failed: {0}")]
    Parse(String),
}

impl ExtractError {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractError::Rejected(_) => "rejected",
            ExtractError::Fetch(_) => "fetch",
            ExtractError::Parse(_) => "parse",
        }
    }
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("response body exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ExtractError>;

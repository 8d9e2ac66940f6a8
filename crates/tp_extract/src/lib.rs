//! Safe fetching and readable-content extraction for user-submitted URLs.

pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod parser;
pub mod validator;

pub use error::{ExtractError, FetchError, Result};
pub use extractor::{ContentExtractor, ExtractorConfig, DEFAULT_USER_AGENT};
pub use fetcher::{FetchedPage, HttpFetcher, PageFetcher};
pub use validator::{host_label, BlockedRange, Rejection, UrlValidator, ValidationOutcome};


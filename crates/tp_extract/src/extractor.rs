use std::sync::Arc;
use std::time::Duration;
use tp_core::{ExtractedArticle, EXTRACTION_FAILED_EXCERPT};
use tracing::{error, info};
use url::Url;

use crate::error::Result;
use crate::fetcher::{HttpFetcher, PageFetcher};
use crate::parser;
use crate::validator::{host_label, UrlValidator, ValidationOutcome};

pub const DEFAULT_USER_AGENT: &str = concat!("timstapaper/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub timeout: Duration,
    pub user_agent: String,
    pub max_redirects: usize,
    pub max_body_bytes: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            max_redirects: 5,
            max_body_bytes: 5 * 1024 * 1024,
        }
    }
}

/// Turns a user-submitted URL into an [`ExtractedArticle`].
///
/// Calls are independent; nothing is cached between them.
pub struct ContentExtractor {
    validator: UrlValidator,
    fetcher: Arc<dyn PageFetcher>,
}

impl ContentExtractor {
    /// Default block-list, real network.
    pub fn new(config: &ExtractorConfig) -> Result<Self> {
        Self::with_validator(config, UrlValidator::new())
    }

    pub fn with_validator(config: &ExtractorConfig, validator: UrlValidator) -> Result<Self> {
        let fetcher = HttpFetcher::new(config, validator.clone())?;
        Ok(Self::with_fetcher(validator, Arc::new(fetcher)))
    }

    pub fn with_fetcher(validator: UrlValidator, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { validator, fetcher }
    }

    /// Always returns something storable.
    ///
    /// Rejected URLs never reach the network; their excerpt carries the
    /// rejection reason. Fetch and parse failures produce an empty article
    /// titled after the host.
    pub async fn extract(&self, raw: &str) -> ExtractedArticle {
        let url = match self.validator.validate(raw) {
            ValidationOutcome::Accepted(url) => url,
            ValidationOutcome::Rejected { rejection, label } => {
                error!(url = %raw, reason = %rejection, "Refusing to fetch URL");
                return ExtractedArticle::degraded(label, rejection.to_string());
            }
        };

        match self.extract_url(&url).await {
            Ok(article) => article,
            Err(e) => {
                error!(url = %url, kind = e.kind(), error = %e, "Error extracting content from URL");
                ExtractedArticle::degraded(host_label(&url), EXTRACTION_FAILED_EXCERPT)
            }
        }
    }

    /// Like [`extract`](Self::extract) but reports failures as typed errors.
    pub async fn try_extract(&self, raw: &str) -> Result<ExtractedArticle> {
        let url = self.validator.validate(raw).into_result()?;
        self.extract_url(&url).await
    }

    async fn extract_url(&self, url: &Url) -> Result<ExtractedArticle> {
        let page = self.fetcher.fetch(url).await?;
        let parsed = parser::parse_fetched(&page)?;

        let title = parsed
            .title
            .filter(|title| !title.trim().is_empty())
            .unwrap_or_else(|| host_label(url));
        let article = ExtractedArticle::new(title, parsed.text.unwrap_or_default(), parsed.top_image);

        info!(url = %url, title = %article.title, chars = article.content.chars().count(), "Extracted article");
        Ok(article)
    }
}

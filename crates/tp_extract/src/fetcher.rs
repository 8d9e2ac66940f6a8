//! Network side of extraction.
//!
//! [`HttpFetcher`] wires the [`UrlValidator`] into the reqwest client twice:
//! as the DNS resolver, so every address a host name resolves to is checked
//! right before connecting, and as the redirect policy, so a public page
//! cannot bounce the request into private space.

use async_trait::async_trait;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use crate::error::FetchError;
use crate::validator::UrlValidator;
use crate::ExtractorConfig;

/// Raw response handed to the parser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// Final URL after redirects
    pub url: Url,
    pub content_type: Option<String>,
    pub body: String,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Downloads a URL that already passed validation
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
    max_body_bytes: usize,
}

impl HttpFetcher {
    pub fn new(config: &ExtractorConfig, validator: UrlValidator) -> Result<Self, FetchError> {
        let validator = Arc::new(validator);
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .redirect(redirect_policy(validator.clone(), config.max_redirects))
            .dns_resolver(Arc::new(ValidatingResolver { validator }))
            // A proxy would resolve names on our behalf and bypass the resolver.
            .no_proxy()
            .build()?;

        Ok(Self {
            client,
            timeout: config.timeout,
            max_body_bytes: config.max_body_bytes,
        })
    }

    fn classify(&self, error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Http(error)
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
        debug!(url = %url, "HTTP fetch starting");
        let mut response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let limit = self.max_body_bytes;
        if response.content_length().is_some_and(|len| len > limit as u64) {
            return Err(FetchError::TooLarge { limit });
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| self.classify(e))? {
            if body.len() + chunk.len() > limit {
                return Err(FetchError::TooLarge { limit });
            }
            body.extend_from_slice(&chunk);
        }

        debug!(url = %final_url, bytes = body.len(), "HTTP fetch finished");
        Ok(FetchedPage {
            url: final_url,
            content_type,
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }
}

fn redirect_policy(validator: Arc<UrlValidator>, max_redirects: usize) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() > max_redirects {
            return attempt.error(format!("too many redirects (max {max_redirects})"));
        }
        match validator.check_url(attempt.url()) {
            Ok(()) => attempt.follow(),
            Err(rejection) => {
                warn!(target_url = %attempt.url(), reason = %rejection, "Refusing redirect");
                attempt.error(rejection)
            }
        }
    })
}

/// System resolver that refuses answers pointing into blocked ranges.
struct ValidatingResolver {
    validator: Arc<UrlValidator>,
}

impl Resolve for ValidatingResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let validator = self.validator.clone();
        let host = name.as_str().to_string();
        Box::pin(async move {
            let addrs = resolve_checked(&validator, &host).await?;
            Ok(Box::new(addrs.into_iter()) as Addrs)
        })
    }
}

/// Resolves `host` and rejects the whole answer if any address is blocked.
async fn resolve_checked(
    validator: &UrlValidator,
    host: &str,
) -> Result<Vec<SocketAddr>, Box<dyn StdError + Send + Sync>> {
    // The port is replaced by the connector.
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, 0)).await?.collect();
    if addrs.is_empty() {
        return Err(format!("no addresses found for {host}").into());
    }
    for addr in &addrs {
        if let Err(rejection) = validator.check_ip(&addr.ip()) {
            warn!(host = %host, ip = %addr.ip(), "DNS answer points into a blocked range");
            return Err(Box::new(rejection));
        }
    }
    Ok(addrs)
}

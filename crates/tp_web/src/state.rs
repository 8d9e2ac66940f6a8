use axum::http::HeaderName;
use std::sync::Arc;
use tp_core::Storage;
use tp_extract::ContentExtractor;

pub const DEFAULT_IDENTITY_HEADER: &str = "x-forwarded-email";
pub const DEFAULT_NAME_HEADER: &str = "x-forwarded-user";

pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub extractor: Arc<ContentExtractor>,
    /// Header carrying the email asserted by the upstream identity proxy.
    pub identity_header: HeaderName,
    pub name_header: HeaderName,
}

impl AppState {
    pub fn new(storage: Arc<dyn Storage>, extractor: Arc<ContentExtractor>) -> Self {
        Self {
            storage,
            extractor,
            identity_header: HeaderName::from_static(DEFAULT_IDENTITY_HEADER),
            name_header: HeaderName::from_static(DEFAULT_NAME_HEADER),
        }
    }

    pub fn with_identity_header(mut self, header: HeaderName) -> Self {
        self.identity_header = header;
        self
    }
}

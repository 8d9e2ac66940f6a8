use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use std::sync::Arc;
use tp_core::{User, UserStorage};

use crate::{error::ApiError, AppState};

/// The caller, resolved from the identity headers set by the upstream proxy.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

fn header_value<'a>(parts: &'a Parts, name: &axum::http::HeaderName) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let email = header_value(parts, &state.identity_header).ok_or(ApiError::Unauthorized)?;
        let name = header_value(parts, &state.name_header);

        let user = state.storage.get_or_create_user(email, name).await?;
        Ok(AuthUser(user))
    }
}

use axum::{
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod auth;
pub mod error;
pub mod handlers;
pub mod state;

pub use error::ApiError;
pub use state::AppState;

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::permissive();

    let api = Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/articles",
            get(handlers::list_articles).post(handlers::create_article),
        )
        .route(
            "/articles/:id",
            get(handlers::get_article)
                .patch(handlers::update_article)
                .delete(handlers::delete_article),
        );

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: AppState, addr: &str) -> tp_core::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "Listening");
    axum::serve(listener, create_app(state)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use tp_extract::{ContentExtractor, FetchError, FetchedPage, PageFetcher, UrlValidator};
    use tp_storage::MemoryStorage;
    use url::Url;

    struct StaticFetcher;

    #[async_trait]
    impl PageFetcher for StaticFetcher {
        async fn fetch(&self, url: &Url) -> Result<FetchedPage, FetchError> {
            Ok(FetchedPage {
                url: url.clone(),
                content_type: Some("text/html".to_string()),
                body: "<html><head><title>Saved Page</title></head>\
                       <body><article><p>Readable body.</p></article></body></html>"
                    .to_string(),
            })
        }
    }

    fn app() -> Router {
        let extractor = ContentExtractor::with_fetcher(UrlValidator::new(), Arc::new(StaticFetcher));
        create_app(AppState::new(Arc::new(MemoryStorage::new()), Arc::new(extractor)))
    }

    fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-forwarded-email", "reader@example.com");
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let req = Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap();
        let (status, body) = send(&app(), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "healthy"}));
    }

    #[tokio::test]
    async fn test_requires_identity() {
        let req = Request::builder().uri("/api/v1/articles").body(Body::empty()).unwrap();
        let response = app().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers().get(header::WWW_AUTHENTICATE).unwrap(), "Bearer");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({"detail": "Not authenticated"}));
    }

    #[tokio::test]
    async fn test_article_lifecycle() {
        let app = app();

        let (status, created) = send(
            &app,
            request("POST", "/api/v1/articles", Some(json!({"url": "https://example.com/post"}))),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["title"], "Saved Page");
        assert_eq!(created["content"], "Readable body.");
        assert_eq!(created["is_favorite"], false);
        let id = created["id"].as_i64().unwrap();

        let (status, list) = send(&app, request("GET", "/api/v1/articles", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list["count"], 1);

        let uri = format!("/api/v1/articles/{}", id);
        let (status, updated) = send(
            &app,
            request("PATCH", &uri, Some(json!({"is_favorite": true, "is_archived": false}))),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["is_favorite"], true);
        assert_eq!(updated["is_archived"], false);

        // Same desired state again is a no-op, not a second toggle.
        let (_, updated) = send(&app, request("PATCH", &uri, Some(json!({"is_favorite": true})))).await;
        assert_eq!(updated["is_favorite"], true);

        let (_, favorites) = send(&app, request("GET", "/api/v1/articles?filter=favorites", None)).await;
        assert_eq!(favorites["count"], 1);
        let (_, archived) = send(&app, request("GET", "/api/v1/articles?filter=archived", None)).await;
        assert_eq!(archived["count"], 0);

        let (status, _) = send(&app, request("DELETE", &uri, None)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, body) = send(&app, request("GET", &uri, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"detail": "Article not found"}));
        let (status, _) = send(&app, request("DELETE", &uri, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_blocked_url_is_stored_degraded() {
        let (status, created) = send(
            &app(),
            request("POST", "/api/v1/articles", Some(json!({"url": "http://192.168.1.1/admin"}))),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["content"], "");
        assert!(created["excerpt"].as_str().unwrap().contains("private network"));
    }

    #[tokio::test]
    async fn test_rejects_non_http_submission() {
        let (status, _) = send(
            &app(),
            request("POST", "/api/v1/articles", Some(json!({"url": "javascript:alert(1)"}))),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_articles_are_owner_scoped() {
        let app = app();
        let (_, created) = send(
            &app,
            request("POST", "/api/v1/articles", Some(json!({"url": "https://example.com/post"}))),
        )
        .await;
        let uri = format!("/api/v1/articles/{}", created["id"]);

        let req = Request::builder()
            .uri(&uri)
            .header("x-forwarded-email", "someone-else@example.com")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

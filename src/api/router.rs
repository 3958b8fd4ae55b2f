use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::errors::GatewayResult;

use super::handlers;
use super::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/rss", get(handlers::rss))
        .route("/shorts", get(handlers::shorts))
        .route("/download", get(handlers::download))
        .route("/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl+C
pub async fn serve(state: AppState, addr: &str) -> GatewayResult<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MEDIA_NAMESPACE;
    use crate::domain::DownloadConstraints;
    use crate::errors::GatewayError;
    use crate::services::{DownloadResolver, FeedRewriter, FeedService};
    use crate::sources::traits::{MockFeedUpstream, MockMediaExtractor};
    use crate::sources::{ExtractionError, ExtractionParams};
    use crate::storage::SlotManager;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tower::ServiceExt;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>Channel</title>
<item><title>Long talk</title><link>https://x/watch?v=abc</link></item>
<item><title>Quick one #Shorts</title><link>https://x/shorts/def</link></item>
</channel></rss>"#;

    fn app(
        upstream: MockFeedUpstream,
        extractor: MockMediaExtractor,
        dir: &Path,
        base_url: Option<&str>,
    ) -> Router {
        let state = AppState::new(
            FeedService::new(Arc::new(upstream), FeedRewriter::new(DEFAULT_MEDIA_NAMESPACE)),
            DownloadResolver::new(Arc::new(extractor), DownloadConstraints::default()),
            SlotManager::new(dir).unwrap(),
            base_url.map(String::from),
        );
        create_router(state)
    }

    fn feed_upstream() -> MockFeedUpstream {
        let mut upstream = MockFeedUpstream::new();
        upstream
            .expect_fetch()
            .returning(|_| Ok(FEED.to_string()));
        upstream
    }

    fn produce(params: &ExtractionParams, ext: &str, bytes: &[u8]) {
        fs::write(params.output_template.replace("%(ext)s", ext), bytes).unwrap();
    }

    async fn get(app: Router, uri: &str) -> Response {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn file_count(dir: &Path) -> usize {
        fs::read_dir(dir).unwrap().count()
    }

    #[tokio::test]
    async fn test_health() {
        let dir = TempDir::new().unwrap();
        let app = app(MockFeedUpstream::new(), MockMediaExtractor::new(), dir.path(), None);

        let response = get(app, "/health").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "ok");
    }

    #[tokio::test]
    async fn test_rss_rewrites_feed() {
        let dir = TempDir::new().unwrap();
        let mut upstream = MockFeedUpstream::new();
        upstream
            .expect_fetch()
            .withf(|params| {
                params.contains(&("bridge".to_string(), "YoutubeBridge".to_string()))
                    && params.contains(&("format".to_string(), "Mrss".to_string()))
                    && !params.iter().any(|(k, _)| k == "remove_existing_media")
            })
            .times(1)
            .returning(|_| Ok(FEED.to_string()));
        let app = app(upstream, MockMediaExtractor::new(), dir.path(), Some("https://svc"));

        let response = get(app, "/rss?bridge=YoutubeBridge&remove_existing_media=true").await;

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
        assert!(content_type.starts_with("text/plain"));
        assert!(content_type.contains("UTF-8"));

        let body = body_string(response).await;
        assert!(body.contains(
            r#"<media:content url="https://svc/download?video_url=https%3A%2F%2Fx%2Fwatch%3Fv%3Dabc"/>"#
        ));
        assert!(body.contains(r#"xmlns:media="http://search.yahoo.com/mrss/""#));
        assert!(body.contains("<link>https://x/watch?v=abc</link>"));
        assert_eq!(body.matches("<media:content").count(), 2);
    }

    #[tokio::test]
    async fn test_rss_infers_base_url_from_forwarded_headers() {
        let dir = TempDir::new().unwrap();
        let app = app(feed_upstream(), MockMediaExtractor::new(), dir.path(), None);

        let request = Request::builder()
            .uri("/rss")
            .header("x-forwarded-proto", "https")
            .header("x-forwarded-host", "feeds.example.org")
            .header(header::HOST, "127.0.0.1:8000")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        let body = body_string(response).await;
        assert!(body.contains("https://feeds.example.org/download?video_url="));
    }

    #[tokio::test]
    async fn test_rss_uses_host_header() {
        let dir = TempDir::new().unwrap();
        let app = app(feed_upstream(), MockMediaExtractor::new(), dir.path(), None);

        let request = Request::builder()
            .uri("/rss")
            .header(header::HOST, "gateway:8000")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        let body = body_string(response).await;
        assert!(body.contains("http://gateway:8000/download?video_url="));
    }

    #[tokio::test]
    async fn test_rss_rejects_bad_flag_before_fetching() {
        let dir = TempDir::new().unwrap();
        let mut upstream = MockFeedUpstream::new();
        upstream.expect_fetch().times(0);
        let app = app(upstream, MockMediaExtractor::new(), dir.path(), Some("https://svc"));

        let response = get(app, "/rss?remove_existing_media=perhaps").await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_string(response).await.contains("remove_existing_media"));
    }

    #[tokio::test]
    async fn test_shorts_drops_short_entries() {
        let dir = TempDir::new().unwrap();
        let app = app(feed_upstream(), MockMediaExtractor::new(), dir.path(), Some("https://svc"));

        let response = get(app, "/shorts").await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_string(response).await;
        assert!(body.contains("Long talk"));
        assert!(!body.contains("Quick one"));
        assert_eq!(body.matches("<media:content").count(), 1);
    }

    #[tokio::test]
    async fn test_upstream_failure_is_bad_gateway() {
        let dir = TempDir::new().unwrap();
        let mut upstream = MockFeedUpstream::new();
        upstream
            .expect_fetch()
            .returning(|_| Err(GatewayError::UpstreamFeed("503 Service Unavailable".to_string())));
        let app = app(upstream, MockMediaExtractor::new(), dir.path(), Some("https://svc"));

        let response = get(app, "/rss").await;

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["error"], "Upstream feed request failed");
        assert!(json["details"].as_str().unwrap().contains("503"));
    }

    #[tokio::test]
    async fn test_malformed_upstream_is_bad_gateway() {
        let dir = TempDir::new().unwrap();
        let mut upstream = MockFeedUpstream::new();
        upstream
            .expect_fetch()
            .returning(|_| Ok("<rss><channel><item>".to_string()));
        let app = app(upstream, MockMediaExtractor::new(), dir.path(), Some("https://svc"));

        let response = get(app, "/rss").await;

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_download_requires_valid_url() {
        let dir = TempDir::new().unwrap();

        for uri in ["/download", "/download?video_url=", "/download?video_url=ftp%3A%2F%2Fx%2Fv"] {
            let mut extractor = MockMediaExtractor::new();
            extractor.expect_extract().times(0);
            let app = app(MockFeedUpstream::new(), extractor, dir.path(), None);

            let response = get(app, uri).await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_download_streams_video_and_releases_slot() {
        let dir = TempDir::new().unwrap();
        let mut extractor = MockMediaExtractor::new();
        extractor
            .expect_extract()
            .withf(|url, params| url == "https://x/watch?v=abc" && !params.thumbnail_only)
            .times(1)
            .returning(|_, params| {
                produce(params, "mp4", b"video-bytes");
                Ok(())
            });
        let app = app(MockFeedUpstream::new(), extractor, dir.path(), None);

        let response = get(app, "/download?video_url=https%3A%2F%2Fx%2Fwatch%3Fv%3Dabc").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "11");
        assert_eq!(response.headers()[handlers::ARTIFACT_KIND_HEADER], "video");
        assert_eq!(file_count(dir.path()), 1);

        assert_eq!(body_string(response).await, "video-bytes");
        assert_eq!(file_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_download_falls_back_to_thumbnail() {
        let dir = TempDir::new().unwrap();
        let mut extractor = MockMediaExtractor::new();
        extractor
            .expect_extract()
            .withf(|_, params| !params.thumbnail_only)
            .returning(|_, _| {
                Err(ExtractionError::Unavailable("This live event will begin in 3 hours".to_string()))
            });
        extractor
            .expect_extract()
            .withf(|_, params| params.thumbnail_only)
            .returning(|_, params| {
                produce(params, "jpg", b"jpeg");
                Ok(())
            });
        let app = app(MockFeedUpstream::new(), extractor, dir.path(), None);

        let response = get(app, "/download?video_url=https%3A%2F%2Fx%2Flive").await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
        assert_eq!(response.headers()[handlers::ARTIFACT_KIND_HEADER], "thumbnail");
        assert_eq!(body_string(response).await, "jpeg");
        assert_eq!(file_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_download_without_artifact_is_not_found() {
        let dir = TempDir::new().unwrap();
        let mut extractor = MockMediaExtractor::new();
        extractor.expect_extract().times(2).returning(|_, _| Ok(()));
        let app = app(MockFeedUpstream::new(), extractor, dir.path(), None);

        let response = get(app, "/download?video_url=https%3A%2F%2Fx%2Fgone").await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(file_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_download_hard_failure_is_bad_gateway() {
        let dir = TempDir::new().unwrap();
        let mut extractor = MockMediaExtractor::new();
        extractor.expect_extract().times(1).returning(|_, params| {
            produce(params, "mp4.part", b"partial");
            Err(ExtractionError::Failed {
                code: "1".to_string(),
                message: "HTTP Error 403: Forbidden".to_string(),
            })
        });
        let app = app(MockFeedUpstream::new(), extractor, dir.path(), None);

        let response = get(app, "/download?video_url=https%3A%2F%2Fx%2Fv").await;

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(file_count(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_concurrent_downloads_use_separate_slots() {
        let dir = TempDir::new().unwrap();
        let mut extractor = MockMediaExtractor::new();
        extractor.expect_extract().times(2).returning(|url, params| {
            let payload = if url.ends_with('1') { b"first" } else { b"other" };
            produce(params, "mp4", payload);
            Ok(())
        });
        let app = app(MockFeedUpstream::new(), extractor, dir.path(), None);

        let first = get(app.clone(), "/download?video_url=https%3A%2F%2Fx%2F1").await;
        let second = get(app, "/download?video_url=https%3A%2F%2Fx%2F2").await;
        assert_eq!(file_count(dir.path()), 2);

        assert_eq!(body_string(second).await, "other");
        assert_eq!(body_string(first).await, "first");
        assert_eq!(file_count(dir.path()), 0);
    }
}

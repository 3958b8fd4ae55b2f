use std::pin::Pin;
use std::task::{Context, Poll};

use axum::{
    body::Body,
    extract::{Query, RawQuery, State},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
};
use futures::Stream;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};
use url::Url;

use crate::config::ENCODING;
use crate::errors::{GatewayError, GatewayResult};
use crate::services::{EntryFilter, RewriteOptions, ShortsFilter};
use crate::storage::SlotGuard;

use super::state::AppState;

/// Tells the caller whether it got the media or the thumbnail fallback
pub const ARTIFACT_KIND_HEADER: &str = "x-artifact-kind";

const REMOVE_EXISTING_MEDIA: &str = "remove_existing_media";

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub video_url: Option<String>,
}

/// Rewritten feed for the given aggregator query
pub async fn rss(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> GatewayResult<Response> {
    feed_response(&state, &headers, query.as_deref(), None).await
}

/// Same as [`rss`], without short-form entries
pub async fn shorts(
    State(state): State<AppState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> GatewayResult<Response> {
    feed_response(&state, &headers, query.as_deref(), Some(&ShortsFilter)).await
}

async fn feed_response(
    state: &AppState,
    headers: &HeaderMap,
    raw_query: Option<&str>,
    entry_filter: Option<&dyn EntryFilter>,
) -> GatewayResult<Response> {
    let query = query_pairs(raw_query);
    let options = RewriteOptions {
        remove_existing_media: flag(&query, REMOVE_EXISTING_MEDIA)?,
        entry_filter,
    };
    let base_url = request_base_url(state, headers)?;

    let body = state.feeds.fetch_rewritten(&query, &options, &base_url).await?;

    Ok((
        [(header::CONTENT_TYPE, format!("text/plain; charset={}", ENCODING))],
        body,
    )
        .into_response())
}

/// Resolve a source URL into a file and stream it back.
///
/// The slot is released once the body stream is dropped, whether it was
/// fully sent or the client went away.
pub async fn download(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> GatewayResult<Response> {
    let source_url = validate_source_url(query.video_url.as_deref())?;

    let slot = state.slots.reserve()?;
    let resolver = state.resolver.clone();
    let url = source_url.clone();

    let (slot, resolved) = tokio::task::spawn_blocking(move || {
        let resolved = resolver.resolve(&url, &slot);
        (slot, resolved)
    })
    .await
    .map_err(|e| GatewayError::Io(std::io::Error::other(format!("download task failed: {}", e))))?;

    let artifact = resolved?.ok_or(GatewayError::NoArtifactAvailable(source_url))?;

    let file = tokio::fs::File::open(&artifact.path).await?;
    let length = file.metadata().await?.len();
    let mime = mime_guess::from_path(&artifact.path).first_or_octet_stream();

    info!(slot = %slot.stem(), kind = %artifact.kind, bytes = length, %mime, "serving artifact");

    let body = Body::from_stream(SlotStream::new(ReaderStream::new(file), slot));
    let mut response = body.into_response();
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    headers.insert(
        ARTIFACT_KIND_HEADER,
        HeaderValue::from_static(artifact.kind.as_str()),
    );

    Ok(response)
}

pub async fn health() -> &'static str {
    "ok"
}

/// Body stream that holds on to its download slot
struct SlotStream<S> {
    inner: S,
    slot: SlotGuard,
}

impl<S> SlotStream<S> {
    fn new(inner: S, slot: SlotGuard) -> Self {
        Self { inner, slot }
    }
}

impl<S: Stream + Unpin> Stream for SlotStream<S> {
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let polled = Pin::new(&mut self.inner).poll_next(cx);
        if let Poll::Ready(None) = polled {
            debug!(slot = %self.slot.stem(), "artifact fully streamed");
        }
        polled
    }
}

fn query_pairs(raw: Option<&str>) -> Vec<(String, String)> {
    raw.map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

/// Parse a boolean query flag
pub fn parse_flag(name: &str, value: &str) -> GatewayResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(GatewayError::InvalidInput(format!(
            "{} must be a boolean, got '{}'",
            name, value
        ))),
    }
}

fn flag(query: &[(String, String)], name: &str) -> GatewayResult<bool> {
    query
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| parse_flag(name, value))
        .transpose()
        .map(|value| value.unwrap_or(false))
}

fn validate_source_url(value: Option<&str>) -> GatewayResult<String> {
    let value = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| GatewayError::InvalidInput("video_url is required".to_string()))?;

    let url = Url::parse(value)
        .map_err(|e| GatewayError::InvalidInput(format!("video_url is not a valid URL: {}", e)))?;

    match url.scheme() {
        "http" | "https" => Ok(value.to_string()),
        other => Err(GatewayError::InvalidInput(format!(
            "video_url scheme '{}' is not supported",
            other
        ))),
    }
}

/// Self URL for enclosures: configured, or rebuilt from the request headers
fn request_base_url(state: &AppState, headers: &HeaderMap) -> GatewayResult<String> {
    if let Some(base_url) = &state.base_url {
        return Ok(base_url.clone());
    }

    let first_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    let proto = first_value("x-forwarded-proto").unwrap_or("http");
    let host = first_value("x-forwarded-host")
        .or_else(|| first_value(header::HOST.as_str()))
        .ok_or_else(|| {
            GatewayError::InvalidInput("cannot determine base URL without a Host header".to_string())
        })?;

    Ok(format!("{}://{}", proto, host.trim_end_matches('/')))
}

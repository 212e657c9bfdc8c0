//! `GET /download-proxy?url=&filename=`
//!
//! Streams a remote video back as an attachment. Validation and upstream
//! failures become JSON errors; anything after the headers only cuts the
//! body short.

use axum::{
    extract::{RawQuery, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use gramgrab_core::logging::new_request_id;
use gramgrab_proxy::DownloadRequest;
use tracing::Instrument;

use crate::http::{AppError, AppResult, AppState};

pub fn create_download_proxy_router() -> Router<AppState> {
    Router::new()
        .route("/download-proxy", get(download_proxy))
        .route("/api/download-proxy", get(download_proxy))
}

pub async fn download_proxy(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> AppResult<impl IntoResponse> {
    let request = parse_download_query(query.as_deref())?;
    let span = tracing::info_span!("download_proxy", request_id = %new_request_id());
    let download = state.proxy.proxy_download(request).instrument(span).await?;
    Ok(download)
}

/// Repeated parameters are allowed; the first occurrence wins.
fn parse_download_query(query: Option<&str>) -> AppResult<DownloadRequest> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query.unwrap_or_default())
        .map_err(|e| AppError::bad_request("invalidQuery", e.to_string()))?;

    let first = |name: &str| {
        pairs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
    };

    Ok(DownloadRequest {
        url: first("url"),
        filename: first("filename"),
    })
}

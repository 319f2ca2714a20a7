use axum::{
    body::Body,
    extract::{rejection::QueryRejection, Query, State},
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::collections::HashMap;
use tailer::{clamp_rate_limit, ContentStream, TailedFile};
use tokio_stream::StreamExt;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::ApiResult;
use crate::state::AppState;

pub const NOT_FOUND_BODY: &str = "Resource not found.\n";

const TEXT_PLAIN: &str = "text/plain";

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/slow", get(slow_handler))
        .fallback(not_found_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /slow[?rate_limit=N]: live tail of the slow log, keeping one record
/// out of every N.
async fn slow_handler(
    State(state): State<AppState>,
    query: Result<Query<HashMap<String, String>>, QueryRejection>,
) -> ApiResult<Response> {
    let params = query.map(|Query(params)| params).unwrap_or_default();
    let rate_limit = parse_rate_limit(params.get("rate_limit").map(String::as_str));

    let config = &state.config;
    let options = config.tail_options(rate_limit);
    let tailed = TailedFile::open(config.slowlog.path.as_str(), &options).inspect_err(|_| {
        state.metrics.open_failed();
    })?;

    info!(path = %config.slowlog.path, rate_limit, "Streaming slow log");

    let mut guard = state.metrics.stream_started();
    let stream = ContentStream::spawn(tailed, config.server.block_size, state.shutdown_rx()).map(
        move |chunk| {
            if let Ok(bytes) = &chunk {
                guard.record_bytes(bytes.len());
            }
            chunk
        },
    );

    Ok(([(header::CONTENT_TYPE, TEXT_PLAIN)], Body::from_stream(stream)).into_response())
}

async fn not_found_handler(uri: Uri) -> impl IntoResponse {
    warn!(path = %uri.path(), "Resource not found");
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, TEXT_PLAIN)],
        NOT_FOUND_BODY,
    )
}

/// Parse the `rate_limit` query value the way C `atoi` would, then clamp to
/// at least 1. Missing or unparsable input means no limiting.
fn parse_rate_limit(raw: Option<&str>) -> usize {
    let Some(raw) = raw else {
        return 1;
    };

    let trimmed = raw.trim_start_matches(|c: char| c.is_ascii_whitespace() || c == '\x0b');
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };

    let magnitude = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0i64, |acc, d| acc.saturating_mul(10).saturating_add(i64::from(d - b'0')));

    clamp_rate_limit(if negative { -magnitude } else { magnitude })
}

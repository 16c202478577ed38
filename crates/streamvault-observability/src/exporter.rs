//! Prometheus Scrape Endpoint
//!
//! Serves the crate-level [`REGISTRY`] over HTTP so the block-cache,
//! stream-reader, and readahead series defined in [`crate::metrics`] can be
//! scraped. StreamVault nodes mount the router on their admin listener:
//!
//! ```ignore
//! let admin = axum::Router::new()
//!     .merge(streamvault_observability::exporter::router());
//! axum::serve(listener, admin).await?;
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus::{Encoder, TextEncoder};

use crate::metrics::REGISTRY;

/// Encode every registered metric family in the Prometheus text format.
/// Returns the encoded body and its content type.
pub fn encode_metrics() -> Result<(Vec<u8>, String), prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok((buffer, encoder.format_type().to_string()))
}

async fn serve_metrics() -> Response {
    match encode_metrics() {
        Ok((body, content_type)) => {
            (StatusCode::OK, [("content-type", content_type)], body).into_response()
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("metrics encoding failed: {}", err),
        )
            .into_response(),
    }
}

/// Router exposing `GET /metrics`
pub fn router() -> Router {
    Router::new().route("/metrics", get(serve_metrics))
}

//! HTTP surface (spec §4.4): a single fallback handler covers every
//! ARM resource path, since the provider/type space is configured at
//! runtime rather than known at compile time. Grounded on the
//! teacher's security-header layering in `bin/core/src/api/mod.rs`,
//! adapted from its nested per-feature routers (which don't apply
//! here — every path runs through the same pipeline) to one
//! catch-all plus an outer request-deadline layer (spec §5: "Each
//! request carries a 10-minute total deadline").

use std::time::Duration;

use axum::Router;
use axum::extract::OriginalUri;
use bytes::Bytes;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use axum::response::{IntoResponse, Response};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::dispatch;
use crate::error::ApiError;
use crate::pipeline;

async fn handle(
  method: Method,
  OriginalUri(uri): OriginalUri,
  headers: HeaderMap,
  body: Bytes,
) -> Response {
  match route(&method, uri.path(), &headers, body).await {
    Ok(response) => response,
    Err(err) => err.into_response(),
  }
}

async fn route(
  method: &Method,
  path: &str,
  headers: &HeaderMap,
  body: Bytes,
) -> Result<Response, ApiError> {
  let ctx = pipeline::run(method, path, headers, body).await?;
  match *method {
    Method::PUT => dispatch::handle_put(ctx).await,
    Method::POST => dispatch::handle_post(ctx, headers).await,
    Method::DELETE => dispatch::handle_delete(ctx, headers).await,
    Method::GET => dispatch::handle_get(ctx, headers).await,
    _ => Err(ApiError::InvalidRequest(format!("unsupported method '{method}'"))),
  }
}

pub fn app() -> Router {
  Router::new()
    .fallback(handle)
    .layer(TimeoutLayer::new(Duration::from_secs(600)))
    .layer(TraceLayer::new_for_http())
    .layer(SetResponseHeaderLayer::overriding(
      HeaderName::from_static("x-content-type-options"),
      HeaderValue::from_static("nosniff"),
    ))
    .layer(SetResponseHeaderLayer::overriding(
      HeaderName::from_static("x-frame-options"),
      HeaderValue::from_static("DENY"),
    ))
}

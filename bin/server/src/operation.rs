//! Operation projection (spec §4.6): renders `AsyncOperation` rows
//! into the ARM-shaped `Operation` object a poll expects.

use std::collections::HashMap;

use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use bundle::BundleManifest;
use store::{AsyncOperation, running_marker};

use crate::error::ApiError;
use crate::installer;
use crate::models::OperationResponse;

pub const API_VERSION: &str = "2018-09-01-preview";

/// `https` unless the bound host is `localhost` (spec §4.6).
pub fn location_url(
  host: &str,
  resource_path: &str,
  operation_id: &str,
) -> String {
  let scheme = if host.starts_with("localhost") { "http" } else { "https" };
  format!(
    "{scheme}://{host}{resource_path}/operations/{operation_id}?api-version={API_VERSION}"
  )
}

pub fn accepted_response(location: &str) -> Response {
  let mut headers = HeaderMap::new();
  headers.insert(
    "Location",
    HeaderValue::from_str(location).unwrap_or_else(|_| HeaderValue::from_static("")),
  );
  headers.insert("Retry-After", HeaderValue::from_static("60"));
  (StatusCode::ACCEPTED, headers, Json(serde_json::json!({}))).into_response()
}

/// Whether the stored `(action, status)` pair is internally
/// consistent: a running `delete` must read `Deleting`; a running
/// lifecycle/custom action must read `Running<action>`.
fn expected_running_status(action: &str) -> String {
  if action == "delete" {
    "Deleting".to_string()
  } else {
    running_marker(action)
  }
}

pub async fn render(
  op_id: &str,
  op: &AsyncOperation,
  location: &str,
  installation_name: Option<&str>,
  manifest: &BundleManifest,
) -> Result<Response, ApiError> {
  if op.is_running() {
    if op.status != expected_running_status(&op.action) {
      return Err(ApiError::Internal(anyhow::anyhow!(
        "inconsistent operation state: action='{}' status='{}' (Unknown)",
        op.action,
        op.status
      )));
    }
    return Ok(accepted_response(location));
  }

  let properties = if op.status == "Succeeded" {
    if op.action == "delete" {
      None
    } else if let Some(name) = installation_name {
      let outputs = installer::list_outputs(name).await.unwrap_or_default();
      let visible: HashMap<String, String> = outputs
        .into_iter()
        .filter(|(key, _)| {
          manifest
            .outputs_for_action(&op.action)
            .any(|o| &o.name == key && !o.sensitive)
        })
        .collect();
      Some(serde_json::to_value(visible).unwrap_or_default())
    } else {
      None
    }
  } else {
    op.output
      .as_ref()
      .map(|output| serde_json::json!({ "output": output }))
  };

  Ok(
    Json(OperationResponse {
      id: op_id.to_string(),
      name: op_id.to_string(),
      status: op.status.clone(),
      properties,
    })
    .into_response(),
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn location_url_prefers_http_for_localhost() {
    assert!(location_url("localhost:8080", "/subscriptions/s/providers/p/t/n", "op-1")
      .starts_with("http://"));
    assert!(location_url("rp.example.com", "/subscriptions/s/providers/p/t/n", "op-1")
      .starts_with("https://"));
  }

  #[test]
  fn expected_running_status_matches_action() {
    assert_eq!(expected_running_status("delete"), "Deleting");
    assert_eq!(expected_running_status("rollback"), running_marker("rollback"));
  }
}

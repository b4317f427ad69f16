//! Request Pipeline (spec §4.4, C4): five ordered middleware stages,
//! each either short-circuiting with a rendered error or advancing.
//! Builds the per-request `BundleRpContext`, the "dynamic context
//! value" the design notes (spec §9) call for — a builder each stage
//! fills in, owned by the request until it is handed to the
//! Dispatcher.

use std::sync::Arc;

use axum::http::{HeaderMap, Method};
use bundle::BundleManifest;
use bytes::Bytes;
use store::{ProvisioningState, ResourceState};
use uuid::Uuid;

use crate::config::server_config;
use crate::error::ApiError;
use crate::models::RequestBody;
use crate::path::{self, ParsedPath, RequestShape};
use crate::state::{authorizer, bundle_registry, db_store};

pub struct BundleRpContext {
  pub request_id: String,
  pub parsed: ParsedPath,
  pub manifest: Arc<BundleManifest>,
  pub existing_state: Option<ResourceState>,
  pub body: RequestBody,
}

/// Stage 1 — RequestId: reuses the caller's correlation header if
/// present, otherwise mints a UUID.
fn request_id(headers: &HeaderMap) -> String {
  headers
    .get("X-Ms-Correlation-Request-Id")
    .and_then(|v| v.to_str().ok())
    .map(str::to_string)
    .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// RPaaS fronts this provider behind a proxy that rewrites the URL
/// path but forwards the original one in `x-ms-customproviders-requestpath`
/// (spec §6). When present it overrides the path the router saw.
fn effective_path<'a>(path: &'a str, headers: &'a HeaderMap) -> &'a str {
  headers
    .get("x-ms-customproviders-requestpath")
    .and_then(|v| v.to_str().ok())
    .unwrap_or(path)
}

/// Stage 2 — Authenticate: acquires an `Authorizer`, 500 on failure.
/// Acquisition itself never fails in this implementation (it always
/// falls back to CLI credentials), but the stage is kept explicit so
/// a future hard-failure path has somewhere to return from.
async fn authenticate() -> Result<(), ApiError> {
  authorizer().await;
  Ok(())
}

/// Stage 3 — ValidateProvider: resolves `provider/type` to a
/// `BundleManifest`.
async fn validate_provider(
  parsed: &ParsedPath,
) -> Result<Arc<BundleManifest>, ApiError> {
  let config = server_config();
  if !config.is_known_provider(&parsed.provider, &parsed.resource_type) {
    return Err(ApiError::Internal(anyhow::anyhow!(
      "unregistered provider/type '{}/{}'",
      parsed.provider,
      parsed.resource_type
    )));
  }
  bundle_registry()
    .get(&parsed.provider, &parsed.resource_type)
    .await
    .ok_or_else(|| {
      ApiError::Internal(anyhow::anyhow!(
        "unregistered provider/type '{}/{}'",
        parsed.provider,
        parsed.resource_type
      ))
    })
}

/// The state-transition gate (spec §4.5 table), applied by LoadState
/// before dispatch.
fn check_gate(
  method: &Method,
  state: &ResourceState,
) -> Result<(), ApiError> {
  use ProvisioningState::*;
  let ps = state.provisioning_state;
  let ok = match *method {
    Method::PUT => ps.is_terminal(),
    Method::POST => ps.is_terminal(),
    Method::DELETE => ps.is_terminal() || matches!(ps, Deleting),
    _ => true,
  };
  if ok {
    Ok(())
  } else {
    Err(ApiError::Conflict(format!(
      "resource is in provisioning state '{ps}', which does not admit a {method}"
    )))
  }
}

/// Stage 4 — LoadState: a GET on a list path bypasses state load.
async fn load_state(
  method: &Method,
  parsed: &ParsedPath,
) -> Result<Option<ResourceState>, ApiError> {
  if matches!(parsed.shape, RequestShape::List) {
    return Ok(None);
  }

  let resource_id = parsed
    .resource_id
    .as_deref()
    .ok_or_else(|| ApiError::InvalidRequest("missing resource name".to_string()))?;

  let is_operations_get =
    *method == Method::GET && matches!(parsed.shape, RequestShape::Operation(_));

  match db_store()
    .get_resource(&parsed.subscription_id, resource_id)
    .await
  {
    Ok(state) => {
      check_gate(method, &state)?;
      Ok(Some(state))
    }
    Err(store::StoreError::NotFound) => {
      if absent_resource_is_ok(method, is_operations_get) {
        Ok(None)
      } else {
        Err(ApiError::NotFound(format!(
          "resource '{resource_id}' not found"
        )))
      }
    }
    Err(e) => Err(e.into()),
  }
}

/// A missing resource is not an error for: PUT (creates it), DELETE
/// (idempotent, spec §4.5/§6 — resolves to 204 downstream), and a GET
/// on an operation path (the operation itself may outlive the
/// resource it acted on).
fn absent_resource_is_ok(method: &Method, is_operations_get: bool) -> bool {
  *method == Method::PUT || *method == Method::DELETE || is_operations_get
}

/// Stage 5 — BindPayload: parses the JSON body for PUT/POST.
fn bind_payload(method: &Method, body: Bytes) -> Result<RequestBody, ApiError> {
  if body.is_empty() || !matches!(*method, Method::PUT | Method::POST) {
    return Ok(RequestBody::default());
  }
  serde_json::from_slice(&body)
    .map_err(|e| ApiError::InvalidRequest(format!("invalid request body: {e}")))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn state_with(ps: ProvisioningState) -> ResourceState {
    ResourceState {
      provisioning_state: ps,
      operation_id: String::new(),
      parameters: "{}".to_string(),
      credentials: "{}".to_string(),
      resource_provider: "Microsoft.Demo".to_string(),
      resource_type: "widgets".to_string(),
      status: String::new(),
      error_response: None,
    }
  }

  #[test]
  fn put_and_post_require_a_terminal_state() {
    assert!(check_gate(&Method::PUT, &state_with(ProvisioningState::Succeeded)).is_ok());
    assert!(check_gate(&Method::PUT, &state_with(ProvisioningState::Failed)).is_ok());
    assert!(check_gate(&Method::PUT, &state_with(ProvisioningState::Accepted)).is_err());
    assert!(check_gate(&Method::POST, &state_with(ProvisioningState::Installing)).is_err());
  }

  #[test]
  fn delete_also_admits_an_already_deleting_resource() {
    assert!(check_gate(&Method::DELETE, &state_with(ProvisioningState::Deleting)).is_ok());
    assert!(check_gate(&Method::DELETE, &state_with(ProvisioningState::Succeeded)).is_ok());
    assert!(check_gate(&Method::DELETE, &state_with(ProvisioningState::Upgrading)).is_err());
  }

  #[test]
  fn get_bypasses_the_gate() {
    assert!(check_gate(&Method::GET, &state_with(ProvisioningState::Installing)).is_ok());
  }

  #[test]
  fn bind_payload_skips_empty_bodies_and_non_mutating_methods() {
    let body = bind_payload(&Method::GET, Bytes::from_static(b"{\"properties\":{}}")).unwrap();
    assert!(body.properties.parameters.is_empty());

    let body = bind_payload(&Method::PUT, Bytes::new()).unwrap();
    assert!(body.properties.parameters.is_empty());
  }

  #[test]
  fn bind_payload_rejects_malformed_json() {
    assert!(bind_payload(&Method::PUT, Bytes::from_static(b"not json")).is_err());
  }

  #[test]
  fn absent_resource_is_ok_for_put_delete_and_operation_poll() {
    assert!(absent_resource_is_ok(&Method::PUT, false));
    assert!(absent_resource_is_ok(&Method::DELETE, false));
    assert!(absent_resource_is_ok(&Method::GET, true));
    assert!(!absent_resource_is_ok(&Method::GET, false));
    assert!(!absent_resource_is_ok(&Method::POST, false));
  }

  #[test]
  fn effective_path_prefers_the_rpaas_header_when_present() {
    let mut headers = HeaderMap::new();
    let routed = "/customProviders/resourceProviders/foo/anything";
    let real = "/subscriptions/s/resourceGroups/g/providers/Microsoft.Demo/widgets/n1";
    assert_eq!(effective_path(routed, &headers), routed);

    headers.insert(
      "x-ms-customproviders-requestpath",
      axum::http::HeaderValue::from_str(real).unwrap(),
    );
    assert_eq!(effective_path(routed, &headers), real);
  }
}

pub async fn run(
  method: &Method,
  path: &str,
  headers: &HeaderMap,
  body: Bytes,
) -> Result<BundleRpContext, ApiError> {
  let request_id = request_id(headers);
  let parsed = path::parse(effective_path(path, headers))
    .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;

  authenticate().await?;
  let manifest = validate_provider(&parsed).await?;
  let existing_state = load_state(method, &parsed).await?;
  let body = bind_payload(method, body)?;

  Ok(BundleRpContext {
    request_id,
    parsed,
    manifest,
    existing_state,
    body,
  })
}

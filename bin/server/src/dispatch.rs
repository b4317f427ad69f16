//! Dispatcher (spec §4.5, C5): translates an authenticated,
//! gate-checked request into job envelopes and synchronous
//! responses, writing pre-work state before any job is enqueued.

use std::collections::HashMap;

use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use store::{ProvisioningState, ResourceState, running_marker};
use uuid::Uuid;

use crate::error::ApiError;
use crate::installer;
use crate::jobs::{DeleteJob, PostJob, PutJob};
use crate::models::resource_projection;
use crate::operation;
use crate::path::RequestShape;
use crate::pipeline::BundleRpContext;
use crate::state::{bundle_registry, db_store, dispatch_lock, job_senders};

fn serialize_map(map: &HashMap<String, String>) -> String {
  serde_json::to_string(map).unwrap_or_else(|_| "{}".to_string())
}

fn deserialize_map(raw: &str) -> HashMap<String, String> {
  serde_json::from_str(raw).unwrap_or_default()
}

/// The host this dispatcher reports back in `Location` headers (spec
/// §4.6). Falls back to `localhost` so a direct `curl` against the
/// bound port without a `Host` header still gets a usable URL.
fn host_header(headers: &HeaderMap) -> String {
  headers
    .get(axum::http::header::HOST)
    .and_then(|v| v.to_str().ok())
    .unwrap_or("localhost")
    .to_string()
}

pub async fn handle_put(ctx: BundleRpContext) -> Result<Response, ApiError> {
  let _guard = dispatch_lock().lock().await;

  let resource_id = ctx
    .parsed
    .resource_id
    .clone()
    .ok_or_else(|| ApiError::InvalidRequest("missing resource name".to_string()))?;

  let bundle_reference = bundle_registry()
    .bundle_reference(&ctx.parsed.provider, &ctx.parsed.resource_type)
    .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("bundle reference not configured")))?
    .to_string();

  let name = store::installation_name(&ctx.parsed.subscription_id, &resource_id, &bundle_reference);

  let exists = installer::probe_exists(&name).await?;
  let action = if exists { "upgrade" } else { "install" };

  ctx
    .manifest
    .validate_parameters(action, &ctx.body.properties.parameters)
    .map_err(ApiError::InvalidRequest)?;
  ctx
    .manifest
    .validate_credentials(&ctx.body.properties.credentials)
    .map_err(ApiError::InvalidRequest)?;

  let provisioning_state = if exists {
    ProvisioningState::Accepted
  } else {
    ProvisioningState::Created
  };

  let state = ResourceState {
    provisioning_state,
    operation_id: String::new(),
    parameters: serialize_map(&ctx.body.properties.parameters),
    credentials: serialize_map(&ctx.body.properties.credentials),
    resource_provider: ctx.parsed.provider.clone(),
    resource_type: ctx.parsed.resource_type.clone(),
    status: String::new(),
    error_response: None,
  };

  db_store()
    .put_resource(&ctx.parsed.subscription_id, &resource_id, &state)
    .await?;

  job_senders()
    .put
    .send(PutJob {
      subscription_id: ctx.parsed.subscription_id.clone(),
      resource_id: resource_id.clone(),
      resource_provider: ctx.parsed.provider.clone(),
      resource_type: ctx.parsed.resource_type.clone(),
      installation_name: name.clone(),
      bundle_reference,
      action: action.to_string(),
      parameters: ctx.body.properties.parameters.clone(),
      credentials: ctx.body.properties.credentials.clone(),
    })
    .await
    .map_err(|e| ApiError::Internal(anyhow::anyhow!("put queue closed: {e}")))?;

  let status = if exists { StatusCode::OK } else { StatusCode::CREATED };
  let body = resource_projection(
    &provisioning_state.to_string(),
    &name,
    &ctx.body.properties.parameters,
    &HashMap::new(),
  );
  Ok((status, Json(body)).into_response())
}

pub async fn handle_post(ctx: BundleRpContext, headers: &HeaderMap) -> Result<Response, ApiError> {
  let _guard = dispatch_lock().lock().await;

  let resource_id = ctx
    .parsed
    .resource_id
    .clone()
    .ok_or_else(|| ApiError::InvalidRequest("missing resource name".to_string()))?;
  let action = match &ctx.parsed.shape {
    RequestShape::Action(action) => action.clone(),
    _ => return Err(ApiError::InvalidRequest("POST requires an action segment".to_string())),
  };

  let state = ctx
    .existing_state
    .clone()
    .ok_or_else(|| ApiError::NotFound(format!("resource '{resource_id}' not found")))?;
  if state.provisioning_state != ProvisioningState::Succeeded {
    return Err(ApiError::Conflict(format!(
      "resource is in provisioning state '{}', cannot accept an action",
      state.provisioning_state
    )));
  }

  let host = host_header(headers);

  if !state.status.is_empty() {
    if state.is_running_action(&action) {
      let location = operation::location_url(&host, &resource_id, &state.operation_id);
      return Ok(operation::accepted_response(&location));
    }
    return Err(ApiError::Conflict(format!(
      "resource already has action '{}' in progress",
      state.status
    )));
  }

  ctx
    .manifest
    .validate_parameters(&action, &ctx.body.properties.parameters)
    .map_err(ApiError::InvalidRequest)?;
  ctx
    .manifest
    .validate_credentials(&ctx.body.properties.credentials)
    .map_err(ApiError::InvalidRequest)?;

  let bundle_reference = bundle_registry()
    .bundle_reference(&ctx.parsed.provider, &ctx.parsed.resource_type)
    .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("bundle reference not configured")))?
    .to_string();
  let installation_name =
    store::installation_name(&ctx.parsed.subscription_id, &resource_id, &bundle_reference);

  let operation_id = Uuid::new_v4().to_string();

  job_senders()
    .post
    .send(PostJob {
      subscription_id: ctx.parsed.subscription_id.clone(),
      resource_id: resource_id.clone(),
      installation_name,
      operation_id: operation_id.clone(),
      action: action.clone(),
      parameters: ctx.body.properties.parameters.clone(),
      credentials: ctx.body.properties.credentials.clone(),
    })
    .await
    .map_err(|e| ApiError::Internal(anyhow::anyhow!("post queue closed: {e}")))?;

  db_store()
    .merge_resource(
      &ctx.parsed.subscription_id,
      &resource_id,
      None,
      Some(&running_marker(&action)),
      Some(&operation_id),
      None,
    )
    .await?;
  db_store()
    .put_async_op(
      &ctx.parsed.subscription_id,
      &operation_id,
      &store::AsyncOperation {
        action: action.clone(),
        status: running_marker(&action),
        output: None,
      },
    )
    .await?;

  let location = operation::location_url(&host, &resource_id, &operation_id);
  Ok(operation::accepted_response(&location))
}

pub async fn handle_delete(ctx: BundleRpContext, headers: &HeaderMap) -> Result<Response, ApiError> {
  let _guard = dispatch_lock().lock().await;

  let resource_id = ctx
    .parsed
    .resource_id
    .clone()
    .ok_or_else(|| ApiError::InvalidRequest("missing resource name".to_string()))?;
  let host = host_header(headers);

  let Some(state) = ctx.existing_state.clone() else {
    return Ok(StatusCode::NO_CONTENT.into_response());
  };

  if state.provisioning_state == ProvisioningState::Deleting && !state.operation_id.is_empty() {
    let location = operation::location_url(&host, &resource_id, &state.operation_id);
    return Ok(operation::accepted_response(&location));
  }

  let bundle_reference = bundle_registry()
    .bundle_reference(&ctx.parsed.provider, &ctx.parsed.resource_type)
    .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("bundle reference not configured")))?
    .to_string();
  let installation_name =
    store::installation_name(&ctx.parsed.subscription_id, &resource_id, &bundle_reference);

  let operation_id = Uuid::new_v4().to_string();

  let mut deleting_state = state.clone();
  deleting_state.provisioning_state = ProvisioningState::Deleting;
  deleting_state.operation_id = operation_id.clone();
  db_store()
    .put_resource(&ctx.parsed.subscription_id, &resource_id, &deleting_state)
    .await?;

  db_store()
    .put_async_op(
      &ctx.parsed.subscription_id,
      &operation_id,
      &store::AsyncOperation {
        action: "delete".to_string(),
        status: "Deleting".to_string(),
        output: None,
      },
    )
    .await?;

  job_senders()
    .delete
    .send(DeleteJob {
      subscription_id: ctx.parsed.subscription_id.clone(),
      resource_id: resource_id.clone(),
      installation_name,
      operation_id: operation_id.clone(),
    })
    .await
    .map_err(|e| ApiError::Internal(anyhow::anyhow!("delete queue closed: {e}")))?;

  let location = operation::location_url(&host, &resource_id, &operation_id);
  Ok(operation::accepted_response(&location))
}

pub async fn handle_get(ctx: BundleRpContext, headers: &HeaderMap) -> Result<Response, ApiError> {
  match &ctx.parsed.shape {
    RequestShape::List => handle_list(&ctx).await,
    RequestShape::Operation(op_id) => handle_operation_get(&ctx, op_id, headers).await,
    _ => handle_resource_get(&ctx).await,
  }
}

async fn handle_list(ctx: &BundleRpContext) -> Result<Response, ApiError> {
  let row_keys = db_store()
    .list_resources(&ctx.parsed.subscription_id, &ctx.parsed.provider, &ctx.parsed.resource_type)
    .await?;
  let resource_ids: Vec<String> = row_keys.iter().map(|k| store::rowkey::decode(k)).collect();
  Ok(Json(serde_json::json!({ "value": resource_ids })).into_response())
}

async fn handle_operation_get(
  ctx: &BundleRpContext,
  op_id: &str,
  headers: &HeaderMap,
) -> Result<Response, ApiError> {
  let resource_id = ctx
    .parsed
    .resource_id
    .clone()
    .ok_or_else(|| ApiError::InvalidRequest("missing resource name".to_string()))?;
  let op = db_store().get_async_op(&ctx.parsed.subscription_id, op_id).await?;

  let host = host_header(headers);
  let location = operation::location_url(&host, &resource_id, op_id);

  let bundle_reference =
    bundle_registry().bundle_reference(&ctx.parsed.provider, &ctx.parsed.resource_type);
  let installation_name = bundle_reference
    .map(|tag| store::installation_name(&ctx.parsed.subscription_id, &resource_id, tag));

  operation::render(op_id, &op, &location, installation_name.as_deref(), &ctx.manifest).await
}

async fn handle_resource_get(ctx: &BundleRpContext) -> Result<Response, ApiError> {
  let resource_id = ctx
    .parsed
    .resource_id
    .clone()
    .ok_or_else(|| ApiError::InvalidRequest("missing resource name".to_string()))?;
  let state = ctx
    .existing_state
    .clone()
    .ok_or_else(|| ApiError::NotFound(format!("resource '{resource_id}' not found")))?;

  let bundle_reference = bundle_registry()
    .bundle_reference(&ctx.parsed.provider, &ctx.parsed.resource_type)
    .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("bundle reference not configured")))?;
  let installation_name =
    store::installation_name(&ctx.parsed.subscription_id, &resource_id, bundle_reference);

  if state.provisioning_state == ProvisioningState::Failed {
    if let Some(compressed) = &state.error_response {
      let raw = store::gzip::decompress(compressed)
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("{e}")))?;
      let message = String::from_utf8_lossy(&raw).into_owned();
      return Ok(Json(crate::models::failed_resource_projection(&message)).into_response());
    }
  }

  if state.provisioning_state.is_terminal() {
    let exists = installer::probe_exists(&installation_name).await?;
    if !exists {
      return Err(ApiError::NotFound(format!("installation for '{resource_id}' no longer exists")));
    }
  }

  let outputs = if state.provisioning_state == ProvisioningState::Succeeded {
    let all = installer::list_outputs(&installation_name).await.unwrap_or_default();
    all
      .into_iter()
      .filter(|(key, _)| ctx.manifest.outputs.iter().any(|o| &o.name == key && !o.sensitive))
      .collect()
  } else {
    HashMap::new()
  };

  let parameters = deserialize_map(&state.parameters);
  let body =
    resource_projection(&state.provisioning_state.to_string(), &installation_name, &parameters, &outputs);
  Ok(Json(body).into_response())
}

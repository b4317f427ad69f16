//! Job Workers (spec §4.7, C6): three fixed-size pools draining the
//! Put/Post/Delete queues. Once a job is dequeued it is never handed
//! back — failures are recorded by the worker itself, not retried.

use store::{AsyncOperation, ProvisioningState, ResourceState};

use crate::installer::{self, MaterializedInputs};
use crate::jobs::{DeleteJob, JobReceivers, PostJob, PutJob, WORKERS_PER_QUEUE};
use crate::state::db_store;

/// Spawns `WORKERS_PER_QUEUE` tasks per queue. The receivers are
/// wrapped so every worker in a pool can pull from the same channel.
pub fn spawn(receivers: JobReceivers) {
  let put_rx = std::sync::Arc::new(tokio::sync::Mutex::new(receivers.put));
  let post_rx = std::sync::Arc::new(tokio::sync::Mutex::new(receivers.post));
  let delete_rx = std::sync::Arc::new(tokio::sync::Mutex::new(receivers.delete));

  for id in 0..WORKERS_PER_QUEUE {
    tokio::spawn(put_worker(id, put_rx.clone()));
    tokio::spawn(post_worker(id, post_rx.clone()));
    tokio::spawn(delete_worker(id, delete_rx.clone()));
  }
}

async fn put_worker(
  id: usize,
  rx: std::sync::Arc<tokio::sync::Mutex<tokio::sync::mpsc::Receiver<PutJob>>>,
) {
  loop {
    let job = {
      let mut guard = rx.lock().await;
      guard.recv().await
    };
    let Some(job) = job else {
      tracing::info!(worker = "put", id, "queue closed, exiting");
      return;
    };
    run_put_job(job).await;
  }
}

async fn run_put_job(job: PutJob) {
  tracing::info!(
    resource_id = %job.resource_id,
    action = %job.action,
    "starting lifecycle action"
  );

  let inputs = match installer::materialize_inputs(
    &crate::state::bundle_registry()
      .get(&job.resource_provider, &job.resource_type)
      .await
      .expect("manifest disappeared for a provider/type validated at enqueue time"),
    &job.parameters,
    &job.credentials,
  )
  .await
  {
    Ok(inputs) => inputs,
    Err(e) => {
      fail_resource(&job.subscription_id, &job.resource_id, &format!("{e:#}")).await;
      return;
    }
  };

  let outcome = installer::run_lifecycle_action(
    &job.action,
    &job.installation_name,
    &job.bundle_reference,
    &inputs,
  )
  .await;

  match outcome {
    Ok(outcome) if outcome.succeeded => succeed_put(&job).await,
    Ok(outcome) => {
      fail_resource(&job.subscription_id, &job.resource_id, &outcome.combined_output).await
    }
    Err(e) => fail_resource(&job.subscription_id, &job.resource_id, &format!("{e:#}")).await,
  }
}

async fn succeed_put(job: &PutJob) {
  let state = ResourceState {
    provisioning_state: ProvisioningState::Succeeded,
    operation_id: String::new(),
    parameters: serde_json::to_string(&job.parameters).unwrap_or_else(|_| "{}".to_string()),
    credentials: serde_json::to_string(&job.credentials).unwrap_or_else(|_| "{}".to_string()),
    resource_provider: job.resource_provider.clone(),
    resource_type: job.resource_type.clone(),
    status: String::new(),
    error_response: None,
  };
  if let Err(e) = db_store().put_resource(&job.subscription_id, &job.resource_id, &state).await {
    tracing::error!(resource_id = %job.resource_id, "failed to persist succeeded state | {e:#}");
  }
}

async fn fail_resource(subscription_id: &str, resource_id: &str, message: &str) {
  tracing::error!(resource_id, "lifecycle action failed | {message}");
  let compressed = store::gzip::compress(message.as_bytes()).await.unwrap_or_default();
  if let Err(e) = db_store()
    .merge_resource(
      subscription_id,
      resource_id,
      Some(ProvisioningState::Failed),
      Some(""),
      None,
      Some(Some(compressed)),
    )
    .await
  {
    tracing::error!(resource_id, "failed to record failure state | {e:#}");
  }
}

async fn post_worker(
  id: usize,
  rx: std::sync::Arc<tokio::sync::Mutex<tokio::sync::mpsc::Receiver<PostJob>>>,
) {
  loop {
    let job = {
      let mut guard = rx.lock().await;
      guard.recv().await
    };
    let Some(job) = job else {
      tracing::info!(worker = "post", id, "queue closed, exiting");
      return;
    };
    run_post_job(job).await;
  }
}

async fn run_post_job(job: PostJob) {
  tracing::info!(resource_id = %job.resource_id, action = %job.action, "starting custom action");

  let manifest = match db_store().get_resource(&job.subscription_id, &job.resource_id).await {
    Ok(state) => crate::state::bundle_registry()
      .get(&state.resource_provider, &state.resource_type)
      .await,
    Err(_) => None,
  };
  let Some(manifest) = manifest else {
    finish_post(&job, false, "resource or its bundle manifest disappeared").await;
    return;
  };

  let inputs = match installer::materialize_inputs(&manifest, &job.parameters, &job.credentials).await
  {
    Ok(inputs) => inputs,
    Err(e) => {
      finish_post(&job, false, &format!("{e:#}")).await;
      return;
    }
  };

  let outcome = installer::run_custom_action(&job.installation_name, &job.action, &inputs).await;
  match outcome {
    Ok(outcome) => finish_post(&job, outcome.succeeded, &outcome.combined_output).await,
    Err(e) => finish_post(&job, false, &format!("{e:#}")).await,
  }
}

/// A POST's queued action always clears the resource's `Status`
/// toggle on completion, success or failure — the resource itself
/// never transitions `ProvisioningState`, only the polled operation
/// does (spec §4.7).
async fn finish_post(job: &PostJob, succeeded: bool, output: &str) {
  let status = if succeeded { "Succeeded" } else { "Failed" };
  tracing::info!(resource_id = %job.resource_id, action = %job.action, status, "custom action finished");

  if let Err(e) = db_store()
    .merge_resource(&job.subscription_id, &job.resource_id, None, Some(""), None, None)
    .await
  {
    tracing::error!(resource_id = %job.resource_id, "failed to clear running status | {e:#}");
  }

  let op = AsyncOperation {
    action: job.action.clone(),
    status: status.to_string(),
    output: Some(output.to_string()),
  };
  if let Err(e) = db_store().put_async_op(&job.subscription_id, &job.operation_id, &op).await {
    tracing::error!(operation_id = %job.operation_id, "failed to record operation result | {e:#}");
  }
}

async fn delete_worker(
  id: usize,
  rx: std::sync::Arc<tokio::sync::Mutex<tokio::sync::mpsc::Receiver<DeleteJob>>>,
) {
  loop {
    let job = {
      let mut guard = rx.lock().await;
      guard.recv().await
    };
    let Some(job) = job else {
      tracing::info!(worker = "delete", id, "queue closed, exiting");
      return;
    };
    run_delete_job(job).await;
  }
}

/// Re-reads `ResourceState` before building the installer's argv,
/// rather than trusting the envelope's own copy — the resource's
/// parameters/credentials may have changed between the PUT that
/// created it and the DELETE that is now tearing it down.
async fn run_delete_job(job: DeleteJob) {
  tracing::info!(resource_id = %job.resource_id, "starting uninstall");

  let state = match db_store().get_resource(&job.subscription_id, &job.resource_id).await {
    Ok(state) => state,
    Err(e) => {
      finish_delete(&job, false, &format!("failed to reload resource state: {e:#}")).await;
      return;
    }
  };

  let Some(manifest) = crate::state::bundle_registry()
    .get(&state.resource_provider, &state.resource_type)
    .await
  else {
    finish_delete(&job, false, "bundle manifest no longer registered").await;
    return;
  };
  let Some(bundle_reference) = crate::state::bundle_registry()
    .bundle_reference(&state.resource_provider, &state.resource_type)
    .map(str::to_string)
  else {
    finish_delete(&job, false, "bundle reference no longer configured").await;
    return;
  };

  let parameters: std::collections::HashMap<String, String> =
    serde_json::from_str(&state.parameters).unwrap_or_default();
  let credentials: std::collections::HashMap<String, String> =
    serde_json::from_str(&state.credentials).unwrap_or_default();

  let inputs: MaterializedInputs =
    match installer::materialize_inputs(&manifest, &parameters, &credentials).await {
      Ok(inputs) => inputs,
      Err(e) => {
        finish_delete(&job, false, &format!("{e:#}")).await;
        return;
      }
    };

  let outcome =
    installer::run_uninstall(&job.installation_name, &bundle_reference, &inputs).await;
  match outcome {
    Ok(outcome) if outcome.succeeded => finish_delete(&job, true, "").await,
    Ok(outcome) => finish_delete(&job, false, &outcome.combined_output).await,
    Err(e) => finish_delete(&job, false, &format!("{e:#}")).await,
  }
}

async fn finish_delete(job: &DeleteJob, succeeded: bool, message: &str) {
  if succeeded {
    tracing::info!(resource_id = %job.resource_id, "uninstall succeeded, removing resource record");
    if let Err(e) = db_store().delete_resource(&job.subscription_id, &job.resource_id).await {
      tracing::error!(resource_id = %job.resource_id, "failed to delete resource record | {e:#}");
    }
    let op = AsyncOperation { action: "delete".to_string(), status: "Succeeded".to_string(), output: None };
    if let Err(e) = db_store().put_async_op(&job.subscription_id, &job.operation_id, &op).await {
      tracing::error!(operation_id = %job.operation_id, "failed to record delete result | {e:#}");
    }
  } else {
    tracing::error!(resource_id = %job.resource_id, "uninstall failed | {message}");
    let compressed = store::gzip::compress(message.as_bytes()).await.unwrap_or_default();
    if let Err(e) = db_store()
      .merge_resource(
        &job.subscription_id,
        &job.resource_id,
        Some(ProvisioningState::Failed),
        Some(""),
        None,
        Some(Some(compressed)),
      )
      .await
    {
      tracing::error!(resource_id = %job.resource_id, "failed to record failure state | {e:#}");
    }
    let op = AsyncOperation {
      action: "delete".to_string(),
      status: "Failed".to_string(),
      output: Some(message.to_string()),
    };
    if let Err(e) = db_store().put_async_op(&job.subscription_id, &job.operation_id, &op).await {
      tracing::error!(operation_id = %job.operation_id, "failed to record delete result | {e:#}");
    }
  }
}

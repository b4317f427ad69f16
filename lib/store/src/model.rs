use serde::{Deserialize, Serialize};

/// `ResourceState.ProvisioningState` (spec §3). `Succeeded` and
/// `Failed` are the only terminal members — see [`ProvisioningState::is_terminal`].
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize,
)]
pub enum ProvisioningState {
  Accepted,
  Created,
  Installing,
  Upgrading,
  Deleting,
  Succeeded,
  Failed,
}

impl ProvisioningState {
  pub fn is_terminal(self) -> bool {
    matches!(self, ProvisioningState::Succeeded | ProvisioningState::Failed)
  }
}

impl std::fmt::Display for ProvisioningState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      ProvisioningState::Accepted => "Accepted",
      ProvisioningState::Created => "Created",
      ProvisioningState::Installing => "Installing",
      ProvisioningState::Upgrading => "Upgrading",
      ProvisioningState::Deleting => "Deleting",
      ProvisioningState::Succeeded => "Succeeded",
      ProvisioningState::Failed => "Failed",
    };
    f.write_str(s)
  }
}

/// The durable record of one managed resource (spec §3). Stored
/// partitioned by subscription id, keyed by the row-key-encoded
/// resource id (see [`crate::rowkey`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceState {
  pub provisioning_state: ProvisioningState,
  /// UUID of the currently owning async operation. Empty in
  /// terminal states unless the last operation is retained.
  #[serde(default)]
  pub operation_id: String,
  /// Caller-supplied parameters, serialized as a JSON object string.
  pub parameters: String,
  /// Caller-supplied credentials, serialized as a JSON object string.
  pub credentials: String,
  pub resource_provider: String,
  pub resource_type: String,
  /// Non-empty while a POST action is in progress (`Running<Action>`).
  #[serde(default)]
  pub status: String,
  /// Gzip-compressed JSON of the last terminal error. Only present
  /// when `provisioning_state == Failed`.
  #[serde(default)]
  pub error_response: Option<Vec<u8>>,
}

impl ResourceState {
  pub fn is_running_action(&self, action: &str) -> bool {
    self.status == running_marker(action)
  }
}

/// The `Status` value a POST worker writes while an action is
/// in-flight, and clears back to `""` on completion.
pub fn running_marker(action: &str) -> String {
  format!("Running{action}")
}

/// The poll-facing record for one long-running operation (spec §3).
/// Stored partitioned by subscription id, keyed by the operation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AsyncOperation {
  pub action: String,
  pub status: String,
  /// Installer stdout/stderr on failure, or a serialized result map
  /// on success. Absent while running.
  #[serde(default)]
  pub output: Option<String>,
}

impl AsyncOperation {
  pub fn is_running(&self) -> bool {
    self.status.starts_with("Running") || self.status == "Deleting"
  }

  pub fn is_terminal(&self) -> bool {
    matches!(self.status.as_str(), "Succeeded" | "Failed")
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn terminal_states_are_succeeded_and_failed() {
    assert!(ProvisioningState::Succeeded.is_terminal());
    assert!(ProvisioningState::Failed.is_terminal());
    assert!(!ProvisioningState::Accepted.is_terminal());
    assert!(!ProvisioningState::Deleting.is_terminal());
  }

  #[test]
  fn running_marker_round_trips_through_is_running_action() {
    let mut state = ResourceState {
      provisioning_state: ProvisioningState::Succeeded,
      operation_id: String::new(),
      parameters: "{}".into(),
      credentials: "{}".into(),
      resource_provider: "Microsoft.Demo".into(),
      resource_type: "widgets".into(),
      status: String::new(),
      error_response: None,
    };
    assert!(!state.is_running_action("rollback"));
    state.status = running_marker("rollback");
    assert!(state.is_running_action("rollback"));
  }

  #[test]
  fn async_operation_running_covers_delete_and_action_markers() {
    let running = AsyncOperation {
      action: "install".into(),
      status: "Runninginstall".into(),
      output: None,
    };
    assert!(running.is_running());
    let deleting = AsyncOperation {
      action: "delete".into(),
      status: "Deleting".into(),
      output: None,
    };
    assert!(deleting.is_running());
    let done = AsyncOperation {
      action: "delete".into(),
      status: "Succeeded".into(),
      output: None,
    };
    assert!(!done.is_running());
    assert!(done.is_terminal());
  }
}

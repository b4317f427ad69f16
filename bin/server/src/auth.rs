//! The cloud identity provider is an external collaborator this
//! system only consumes through an opaque handle (spec §1); this
//! module is the `Authorizer` acquisition it names in §4.4.

use std::time::Duration;

const IMDS_PROBE_URL: &str =
  "http://169.254.169.254/metadata/identity/oauth2/token";
const PROBE_TIMEOUTS: [Duration; 3] = [
  Duration::from_secs(1),
  Duration::from_secs(2),
  Duration::from_secs(3),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthSource {
  ManagedIdentity,
  Cli,
}

#[derive(Debug, Clone)]
pub struct Authorizer {
  pub source: AuthSource,
}

impl Authorizer {
  /// Tries managed identity first (three increasing-timeout HEAD
  /// probes against the well-known metadata endpoint), then falls
  /// back to CLI-based credentials (spec §4.4 step 2).
  pub async fn acquire() -> Self {
    if probe_managed_identity().await {
      tracing::info!("acquired credentials via managed identity");
      return Self { source: AuthSource::ManagedIdentity };
    }

    tracing::info!(
      "managed identity probe exhausted, falling back to CLI credentials"
    );
    if let Err(e) = probe_cli_credentials().await {
      tracing::warn!("CLI credential probe also failed, proceeding anyway | {e:#}");
    }
    Self { source: AuthSource::Cli }
  }
}

async fn probe_managed_identity() -> bool {
  let client = reqwest::Client::new();
  for timeout in PROBE_TIMEOUTS {
    match client
      .head(IMDS_PROBE_URL)
      .header("Metadata", "true")
      .timeout(timeout)
      .send()
      .await
    {
      Ok(_) => return true,
      Err(e) => {
        tracing::debug!(
          "managed identity probe failed at {timeout:?} timeout | {e}"
        );
      }
    }
  }
  false
}

/// Acquires credentials through the installed CLI (`az account
/// show`), the fallback path when no managed identity is present.
pub async fn probe_cli_credentials() -> anyhow::Result<()> {
  let output = command::run_command(
    "az",
    &["account".to_string(), "show".to_string()],
    &[],
    None,
  )
  .await;
  if !output.success() {
    anyhow::bail!(
      "CLI credential probe failed: {}",
      output.combined_output()
    );
  }
  Ok(())
}

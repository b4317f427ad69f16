//! Installer Adapter (spec §4.7, C7): spawns the bundle installer as
//! a subprocess, materializes parameter/credential sets, and parses
//! its outputs. Grounded on `command::run_command` for the
//! drain-before-wait subprocess discipline and on
//! `original_source/pkg/helpers/porter.go` for the argv shape.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use bundle::BundleManifest;
use serde::Serialize;

use crate::config::server_config;

pub struct InstallerOutcome {
  pub succeeded: bool,
  /// Combined stdout+stderr. Becomes `ErrorResponse`/`AsyncOp.Output`
  /// on failure, or the serialized result on success.
  pub combined_output: String,
}

#[derive(Serialize)]
struct SetEntry {
  name: String,
  source: SetSource,
}

#[derive(Serialize)]
#[serde(untagged)]
enum SetSource {
  Path { path: String },
  Env { env: String },
}

/// A scratch directory plus the materialized parameter/credential
/// set files and the env vars that must be exported to the
/// installer subprocess. Dropped (and thus removed) when the worker
/// finishes with it, per spec §4.7 ("All temp artifacts MUST be
/// cleaned on worker exit").
pub struct MaterializedInputs {
  dir: tempfile::TempDir,
  pub param_file: Option<PathBuf>,
  pub cred_file: Option<PathBuf>,
  pub envs: Vec<(String, String)>,
}

fn env_var_name(key: &str) -> String {
  key.to_uppercase().replace('-', "_")
}

async fn materialize_set(
  scratch_dir: &Path,
  kind: &str,
  values: &HashMap<String, String>,
  file_mode: impl Fn(&str) -> bool,
) -> anyhow::Result<(Option<PathBuf>, Vec<(String, String)>)> {
  if values.is_empty() {
    return Ok((None, Vec::new()));
  }

  let values_dir = scratch_dir.join(kind);
  tokio::fs::create_dir_all(&values_dir)
    .await
    .with_context(|| format!("failed to create {kind} scratch dir"))?;

  let mut entries = Vec::with_capacity(values.len());
  let mut envs = Vec::new();

  for (name, value) in values {
    if file_mode(name) {
      let path = values_dir.join(name);
      tokio::fs::write(&path, value)
        .await
        .with_context(|| format!("failed to write {kind} file for '{name}'"))?;
      entries.push(SetEntry {
        name: name.clone(),
        source: SetSource::Path {
          path: path.to_string_lossy().into_owned(),
        },
      });
    } else {
      let env_name = env_var_name(name);
      envs.push((env_name.clone(), value.clone()));
      entries.push(SetEntry {
        name: name.clone(),
        source: SetSource::Env { env: env_name },
      });
    }
  }

  let set_path = scratch_dir.join(format!("{kind}-set.json"));
  let document = serde_json::to_vec_pretty(&entries)
    .context("failed to serialize parameter/credential set")?;
  tokio::fs::write(&set_path, document)
    .await
    .with_context(|| format!("failed to write {kind} set document"))?;

  Ok((Some(set_path), envs))
}

/// Parameters are always materialized as environment variables: the
/// manifest model this system carries declares no file-destination
/// for parameters (only credentials can be file-mode, spec §3).
pub async fn materialize_inputs(
  manifest: &BundleManifest,
  parameters: &HashMap<String, String>,
  credentials: &HashMap<String, String>,
) -> anyhow::Result<MaterializedInputs> {
  let dir = tempfile::Builder::new()
    .prefix("cnab-arm-rp-")
    .tempdir()
    .context("failed to create scratch directory")?;

  let (param_file, mut envs) =
    materialize_set(dir.path(), "parameters", parameters, |_| false)
      .await?;
  let (cred_file, cred_envs) = materialize_set(
    dir.path(),
    "credentials",
    credentials,
    |name| manifest.credential(name).map(|c| c.is_file()).unwrap_or(false),
  )
  .await?;
  envs.extend(cred_envs);

  Ok(MaterializedInputs { dir, param_file, cred_file, envs })
}

impl MaterializedInputs {
  pub fn scratch_dir(&self) -> &Path {
    self.dir.path()
  }
}

fn installer_bin() -> &'static str {
  &server_config().installer_bin
}

fn push_set_flags(args: &mut Vec<String>, inputs: &MaterializedInputs) {
  if let Some(path) = &inputs.param_file {
    args.push("-p".to_string());
    args.push(path.to_string_lossy().into_owned());
  }
  if let Some(path) = &inputs.cred_file {
    args.push("-c".to_string());
    args.push(path.to_string_lossy().into_owned());
  }
}

async fn run(args: Vec<String>, envs: &[(String, String)]) -> anyhow::Result<InstallerOutcome> {
  let output =
    command::run_command(installer_bin(), &args, envs, None).await;
  let combined = output.combined_output();
  Ok(InstallerOutcome { succeeded: output.success(), combined_output: combined })
}

/// `installations show <name>` (spec §4.7). A nonzero exit whose
/// output contains "installation does not exist" means the
/// installation is absent, not that the probe itself failed.
pub async fn probe_exists(installation_name: &str) -> anyhow::Result<bool> {
  let args = vec![
    "installations".to_string(),
    "show".to_string(),
    installation_name.to_string(),
    "--output".to_string(),
    "json".to_string(),
  ];
  let outcome = run(args, &[]).await?;
  if outcome.succeeded {
    return Ok(true);
  }
  if outcome
    .combined_output
    .to_lowercase()
    .contains("installation does not exist")
  {
    return Ok(false);
  }
  anyhow::bail!(
    "failed to probe installation '{installation_name}': {}",
    outcome.combined_output
  )
}

/// `install`/`upgrade` (spec §4.7).
pub async fn run_lifecycle_action(
  action: &str,
  installation_name: &str,
  bundle_reference: &str,
  inputs: &MaterializedInputs,
) -> anyhow::Result<InstallerOutcome> {
  let mut args = vec![
    action.to_string(),
    installation_name.to_string(),
    "--reference".to_string(),
    bundle_reference.to_string(),
  ];
  push_set_flags(&mut args, inputs);
  run(args, &inputs.envs).await
}

/// `uninstall ... --delete --force-delete` (spec §C, grounded on
/// `jobs/delete.go`): a successful uninstall also removes the
/// installer's own installation record.
pub async fn run_uninstall(
  installation_name: &str,
  bundle_reference: &str,
  inputs: &MaterializedInputs,
) -> anyhow::Result<InstallerOutcome> {
  let mut args = vec![
    "uninstall".to_string(),
    installation_name.to_string(),
    "--reference".to_string(),
    bundle_reference.to_string(),
    "--delete".to_string(),
    "--force-delete".to_string(),
  ];
  push_set_flags(&mut args, inputs);
  run(args, &inputs.envs).await
}

/// `invoke <name> --action <action>` (spec §4.7, POST custom
/// actions).
pub async fn run_custom_action(
  installation_name: &str,
  action: &str,
  inputs: &MaterializedInputs,
) -> anyhow::Result<InstallerOutcome> {
  let mut args = vec![
    "invoke".to_string(),
    installation_name.to_string(),
    "--action".to_string(),
    action.to_string(),
  ];
  push_set_flags(&mut args, inputs);
  run(args, &inputs.envs).await
}

/// `installations output list -i <name> --output json` (spec
/// §4.7), used by the operation projection (§4.6) to fetch outputs
/// after a successful non-delete action.
pub async fn list_outputs(
  installation_name: &str,
) -> anyhow::Result<HashMap<String, String>> {
  let args = vec![
    "installations".to_string(),
    "output".to_string(),
    "list".to_string(),
    "-i".to_string(),
    installation_name.to_string(),
    "--output".to_string(),
    "json".to_string(),
  ];
  let outcome = run(args, &[]).await?;
  if !outcome.succeeded {
    anyhow::bail!(
      "failed to list outputs for '{installation_name}': {}",
      outcome.combined_output
    );
  }

  #[derive(serde::Deserialize)]
  struct OutputRow {
    name: String,
    value: String,
  }
  let rows: Vec<OutputRow> =
    serde_json::from_str(&outcome.combined_output).with_context(|| {
      format!(
        "failed to parse output list for '{installation_name}'"
      )
    })?;
  Ok(rows.into_iter().map(|r| (r.name, r.value)).collect())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn env_var_name_uppercases_and_normalizes_dashes() {
    assert_eq!(env_var_name("api-key"), "API_KEY");
    assert_eq!(env_var_name("region"), "REGION");
  }
}

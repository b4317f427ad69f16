use std::sync::OnceLock;

use bundle::ProviderMappingEntry;
use logger::LogConfig;
use serde::Deserialize;

/// Flat env-var configuration (spec §6). Loaded with `envy` the way
/// the teacher's `periphery_config()` loads `Env` — no file/config
/// merge layer, since every field here is a plain scalar.
#[derive(Debug, Deserialize)]
struct Env {
  cnab_azure_state_storage_account_name: String,
  cnab_azure_state_storage_resource_group: String,
  cnab_azure_subscription_id: String,
  custom_rp_state_table: String,
  custom_rp_async_op_table: String,

  cnab_bundle_tag: Option<String>,
  resource_type: Option<String>,
  #[serde(default)]
  is_rpaas: bool,
  #[serde(default)]
  cnab_bundle_insecure_registry: bool,
  #[serde(default)]
  cnab_bundle_force_pull: bool,
  #[serde(default)]
  log_request_body: bool,
  #[serde(default)]
  log_response_body: bool,
  #[serde(default = "default_listener_port")]
  listener_port: u16,

  #[serde(default = "default_provider_mapping_path")]
  provider_mapping_path: String,

  #[serde(default = "default_installer_bin")]
  installer_bin: String,

  #[serde(default = "default_mongodb_uri")]
  mongodb_uri: String,
  #[serde(default = "default_mongodb_database")]
  mongodb_database: String,
}

fn default_listener_port() -> u16 {
  8080
}

fn default_provider_mapping_path() -> String {
  "providermapping.yaml".to_string()
}

fn default_installer_bin() -> String {
  "porter".to_string()
}

fn default_mongodb_uri() -> String {
  "mongodb://localhost:27017".to_string()
}

fn default_mongodb_database() -> String {
  "cnab_arm_rp".to_string()
}

/// Single-provider mode's `(provider, type, tag)`, resolved once at
/// startup from either `RESOURCE_TYPE`/`CNAB_BUNDLE_TAG` (single
/// mode) or `providermapping.yaml` (RPaaS mode, spec §6).
#[derive(Debug, Clone)]
pub enum ProviderMode {
  Single(ProviderMappingEntry),
  Rpaas(Vec<ProviderMappingEntry>),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
  pub storage_account_name: String,
  pub storage_resource_group: String,
  pub subscription_id: String,
  pub state_table: String,
  pub async_op_table: String,
  pub provider_mode: ProviderMode,
  pub log_request_body: bool,
  pub log_response_body: bool,
  pub listener_port: u16,
  pub installer_bin: String,
  pub mongodb_uri: String,
  pub mongodb_database: String,
  pub log: LogConfig,
}

impl ServerConfig {
  fn load() -> anyhow::Result<Self> {
    let env: Env = envy::from_env()
      .map_err(|e| anyhow::anyhow!("failed to parse environment: {e}"))?;

    let provider_mode = if env.is_rpaas {
      let path = &env.provider_mapping_path;
      let raw = std::fs::read_to_string(path).map_err(|e| {
        anyhow::anyhow!(
          "IS_RPAAS is set but failed to read {path}: {e}"
        )
      })?;
      let entries: Vec<ProviderMappingEntry> =
        serde_yaml_ng::from_str(&raw).map_err(|e| {
          anyhow::anyhow!("failed to parse {path}: {e}")
        })?;
      ProviderMode::Rpaas(entries)
    } else {
      let resource_type = env.resource_type.clone().ok_or_else(|| {
        anyhow::anyhow!(
          "RESOURCE_TYPE is required when IS_RPAAS is not set"
        )
      })?;
      let bundle_reference =
        env.cnab_bundle_tag.clone().ok_or_else(|| {
          anyhow::anyhow!(
            "CNAB_BUNDLE_TAG is required when IS_RPAAS is not set"
          )
        })?;
      let (provider, resource_type) = resource_type
        .split_once('/')
        .map(|(p, t)| (p.to_string(), t.to_string()))
        .unwrap_or(("Microsoft.CustomProviders".to_string(), resource_type));
      ProviderMode::Single(ProviderMappingEntry {
        resource_provider: provider,
        resource_type,
        bundle_reference,
        insecure_registry: env.cnab_bundle_insecure_registry,
      })
    };

    Ok(Self {
      storage_account_name: env.cnab_azure_state_storage_account_name,
      storage_resource_group: env
        .cnab_azure_state_storage_resource_group,
      subscription_id: env.cnab_azure_subscription_id,
      state_table: env.custom_rp_state_table,
      async_op_table: env.custom_rp_async_op_table,
      provider_mode,
      log_request_body: env.log_request_body,
      log_response_body: env.log_response_body,
      listener_port: env.listener_port,
      installer_bin: env.installer_bin,
      mongodb_uri: env.mongodb_uri,
      mongodb_database: env.mongodb_database,
      log: LogConfig::default(),
    })
  }

  pub fn provider_entries(&self) -> Vec<ProviderMappingEntry> {
    match &self.provider_mode {
      ProviderMode::Single(entry) => vec![entry.clone()],
      ProviderMode::Rpaas(entries) => entries.clone(),
    }
  }

  pub fn is_known_provider(&self, provider: &str, resource_type: &str) -> bool {
    self.provider_entries().iter().any(|e| {
      e.resource_provider.eq_ignore_ascii_case(provider)
        && e.resource_type.eq_ignore_ascii_case(resource_type)
    })
  }
}

pub fn server_config() -> &'static ServerConfig {
  static SERVER_CONFIG: OnceLock<ServerConfig> = OnceLock::new();
  SERVER_CONFIG.get_or_init(|| match ServerConfig::load() {
    Ok(config) => config,
    Err(e) => {
      eprintln!("FATAL: failed to load configuration | {e:#}");
      std::process::exit(1)
    }
  })
}

//! Startup orchestration (spec §4.1/§9), grounded on the teacher's
//! `on_startup()` `tokio::join!` pattern: independent startup tasks
//! run concurrently, then the job workers come up once state and the
//! bundle registry are both ready.

use bundle::{BundleRegistry, OciRegistryClient};
use store::Store;

use crate::config::server_config;
use crate::jobs;
use crate::state::{init_bundle_registry, init_db_store, init_job_senders};
use crate::workers;

async fn load_bundle_registry() -> anyhow::Result<BundleRegistry> {
  let config = server_config();
  let client = OciRegistryClient::default();
  BundleRegistry::load(&config.provider_entries(), &client).await
}

async fn connect_store() -> anyhow::Result<Store> {
  let config = server_config();
  Store::connect(&config.mongodb_uri, &config.mongodb_database, &config.state_table, &config.async_op_table)
    .await
}

/// Fails the process if the bundle registry cannot be fully loaded
/// (spec §4.1: "Fails startup if any pull fails") or the state store
/// cannot be reached — both are required before a single request can
/// be served.
pub async fn run() -> anyhow::Result<()> {
  let (registry, store) = tokio::join!(load_bundle_registry(), connect_store());
  let registry = registry.map_err(|e| anyhow::anyhow!("bundle registry load failed | {e:#}"))?;
  let store = store.map_err(|e| anyhow::anyhow!("state store connect failed | {e:#}"))?;

  init_bundle_registry(registry);
  init_db_store(store);

  let (senders, receivers) = jobs::channels();
  init_job_senders(senders);
  workers::spawn(receivers);

  tracing::info!("startup complete");
  Ok(())
}

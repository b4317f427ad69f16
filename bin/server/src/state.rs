//! Process-wide, read-only-after-init state (spec §9 "Global mutable
//! state"): the bundle manifest map, the state store client, and the
//! job queues, each reachable through a single accessor the HTTP
//! handlers, middleware, and workers all call through — grounded on
//! the teacher's `db_client()`/`OnceLock` accessor pattern in
//! `bin/core/src/state.rs`.

use std::sync::OnceLock;

use bundle::BundleRegistry;
use store::Store;
use tokio::sync::Mutex;

use crate::auth::Authorizer;
use crate::jobs::JobSenders;

static DB_STORE: OnceLock<Store> = OnceLock::new();
static BUNDLE_REGISTRY: OnceLock<BundleRegistry> = OnceLock::new();
static JOB_SENDERS: OnceLock<JobSenders> = OnceLock::new();
static AUTHORIZER: tokio::sync::OnceCell<Authorizer> =
  tokio::sync::OnceCell::const_new();

pub fn db_store() -> &'static Store {
  DB_STORE.get().unwrap_or_else(|| {
    tracing::error!(
      "FATAL: db_store accessed before init_db_store() | exiting"
    );
    std::process::exit(1)
  })
}

pub fn init_db_store(store: Store) {
  if DB_STORE.set(store).is_err() {
    tracing::error!("db_store initialized more than once");
  }
}

pub fn bundle_registry() -> &'static BundleRegistry {
  BUNDLE_REGISTRY.get().unwrap_or_else(|| {
    tracing::error!(
      "FATAL: bundle_registry accessed before init_bundle_registry() | exiting"
    );
    std::process::exit(1)
  })
}

pub fn init_bundle_registry(registry: BundleRegistry) {
  if BUNDLE_REGISTRY.set(registry).is_err() {
    tracing::error!("bundle_registry initialized more than once");
  }
}

pub fn job_senders() -> &'static JobSenders {
  JOB_SENDERS.get().unwrap_or_else(|| {
    tracing::error!(
      "FATAL: job_senders accessed before init_job_senders() | exiting"
    );
    std::process::exit(1)
  })
}

pub fn init_job_senders(senders: JobSenders) {
  if JOB_SENDERS.set(senders).is_err() {
    tracing::error!("job_senders initialized more than once");
  }
}

/// Acquired lazily on first use and cached for the process lifetime
/// — the managed-identity probe + CLI fallback (spec §4.4) is too
/// expensive to repeat per request.
pub async fn authorizer() -> &'static Authorizer {
  AUTHORIZER.get_or_init(Authorizer::acquire).await
}

/// Serializes dispatcher read-modify-write sequences per the
/// cooperative-assumption note in spec §5 — the state store itself
/// has no compare-and-swap, so this process-local lock is the
/// closest this implementation gets to the optimistic-concurrency
/// column spec §9 flags as an open question.
pub fn dispatch_lock() -> &'static Mutex<()> {
  static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
  LOCK.get_or_init(|| Mutex::new(()))
}

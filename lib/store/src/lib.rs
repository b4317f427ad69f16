pub mod gzip;
pub mod model;
pub mod mongo;
pub mod rowkey;

pub use model::{AsyncOperation, ProvisioningState, ResourceState, running_marker};
pub use mongo::Store;
pub use rowkey::installation_name;

/// Errors surfaced by the State Store (spec §4.2). `NotFound` is a
/// normal result on first PUT and on operation polling before the
/// first write — it is distinguished from every other failure mode
/// so callers can render 404 instead of 500.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error("resource not found")]
  NotFound,
  #[error(transparent)]
  RowKey(#[from] rowkey::RowKeyError),
  #[error("stored record is corrupt: {0}")]
  Corrupt(String),
  #[error(transparent)]
  Backend(#[from] anyhow::Error),
}

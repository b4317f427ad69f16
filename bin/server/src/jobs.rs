//! Job envelopes (spec §3) carried from the Dispatcher (C5) to the
//! Job Workers (C6). Once enqueued, a job is owned exclusively by
//! the worker that dequeues it (spec §5) — nothing on the request
//! path mutates it again.

use std::collections::HashMap;

use tokio::sync::mpsc;

pub const QUEUE_CAPACITY: usize = 20;
pub const WORKERS_PER_QUEUE: usize = 2;

#[derive(Debug, Clone)]
pub struct PutJob {
  pub subscription_id: String,
  pub resource_id: String,
  pub resource_provider: String,
  pub resource_type: String,
  pub installation_name: String,
  pub bundle_reference: String,
  /// `install` or `upgrade`, decided by the Dispatcher's existence
  /// probe (spec §4.5).
  pub action: String,
  pub parameters: HashMap<String, String>,
  pub credentials: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct PostJob {
  pub subscription_id: String,
  pub resource_id: String,
  pub installation_name: String,
  pub operation_id: String,
  pub action: String,
  pub parameters: HashMap<String, String>,
  pub credentials: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct DeleteJob {
  pub subscription_id: String,
  pub resource_id: String,
  pub installation_name: String,
  pub operation_id: String,
}

pub struct JobSenders {
  pub put: mpsc::Sender<PutJob>,
  pub post: mpsc::Sender<PostJob>,
  pub delete: mpsc::Sender<DeleteJob>,
}

pub struct JobReceivers {
  pub put: mpsc::Receiver<PutJob>,
  pub post: mpsc::Receiver<PostJob>,
  pub delete: mpsc::Receiver<DeleteJob>,
}

/// Three bounded queues (spec §4.7, default capacity 20), one per
/// HTTP method that can kick off a lifecycle action.
pub fn channels() -> (JobSenders, JobReceivers) {
  let (put_tx, put_rx) = mpsc::channel(QUEUE_CAPACITY);
  let (post_tx, post_rx) = mpsc::channel(QUEUE_CAPACITY);
  let (delete_tx, delete_rx) = mpsc::channel(QUEUE_CAPACITY);
  (
    JobSenders { put: put_tx, post: post_tx, delete: delete_tx },
    JobReceivers { put: put_rx, post: post_rx, delete: delete_rx },
  )
}

use std::{collections::HashMap, hash::Hash};

use tokio::sync::RwLock;

/// Process-wide read-mostly map guarded by an RwLock, keyed by a
/// `Clone`-able key and holding `Clone`-able values so readers never
/// contend with each other.
///
/// Used for the frozen bundle-manifest map, keyed by `provider/type`.
#[derive(Debug)]
pub struct CloneCache<K: PartialEq + Eq + Hash, T: Clone>(
  RwLock<HashMap<K, T>>,
);

impl<K: PartialEq + Eq + Hash, T: Clone> Default for CloneCache<K, T> {
  fn default() -> Self {
    Self(RwLock::new(HashMap::new()))
  }
}

impl<K: PartialEq + Eq + Hash + Clone, T: Clone> CloneCache<K, T> {
  pub async fn get(&self, key: &K) -> Option<T> {
    self.0.read().await.get(key).cloned()
  }

  pub async fn get_keys(&self) -> Vec<K> {
    self.0.read().await.keys().cloned().collect()
  }

  pub async fn insert(&self, key: K, val: T) -> Option<T> {
    self.0.write().await.insert(key, val)
  }
}

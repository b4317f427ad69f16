//! Bundle Registry Client (spec §4.1, C1): resolves a configured
//! `(resourceProvider, resourceType)` pair to the `BundleManifest`
//! pulled for it at startup, and keeps those manifests cached for
//! the process lifetime.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use cache::CloneCache;
use serde::Deserialize;

use crate::manifest::BundleManifest;
use crate::oci::{OciRegistryClient, resolve_tag};

/// One row of `providermapping.yaml`, the RPaaS-style configuration
/// that maps an ARM custom resource type to the bundle it installs.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMappingEntry {
  #[serde(rename = "resourceProvider")]
  pub resource_provider: String,
  #[serde(rename = "resourceType")]
  pub resource_type: String,
  #[serde(rename = "bundleReference")]
  pub bundle_reference: String,
  #[serde(default)]
  pub insecure_registry: bool,
}

/// Composite key this system indexes bundle manifests by:
/// `{resourceProvider}/{resourceType}`, lowercased, matching how
/// provider/type are compared case-insensitively elsewhere (the
/// resource path parser, §4.3/C3).
pub fn rp_key(provider: &str, resource_type: &str) -> String {
  format!("{}/{}", provider.to_lowercase(), resource_type.to_lowercase())
}

pub struct BundleRegistry {
  manifests: CloneCache<String, Arc<BundleManifest>>,
  /// Bundle reference configured for each `(provider, type)`, kept
  /// around so the installer adapter can re-derive a stable
  /// installation name without re-reading `providermapping.yaml`.
  references: HashMap<String, String>,
}

impl BundleRegistry {
  /// Pulls every bundle named in `entries` up front. Fails the whole
  /// load on the first pull failure, per spec §4.1: "Fails startup
  /// if any pull fails."
  pub async fn load(
    entries: &[ProviderMappingEntry],
    client: &OciRegistryClient,
  ) -> anyhow::Result<Self> {
    let manifests = CloneCache::default();
    let mut references = HashMap::new();

    for entry in entries {
      let key = rp_key(&entry.resource_provider, &entry.resource_type);
      let reference = resolve_tag(&entry.bundle_reference);
      tracing::info!(%key, %reference, "pulling bundle manifest");
      let manifest = client
        .pull_bundle(&reference, entry.insecure_registry)
        .await
        .with_context(|| {
          format!(
            "failed to pull bundle '{reference}' for resource type '{key}'"
          )
        })?;
      references.insert(key.clone(), reference);
      manifests.insert(key, Arc::new(manifest)).await;
    }

    tracing::info!(count = entries.len(), "bundle registry loaded");
    Ok(Self { manifests, references })
  }

  pub async fn get(
    &self,
    provider: &str,
    resource_type: &str,
  ) -> Option<Arc<BundleManifest>> {
    self.manifests.get(&rp_key(provider, resource_type)).await
  }

  pub fn bundle_reference(
    &self,
    provider: &str,
    resource_type: &str,
  ) -> Option<&str> {
    self
      .references
      .get(&rp_key(provider, resource_type))
      .map(String::as_str)
  }

  pub async fn known_types(&self) -> Vec<String> {
    self.manifests.get_keys().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rp_key_is_case_insensitive() {
    assert_eq!(
      rp_key("Microsoft.Demo", "Widgets"),
      rp_key("microsoft.demo", "widgets")
    );
  }
}

pub mod manifest;
pub mod oci;
pub mod registry;

pub use manifest::{
  BundleCredential, BundleManifest, BundleOutput, BundleParameter,
};
pub use oci::OciRegistryClient;
pub use registry::{BundleRegistry, ProviderMappingEntry, rp_key};

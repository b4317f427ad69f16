//! Row-key escaping (spec §4.2/§4.3, P5) and installation-name
//! derivation (spec §3, P4).
//!
//! `/` is substituted for `!` to satisfy the backend's key
//! restrictions; `!` is therefore rejected in any raw resource id
//! up front, per the design note in spec §9.

use sha2::{Digest, Sha256};

const ESCAPE_CHAR: char = '!';

#[derive(Debug, thiserror::Error)]
pub enum RowKeyError {
  #[error("resource id contains reserved character '{ESCAPE_CHAR}'")]
  ReservedCharacter,
}

/// Encodes a raw resource id (containing `/`) into a row key safe
/// for the backend, substituting `/` with `!`. Rejects ids that
/// already contain `!`.
pub fn encode(resource_id: &str) -> Result<String, RowKeyError> {
  if resource_id.contains(ESCAPE_CHAR) {
    return Err(RowKeyError::ReservedCharacter);
  }
  Ok(resource_id.replace('/', &ESCAPE_CHAR.to_string()))
}

/// Inverse of [`encode`]; used by the LIST projection (spec §4.3) to
/// recover resource ids from stored row keys.
pub fn decode(row_key: &str) -> String {
  row_key.replace(ESCAPE_CHAR, "/")
}

/// Rejects any raw path containing the row-key escape character,
/// per spec §4.3 ("Reject paths containing `!`").
pub fn reject_reserved_character(path: &str) -> Result<(), RowKeyError> {
  if path.contains(ESCAPE_CHAR) {
    return Err(RowKeyError::ReservedCharacter);
  }
  Ok(())
}

/// `installationName(resId, tag)` (spec §3, P4): lowercase-SHA-256
/// hex of `lowercase(trimmedBundleTag) + lowercase(resourceId)`,
/// with the subscription id folded into the preimage. This is a
/// deliberate deviation from the hash the source computes (see
/// DESIGN.md) — the source's preimage omits the subscription id, so
/// the same bundle tag deployed to the same logical resource path in
/// two different subscriptions would collide at the installer layer.
pub fn installation_name(
  subscription_id: &str,
  resource_id: &str,
  bundle_tag: &str,
) -> String {
  let preimage = format!(
    "{}{}{}",
    bundle_tag.trim().to_lowercase(),
    resource_id.to_lowercase(),
    subscription_id.to_lowercase(),
  );
  let digest = Sha256::digest(preimage.as_bytes());
  hex::encode(digest)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn encode_decode_round_trips_for_ids_without_escape_char() {
    let id = "/subscriptions/S/resourceGroups/g/providers/P/T/n1";
    let encoded = encode(id).unwrap();
    assert!(!encoded.contains('/'));
    assert_eq!(decode(&encoded), id);
  }

  #[test]
  fn encode_rejects_escape_character() {
    assert!(encode("has!bang").is_err());
  }

  #[test]
  fn installation_name_is_stable_and_case_invariant_on_resource_id() {
    let a = installation_name("sub1", "/subscriptions/sub1/resourceGroups/g/providers/P/T/n1", "example.com/demo:v1");
    let b = installation_name("sub1", "/SUBSCRIPTIONS/SUB1/resourceGroups/g/providers/P/T/N1", "example.com/demo:v1");
    assert_eq!(a, b);
    let c = installation_name("sub1", "/subscriptions/sub1/resourceGroups/g/providers/P/T/n1", "example.com/demo:v1");
    assert_eq!(a, c);
  }

  #[test]
  fn installation_name_differs_across_subscriptions() {
    let a = installation_name("sub1", "/subscriptions/sub1/resourceGroups/g/providers/P/T/n1", "example.com/demo:v1");
    let b = installation_name("sub2", "/subscriptions/sub1/resourceGroups/g/providers/P/T/n1", "example.com/demo:v1");
    assert_ne!(a, b);
  }
}

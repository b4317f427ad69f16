//! Resource-Path Parser (spec §4.3, C3).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
  #[error("path contains reserved character '!'")]
  ReservedCharacter,
  #[error("path is missing a 'subscriptions' segment")]
  MissingSubscription,
  #[error("path is missing a 'providers' segment")]
  MissingProvider,
  #[error("path does not resolve to a known request shape")]
  Unrecognized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestShape {
  /// `…/providers/{provider}/{type}` — GET only.
  List,
  /// `…/providers/{provider}/{type}/{name}`.
  Resource,
  /// `…/{name}/{action}` — POST only, `action` is bundle-declared.
  Action(String),
  /// `…/{name}/operations/{opId}` — GET only.
  Operation(String),
}

#[derive(Debug, Clone)]
pub struct ParsedPath {
  pub subscription_id: String,
  pub provider: String,
  pub resource_type: String,
  pub resource_name: Option<String>,
  /// Full ARM-style id up to and including the resource name, e.g.
  /// `/subscriptions/S/resourceGroups/g/providers/P/T/n1`. Absent
  /// for list requests, which name no single resource.
  pub resource_id: Option<String>,
  pub shape: RequestShape,
}

/// Parses the raw request path per spec §4.3. Rejects `!` up front
/// (the row-key escape character, spec §4.2/§9).
pub fn parse(path: &str) -> Result<ParsedPath, PathError> {
  store::rowkey::reject_reserved_character(path)
    .map_err(|_| PathError::ReservedCharacter)?;

  let segments: Vec<&str> =
    path.split('/').filter(|s| !s.is_empty()).collect();

  let sub_idx = segments
    .iter()
    .position(|s| s.eq_ignore_ascii_case("subscriptions"))
    .ok_or(PathError::MissingSubscription)?;
  let subscription_id = segments
    .get(sub_idx + 1)
    .ok_or(PathError::MissingSubscription)?
    .to_string();

  let providers_idx = segments
    .iter()
    .position(|s| s.eq_ignore_ascii_case("providers"))
    .ok_or(PathError::MissingProvider)?;
  let provider = segments
    .get(providers_idx + 1)
    .ok_or(PathError::MissingProvider)?
    .to_string();

  let rest = &segments[providers_idx + 2..];

  let (resource_type, resource_name, shape, name_end) = match rest.len() {
    1 => (rest[0].to_string(), None, RequestShape::List, providers_idx + 2),
    2 => (
      rest[0].to_string(),
      Some(rest[1].to_string()),
      RequestShape::Resource,
      providers_idx + 4,
    ),
    3 => (
      rest[0].to_string(),
      Some(rest[1].to_string()),
      RequestShape::Action(rest[2].to_string()),
      providers_idx + 4,
    ),
    4 if rest[2].eq_ignore_ascii_case("operations") => (
      rest[0].to_string(),
      Some(rest[1].to_string()),
      RequestShape::Operation(rest[3].to_string()),
      providers_idx + 4,
    ),
    _ => return Err(PathError::Unrecognized),
  };

  let resource_id = resource_name.as_ref().map(|_| {
    format!("/{}", segments[..name_end].join("/"))
  });

  Ok(ParsedPath {
    subscription_id,
    provider,
    resource_type,
    resource_name,
    resource_id,
    shape,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  const SUB: &str = "/subscriptions/11111111-1111-1111-1111-111111111111/resourceGroups/g/providers/Microsoft.Demo/widgets";

  #[test]
  fn parses_list_request() {
    let parsed = parse(SUB).unwrap();
    assert_eq!(parsed.shape, RequestShape::List);
    assert!(parsed.resource_name.is_none());
  }

  #[test]
  fn parses_resource_request() {
    let path = format!("{SUB}/n1");
    let parsed = parse(&path).unwrap();
    assert_eq!(parsed.shape, RequestShape::Resource);
    assert_eq!(parsed.resource_name.as_deref(), Some("n1"));
    assert_eq!(parsed.resource_id.as_deref(), Some(path.as_str()));
  }

  #[test]
  fn parses_action_request() {
    let path = format!("{SUB}/n1/rollback");
    let parsed = parse(&path).unwrap();
    assert_eq!(parsed.shape, RequestShape::Action("rollback".to_string()));
  }

  #[test]
  fn parses_operation_request() {
    let path = format!("{SUB}/n1/operations/op-1");
    let parsed = parse(&path).unwrap();
    assert_eq!(parsed.shape, RequestShape::Operation("op-1".to_string()));
  }

  #[test]
  fn rejects_reserved_character() {
    let path = format!("{SUB}/n1!bad");
    assert!(matches!(
      parse(&path),
      Err(PathError::ReservedCharacter)
    ));
  }

  #[test]
  fn rejects_missing_provider() {
    assert!(matches!(
      parse("/subscriptions/S/resourceGroups/g"),
      Err(PathError::MissingProvider)
    ));
  }
}

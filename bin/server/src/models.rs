use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body accepted on PUT/POST (spec §6): `{ "properties": { "parameters": {...}, "credentials": {...} } }`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestBody {
  #[serde(default)]
  pub properties: RequestProperties,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestProperties {
  #[serde(default)]
  pub parameters: HashMap<String, String>,
  #[serde(default)]
  pub credentials: HashMap<String, String>,
}

/// `GET` operations projection (spec §4.6): `{id, name, status, properties?}`.
#[derive(Debug, Clone, Serialize)]
pub struct OperationResponse {
  pub id: String,
  pub name: String,
  pub status: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub properties: Option<Value>,
}

/// Builds the resource projection body (spec §4.5 GET, scenario 1 in
/// §8): `ProvisioningState`, `Installation`, non-sensitive outputs
/// that apply to the current action, and the caller-supplied
/// parameters — all flattened into one object.
pub fn resource_projection(
  provisioning_state: &str,
  installation_name: &str,
  parameters: &HashMap<String, String>,
  outputs: &HashMap<String, String>,
) -> Value {
  let mut body = Map::new();
  body.insert(
    "ProvisioningState".to_string(),
    Value::String(provisioning_state.to_string()),
  );
  body.insert(
    "Installation".to_string(),
    Value::String(installation_name.to_string()),
  );
  for (k, v) in parameters {
    body.insert(k.clone(), Value::String(v.clone()));
  }
  for (k, v) in outputs {
    body.insert(k.clone(), Value::String(v.clone()));
  }
  Value::Object(body)
}

pub fn failed_resource_projection(error_message: &str) -> Value {
  serde_json::json!({
    "ProvisioningState": "Failed",
    "Error": error_message,
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn resource_projection_flattens_parameters_and_outputs() {
    let mut parameters = HashMap::new();
    parameters.insert("size".to_string(), "small".to_string());
    let mut outputs = HashMap::new();
    outputs.insert("endpoint".to_string(), "https://example".to_string());

    let body = resource_projection("Succeeded", "inst-1", &parameters, &outputs);
    assert_eq!(body["ProvisioningState"], "Succeeded");
    assert_eq!(body["Installation"], "inst-1");
    assert_eq!(body["size"], "small");
    assert_eq!(body["endpoint"], "https://example");
  }

  #[test]
  fn request_body_defaults_to_empty_maps() {
    let body: RequestBody = serde_json::from_str("{}").unwrap();
    assert!(body.properties.parameters.is_empty());
    assert!(body.properties.credentials.is_empty());
  }
}

use serde::{Deserialize, Serialize};

/// A single named parameter declared by a CNAB bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleParameter {
  pub name: String,
  #[serde(default)]
  pub required: bool,
  /// Lifecycle/custom actions this parameter is relevant to. Empty
  /// means "all actions".
  #[serde(default, rename = "applyTo")]
  pub applies_to: Vec<String>,
}

impl BundleParameter {
  pub fn applies_to(&self, action: &str) -> bool {
    self.applies_to.is_empty()
      || self.applies_to.iter().any(|a| a == action)
  }
}

/// A single named credential declared by a CNAB bundle. Credentials
/// carry no `applyTo` in the CNAB spec — they apply uniformly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleCredential {
  pub name: String,
  #[serde(default)]
  pub required: bool,
  /// Destination path inside the invocation image, when the
  /// installer delivers this credential as a file rather than an
  /// environment variable.
  #[serde(default)]
  pub path: Option<String>,
}

impl BundleCredential {
  pub fn is_file(&self) -> bool {
    self.path.is_some()
  }
}

/// A declared output, produced by one or more actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleOutput {
  pub name: String,
  #[serde(default, rename = "applyTo")]
  pub applies_to: Vec<String>,
  #[serde(default)]
  pub sensitive: bool,
}

impl BundleOutput {
  pub fn applies_to(&self, action: &str) -> bool {
    self.applies_to.is_empty()
      || self.applies_to.iter().any(|a| a == action)
  }
}

/// The immutable, process-wide manifest for one configured
/// `(provider, type)` pair. Loaded once at startup by the Bundle
/// Registry Client and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleManifest {
  /// The resolved bundle reference (tag or digest), as pulled.
  pub reference: String,
  pub parameters: Vec<BundleParameter>,
  pub credentials: Vec<BundleCredential>,
  pub outputs: Vec<BundleOutput>,
  /// Custom action names beyond install/upgrade/uninstall, as
  /// declared by the bundle (CNAB `actions` block).
  #[serde(default)]
  pub custom_actions: Vec<String>,
}

impl BundleManifest {
  pub fn parameter(&self, name: &str) -> Option<&BundleParameter> {
    self.parameters.iter().find(|p| p.name == name)
  }

  pub fn credential(&self, name: &str) -> Option<&BundleCredential> {
    self.credentials.iter().find(|c| c.name == name)
  }

  pub fn is_custom_action(&self, action: &str) -> bool {
    self.custom_actions.iter().any(|a| a == action)
  }

  pub fn outputs_for_action<'a>(
    &'a self,
    action: &'a str,
  ) -> impl Iterator<Item = &'a BundleOutput> {
    self.outputs.iter().filter(move |o| o.applies_to(action))
  }

  /// Every supplied key must name a declared parameter; every
  /// parameter required for `action` must be supplied.
  pub fn validate_parameters(
    &self,
    action: &str,
    supplied: &std::collections::HashMap<String, String>,
  ) -> Result<(), String> {
    for key in supplied.keys() {
      if self.parameter(key).is_none() {
        return Err(format!("unknown parameter '{key}'"));
      }
    }
    for param in &self.parameters {
      if param.required
        && param.applies_to(action)
        && !supplied.contains_key(&param.name)
      {
        return Err(format!(
          "missing required parameter '{}' for action '{action}'",
          param.name
        ));
      }
    }
    Ok(())
  }

  /// Credentials have no `applyTo`, so required-ness is unconditional.
  pub fn validate_credentials(
    &self,
    supplied: &std::collections::HashMap<String, String>,
  ) -> Result<(), String> {
    for key in supplied.keys() {
      if self.credential(key).is_none() {
        return Err(format!("unknown credential '{key}'"));
      }
    }
    for cred in &self.credentials {
      if cred.required && !supplied.contains_key(&cred.name) {
        return Err(format!("missing required credential '{}'", cred.name));
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  fn manifest() -> BundleManifest {
    BundleManifest {
      reference: "example.com/demo:v1".into(),
      parameters: vec![
        BundleParameter {
          name: "size".into(),
          required: true,
          applies_to: vec!["install".into(), "upgrade".into()],
        },
        BundleParameter {
          name: "region".into(),
          required: false,
          applies_to: vec![],
        },
      ],
      credentials: vec![BundleCredential {
        name: "api-key".into(),
        required: true,
        path: None,
      }],
      outputs: vec![BundleOutput {
        name: "connection-string".into(),
        applies_to: vec!["install".into()],
        sensitive: true,
      }],
      custom_actions: vec!["rollback".into(), "backup".into()],
    }
  }

  #[test]
  fn required_parameter_missing_is_rejected() {
    let m = manifest();
    let supplied = HashMap::new();
    assert!(m.validate_parameters("install", &supplied).is_err());
  }

  #[test]
  fn required_parameter_present_passes() {
    let m = manifest();
    let mut supplied = HashMap::new();
    supplied.insert("size".to_string(), "large".to_string());
    assert!(m.validate_parameters("install", &supplied).is_ok());
  }

  #[test]
  fn unknown_parameter_is_rejected() {
    let m = manifest();
    let mut supplied = HashMap::new();
    supplied.insert("size".to_string(), "large".to_string());
    supplied.insert("bogus".to_string(), "x".to_string());
    assert!(m.validate_parameters("install", &supplied).is_err());
  }

  #[test]
  fn required_only_applies_to_listed_actions() {
    let m = manifest();
    // 'size' is not required for 'rollback' (applies_to excludes it)
    let supplied = HashMap::new();
    assert!(m.validate_parameters("rollback", &supplied).is_ok());
  }

  #[test]
  fn sensitive_output_excluded_downstream() {
    let m = manifest();
    let outputs: Vec<_> = m.outputs_for_action("install").collect();
    assert_eq!(outputs.len(), 1);
    assert!(outputs[0].sensitive);
  }
}

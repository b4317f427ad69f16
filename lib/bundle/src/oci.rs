//! Minimal OCI Distribution client used to pull a CNAB bundle's
//! config blob (`application/vnd.cnab.config.v1+json`) at startup.
//!
//! This stands in for the external collaborator described in spec
//! §1 as "the OCI registry from which bundles are pulled at
//! startup", modeled there as a `PullBundle(ref) -> BundleManifest`
//! call. `OciRegistryClient::pull_bundle` is that call.

use std::collections::HashMap;

use anyhow::{Context, anyhow};
use serde::Deserialize;

use crate::manifest::{
  BundleCredential, BundleManifest, BundleOutput, BundleParameter,
};

pub struct OciRegistryClient {
  http: reqwest::Client,
}

impl Default for OciRegistryClient {
  fn default() -> Self {
    Self {
      http: reqwest::Client::builder()
        .user_agent("cnab-arm-rp")
        .build()
        .expect("failed to build OCI http client"),
    }
  }
}

struct ParsedReference {
  registry: String,
  repository: String,
  /// Either a tag or a `sha256:...` digest.
  reference: String,
}

fn parse_reference(reference: &str) -> anyhow::Result<ParsedReference> {
  let (name, tag_or_digest) = match reference.rsplit_once('@') {
    Some((name, digest)) => (name, format!("sha256:{}", digest.trim_start_matches("sha256:"))),
    None => match reference.rsplit_once(':') {
      // Guard against ':' being a port separator in the registry host.
      Some((name, tag)) if !tag.contains('/') => {
        (name, tag.to_string())
      }
      _ => (reference, "latest".to_string()),
    },
  };

  let (registry, repository) = match name.split_once('/') {
    Some((host, rest)) if host.contains('.') || host.contains(':') || host == "localhost" => {
      (host.to_string(), rest.to_string())
    }
    _ => ("registry-1.docker.io".to_string(), name.to_string()),
  };

  Ok(ParsedReference {
    registry,
    repository,
    reference: tag_or_digest,
  })
}

/// Appends `:latest` when `reference` carries neither a tag nor a
/// digest, per spec §4.1.
pub fn resolve_tag(reference: &str) -> String {
  let last_segment = reference.rsplit('/').next().unwrap_or(reference);
  if last_segment.contains('@') || last_segment.contains(':') {
    reference.to_string()
  } else {
    format!("{reference}:latest")
  }
}

#[derive(Debug, Deserialize)]
struct AuthChallenge {
  realm: String,
  service: Option<String>,
  scope: Option<String>,
}

fn parse_www_authenticate(header: &str) -> Option<AuthChallenge> {
  let rest = header.strip_prefix("Bearer ")?;
  let mut realm = None;
  let mut service = None;
  let mut scope = None;
  for part in rest.split(',') {
    let (k, v) = part.split_once('=')?;
    let v = v.trim().trim_matches('"').to_string();
    match k.trim() {
      "realm" => realm = Some(v),
      "service" => service = Some(v),
      "scope" => scope = Some(v),
      _ => {}
    }
  }
  Some(AuthChallenge {
    realm: realm?,
    service,
    scope,
  })
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
  #[serde(alias = "access_token")]
  token: String,
}

#[derive(Debug, Deserialize)]
struct Manifest {
  config: Descriptor,
}

#[derive(Debug, Deserialize)]
struct Descriptor {
  digest: String,
}

/// The subset of the CNAB `bundle.json` schema this system reads.
/// Parameters/credentials/outputs/actions are all maps keyed by
/// name in the real CNAB spec.
#[derive(Debug, Deserialize)]
struct CnabBundleDoc {
  #[serde(default)]
  parameters: HashMap<String, CnabParameter>,
  #[serde(default)]
  credentials: HashMap<String, CnabCredential>,
  #[serde(default)]
  outputs: HashMap<String, CnabOutput>,
  #[serde(default)]
  actions: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize, Default)]
struct CnabParameter {
  #[serde(default)]
  required: bool,
  #[serde(default, rename = "applyTo")]
  apply_to: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CnabCredential {
  #[serde(default)]
  required: bool,
  #[serde(default)]
  path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CnabOutput {
  #[serde(default, rename = "applyTo")]
  apply_to: Vec<String>,
  #[serde(default)]
  sensitive: bool,
}

impl OciRegistryClient {
  pub async fn pull_bundle(
    &self,
    reference: &str,
    insecure: bool,
  ) -> anyhow::Result<BundleManifest> {
    let parsed = parse_reference(reference)
      .with_context(|| format!("invalid bundle reference '{reference}'"))?;
    let scheme = if insecure || parsed.registry == "localhost" {
      "http"
    } else {
      "https"
    };
    let base = format!("https://{}", parsed.registry).replacen("https", scheme, 1);

    let manifest_url = format!(
      "{base}/v2/{}/manifests/{}",
      parsed.repository, parsed.reference
    );
    let manifest = self
      .get_with_auth(&manifest_url, &parsed, "application/vnd.oci.image.manifest.v1+json, application/vnd.docker.distribution.manifest.v2+json")
      .await
      .with_context(|| format!("failed to fetch manifest for {reference}"))?
      .json::<Manifest>()
      .await
      .context("failed to parse OCI manifest")?;

    let config_url = format!(
      "{base}/v2/{}/blobs/{}",
      parsed.repository, manifest.config.digest
    );
    let config = self
      .get_with_auth(&config_url, &parsed, "application/vnd.cnab.config.v1+json, application/json")
      .await
      .with_context(|| format!("failed to fetch bundle config for {reference}"))?
      .json::<CnabBundleDoc>()
      .await
      .context("failed to parse CNAB bundle.json")?;

    Ok(BundleManifest {
      reference: reference.to_string(),
      parameters: config
        .parameters
        .into_iter()
        .map(|(name, p)| BundleParameter {
          name,
          required: p.required,
          applies_to: p.apply_to,
        })
        .collect(),
      credentials: config
        .credentials
        .into_iter()
        .map(|(name, c)| BundleCredential {
          name,
          required: c.required,
          path: c.path,
        })
        .collect(),
      outputs: config
        .outputs
        .into_iter()
        .map(|(name, o)| BundleOutput {
          name,
          applies_to: o.apply_to,
          sensitive: o.sensitive,
        })
        .collect(),
      custom_actions: config
        .actions
        .into_keys()
        .filter(|a| !matches!(a.as_str(), "install" | "upgrade" | "uninstall"))
        .collect(),
    })
  }

  async fn get_with_auth(
    &self,
    url: &str,
    reference: &ParsedReference,
    accept: &str,
  ) -> anyhow::Result<reqwest::Response> {
    let resp = self.http.get(url).header("Accept", accept).send().await?;
    if resp.status() != reqwest::StatusCode::UNAUTHORIZED {
      return resp.error_for_status().map_err(Into::into);
    }

    let challenge = resp
      .headers()
      .get(reqwest::header::WWW_AUTHENTICATE)
      .and_then(|v| v.to_str().ok())
      .and_then(parse_www_authenticate)
      .ok_or_else(|| anyhow!("registry returned 401 without a Bearer challenge"))?;

    let scope = challenge
      .scope
      .unwrap_or_else(|| format!("repository:{}:pull", reference.repository));
    let mut token_req = self.http.get(&challenge.realm).query(&[("scope", scope.as_str())]);
    if let Some(service) = &challenge.service {
      token_req = token_req.query(&[("service", service.as_str())]);
    }
    let token = token_req
      .send()
      .await?
      .error_for_status()?
      .json::<TokenResponse>()
      .await
      .context("failed to parse registry auth token response")?
      .token;

    self
      .http
      .get(url)
      .header("Accept", accept)
      .bearer_auth(token)
      .send()
      .await?
      .error_for_status()
      .map_err(Into::into)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn resolve_tag_appends_latest_when_bare() {
    assert_eq!(resolve_tag("example.com/demo"), "example.com/demo:latest");
  }

  #[test]
  fn resolve_tag_leaves_explicit_tag() {
    assert_eq!(resolve_tag("example.com/demo:v2"), "example.com/demo:v2");
  }

  #[test]
  fn resolve_tag_leaves_digest() {
    let r = "example.com/demo@sha256:abc123";
    assert_eq!(resolve_tag(r), r);
  }

  #[test]
  fn parse_reference_splits_registry_and_repo() {
    let p = parse_reference("example.com/group/demo:v1").unwrap();
    assert_eq!(p.registry, "example.com");
    assert_eq!(p.repository, "group/demo");
    assert_eq!(p.reference, "v1");
  }

  #[test]
  fn parse_reference_defaults_to_docker_hub() {
    let p = parse_reference("library/demo:v1").unwrap();
    assert_eq!(p.registry, "registry-1.docker.io");
    assert_eq!(p.repository, "library/demo");
  }
}

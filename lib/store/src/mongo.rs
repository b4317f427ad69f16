use anyhow::Context;
use bson::{Binary, Bson, Document, doc, spec::BinarySubtype};
use mongodb::{Client, Collection, options::ClientOptions};

use crate::model::{AsyncOperation, ProvisioningState, ResourceState};
use crate::{StoreError, rowkey};

/// Mongo-backed implementation of the two-table State Store (spec
/// §4.2, C2). Each collection's `_id` is `{subscription}#{row_key}`,
/// which gives upsert-by-id the atomicity the partition/row-key pair
/// implies without a compound unique index.
#[derive(Clone)]
pub struct Store {
  resources: Collection<Document>,
  async_ops: Collection<Document>,
}

fn doc_id(subscription_id: &str, row_key: &str) -> String {
  format!("{subscription_id}#{row_key}")
}

impl Store {
  pub async fn connect(
    uri: &str,
    database: &str,
    resource_table: &str,
    async_op_table: &str,
  ) -> anyhow::Result<Self> {
    let options = ClientOptions::parse(uri)
      .await
      .context("failed to parse MongoDB connection string")?;
    let client = Client::with_options(options)
      .context("failed to construct MongoDB client")?;
    let db = client.database(database);
    Ok(Self {
      resources: db.collection(resource_table),
      async_ops: db.collection(async_op_table),
    })
  }

  pub async fn get_resource(
    &self,
    subscription_id: &str,
    resource_id: &str,
  ) -> Result<ResourceState, StoreError> {
    let row_key = rowkey::encode(resource_id)?;
    let id = doc_id(subscription_id, &row_key);
    let found = self
      .resources
      .find_one(doc! { "_id": &id })
      .await
      .context("failed to query resource state")?
      .ok_or(StoreError::NotFound)?;
    document_to_resource(found)
  }

  pub async fn put_resource(
    &self,
    subscription_id: &str,
    resource_id: &str,
    state: &ResourceState,
  ) -> Result<(), StoreError> {
    let row_key = rowkey::encode(resource_id)?;
    let id = doc_id(subscription_id, &row_key);
    let mut document = resource_to_document(state)?;
    document.insert("_id", &id);
    document.insert("subscription_id", subscription_id);
    document.insert("row_key", &row_key);
    self
      .resources
      .replace_one(doc! { "_id": &id }, document)
      .upsert(true)
      .await
      .context("failed to upsert resource state")?;
    Ok(())
  }

  /// Partial update, used for `Status` toggles and `SetFailed`
  /// (spec §4.2). Only non-`None` fields below are written.
  pub async fn merge_resource(
    &self,
    subscription_id: &str,
    resource_id: &str,
    provisioning_state: Option<ProvisioningState>,
    status: Option<&str>,
    operation_id: Option<&str>,
    error_response: Option<Option<Vec<u8>>>,
  ) -> Result<(), StoreError> {
    let row_key = rowkey::encode(resource_id)?;
    let id = doc_id(subscription_id, &row_key);

    let mut set = Document::new();
    if let Some(ps) = provisioning_state {
      set.insert("provisioning_state", ps.to_string());
    }
    if let Some(status) = status {
      set.insert("status", status);
    }
    if let Some(operation_id) = operation_id {
      set.insert("operation_id", operation_id);
    }
    if let Some(error) = error_response {
      set.insert("error_response", bytes_to_bson(error));
    }
    if set.is_empty() {
      return Ok(());
    }

    let result = self
      .resources
      .update_one(doc! { "_id": &id }, doc! { "$set": set })
      .await
      .context("failed to merge resource state")?;
    if result.matched_count == 0 {
      return Err(StoreError::NotFound);
    }
    Ok(())
  }

  pub async fn delete_resource(
    &self,
    subscription_id: &str,
    resource_id: &str,
  ) -> Result<(), StoreError> {
    let row_key = rowkey::encode(resource_id)?;
    let id = doc_id(subscription_id, &row_key);
    self
      .resources
      .delete_one(doc! { "_id": &id })
      .await
      .context("failed to delete resource state")?;
    Ok(())
  }

  /// Projection-only listing (spec §4.2): returns row keys, still
  /// `/`-escaped. Callers decode with [`rowkey::decode`].
  pub async fn list_resources(
    &self,
    subscription_id: &str,
    provider: &str,
    resource_type: &str,
  ) -> Result<Vec<String>, StoreError> {
    use futures_util::TryStreamExt;

    let filter = doc! {
      "subscription_id": subscription_id,
      "resource_provider": provider,
      "resource_type": resource_type,
    };
    let mut cursor = self
      .resources
      .find(filter)
      .projection(doc! { "row_key": 1 })
      .await
      .context("failed to list resources")?;

    let mut row_keys = Vec::new();
    while let Some(doc) = cursor
      .try_next()
      .await
      .context("failed to stream resource list")?
    {
      if let Ok(row_key) = doc.get_str("row_key") {
        row_keys.push(row_key.to_string());
      }
    }
    Ok(row_keys)
  }

  pub async fn put_async_op(
    &self,
    subscription_id: &str,
    operation_id: &str,
    op: &AsyncOperation,
  ) -> Result<(), StoreError> {
    let id = doc_id(subscription_id, operation_id);
    let mut document = doc! {
      "action": &op.action,
      "status": &op.status,
    };
    document.insert(
      "output",
      op.output.clone().map(Bson::String).unwrap_or(Bson::Null),
    );
    document.insert("_id", &id);
    document.insert("subscription_id", subscription_id);
    self
      .async_ops
      .replace_one(doc! { "_id": &id }, document)
      .upsert(true)
      .await
      .context("failed to upsert async operation")?;
    Ok(())
  }

  pub async fn get_async_op(
    &self,
    subscription_id: &str,
    operation_id: &str,
  ) -> Result<AsyncOperation, StoreError> {
    let id = doc_id(subscription_id, operation_id);
    let found = self
      .async_ops
      .find_one(doc! { "_id": &id })
      .await
      .context("failed to query async operation")?
      .ok_or(StoreError::NotFound)?;
    Ok(AsyncOperation {
      action: found.get_str("action").unwrap_or_default().to_string(),
      status: found.get_str("status").unwrap_or_default().to_string(),
      output: found.get_str("output").ok().map(str::to_string),
    })
  }
}

fn resource_to_document(
  state: &ResourceState,
) -> Result<Document, StoreError> {
  let mut document = doc! {
    "provisioning_state": state.provisioning_state.to_string(),
    "operation_id": &state.operation_id,
    "parameters": &state.parameters,
    "credentials": &state.credentials,
    "resource_provider": &state.resource_provider,
    "resource_type": &state.resource_type,
    "status": &state.status,
  };
  document.insert(
    "error_response",
    bytes_to_bson(state.error_response.clone()),
  );
  Ok(document)
}

fn bytes_to_bson(bytes: Option<Vec<u8>>) -> Bson {
  match bytes {
    Some(bytes) => Bson::Binary(Binary {
      subtype: BinarySubtype::Generic,
      bytes,
    }),
    None => Bson::Null,
  }
}

fn document_to_resource(
  document: Document,
) -> Result<ResourceState, StoreError> {
  let raw = document.get_str("provisioning_state").map_err(|_| {
    StoreError::Corrupt("missing provisioning_state".to_string())
  })?;
  let provisioning_state = parse_provisioning_state(raw)?;
  let error_response = match document.get("error_response") {
    Some(Bson::Binary(bin)) => Some(bin.bytes.clone()),
    _ => None,
  };
  Ok(ResourceState {
    provisioning_state,
    operation_id: document
      .get_str("operation_id")
      .unwrap_or_default()
      .to_string(),
    parameters: document
      .get_str("parameters")
      .unwrap_or("{}")
      .to_string(),
    credentials: document
      .get_str("credentials")
      .unwrap_or("{}")
      .to_string(),
    resource_provider: document
      .get_str("resource_provider")
      .unwrap_or_default()
      .to_string(),
    resource_type: document
      .get_str("resource_type")
      .unwrap_or_default()
      .to_string(),
    status: document.get_str("status").unwrap_or_default().to_string(),
    error_response,
  })
}

fn parse_provisioning_state(
  raw: &str,
) -> Result<ProvisioningState, StoreError> {
  Ok(match raw {
    "Accepted" => ProvisioningState::Accepted,
    "Created" => ProvisioningState::Created,
    "Installing" => ProvisioningState::Installing,
    "Upgrading" => ProvisioningState::Upgrading,
    "Deleting" => ProvisioningState::Deleting,
    "Succeeded" => ProvisioningState::Succeeded,
    "Failed" => ProvisioningState::Failed,
    other => {
      return Err(StoreError::Corrupt(format!(
        "unrecognized provisioning_state '{other}'"
      )));
    }
  })
}

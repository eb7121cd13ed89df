//! Resolution of token claims to entity records

use crate::token::{Claims, EntityKey, TokenCodec, TokenError};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

pub mod memory;

/// `(primary key, identifying field)` of a resolved record
pub type EntityTuple = (Value, Value);

/// Errors that can occur while resolving entities
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EntityError {
    #[error("No '{table}' record with {field} = {value}")]
    NotFound {
        table: String,
        field: String,
        value: String,
    },
    #[error("No entity model registered for table '{0}'")]
    UnknownModel(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl EntityError {
    fn not_found(table: &str, field: &str, value: impl ToString) -> Self {
        Self::NotFound {
            table: table.to_string(),
            field: field.to_string(),
            value: value.to_string(),
        }
    }
}

/// A stored record as a set of named fields
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityRecord {
    fields: Map<String, Value>,
}

impl EntityRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Builds a record from a JSON object, `None` for any other value
    pub fn from_json(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

/// Storage-backed entity type the resolver can look records up in.
///
/// Lookups are read-only; implementations must be safe to call from many
/// requests at once.
#[async_trait::async_trait]
pub trait EntityModel: Send + Sync {
    /// Name the entity is referenced by in tokens and published under
    fn table_name(&self) -> &str;

    /// Primary key field (default: "id")
    fn primary_key(&self) -> &str {
        "id"
    }

    /// Second field of the published tuple, e.g. a user name or email
    fn identifying_field(&self) -> &str;

    async fn find_by_key(&self, key: &EntityKey) -> Result<Option<EntityRecord>, EntityError>;

    async fn find_by_field(
        &self,
        field: &str,
        value: &Value,
    ) -> Result<Option<EntityRecord>, EntityError>;

    fn to_tuple(&self, record: &EntityRecord) -> EntityTuple {
        let field = |name: &str| record.get(name).cloned().unwrap_or(Value::Null);
        (field(self.primary_key()), field(self.identifying_field()))
    }
}

/// Looks up the records referenced by token claims.
///
/// Models are kept in registration order; when several share a table name
/// the first one wins.
#[derive(Clone)]
pub struct EntityResolver {
    models: Vec<Arc<dyn EntityModel>>,
    codec: TokenCodec,
}

impl EntityResolver {
    pub fn new(models: Vec<Arc<dyn EntityModel>>, codec: TokenCodec) -> Self {
        Self { models, codec }
    }

    pub fn model(&self, table_name: &str) -> Option<&Arc<dyn EntityModel>> {
        self.models
            .iter()
            .find(|model| model.table_name() == table_name)
    }

    fn require_model(&self, table_name: &str) -> Result<&Arc<dyn EntityModel>, EntityError> {
        self.model(table_name)
            .ok_or_else(|| EntityError::UnknownModel(table_name.to_string()))
    }

    /// Resolves every entity claim with one point lookup each. The output
    /// follows the claim order; any missing record fails the whole call.
    pub async fn get_entities_from_claims(
        &self,
        claims: &Claims,
    ) -> Result<Vec<(String, EntityTuple)>, EntityError> {
        let mut resolved = Vec::with_capacity(claims.entities.len());

        for claim in &claims.entities {
            let model = self.require_model(&claim.table_name)?;
            let record = model.find_by_key(&claim.id).await?.ok_or_else(|| {
                EntityError::not_found(&claim.table_name, model.primary_key(), &claim.id)
            })?;
            debug!("Resolved '{}' entity {}", claim.table_name, claim.id);
            resolved.push((claim.table_name.clone(), model.to_tuple(&record)));
        }

        Ok(resolved)
    }

    /// Resolves a single record of `table_name` by an arbitrary field
    pub async fn find_by_field(
        &self,
        table_name: &str,
        field: &str,
        value: &Value,
    ) -> Result<EntityTuple, EntityError> {
        let model = self.require_model(table_name)?;
        let record = model
            .find_by_field(field, value)
            .await?
            .ok_or_else(|| EntityError::not_found(table_name, field, value))?;
        Ok(model.to_tuple(&record))
    }

    /// Verifies `token` and returns the claim named `field_name` without
    /// touching storage
    pub fn get_id_from_token(&self, token: &str, field_name: &str) -> Result<Value, TokenError> {
        self.codec
            .decode(token)?
            .get(field_name)
            .ok_or_else(|| TokenError::ClaimNotFound(field_name.to_string()))
    }
}

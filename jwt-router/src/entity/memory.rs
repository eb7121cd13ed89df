use super::{EntityError, EntityModel, EntityRecord};
use crate::token::EntityKey;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Entity model keeping its rows in memory
#[derive(Clone)]
pub struct InMemoryModel {
    table_name: String,
    primary_key: String,
    identifying_field: String,
    rows: Arc<RwLock<Vec<EntityRecord>>>,
}

impl InMemoryModel {
    pub fn new(table_name: impl Into<String>, identifying_field: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            primary_key: "id".to_string(),
            identifying_field: identifying_field.into(),
            rows: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Use `primary_key` instead of "id"
    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    /// Adds a row. The row must be a JSON object carrying the primary key.
    pub async fn insert(&self, row: Value) -> Result<(), EntityError> {
        let record = EntityRecord::from_json(row).ok_or_else(|| {
            EntityError::Storage(format!("'{}' rows must be JSON objects", self.table_name))
        })?;
        if record.get(&self.primary_key).is_none() {
            return Err(EntityError::Storage(format!(
                "'{}' row is missing primary key '{}'",
                self.table_name, self.primary_key
            )));
        }
        self.rows.write().await.push(record);
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait]
impl EntityModel for InMemoryModel {
    fn table_name(&self) -> &str {
        &self.table_name
    }

    fn primary_key(&self) -> &str {
        &self.primary_key
    }

    fn identifying_field(&self) -> &str {
        &self.identifying_field
    }

    async fn find_by_key(&self, key: &EntityKey) -> Result<Option<EntityRecord>, EntityError> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .find(|row| {
                row.get(&self.primary_key)
                    .is_some_and(|value| key.matches(value))
            })
            .cloned())
    }

    async fn find_by_field(
        &self,
        field: &str,
        value: &Value,
    ) -> Result<Option<EntityRecord>, EntityError> {
        let rows = self.rows.read().await;
        Ok(rows.iter().find(|row| row.get(field) == Some(value)).cloned())
    }
}

/// One table of a seed file
#[derive(Debug, Deserialize)]
struct SeedTable {
    table_name: String,
    #[serde(default = "default_primary_key")]
    primary_key: String,
    identifying_field: String,
    #[serde(default)]
    rows: Vec<Value>,
}

fn default_primary_key() -> String {
    "id".to_string()
}

/// Parses a seed document: a JSON array of
/// `{"table_name", "primary_key"?, "identifying_field", "rows"}` objects.
pub async fn load_seed(document: &str) -> Result<Vec<InMemoryModel>, EntityError> {
    let tables: Vec<SeedTable> = serde_json::from_str(document)
        .map_err(|e| EntityError::Storage(format!("invalid seed document: {e}")))?;

    let mut models = Vec::with_capacity(tables.len());
    for table in tables {
        let model = InMemoryModel::new(table.table_name, table.identifying_field)
            .with_primary_key(table.primary_key);
        for row in table.rows {
            model.insert(row).await?;
        }
        models.push(model);
    }
    Ok(models)
}

/// Reads and parses a seed file, see [`load_seed`]
pub async fn load_seed_file(path: impl AsRef<Path>) -> Result<Vec<InMemoryModel>, EntityError> {
    let path = path.as_ref();
    let document = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| EntityError::Storage(format!("failed to read {}: {e}", path.display())))?;
    load_seed(&document).await
}

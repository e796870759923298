//! Validated request objects executed against the engine facade.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ServerError;
use crate::validation::{
    validate_collection_name, validate_field_name, validate_index_name, validate_index_type,
};

// ── Schema types ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldKind {
    Vector { dimension: u32 },
    Scalar,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    pub kind: FieldKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub name: String,
    pub fields: Vec<FieldSchema>,
}

/// A validated index definition handed to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSpec {
    pub index_name: String,
    pub index_type: String,
    pub params: serde_json::Value,
}

// ── Engine facade ───────────────────────────────────────────────

/// The slice of the engine surface the request layer drives. Implemented by
/// the real engine; mocked in tests.
#[async_trait]
pub trait EngineFacade: Send + Sync {
    async fn describe_collection(&self, collection: &str) -> Result<CollectionSchema, ServerError>;

    async fn create_index(
        &self,
        collection: &str,
        field: &str,
        spec: IndexSpec,
    ) -> Result<(), ServerError>;
}

// ── CreateIndex ─────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct CreateIndexRequest {
    pub collection_name: String,
    pub field_name: String,
    pub index_name: String,
    pub index_type: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl CreateIndexRequest {
    pub fn new(
        collection_name: impl Into<String>,
        field_name: impl Into<String>,
        index_name: impl Into<String>,
        index_type: impl Into<String>,
        params: serde_json::Value,
    ) -> Self {
        Self {
            collection_name: collection_name.into(),
            field_name: field_name.into(),
            index_name: index_name.into(),
            index_type: index_type.into(),
            params,
        }
    }

    /// Validate arguments, resolve the target field against the collection
    /// schema, then ask the engine to build the index.
    pub async fn execute(&self, engine: &dyn EngineFacade) -> Result<(), ServerError> {
        let start = Instant::now();

        validate_collection_name(&self.collection_name)?;
        validate_field_name(&self.field_name)?;
        validate_index_name(&self.index_name)?;

        let schema = engine.describe_collection(&self.collection_name).await?;

        let field = schema
            .fields
            .iter()
            .find(|f| f.name == self.field_name)
            .ok_or_else(|| ServerError::FieldNotFound {
                collection: self.collection_name.clone(),
                field: self.field_name.clone(),
            })?;

        // Index type checks only apply to vector fields; scalar fields get
        // the engine's default structure regardless of the requested type.
        if let FieldKind::Vector { dimension } = field.kind {
            validate_index_type(&self.index_type)?;
            info!(
                collection = %self.collection_name,
                field = %self.field_name,
                index_type = %self.index_type,
                dimension,
                "creating vector index"
            );
        }

        let spec = IndexSpec {
            index_name: self.index_name.clone(),
            index_type: self.index_type.clone(),
            params: self.params.clone(),
        };
        engine
            .create_index(&self.collection_name, &self.field_name, spec)
            .await?;

        info!(
            collection = %self.collection_name,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "create index request finished"
        );
        Ok(())
    }
}

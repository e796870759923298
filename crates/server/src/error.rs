use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid collection name: {0}")]
    InvalidCollectionName(String),

    #[error("invalid field name: {0}")]
    InvalidFieldName(String),

    #[error("invalid index name: {0}")]
    InvalidIndexName(String),

    #[error("invalid index type: {0}")]
    InvalidIndexType(String),

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("field '{field}' not found in collection '{collection}'")]
    FieldNotFound { collection: String, field: String },

    #[error("engine error: {0}")]
    Engine(String),
}

//! Request-validation layer.
//!
//! Sits between the client API transport and the engine: validates request
//! arguments, resolves them against the collection schema, and translates
//! validated requests into engine calls. Transport is out of scope; requests
//! are plain structs executed against an [`EngineFacade`].

pub mod error;
pub mod requests;
pub mod validation;

pub use error::ServerError;
pub use requests::{
    CollectionSchema, CreateIndexRequest, EngineFacade, FieldKind, FieldSchema, IndexSpec,
};

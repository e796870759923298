//! Argument validators shared by the request layer.

use crate::error::ServerError;

const MAX_NAME_LENGTH: usize = 255;

/// Vector index types the engine knows how to build.
pub const VECTOR_INDEX_TYPES: &[&str] =
    &["FLAT", "IVF_FLAT", "IVF_SQ8", "IVF_PQ", "HNSW", "ANNOY"];

/// Names must start with a letter or underscore and contain only letters,
/// digits and underscores.
fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name is empty".to_string());
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(format!("name exceeds {} characters", MAX_NAME_LENGTH));
    }
    let mut chars = name.chars();
    let first = chars.next().expect("non-empty checked");
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(format!("name must start with a letter or underscore: '{}'", name));
    }
    if let Some(bad) = name.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
        return Err(format!("invalid character '{}' in name '{}'", bad, name));
    }
    Ok(())
}

pub fn validate_collection_name(name: &str) -> Result<(), ServerError> {
    validate_name(name).map_err(ServerError::InvalidCollectionName)
}

pub fn validate_field_name(name: &str) -> Result<(), ServerError> {
    validate_name(name).map_err(ServerError::InvalidFieldName)
}

pub fn validate_index_name(name: &str) -> Result<(), ServerError> {
    validate_name(name).map_err(ServerError::InvalidIndexName)
}

pub fn validate_index_type(index_type: &str) -> Result<(), ServerError> {
    if VECTOR_INDEX_TYPES.contains(&index_type) {
        Ok(())
    } else {
        Err(ServerError::InvalidIndexType(index_type.to_string()))
    }
}

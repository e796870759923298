use thiserror::Error;

#[derive(Error, Debug)]
pub enum QuiverError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Config key not registered: {0}")]
    ConfigKeyMissing(String),

    #[error("Config value for '{key}' is not a {expected}")]
    ConfigTypeMismatch { key: String, expected: &'static str },

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("{0}")]
    Other(String),
}

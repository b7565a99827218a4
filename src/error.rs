use thiserror::Error;

use crate::task::TaskId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Schema parse error: {0}")]
    SchemaParse(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unsupported argument type for '{key}': {kind}")]
    UnsupportedType { key: String, kind: &'static str },

    #[error("Compile error: {0}")]
    Compile(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Task not found: {0}")]
    NotFound(TaskId),

    #[error("Task already exists: {0}")]
    TaskExists(TaskId),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl Error {
    /// Errors raised while turning templates into query text.
    ///
    /// Any of these aborts operation-set generation for the whole schema.
    pub fn is_compile_time(&self) -> bool {
        matches!(
            self,
            Error::Validation(_) | Error::UnsupportedType { .. } | Error::Compile(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

use miette::Diagnostic;
use thiserror::Error;

use crate::catalog::CatalogError;

#[derive(Debug, Error, Diagnostic)]
pub enum LodestarError {
    #[error("I/O error: {0}")]
    #[diagnostic(code(lodestar::io))]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    #[diagnostic(code(lodestar::config))]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(lodestar::serde))]
    Serde(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    #[diagnostic(code(lodestar::db))]
    Db(#[from] sea_orm::DbErr),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    #[diagnostic(code(lodestar::other))]
    Other(String),
}

/// Failures raised by a `ConsentStore` implementation.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("Database error: {0}")]
    #[diagnostic(code(lodestar::store::db))]
    Db(#[from] sea_orm::DbErr),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(lodestar::store::serde))]
    Serde(#[from] serde_json::Error),

    #[error("Consent {id} was modified concurrently (expected version {version})")]
    #[diagnostic(code(lodestar::store::conflict))]
    Conflict { id: String, version: u64 },

    #[error("Stored consent is corrupt: {0}")]
    #[diagnostic(code(lodestar::store::corrupt))]
    Corrupt(String),
}

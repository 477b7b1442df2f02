//! Error types for the apitest collaborators

use thiserror::Error;

/// Result type alias using the collaborator Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the API and database collaborators
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    #[error("Invalid row for {table}: {reason}")]
    InvalidRow { table: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

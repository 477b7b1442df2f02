//! apitest common library
//!
//! Shared request/table types and the two collaborators the orchestrator
//! drives: the API under test and the database behind it.

pub mod client;
pub mod db;
pub mod error;
pub mod http;
pub mod types;

pub use client::{ApiClient, DbClient};
pub use db::SqliteDb;
pub use error::{Error, Result};
pub use http::{HttpApi, HttpConfig};
pub use types::*;

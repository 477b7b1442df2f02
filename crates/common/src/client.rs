//! Collaborator interfaces consumed by the orchestrator

use async_trait::async_trait;
use serde_json::Value;

use crate::types::{ApiResponse, Request, Row, TableRef};
use crate::Result;

/// Executes one request against the API under test
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Transport or protocol failures are errors; any HTTP status is a response.
    async fn execute(&self, request: &Request) -> Result<ApiResponse>;
}

/// Table-level access to the database behind the API
#[async_trait]
pub trait DbClient: Send + Sync {
    /// Truncate every target and reset its identity/sequence counter
    async fn reset(&self, targets: &[TableRef]) -> Result<()>;

    /// Insert rows in order
    async fn bulk_insert(&self, target: &TableRef, rows: &[Row]) -> Result<()>;

    /// Full table contents as a JSON array of row objects
    async fn fetch_all(&self, target: &TableRef) -> Result<Value>;
}

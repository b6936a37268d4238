//! Table catalog seam.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;

use crate::errors::CatalogError;
use crate::model::{TableId, TableName};

/// Read-only view of the table metadata service. The master supplies an
/// implementation backed by its metadata store; tests supply fakes.
#[async_trait]
pub trait TableCatalog: Send + Sync {
    /// All known tables, name to id.
    async fn table_id_map(&self) -> Result<BTreeMap<TableName, TableId>, CatalogError>;

    /// Custom properties of one table whose keys start with `prefix`.
    /// Returned keys are the full property keys.
    async fn properties_with_prefix(
        &self,
        table: &TableName,
        prefix: &str,
    ) -> Result<HashMap<String, String>, CatalogError>;
}

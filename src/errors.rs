//! Errors.

use crate::model::TableName;

/// Errors surfaced while constructing the balancer. After a successful
/// init nothing in the balancing paths is fatal; failures there are logged
/// and the control loop self-heals on the next tick.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("bad balancer configuration: {0}")]
    BadConfig(String),
    #[error("invalid host regex for table {table:?}")]
    BadHostRegex {
        table: TableName,
        #[source]
        source: regex::Error,
    },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Failures of the table catalog the master hands us.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("table catalog unavailable: {0}")]
    Unavailable(String),
    #[error("table {0:?} is not in the catalog")]
    UnknownTable(TableName),
}

/// Transport-level failures talking to a single tablet server.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("transport error talking to {server}: {message}")]
    Transport { server: String, message: String },
    #[error("request to {server} timed out")]
    Timeout { server: String },
}

/// Host name resolution failures. Callers treat these as "no regex
/// matches" and fall back to the default pool.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("failed to initialize system resolver: {0}")]
    Init(String),
    #[error("failed to resolve {host:?}: {message}")]
    Lookup { host: String, message: String },
    #[error("no address records for {0:?}")]
    NoRecords(String),
}

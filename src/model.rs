//! Core data model shared across the balancer.

use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};

/// User-facing table name. Pool names reuse this type: a pool is named
/// after the table whose regex defines it, or by the default sentinel.
pub type TableName = String;
pub type PoolName = String;

/// Live servers as handed to us by the master each tick, ordered by
/// [`ServerId`]'s comparator. Pool views are sub-maps of this and keep the
/// same ordering.
pub type ServerMap = BTreeMap<ServerId, ServerStatus>;

/// Derived pool membership: pool name to the ordered servers inside it.
pub type PoolMap = HashMap<PoolName, ServerMap>;

/// Stable table identifier, distinct from the user-facing name.
#[derive(Hash, Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TableId(String);

impl TableId {
    pub fn new(id: impl Into<String>) -> TableId {
        TableId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TableId {
    fn from(id: &str) -> TableId {
        TableId(id.to_string())
    }
}

impl Display for TableId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logical identity of a tablet server. Ordered by host, then port; pool
/// views inherit this ordering, and the out-of-bounds scanner's choice of
/// destination ("first server of the pool") is deterministic under it.
#[derive(Hash, Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ServerId {
    host: String,
    port: u16,
}

impl ServerId {
    pub fn new(host: impl Into<String>, port: u16) -> ServerId {
        ServerId {
            host: host.into(),
            port,
        }
    }

    /// Host name or IP literal, as registered by the server.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl Display for ServerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Load snapshot of one live server. The balancer core never interprets
/// these fields; they ride along for the inner per-table balancers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStatus {
    pub online_tablets: usize,
    pub last_contact_ms: u64,
}

/// Identity of one tablet: a table plus a key range `(prev_end_row,
/// end_row]`. `None` means unbounded on that side.
#[derive(Hash, Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TabletExtent {
    table: TableId,
    end_row: Option<Vec<u8>>,
    prev_end_row: Option<Vec<u8>>,
}

impl TabletExtent {
    pub fn new(
        table: TableId,
        end_row: Option<Vec<u8>>,
        prev_end_row: Option<Vec<u8>>,
    ) -> TabletExtent {
        TabletExtent {
            table,
            end_row,
            prev_end_row,
        }
    }

    /// The whole-table extent (unbounded on both sides).
    pub fn whole_table(table: TableId) -> TabletExtent {
        TabletExtent::new(table, None, None)
    }

    pub fn table(&self) -> &TableId {
        &self.table
    }

    pub fn end_row(&self) -> Option<&[u8]> {
        self.end_row.as_deref()
    }

    pub fn prev_end_row(&self) -> Option<&[u8]> {
        self.prev_end_row.as_deref()
    }
}

impl Display for TabletExtent {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        fn row(r: Option<&[u8]>) -> String {
            match r {
                Some(r) => String::from_utf8_lossy(r).into_owned(),
                None => String::new(),
            }
        }
        write!(
            f,
            "{}:{}..{}",
            self.table,
            row(self.prev_end_row()),
            row(self.end_row())
        )
    }
}

/// Per-tablet status reported by one server during the out-of-bounds scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabletStat {
    pub extent: TabletExtent,
    pub num_entries: u64,
    pub size_bytes: u64,
}

impl TabletStat {
    pub fn new(extent: TabletExtent) -> TabletStat {
        TabletStat {
            extent,
            num_entries: 0,
            size_bytes: 0,
        }
    }
}

/// A proposed tablet move. The balancer only proposes; an external
/// orchestrator executes.
#[derive(Hash, Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub extent: TabletExtent,
    pub from: ServerId,
    pub to: ServerId,
}

impl Display for Migration {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{} -> {}]", self.extent, self.from, self.to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_ordering_is_host_then_port() {
        let mut servers: ServerMap = BTreeMap::new();
        servers.insert(ServerId::new("host2.x", 9997), ServerStatus::default());
        servers.insert(ServerId::new("host1.x", 9998), ServerStatus::default());
        servers.insert(ServerId::new("host1.x", 9997), ServerStatus::default());

        let order: Vec<String> = servers.keys().map(|s| s.to_string()).collect();
        assert_eq!(order, vec!["host1.x:9997", "host1.x:9998", "host2.x:9997"]);
    }

    #[test]
    fn test_extent_display() {
        let extent = TabletExtent::new(
            TableId::new("2a"),
            Some(b"m".to_vec()),
            Some(b"g".to_vec()),
        );
        assert_eq!(extent.to_string(), "2a:g..m");
        assert_eq!(
            TabletExtent::whole_table(TableId::new("2a")).to_string(),
            "2a:.."
        );
    }
}

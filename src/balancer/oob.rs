//! Out-of-bounds scan: finding tablets hosted outside their table's pool.

use std::collections::HashSet;
use std::sync::atomic::Ordering;

use tracing::{error, info, warn};

use super::{HostRegexBalancer, TableSnapshot};
use crate::model::{Migration, PoolMap, ServerMap, TabletExtent};

impl HostRegexBalancer {
    /// Sweeps every live server for online tablets of every regex-pooled
    /// table the server does not belong to, and proposes moving each such
    /// tablet to the first server of its table's pool. The inner balancer
    /// spreads load within the pool on later ticks.
    ///
    /// A failed tablet query skips the rest of that server's sweep only,
    /// and the scan timestamp advances even when parts of the sweep
    /// failed, keeping the scan rate bounded under RPC storms.
    pub(crate) async fn scan_out_of_bounds(
        &self,
        current: &ServerMap,
        pools: &PoolMap,
        tables: &TableSnapshot,
        in_flight: &HashSet<TabletExtent>,
    ) -> Vec<Migration> {
        let mut proposals = Vec::new();

        'servers: for server in current.keys() {
            for table in self.grouper.regex_tables() {
                let in_pool = pools
                    .get(table.as_str())
                    .is_some_and(|pool| pool.contains_key(server));
                if in_pool {
                    // The server legitimately hosts this table's tablets.
                    continue;
                }

                let Some(table_id) = tables.id_for(table) else {
                    warn!(
                        "table '{}' has a host regex but is not in the catalog, skipping its out-of-bounds check",
                        table
                    );
                    continue;
                };

                let stats = match self.rpc.online_tablets_for_table(server, table_id).await {
                    Ok(stats) => stats,
                    Err(err) => {
                        error!("failed to list online tablets on {}: {}", server, err);
                        continue 'servers;
                    }
                };
                if stats.is_empty() {
                    continue;
                }

                let Some(target) = pools.get(table.as_str()).and_then(|pool| pool.keys().next())
                else {
                    warn!(
                        "pool for table '{}' has no live servers, cannot relocate its tablets off {}",
                        table, server
                    );
                    continue;
                };

                for stat in stats {
                    if in_flight.contains(&stat.extent) {
                        continue;
                    }
                    info!(
                        "tablet {} is out of bounds on {}, proposing move to {}",
                        stat.extent, server, target
                    );
                    proposals.push(Migration {
                        extent: stat.extent,
                        from: server.clone(),
                        to: target.clone(),
                    });
                }
            }
        }

        self.last_oob.store(self.clock.raw(), Ordering::Release);
        proposals
    }
}

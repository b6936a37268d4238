//! The host-regex tablet load balancer.
//!
//! At each master tick the balancer derives server pools from the live
//! fleet, relocates tablets found outside their table's pool, and hands
//! each table's balancing to an inner per-table balancer that only ever
//! sees the table's restricted pool view.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use quanta::Clock;
use tracing::{debug, error, info, warn};

use crate::catalog::TableCatalog;
use crate::config::{HostRegexConfig, HOST_REGEX_PREFIX};
use crate::errors::{CatalogError, Error};
use crate::model::{Migration, ServerId, ServerMap, TableId, TableName, TabletExtent};
use crate::pool::{PoolGrouper, DEFAULT_POOL};
use crate::resolver::HostResolver;
use crate::rpc::TabletRpc;

mod oob;

/// Lower bound on the delay hint returned by [`HostRegexBalancer::balance`],
/// in milliseconds.
pub const MIN_BALANCE_TIME_MS: u64 = 5_000;

/// What one inner balancing pass produced.
#[derive(Debug, Default)]
pub struct BalanceOutcome {
    /// How long the caller should wait before the next balancing tick.
    pub delay_ms: u64,
    /// Proposed tablet moves.
    pub migrations: Vec<Migration>,
}

/// The per-table balancer the core delegates to. Implementations receive
/// only the restricted pool view of the cluster and must not assume they
/// see the complete fleet.
#[async_trait]
pub trait TableBalancer: Send + Sync {
    /// Chooses a server for each unassigned tablet of one table, merging
    /// decisions into `assignments`. `unassigned` maps each tablet to its
    /// last known server, if any.
    async fn get_assignments(
        &self,
        view: &ServerMap,
        unassigned: &HashMap<TabletExtent, Option<ServerId>>,
        assignments: &mut HashMap<TabletExtent, ServerId>,
    );

    /// Proposes migrations for one table across `view`.
    async fn balance(&self, view: &ServerMap, in_flight: &HashSet<TabletExtent>)
        -> BalanceOutcome;
}

/// Lookup of the inner balancer responsible for a table.
pub trait BalancerRegistry: Send + Sync {
    fn balancer_for(&self, table: &TableId) -> Arc<dyn TableBalancer>;
}

/// Name/id mapping of the catalogued tables, refreshed each tick.
pub(crate) struct TableSnapshot {
    by_name: BTreeMap<TableName, TableId>,
    by_id: HashMap<TableId, TableName>,
}

impl TableSnapshot {
    fn new(by_name: BTreeMap<TableName, TableId>) -> TableSnapshot {
        let by_id = by_name
            .iter()
            .map(|(name, id)| (id.clone(), name.clone()))
            .collect();
        TableSnapshot { by_name, by_id }
    }

    pub(crate) fn id_for(&self, name: &str) -> Option<&TableId> {
        self.by_name.get(name)
    }

    fn name_for(&self, id: &TableId) -> Option<&TableName> {
        self.by_id.get(id)
    }

    fn iter(&self) -> impl Iterator<Item = (&TableName, &TableId)> {
        self.by_name.iter()
    }
}

/// The balancer core. Constructing it is the `init` of the control-loop
/// contract: configuration and the initial catalog snapshot are loaded
/// here, and a catalog failure at this point is fatal. Both entry points
/// may afterwards be invoked concurrently by the master.
pub struct HostRegexBalancer {
    catalog: Arc<dyn TableCatalog>,
    rpc: Arc<dyn TabletRpc>,
    registry: Arc<dyn BalancerRegistry>,
    grouper: PoolGrouper,
    tables: ArcSwap<TableSnapshot>,
    oob_period: std::time::Duration,
    last_oob: AtomicU64,
    clock: Clock,
}

impl HostRegexBalancer {
    pub async fn init(
        config: &HostRegexConfig,
        catalog: Arc<dyn TableCatalog>,
        rpc: Arc<dyn TabletRpc>,
        resolver: Arc<dyn HostResolver>,
        registry: Arc<dyn BalancerRegistry>,
    ) -> Result<HostRegexBalancer, Error> {
        Self::init_with_clock(config, catalog, rpc, resolver, registry, Clock::new()).await
    }

    /// Like [`init`](Self::init) with an injected clock, so tests can
    /// advance the OOB and pool-recheck periods without sleeping.
    pub async fn init_with_clock(
        config: &HostRegexConfig,
        catalog: Arc<dyn TableCatalog>,
        rpc: Arc<dyn TabletRpc>,
        resolver: Arc<dyn HostResolver>,
        registry: Arc<dyn BalancerRegistry>,
        clock: Clock,
    ) -> Result<HostRegexBalancer, Error> {
        let table_ids = catalog.table_id_map().await?;

        // Site-wide regexes first, then each table's own custom property
        // may override the regex for that table.
        let mut regexes = config.table_regexes.clone();
        for table in table_ids.keys() {
            let props = catalog
                .properties_with_prefix(table, HOST_REGEX_PREFIX)
                .await?;
            if let Some(pattern) = props.get(&format!("{HOST_REGEX_PREFIX}{table}")) {
                regexes.insert(table.clone(), pattern.clone());
            }
        }

        let grouper = PoolGrouper::new(
            &regexes,
            config.ip_based,
            config.pool_recheck_period.as_std(),
            resolver,
            clock.clone(),
        )?;

        info!(
            "host regex balancer initialized: {} pool regexes, oob period {}, pool recheck {}",
            regexes.len(),
            config.oob_period,
            config.pool_recheck_period
        );

        Ok(HostRegexBalancer {
            catalog,
            rpc,
            registry,
            grouper,
            tables: ArcSwap::from_pointee(TableSnapshot::new(table_ids)),
            oob_period: config.oob_period.as_std(),
            last_oob: AtomicU64::new(clock.raw()),
            clock,
        })
    }

    /// Chooses a server for each unassigned tablet. Tablets of a table
    /// whose pool has no live servers fall back to the default pool; if
    /// that is empty too they stay unassigned until the next tick.
    pub async fn get_assignments(
        &self,
        current: &ServerMap,
        unassigned: &HashMap<TabletExtent, Option<ServerId>>,
        assignments: &mut HashMap<TabletExtent, ServerId>,
    ) {
        let tables = match self.refresh_tables().await {
            Ok(tables) => tables,
            Err(err) => {
                // Keep assigning with the last known catalog snapshot; a
                // transient catalog outage must not wedge assignment.
                error!("table catalog unavailable, using last known table map: {}", err);
                self.tables.load_full()
            }
        };
        let pools = self.grouper.group(current).await;

        let mut by_table: HashMap<TableId, HashMap<TabletExtent, Option<ServerId>>> =
            HashMap::new();
        for (extent, last_server) in unassigned {
            by_table
                .entry(extent.table().clone())
                .or_default()
                .insert(extent.clone(), last_server.clone());
        }

        for (table_id, grouped) in by_table {
            let Some(name) = tables.name_for(&table_id) else {
                warn!(
                    "{} unassigned tablets reference unknown table {}, skipping",
                    grouped.len(),
                    table_id
                );
                continue;
            };

            let pool_name = self.grouper.pool_name_for_table(name);
            let view = match pools.get(pool_name) {
                Some(view) if !view.is_empty() => view,
                _ => {
                    warn!(
                        "pool '{}' for table '{}' has no live servers, falling back to the default pool",
                        pool_name, name
                    );
                    match pools.get(DEFAULT_POOL) {
                        Some(view) if !view.is_empty() => view,
                        _ => {
                            error!(
                                "default pool has no live servers, {} tablets of table '{}' stay unassigned",
                                grouped.len(),
                                name
                            );
                            continue;
                        }
                    }
                }
            };

            self.registry
                .balancer_for(&table_id)
                .get_assignments(view, &grouped, assignments)
                .await;
        }
    }

    /// One balancing pass: run the out-of-bounds scan when its period has
    /// elapsed, then delegate per-table balancing unless migrations are
    /// still in flight. Returns a delay hint in milliseconds, never below
    /// [`MIN_BALANCE_TIME_MS`].
    pub async fn balance(
        &self,
        current: &ServerMap,
        in_flight: &HashSet<TabletExtent>,
        migrations_out: &mut Vec<Migration>,
    ) -> u64 {
        let tables = match self.refresh_tables().await {
            Ok(tables) => tables,
            Err(err) => {
                error!("cannot balance, table catalog unavailable: {}", err);
                return MIN_BALANCE_TIME_MS;
            }
        };
        let pools = self.grouper.group(current).await;

        let last = self.last_oob.load(Ordering::Acquire);
        if self.clock.delta(last, self.clock.raw()) >= self.oob_period {
            let proposals = self
                .scan_out_of_bounds(current, &pools, &tables, in_flight)
                .await;
            migrations_out.extend(proposals);
        }

        if !in_flight.is_empty() {
            debug!(
                "{} migrations already in flight, deferring per-table balancing",
                in_flight.len()
            );
            return MIN_BALANCE_TIME_MS;
        }

        let mut min_delay: Option<u64> = None;
        for (name, table_id) in tables.iter() {
            let pool_name = self.grouper.pool_name_for_table(name);
            let Some(view) = pools.get(pool_name) else {
                warn!(
                    "table '{}' maps to pool '{}' which has no live servers, skipping balance",
                    name, pool_name
                );
                continue;
            };

            let outcome = self
                .registry
                .balancer_for(table_id)
                .balance(view, in_flight)
                .await;
            if !outcome.migrations.is_empty() {
                debug!(
                    "table '{}': {} migrations proposed within pool '{}'",
                    name,
                    outcome.migrations.len(),
                    pool_name
                );
            }
            migrations_out.extend(outcome.migrations);
            min_delay = Some(match min_delay {
                Some(delay) => delay.min(outcome.delay_ms),
                None => outcome.delay_ms,
            });
        }

        min_delay.unwrap_or(MIN_BALANCE_TIME_MS).max(MIN_BALANCE_TIME_MS)
    }

    /// Re-reads the table catalog and swaps in the fresh snapshot.
    async fn refresh_tables(&self) -> Result<Arc<TableSnapshot>, CatalogError> {
        let table_ids = self.catalog.table_id_map().await?;
        let snapshot = Arc::new(TableSnapshot::new(table_ids));
        self.tables.store(Arc::clone(&snapshot));
        Ok(snapshot)
    }
}

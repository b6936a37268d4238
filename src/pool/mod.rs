//! Server pool derivation.
//!
//! Operators partition the tablet-server fleet into named pools by applying
//! regular expressions to server host names (or raw IPs in IP mode). A pool
//! is named after the table whose regex defines it; servers matching no
//! regex land in the reserved default pool. The derived grouping is cached
//! and rebuilt at most once per recheck period.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use quanta::Clock;
use regex::Regex;
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::errors::Error;
use crate::model::{PoolMap, PoolName, ServerMap, TableName};
use crate::resolver::HostResolver;

/// Name of the pool holding every server no regex claims. Reserved: a user
/// table must not carry this name.
pub const DEFAULT_POOL: &str = "HostTableLoadBalancer.ALL";

/// Derives and caches the pool membership of the live fleet.
///
/// The cache is time-based only: within the recheck period `group` returns
/// the previous grouping unchanged even if the live server set differs.
/// Rebuilds are serialized; readers see either the old or the new grouping
/// atomically.
pub struct PoolGrouper {
    patterns: BTreeMap<TableName, Regex>,
    ip_based: bool,
    recheck_period: std::time::Duration,
    resolver: Arc<dyn HostResolver>,
    cached: ArcSwapOption<PoolMap>,
    last_recheck: AtomicU64,
    rebuild: Mutex<()>,
    clock: Clock,
}

impl std::fmt::Debug for PoolGrouper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolGrouper")
            .field("patterns", &self.patterns)
            .field("ip_based", &self.ip_based)
            .field("recheck_period", &self.recheck_period)
            .field("last_recheck", &self.last_recheck)
            .finish()
    }
}

impl PoolGrouper {
    /// Compiles the configured regexes. A pattern must cover the whole
    /// resolved host string, so patterns are anchored on compilation.
    pub fn new(
        regexes: &BTreeMap<TableName, String>,
        ip_based: bool,
        recheck_period: std::time::Duration,
        resolver: Arc<dyn HostResolver>,
        clock: Clock,
    ) -> Result<PoolGrouper, Error> {
        let mut patterns = BTreeMap::new();
        for (table, pattern) in regexes {
            if table == DEFAULT_POOL {
                return Err(Error::BadConfig(format!(
                    "{DEFAULT_POOL:?} is the reserved default pool name and cannot name a table regex"
                )));
            }
            let compiled =
                Regex::new(&format!("^(?:{pattern})$")).map_err(|source| Error::BadHostRegex {
                    table: table.clone(),
                    source,
                })?;
            patterns.insert(table.clone(), compiled);
        }
        Ok(PoolGrouper {
            patterns,
            ip_based,
            recheck_period,
            resolver,
            cached: ArcSwapOption::empty(),
            last_recheck: AtomicU64::new(0),
            rebuild: Mutex::new(()),
            clock,
        })
    }

    /// The pool a table's tablets belong on: the table's own name if a
    /// regex is configured for it, the default pool otherwise.
    pub fn pool_name_for_table<'a>(&'a self, table: &'a str) -> &'a str {
        if self.patterns.contains_key(table) {
            table
        } else {
            DEFAULT_POOL
        }
    }

    /// Tables with a configured regex, in name order.
    pub fn regex_tables(&self) -> impl Iterator<Item = &TableName> {
        self.patterns.keys()
    }

    /// Groups the live servers into pools, reusing the cached grouping
    /// while the recheck period has not elapsed.
    pub async fn group(&self, current: &ServerMap) -> Arc<PoolMap> {
        if let Some(pools) = self.fresh() {
            return pools;
        }

        let _guard = self.rebuild.lock().await;
        // A concurrent caller may have rebuilt while we waited on the lock.
        if let Some(pools) = self.fresh() {
            return pools;
        }

        debug!("re-deriving server pools for {} live servers", current.len());
        let mut pools = PoolMap::new();
        for (server, status) in current {
            for name in self.pool_names_for_host(server.host()).await {
                pools
                    .entry(name)
                    .or_default()
                    .insert(server.clone(), status.clone());
            }
        }

        let pools = Arc::new(pools);
        self.cached.store(Some(Arc::clone(&pools)));
        self.last_recheck.store(self.clock.raw(), Ordering::Release);
        pools
    }

    fn fresh(&self) -> Option<Arc<PoolMap>> {
        let pools = self.cached.load_full()?;
        let last = self.last_recheck.load(Ordering::Acquire);
        if self.clock.delta(last, self.clock.raw()) < self.recheck_period {
            Some(pools)
        } else {
            None
        }
    }

    /// Every pool whose regex matches the server's resolved host; the
    /// default pool alone when none match or resolution fails. In IP mode
    /// the raw host string is matched and the resolver is never consulted.
    async fn pool_names_for_host(&self, host: &str) -> Vec<PoolName> {
        let matchable: Cow<'_, str> = if self.ip_based {
            Cow::Borrowed(host)
        } else {
            match self.resolver.resolve(host).await {
                Ok(name) => Cow::Owned(name),
                Err(err) => {
                    error!(
                        "failed to resolve host '{}', assigning it to the default pool: {}",
                        host, err
                    );
                    return vec![DEFAULT_POOL.to_string()];
                }
            }
        };

        let mut names: Vec<PoolName> = self
            .patterns
            .iter()
            .filter(|(_, pattern)| pattern.is_match(&matchable))
            .map(|(table, _)| table.clone())
            .collect();
        if names.is_empty() {
            names.push(DEFAULT_POOL.to_string());
        }
        names
    }
}

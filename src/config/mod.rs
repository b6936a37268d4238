//! Balancer configuration.
//!
//! All recognized options live under a common property prefix so the master
//! can pass its flat property map straight through; the same struct also
//! deserializes from the master's config file via serde.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::Error;
use crate::model::TableName;

mod duration;

#[cfg(test)]
mod tests;

pub use duration::Duration;

/// Common prefix of every property the balancer understands.
/// `balancer.host.regex.<tableName>` defines the pool regex for a table;
/// the reserved suffixes below configure the balancer itself.
pub const HOST_REGEX_PREFIX: &str = "balancer.host.regex.";

/// Interval between out-of-bounds scans.
pub const OOB_PERIOD_KEY: &str = "balancer.host.regex.oob.period";

/// Interval between pool membership re-derivations.
pub const POOL_RECHECK_KEY: &str = "balancer.host.regex.pool.check";

/// If true, regexes are matched against the raw host string without name
/// resolution.
pub const IP_BASED_KEY: &str = "balancer.host.regex.is.ip";

/// Operator-set balancer options, read once at init.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HostRegexConfig {
    /// Pool-defining regexes, keyed by table name. A table with no entry
    /// here (and no per-table property override) lives in the default pool.
    #[serde(default)]
    pub table_regexes: BTreeMap<TableName, String>,

    #[serde(default = "HostRegexConfig::default_oob_period")]
    pub oob_period: Duration,

    #[serde(default = "HostRegexConfig::default_pool_recheck_period")]
    pub pool_recheck_period: Duration,

    #[serde(default)]
    pub ip_based: bool,
}

impl HostRegexConfig {
    pub fn default_oob_period() -> Duration {
        Duration::from_mins(5)
    }

    pub fn default_pool_recheck_period() -> Duration {
        Duration::from_mins(1)
    }

    /// Builds the configuration from a flat property map. Keys outside
    /// [`HOST_REGEX_PREFIX`] are ignored; malformed values under it are
    /// configuration errors and fatal.
    pub fn from_properties<'a, I>(properties: I) -> Result<Self, Error>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut config = HostRegexConfig::default();

        for (key, value) in properties {
            let Some(suffix) = key.strip_prefix(HOST_REGEX_PREFIX) else {
                continue;
            };
            match key {
                OOB_PERIOD_KEY => {
                    config.oob_period = value
                        .parse()
                        .map_err(|err| Error::BadConfig(format!("{OOB_PERIOD_KEY}: {err}")))?;
                }
                POOL_RECHECK_KEY => {
                    config.pool_recheck_period = value
                        .parse()
                        .map_err(|err| Error::BadConfig(format!("{POOL_RECHECK_KEY}: {err}")))?;
                }
                IP_BASED_KEY => {
                    config.ip_based = value.parse().map_err(|_| {
                        Error::BadConfig(format!(
                            "{IP_BASED_KEY}: expected 'true' or 'false', got {value:?}"
                        ))
                    })?;
                }
                _ if suffix.is_empty() => continue,
                _ => {
                    config
                        .table_regexes
                        .insert(suffix.to_string(), value.to_string());
                }
            }
        }

        Ok(config)
    }
}

impl Default for HostRegexConfig {
    fn default() -> HostRegexConfig {
        HostRegexConfig {
            table_regexes: BTreeMap::new(),
            oob_period: Self::default_oob_period(),
            pool_recheck_period: Self::default_pool_recheck_period(),
            ip_based: false,
        }
    }
}

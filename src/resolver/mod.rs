//! Host name resolution.
//!
//! Pool regexes match against a server's canonical DNS name unless the
//! balancer runs in IP mode. Resolution sits behind a trait so the pool
//! grouper can be driven by fakes in tests, and so embedders can swap in
//! their own resolver.

use std::net::IpAddr;

use async_trait::async_trait;
use dashmap::DashMap;
use hickory_resolver::TokioAsyncResolver;
use quanta::Clock;

use crate::errors::ResolveError;

/// Maps a server's registered host string to the string pool regexes are
/// matched against.
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str) -> Result<String, ResolveError>;
}

/// Production resolver backed by the system DNS configuration. A host name
/// is forward-resolved to an address and the address reverse-resolved to
/// its canonical name; an IP literal goes straight to reverse lookup.
pub struct SystemResolver {
    inner: TokioAsyncResolver,
}

impl SystemResolver {
    pub fn from_system_conf() -> Result<SystemResolver, ResolveError> {
        let inner = TokioAsyncResolver::tokio_from_system_conf()
            .map_err(|err| ResolveError::Init(err.to_string()))?;
        Ok(SystemResolver { inner })
    }
}

#[async_trait]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str) -> Result<String, ResolveError> {
        let ip: IpAddr = match host.parse() {
            Ok(ip) => ip,
            Err(_) => self
                .inner
                .lookup_ip(host)
                .await
                .map_err(|err| ResolveError::Lookup {
                    host: host.to_string(),
                    message: err.to_string(),
                })?
                .iter()
                .next()
                .ok_or_else(|| ResolveError::NoRecords(host.to_string()))?,
        };

        let ptr = self
            .inner
            .reverse_lookup(ip)
            .await
            .map_err(|err| ResolveError::Lookup {
                host: host.to_string(),
                message: err.to_string(),
            })?;

        let name = ptr
            .iter()
            .next()
            .ok_or_else(|| ResolveError::NoRecords(host.to_string()))?;

        Ok(name.to_utf8().trim_end_matches('.').to_string())
    }
}

/// TTL cache in front of another resolver. Successful lookups are reused
/// for `ttl`; failures are not cached, so a server moving to a new address
/// is picked up no later than one TTL after the move.
pub struct CachingResolver<R> {
    inner: R,
    ttl: std::time::Duration,
    clock: Clock,
    cache: DashMap<String, (String, u64)>,
}

impl<R: HostResolver> CachingResolver<R> {
    pub fn new(inner: R, ttl: std::time::Duration) -> CachingResolver<R> {
        Self::with_clock(inner, ttl, Clock::new())
    }

    pub fn with_clock(inner: R, ttl: std::time::Duration, clock: Clock) -> CachingResolver<R> {
        CachingResolver {
            inner,
            ttl,
            clock,
            cache: DashMap::new(),
        }
    }

    fn cached(&self, host: &str) -> Option<String> {
        let entry = self.cache.get(host)?;
        let (name, resolved_at) = entry.value();
        if self.clock.delta(*resolved_at, self.clock.raw()) < self.ttl {
            Some(name.clone())
        } else {
            None
        }
    }
}

#[async_trait]
impl<R: HostResolver> HostResolver for CachingResolver<R> {
    async fn resolve(&self, host: &str) -> Result<String, ResolveError> {
        if let Some(name) = self.cached(host) {
            return Ok(name);
        }
        let name = self.inner.resolve(host).await?;
        self.cache
            .insert(host.to_string(), (name.clone(), self.clock.raw()));
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    struct CountingResolver {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingResolver {
        fn new(fail: bool) -> CountingResolver {
            CountingResolver {
                calls: AtomicUsize::new(0),
                fail,
            }
        }
    }

    #[async_trait]
    impl HostResolver for &CountingResolver {
        async fn resolve(&self, host: &str) -> Result<String, ResolveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ResolveError::NoRecords(host.to_string()));
            }
            Ok(format!("{host}.example.com"))
        }
    }

    #[tokio::test]
    async fn test_cache_hit_within_ttl() {
        let (clock, _mock) = Clock::mock();
        let inner = CountingResolver::new(false);
        let caching = CachingResolver::with_clock(&inner, Duration::from_secs(60), clock);

        assert_eq!(caching.resolve("host1").await.unwrap(), "host1.example.com");
        assert_eq!(caching.resolve("host1").await.unwrap(), "host1.example.com");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cache_expires_after_ttl() {
        let (clock, mock) = Clock::mock();
        let inner = CountingResolver::new(false);
        let caching = CachingResolver::with_clock(&inner, Duration::from_secs(60), clock);

        caching.resolve("host1").await.unwrap();
        mock.increment(Duration::from_secs(61));
        caching.resolve("host1").await.unwrap();
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let (clock, _mock) = Clock::mock();
        let inner = CountingResolver::new(true);
        let caching = CachingResolver::with_clock(&inner, Duration::from_secs(60), clock);

        assert!(caching.resolve("host1").await.is_err());
        assert!(caching.resolve("host1").await.is_err());
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_distinct_hosts_are_cached_separately() {
        let (clock, _mock) = Clock::mock();
        let inner = CountingResolver::new(false);
        let caching = CachingResolver::with_clock(&inner, Duration::from_secs(60), clock);

        assert_eq!(caching.resolve("host1").await.unwrap(), "host1.example.com");
        assert_eq!(caching.resolve("host2").await.unwrap(), "host2.example.com");
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }
}

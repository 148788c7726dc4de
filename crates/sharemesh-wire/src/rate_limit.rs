//! Per-source-IP connection spacing using GCRA.
//!
//! A keyed limiter with a burst of one cell per interval admits a
//! connection from an IP only when at least `interval` has passed since
//! that IP's last admitted connection. Refused attempts do not push the
//! window forward. Entries are kept for the life of the process.

use governor::{clock::DefaultClock, state::keyed::DashMapStateStore, Quota, RateLimiter};
use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

type KeyedRateLimiter = RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock>;

/// Shared limiter consulted by every listener before dispatching a socket.
#[derive(Clone)]
pub struct ConnectionRateLimiter {
    limiter: Option<Arc<KeyedRateLimiter>>,
}

impl ConnectionRateLimiter {
    /// Create a limiter that spaces connections by `interval`.
    /// A zero interval disables limiting.
    pub fn new(interval: Duration) -> Self {
        let limiter = Quota::with_period(interval).map(|quota| {
            Arc::new(RateLimiter::dashmap(
                quota.allow_burst(NonZeroU32::MIN),
            ))
        });
        Self { limiter }
    }

    /// Returns `true` if a connection from `ip` may proceed.
    pub fn check(&self, ip: IpAddr) -> bool {
        match &self.limiter {
            Some(limiter) => {
                if limiter.check_key(&ip).is_ok() {
                    true
                } else {
                    warn!(ip = %ip, "Connection interval violated, dropping connection");
                    false
                }
            }
            None => true,
        }
    }

    /// Whether limiting is active.
    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }
}

impl std::fmt::Debug for ConnectionRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRateLimiter")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_interval_disables() {
        let limiter = ConnectionRateLimiter::new(Duration::ZERO);
        assert!(!limiter.is_enabled());
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        for _ in 0..10 {
            assert!(limiter.check(ip));
        }
    }

    #[test]
    fn test_second_connection_within_interval_refused() {
        let limiter = ConnectionRateLimiter::new(Duration::from_secs(60));
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        assert!(limiter.check(ip));
        assert!(!limiter.check(ip));
        assert!(!limiter.check(ip));
    }

    #[test]
    fn test_addresses_are_independent() {
        let limiter = ConnectionRateLimiter::new(Duration::from_secs(60));
        assert!(limiter.check("10.0.0.1".parse().unwrap()));
        assert!(limiter.check("10.0.0.2".parse().unwrap()));
        assert!(limiter.check("::1".parse().unwrap()));
    }

    #[tokio::test]
    async fn test_admits_again_after_interval() {
        let limiter = ConnectionRateLimiter::new(Duration::from_millis(200));
        let ip: IpAddr = "127.0.0.1".parse().unwrap();
        assert!(limiter.check(ip));
        assert!(!limiter.check(ip));
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(limiter.check(ip));
        assert!(!limiter.check(ip));
    }
}

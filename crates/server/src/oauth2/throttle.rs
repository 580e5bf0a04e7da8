//! In-memory lockout for repeated client authentication failures.
//!
//! Counters are per `client_id` and peer address in a fixed window, so
//! failures from one caller never lock out the client elsewhere. They are
//! ephemeral and reset on restart.

use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct ThrottleKey {
    client_id: String,
    peer: Option<IpAddr>,
}

impl ThrottleKey {
    fn new(client_id: &str, peer: Option<IpAddr>) -> Self {
        Self {
            client_id: client_id.to_string(),
            peer,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct FailureWindow {
    failures: u32,
    started_at: Instant,
}

impl FailureWindow {
    fn is_expired(&self, window: Duration) -> bool {
        self.started_at.elapsed() >= window
    }
}

#[derive(Clone)]
pub struct ClientAuthThrottle {
    counters: Arc<DashMap<ThrottleKey, FailureWindow>>,
    max_failures: u32,
    window: Duration,
}

impl ClientAuthThrottle {
    /// `max_failures == 0` disables the lockout entirely.
    pub fn new(max_failures: u32, window: Duration) -> Self {
        Self {
            counters: Arc::new(DashMap::new()),
            max_failures,
            window,
        }
    }

    pub fn disabled() -> Self {
        Self::new(0, Duration::ZERO)
    }

    pub fn is_enabled(&self) -> bool {
        self.max_failures > 0
    }

    pub fn is_locked(&self, client_id: &str, peer: Option<IpAddr>) -> bool {
        if !self.is_enabled() {
            return false;
        }
        match self.counters.get(&ThrottleKey::new(client_id, peer)) {
            Some(entry) if !entry.is_expired(self.window) => entry.failures >= self.max_failures,
            _ => false,
        }
    }

    pub fn record_failure(&self, client_id: &str, peer: Option<IpAddr>) {
        if !self.is_enabled() {
            return;
        }
        let mut entry = self
            .counters
            .entry(ThrottleKey::new(client_id, peer))
            .or_insert(FailureWindow {
                failures: 0,
                started_at: Instant::now(),
            });
        if entry.is_expired(self.window) {
            *entry = FailureWindow {
                failures: 0,
                started_at: Instant::now(),
            };
        }
        entry.failures = entry.failures.saturating_add(1);
    }

    pub fn record_success(&self, client_id: &str, peer: Option<IpAddr>) {
        if self.is_enabled() {
            self.counters.remove(&ThrottleKey::new(client_id, peer));
        }
    }

    /// Drop windows that have elapsed. Called from the cleanup task.
    pub fn prune(&self) {
        let window = self.window;
        self.counters.retain(|_, entry| !entry.is_expired(window));
    }

    pub fn tracked_clients(&self) -> usize {
        self.counters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locks_after_max_failures() {
        let throttle = ClientAuthThrottle::new(3, Duration::from_secs(60));
        for _ in 0..2 {
            throttle.record_failure("client-a", None);
        }
        assert!(!throttle.is_locked("client-a", None));
        throttle.record_failure("client-a", None);
        assert!(throttle.is_locked("client-a", None));
        assert!(!throttle.is_locked("client-b", None));
    }

    #[test]
    fn success_clears_counter() {
        let throttle = ClientAuthThrottle::new(2, Duration::from_secs(60));
        throttle.record_failure("client-a", None);
        throttle.record_success("client-a", None);
        throttle.record_failure("client-a", None);
        assert!(!throttle.is_locked("client-a", None));
    }

    #[test]
    fn window_expiry_unlocks() {
        let throttle = ClientAuthThrottle::new(1, Duration::from_millis(20));
        throttle.record_failure("client-a", None);
        assert!(throttle.is_locked("client-a", None));
        std::thread::sleep(Duration::from_millis(30));
        assert!(!throttle.is_locked("client-a", None));
        throttle.prune();
        assert_eq!(throttle.tracked_clients(), 0);
    }

    #[test]
    fn peers_are_counted_separately() {
        let throttle = ClientAuthThrottle::new(2, Duration::from_secs(60));
        let attacker: IpAddr = "203.0.113.7".parse().unwrap();
        let owner: IpAddr = "198.51.100.20".parse().unwrap();
        throttle.record_failure("client-a", Some(attacker));
        throttle.record_failure("client-a", Some(attacker));
        assert!(throttle.is_locked("client-a", Some(attacker)));
        assert!(!throttle.is_locked("client-a", Some(owner)));
        assert!(!throttle.is_locked("client-a", None));
    }

    #[test]
    fn disabled_never_locks() {
        let throttle = ClientAuthThrottle::disabled();
        for _ in 0..100 {
            throttle.record_failure("client-a", None);
        }
        assert!(!throttle.is_locked("client-a", None));
        assert_eq!(throttle.tracked_clients(), 0);
    }
}

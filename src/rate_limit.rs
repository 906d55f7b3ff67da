//! Fixed-window request counting per client.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Past this many tracked clients, expired windows are pruned on the next hit.
const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy)]
struct ClientWindow {
    started: Instant,
    hits: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_after: Duration,
}

#[derive(Clone)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    clients: Arc<DashMap<String, ClientWindow>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: Arc::new(DashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_requests > 0 && !self.window.is_zero()
    }

    pub fn check(&self, client: &str) -> Decision {
        self.check_at(client, Instant::now())
    }

    fn check_at(&self, client: &str, now: Instant) -> Decision {
        if self.clients.len() > PRUNE_THRESHOLD {
            self.clients
                .retain(|_, w| now.saturating_duration_since(w.started) < self.window);
        }

        let mut entry = self
            .clients
            .entry(client.to_string())
            .or_insert(ClientWindow { started: now, hits: 0 });

        if now.saturating_duration_since(entry.started) >= self.window {
            *entry = ClientWindow { started: now, hits: 0 };
        }
        entry.hits = entry.hits.saturating_add(1);

        let reset_after = self
            .window
            .saturating_sub(now.saturating_duration_since(entry.started));

        Decision {
            allowed: entry.hits <= self.max_requests,
            limit: self.max_requests,
            remaining: self.max_requests.saturating_sub(entry.hits),
            reset_after,
        }
    }

    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_after_limit_and_resets_with_window() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        let start = Instant::now();

        assert_eq!(limiter.check_at("a", start).remaining, 1);
        assert!(limiter.check_at("a", start).allowed);

        let blocked = limiter.check_at("a", start + Duration::from_secs(10));
        assert!(!blocked.allowed);
        assert_eq!(blocked.remaining, 0);
        assert_eq!(blocked.reset_after, Duration::from_secs(50));

        assert!(limiter.check_at("a", start + Duration::from_secs(60)).allowed);
    }

    #[test]
    fn clients_are_counted_separately() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        let now = Instant::now();
        assert!(limiter.check_at("a", now).allowed);
        assert!(limiter.check_at("b", now).allowed);
        assert!(!limiter.check_at("a", now).allowed);
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn zero_max_disables() {
        assert!(!RateLimiter::new(0, Duration::from_secs(60)).is_enabled());
        assert!(RateLimiter::new(5, Duration::from_secs(60)).is_enabled());
    }
}

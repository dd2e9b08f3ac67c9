//! Per-client request rate limiting

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::ClientId;

/// Fixed-window request counter, one window per client.
#[derive(Debug)]
pub struct RateLimiter {
    /// Requests allowed in each window
    limit: u32,
    window: Duration,
    clients: HashMap<ClientId, Window>,
}

#[derive(Debug)]
struct Window {
    started: Instant,
    used: u32,
}

impl RateLimiter {
    /// Allow `limit` requests per `window` for every client.
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            clients: HashMap::new(),
        }
    }

    /// Record a request from `client_id`. Returns `false` if it is over the limit.
    pub fn check(&mut self, client_id: &ClientId) -> bool {
        self.check_at(client_id, Instant::now())
    }

    fn check_at(&mut self, client_id: &ClientId, now: Instant) -> bool {
        let window = self.clients.entry(client_id.clone()).or_insert(Window {
            started: now,
            used: 0,
        });

        if now.duration_since(window.started) >= self.window {
            window.started = now;
            window.used = 0;
        }

        if window.used < self.limit {
            window.used += 1;
            true
        } else {
            tracing::debug!(client_id = %client_id, limit = self.limit, "Client rate limited");
            false
        }
    }

    /// Forget a disconnected client
    pub fn remove_client(&mut self, client_id: &ClientId) {
        self.clients.remove(client_id);
    }

    /// Number of clients currently tracked
    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }
}

//! Chat flood protection
//!
//! Fixed-window counter per connection, applied to `sendMessage`. A flooding
//! client gets an error back instead of having its messages fanned out.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;

/// Per-connection message rate limiter
#[derive(Debug, Clone)]
pub struct FloodGuard {
    /// Map of connection id to (message count, window start)
    windows: Arc<RwLock<HashMap<String, (u32, Instant)>>>,
    max_messages: u32,
    window: Duration,
}

impl Default for FloodGuard {
    fn default() -> Self {
        Self::new(20, Duration::from_secs(10)) // 20 messages per 10 seconds
    }
}

impl FloodGuard {
    pub fn new(max_messages: u32, window: Duration) -> Self {
        Self {
            windows: Arc::new(RwLock::new(HashMap::new())),
            max_messages,
            window,
        }
    }

    /// Returns true if the message may go through
    pub async fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut windows = self.windows.write().await;

        match windows.get_mut(key) {
            Some((count, window_start)) => {
                if now.duration_since(*window_start) >= self.window {
                    *count = 1;
                    *window_start = now;
                    true
                } else if *count >= self.max_messages {
                    false
                } else {
                    *count += 1;
                    true
                }
            }
            None => {
                windows.insert(key.to_string(), (1, now));
                true
            }
        }
    }

    /// Drop state for a connection that went away
    pub async fn forget(&self, key: &str) {
        self.windows.write().await.remove(key);
    }

    /// Clean up stale windows (call periodically)
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut windows = self.windows.write().await;
        windows.retain(|_, (_, window_start)| now.duration_since(*window_start) < self.window * 2);
    }
}

/// Flood protection settings
#[derive(Debug, Clone)]
pub struct FloodConfig {
    /// None = disabled
    pub guard: Option<FloodGuard>,
}

impl Default for FloodConfig {
    fn default() -> Self {
        Self {
            guard: Some(FloodGuard::default()),
        }
    }
}

impl FloodConfig {
    /// Load config from environment variables
    pub fn from_env() -> Self {
        let enabled = std::env::var("CHAT_RATE_LIMIT")
            .map(|v| v != "0" && v.to_lowercase() != "false")
            .unwrap_or(true);

        let guard = if enabled {
            let max_messages = std::env::var("CHAT_RATE_LIMIT_MAX")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(20);

            let window_secs = std::env::var("CHAT_RATE_LIMIT_WINDOW")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10);

            tracing::info!(max_messages, window_secs, "Chat flood protection enabled");
            Some(FloodGuard::new(max_messages, Duration::from_secs(window_secs)))
        } else {
            tracing::warn!("Chat flood protection disabled");
            None
        };

        Self { guard }
    }
}

/// Periodically drop stale flood windows
pub fn spawn_flood_cleanup(guard: FloodGuard, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            guard.cleanup().await;
        }
    })
}

//! Short-lived deduplication of alert keys
//!
//! `has_cached` answers "was this key seen within the window" and re-arms
//! the window whenever it answers no. Expired entries are dropped lazily on
//! lookup; the periodic sweep only reclaims memory for keys never seen again.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

/// Default suppression window (5 minutes)
const DEFAULT_WINDOW_SECS: u64 = 5 * 60;

/// Time-windowed "have I alerted on this key recently" filter
pub struct EventCache {
    window: Duration,
    entries: Mutex<HashMap<String, Instant>>,
}

impl Default for EventCache {
    fn default() -> Self {
        Self::new()
    }
}

impl EventCache {
    pub fn new() -> Self {
        Self {
            window: Duration::from_secs(DEFAULT_WINDOW_SECS),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Set custom suppression window
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Returns false the first time a key is seen and the first time after
    /// its window lapsed (re-arming it); true otherwise
    pub async fn has_cached(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        match entries.get(key) {
            Some(expires_at) if now <= *expires_at => true,
            _ => {
                entries.insert(key.to_string(), now + self.window);
                false
            }
        }
    }

    /// Drop every expired entry; returns how many were removed
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, expires_at| now <= *expires_at);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Sweep on a fixed interval until shutdown
    pub async fn run_sweeper(&self, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.sweep().await;
                    debug!(removed, "Swept event cache");
                }
                _ = shutdown.recv() => {
                    info!("Event cache sweeper shutting down");
                    break;
                }
            }
        }
    }
}

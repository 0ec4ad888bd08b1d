use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

struct Snapshot {
    flags: HashMap<String, bool>,
    fetched_at: Option<Instant>,
}

/// Feature-flag cache with stale-while-revalidate semantics: reads never
/// block on the network, a stale snapshot keeps serving while one background
/// refresh replaces the whole map.
pub struct FlagsCache {
    http: reqwest::Client,
    url: Option<String>,
    api_key: Option<String>,
    ttl: Duration,
    snapshot: RwLock<Snapshot>,
    refreshing: AtomicBool,
}

impl FlagsCache {
    pub fn new(url: Option<String>, api_key: Option<String>) -> Arc<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .unwrap_or_default();

        Arc::new(Self {
            http,
            url,
            api_key,
            ttl: Duration::from_secs(30),
            snapshot: RwLock::new(Snapshot {
                flags: HashMap::new(),
                fetched_at: None,
            }),
            refreshing: AtomicBool::new(false),
        })
    }

    pub fn disabled() -> Arc<Self> {
        Self::new(None, None)
    }

    pub async fn is_enabled(self: &Arc<Self>, flag: &str, default: bool) -> bool {
        if self.url.is_none() {
            return default;
        }

        let (value, stale) = {
            let snap = self.snapshot.read().await;
            let stale = snap
                .fetched_at
                .map_or(true, |at| at.elapsed() > self.ttl);
            (snap.flags.get(flag).copied(), stale)
        };

        if stale {
            self.refresh_in_background();
        }

        value.unwrap_or(default)
    }

    fn refresh_in_background(self: &Arc<Self>) {
        if self.refreshing.swap(true, Ordering::SeqCst) {
            return;
        }
        let cache = self.clone();
        tokio::spawn(async move {
            cache.refresh().await;
            cache.refreshing.store(false, Ordering::SeqCst);
        });
    }

    async fn refresh(&self) {
        let Some(url) = &self.url else {
            return;
        };

        let mut request = self.http.get(url);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        // Fetch outside any lock, then swap the whole map at once.
        let fetched = match request.send().await {
            Ok(response) => response.json::<HashMap<String, bool>>().await,
            Err(err) => {
                debug!("flags refresh failed: {}", err);
                return;
            }
        };

        match fetched {
            Ok(flags) => {
                let mut snap = self.snapshot.write().await;
                snap.flags = flags;
                snap.fetched_at = Some(Instant::now());
            }
            Err(err) => debug!("flags response malformed: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_cache_serves_defaults() {
        let cache = FlagsCache::disabled();
        assert!(cache.is_enabled("bookings.instant_book", true).await);
        assert!(!cache.is_enabled("bookings.instant_book", false).await);
    }
}

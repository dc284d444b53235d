use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const DEFAULT_RATE_TTL: Duration = Duration::from_secs(24 * 3600);

/// Exchange rates for one base currency.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedRates {
    pub base: String,
    /// Units of each target currency per unit of `base`.
    pub rates: HashMap<String, f64>,
    pub fetched_at: Instant,
    pub valid_until: Instant,
}

impl CachedRates {
    pub fn rate(&self, target: &str) -> Option<f64> {
        if target == self.base {
            return Some(1.0);
        }
        self.rates.get(target).copied()
    }
}

type Entries = Arc<RwLock<HashMap<String, CachedRates>>>;

/// In-memory rate cache. Entries expire `ttl` after they were fetched; a
/// background janitor drops expired entries every `ttl / 2`.
#[derive(Debug)]
pub struct RateCache {
    entries: Entries,
    ttl: Duration,
    janitor: CancellationToken,
}

impl RateCache {
    /// Create the cache and spawn its janitor. A zero `ttl` means one day.
    /// Must be called from within a tokio runtime.
    pub fn new(ttl: Duration) -> Self {
        let ttl = if ttl.is_zero() { DEFAULT_RATE_TTL } else { ttl };
        let entries: Entries = Arc::default();
        let janitor = CancellationToken::new();

        tokio::spawn(sweep(Arc::clone(&entries), ttl / 2, janitor.clone()));

        Self {
            entries,
            ttl,
            janitor,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Rates for `base` unless missing or expired.
    pub async fn get(&self, base: &str) -> Option<CachedRates> {
        let entries = self.entries.read().await;
        let rates = entries.get(base)?;
        (Instant::now() <= rates.valid_until).then(|| rates.clone())
    }

    /// Store rates fetched at `fetched_at`, replacing any previous entry.
    pub async fn set(&self, base: &str, rates: HashMap<String, f64>, fetched_at: Instant) {
        let entry = CachedRates {
            base: base.to_string(),
            rates,
            fetched_at,
            valid_until: fetched_at + self.ttl,
        };
        self.entries.write().await.insert(base.to_string(), entry);
    }

    /// Store rates fetched just now.
    pub async fn insert(&self, base: &str, rates: HashMap<String, f64>) {
        self.set(base, rates, Instant::now()).await;
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Drop expired entries now, returning how many were removed.
    pub async fn remove_expired(&self) -> usize {
        remove_expired(&self.entries).await
    }

    /// Entry count, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Entry count and the oldest fetch time.
    pub async fn stats(&self) -> (usize, Option<Instant>) {
        let entries = self.entries.read().await;
        let oldest = entries.values().map(|r| r.fetched_at).min();
        (entries.len(), oldest)
    }

    /// Stop the janitor. Entries remain readable.
    pub fn stop(&self) {
        self.janitor.cancel();
    }
}

impl Drop for RateCache {
    fn drop(&mut self) {
        self.janitor.cancel();
    }
}

async fn remove_expired(entries: &Entries) -> usize {
    let now = Instant::now();
    let mut entries = entries.write().await;
    let before = entries.len();
    entries.retain(|_, rates| now <= rates.valid_until);
    before - entries.len()
}

async fn sweep(entries: Entries, period: Duration, cancel: CancellationToken) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let removed = remove_expired(&entries).await;
                if removed > 0 {
                    debug!(removed, "Removed expired exchange rates");
                }
            }
        }
    }
}

// src/fetch/cache.rs

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};
use tokio::sync::OnceCell;
use tracing::{debug, trace};

/// Source of "now" for cache expiry.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Index of the fixed-length window `now` falls into, counted from the unix epoch.
pub fn epoch_bucket(now: DateTime<Utc>, ttl: Duration) -> i64 {
    let secs = ttl.as_secs().max(1) as i64;
    now.timestamp().div_euclid(secs)
}

type Slot<V> = Arc<OnceCell<Arc<V>>>;

/// Memoizes one value per source id for the lifetime of an epoch bucket.
///
/// All callers inside the same bucket share one `Arc<V>`. Callers that miss
/// at the same time wait on a single fetch instead of racing. A failed fetch
/// leaves the slot empty so the next caller tries again. When a newer bucket
/// is populated the older one for that id is dropped.
pub struct TtlCache<V> {
    clock: Arc<dyn Clock>,
    slots: Mutex<HashMap<String, (i64, Slot<V>)>>,
}

impl<V> TtlCache<V> {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get_or_fetch<F, Fut>(&self, id: &str, ttl: Duration, fetch: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let bucket = epoch_bucket(self.clock.now(), ttl);
        let slot = self.slot(id, bucket);

        if let Some(hit) = slot.get() {
            trace!(id, bucket, "cache hit");
            return Ok(Arc::clone(hit));
        }

        let value = slot
            .get_or_try_init(|| async move { fetch().await.map(Arc::new) })
            .await?;
        Ok(Arc::clone(value))
    }

    /// Number of ids currently holding a populated snapshot.
    pub fn len(&self) -> usize {
        self.lock()
            .values()
            .filter(|(_, slot)| slot.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, id: &str, bucket: i64) -> Slot<V> {
        let mut slots = self.lock();
        match slots.get(id) {
            Some((current, slot)) if *current == bucket => Arc::clone(slot),
            previous => {
                if let Some((old, _)) = previous {
                    debug!(id, old_bucket = *old, bucket, "cache entry expired");
                }
                let slot: Slot<V> = Arc::new(OnceCell::new());
                slots.insert(id.to_string(), (bucket, Arc::clone(&slot)));
                slot
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (i64, Slot<V>)>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

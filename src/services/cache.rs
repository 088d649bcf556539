//! Time-bounded memoization of travel-time provider results
//!
//! One cache instance is shared across all in-flight requests for the
//! process lifetime. Keys are normalized so near-duplicate coordinates
//! (within ~10 m) hit the same entry. Expiry is lazy: an expired entry
//! reads as a miss and is removed on the spot; `sweep` may additionally be
//! called from a periodic task to bound memory.
//!
//! The cache is best-effort: losing it only costs a redundant provider
//! call, never a wrong price.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::routing::TravelTime;
use crate::types::Coordinates;

/// Decimal degrees kept in a cache key (4 ≈ 10 m resolution)
pub const COORDINATE_KEY_PRECISION: u32 = 4;

/// Default entry lifetime (15 minutes)
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(15 * 60);

/// Clock abstraction so tests can control expiry deterministically
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Production clock
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for tests
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

/// Normalized cache fingerprint for one routing call
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    origin_lat_e4: i64,
    origin_lng_e4: i64,
    dest_lat_e4: i64,
    dest_lng_e4: i64,
    traffic_model: Option<String>,
}

impl RouteKey {
    pub fn new(origin: &Coordinates, destination: &Coordinates, traffic_model: Option<&str>) -> Self {
        Self {
            origin_lat_e4: quantize(origin.lat),
            origin_lng_e4: quantize(origin.lng),
            dest_lat_e4: quantize(destination.lat),
            dest_lng_e4: quantize(destination.lng),
            traffic_model: traffic_model.map(str::to_string),
        }
    }
}

/// Round a coordinate to COORDINATE_KEY_PRECISION decimals as an integer
fn quantize(degrees: f64) -> i64 {
    let factor = 10_f64.powi(COORDINATE_KEY_PRECISION as i32);
    (degrees * factor).round() as i64
}

struct CacheEntry {
    value: TravelTime,
    inserted_at: Instant,
}

/// Shared in-process travel-time cache with lazy TTL expiry
pub struct TravelTimeCache {
    entries: Mutex<HashMap<RouteKey, CacheEntry>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TravelTimeCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            clock,
        }
    }

    /// Look up a fresh entry; expired entries read as a miss and are removed
    pub fn get(&self, key: &RouteKey) -> Option<TravelTime> {
        let mut entries = self.entries.lock();
        let now = self.clock.now();

        match entries.get(key) {
            Some(entry) if now.duration_since(entry.inserted_at) < self.ttl => {
                Some(entry.value.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Insert or overwrite. Values for the same key are expected to be
    /// identical within the TTL window, so racing writers are harmless.
    pub fn put(&self, key: RouteKey, value: TravelTime) {
        let mut entries = self.entries.lock();
        entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: self.clock.now(),
            },
        );
    }

    /// Drop all expired entries (call periodically to free memory)
    pub fn sweep(&self) {
        let mut entries = self.entries.lock();
        let now = self.clock.now();
        entries.retain(|_, e| now.duration_since(e.inserted_at) < self.ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

//! Route-to-route distance/time cache
//!
//! Entries are keyed by the ordered pair `(from_route, to_route)` and live in
//! the persistent store for `CACHE_TTL_DAYS`. Misses and stale hits go to the
//! routing provider. Concurrent misses for the same pair share one provider
//! call: the first caller starts the fetch, later callers await the same
//! shared future.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::DistanceCacheStore;
use crate::error::{PlannerError, PlannerResult};
use crate::services::clock::Clock;
use crate::services::routing::{RouteSummary, RoutingProvider};
use crate::types::{Coordinates, RouteDistanceCacheEntry, RouteLeg};

/// Entries older than this are recomputed and eventually swept
pub const CACHE_TTL_DAYS: i64 = 30;

/// Stored when the provider reports any traffic delay
pub const TRAFFIC_MULTIPLIER: f64 = 1.2;

/// One lookup: `from` route's destination to `to` route's origin
#[derive(Debug, Clone, Copy)]
pub struct LegRequest {
    pub from_route_id: Uuid,
    pub to_route_id: Uuid,
    pub from_endpoint: Coordinates,
    pub to_endpoint: Coordinates,
}

type PairKey = (Uuid, Uuid);

/// Clonable failure shared by every waiter of one fetch
#[derive(Debug, Clone)]
enum FetchError {
    Routing(String),
    Store(String),
}

impl From<FetchError> for PlannerError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Routing(msg) => PlannerError::RoutingUnavailable(msg),
            FetchError::Store(msg) => PlannerError::Persistence(anyhow::anyhow!(msg)),
        }
    }
}

type SharedFetch = Shared<BoxFuture<'static, Result<RouteLeg, FetchError>>>;

#[derive(Clone)]
pub struct DistanceCache {
    store: Arc<dyn DistanceCacheStore>,
    provider: Arc<dyn RoutingProvider>,
    clock: Arc<dyn Clock>,
    call_timeout: Duration,
    inflight: Arc<Mutex<HashMap<PairKey, SharedFetch>>>,
}

impl DistanceCache {
    pub fn new(
        store: Arc<dyn DistanceCacheStore>,
        provider: Arc<dyn RoutingProvider>,
        clock: Arc<dyn Clock>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            provider,
            clock,
            call_timeout,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Return the cached leg when fresh, otherwise route it and store the result.
    ///
    /// Provider failures and timeouts surface as `RoutingUnavailable` and leave
    /// the cache untouched.
    pub async fn get_or_compute(&self, request: LegRequest) -> PlannerResult<RouteLeg> {
        let now = self.clock.now();
        if let Some(entry) = self
            .store
            .get_distance_entry(request.from_route_id, request.to_route_id)
            .await?
        {
            if is_fresh(&entry, now) {
                return Ok(entry.leg());
            }
        }

        let key = (request.from_route_id, request.to_route_id);
        let fetch = {
            let mut inflight = self.inflight.lock();
            inflight
                .entry(key)
                .or_insert_with(|| self.start_fetch(key, request))
                .clone()
        };

        fetch.await.map_err(PlannerError::from)
    }

    /// The fetch removes its own in-flight entry when it settles, so a waiter
    /// dropped mid-call leaves the entry for the next caller to join and drive.
    fn start_fetch(&self, key: PairKey, request: LegRequest) -> SharedFetch {
        let store = Arc::clone(&self.store);
        let provider = Arc::clone(&self.provider);
        let clock = Arc::clone(&self.clock);
        let inflight = Arc::clone(&self.inflight);
        let call_timeout = self.call_timeout;

        async move {
            let result = fetch_leg(store, provider, clock, call_timeout, request).await;
            inflight.lock().remove(&key);
            result
        }
        .boxed()
        .shared()
    }

    /// Delete every entry older than the TTL. Returns the number removed.
    pub async fn sweep_expired(&self) -> PlannerResult<u64> {
        let cutoff = self.clock.now() - chrono::Duration::days(CACHE_TTL_DAYS);
        let deleted = self.store.delete_distance_entries_before(cutoff).await?;
        debug!("Distance cache sweep removed {} entries older than {}", deleted, cutoff);
        Ok(deleted)
    }
}

async fn fetch_leg(
    store: Arc<dyn DistanceCacheStore>,
    provider: Arc<dyn RoutingProvider>,
    clock: Arc<dyn Clock>,
    call_timeout: Duration,
    request: LegRequest,
) -> Result<RouteLeg, FetchError> {
    // A fetch that finished just before this one started may already have stored the pair
    if let Some(entry) = store
        .get_distance_entry(request.from_route_id, request.to_route_id)
        .await
        .map_err(|e| FetchError::Store(format!("{:#}", e)))?
    {
        if is_fresh(&entry, clock.now()) {
            return Ok(entry.leg());
        }
    }

    debug!(
        "Distance cache miss {} -> {}, asking {}",
        request.from_route_id,
        request.to_route_id,
        provider.name()
    );

    let summary = match tokio::time::timeout(
        call_timeout,
        provider.route(request.from_endpoint, request.to_endpoint),
    )
    .await
    {
        Ok(Ok(summary)) => summary,
        Ok(Err(e)) => {
            warn!(
                "Routing {} -> {} failed: {:#}",
                request.from_route_id, request.to_route_id, e
            );
            return Err(FetchError::Routing(format!("{:#}", e)));
        }
        Err(_) => {
            warn!(
                "Routing {} -> {} timed out after {:?}",
                request.from_route_id, request.to_route_id, call_timeout
            );
            return Err(FetchError::Routing(format!("timed out after {:?}", call_timeout)));
        }
    };

    let leg = leg_from_summary(&summary);
    let entry = RouteDistanceCacheEntry {
        from_route_id: request.from_route_id,
        to_route_id: request.to_route_id,
        distance_km: leg.distance_km,
        travel_time_minutes: leg.travel_minutes,
        traffic_factor: leg.traffic_factor,
        last_updated: clock.now(),
    };
    store
        .upsert_distance_entry(&entry)
        .await
        .map_err(|e| FetchError::Store(format!("{:#}", e)))?;

    Ok(leg)
}

fn is_fresh(entry: &RouteDistanceCacheEntry, now: DateTime<Utc>) -> bool {
    entry.last_updated >= now - chrono::Duration::days(CACHE_TTL_DAYS)
}

fn leg_from_summary(summary: &RouteSummary) -> RouteLeg {
    RouteLeg {
        distance_km: summary.length_meters / 1000.0,
        travel_minutes: summary.travel_time_seconds / 60.0,
        traffic_factor: if summary.traffic_delay_seconds > 0.0 {
            TRAFFIC_MULTIPLIER
        } else {
            1.0
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use crate::services::clock::FixedClock;
    use crate::services::routing::StubRoutingProvider;
    use chrono::TimeZone;

    struct Fixture {
        store: Arc<MemoryStore>,
        provider: Arc<StubRoutingProvider>,
        clock: Arc<FixedClock>,
        cache: DistanceCache,
    }

    fn fixture(provider: StubRoutingProvider, timeout: Duration) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(provider);
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 6, 0, 0).unwrap()));
        let cache = DistanceCache::new(store.clone(), provider.clone(), clock.clone(), timeout);
        Fixture { store, provider, clock, cache }
    }

    fn request(from: Uuid, to: Uuid) -> LegRequest {
        LegRequest {
            from_route_id: from,
            to_route_id: to,
            from_endpoint: Coordinates { lat: 13.08, lng: 100.88 },
            to_endpoint: Coordinates { lat: 13.67, lng: 100.60 },
        }
    }

    #[tokio::test]
    async fn test_miss_calls_provider_and_stores_converted_units() {
        let f = fixture(StubRoutingProvider::new(20.0, 25.0), Duration::from_secs(5));
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let leg = f.cache.get_or_compute(request(a, b)).await.unwrap();

        assert_eq!(leg.distance_km, 20.0);
        assert_eq!(leg.travel_minutes, 25.0);
        assert_eq!(leg.traffic_factor, 1.0);
        assert_eq!(f.provider.calls(), 1);

        let stored = f.store.distance(a, b).unwrap();
        assert_eq!(stored.last_updated, f.clock.now());
        assert!(f.store.distance(b, a).is_none(), "direction matters");
    }

    #[tokio::test]
    async fn test_fresh_hit_skips_provider() {
        let f = fixture(StubRoutingProvider::new(20.0, 25.0), Duration::from_secs(5));
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        f.cache.get_or_compute(request(a, b)).await.unwrap();
        f.clock.advance(chrono::Duration::days(29));
        f.cache.get_or_compute(request(a, b)).await.unwrap();

        assert_eq!(f.provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_stale_entry_is_recomputed() {
        let f = fixture(StubRoutingProvider::new(20.0, 25.0), Duration::from_secs(5));
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        f.store.insert_distance(RouteDistanceCacheEntry {
            from_route_id: a,
            to_route_id: b,
            distance_km: 99.0,
            travel_time_minutes: 99.0,
            traffic_factor: 1.0,
            last_updated: f.clock.now() - chrono::Duration::days(31),
        });

        let leg = f.cache.get_or_compute(request(a, b)).await.unwrap();

        assert_eq!(f.provider.calls(), 1);
        assert_eq!(leg.distance_km, 20.0);
        assert_eq!(f.store.distance(a, b).unwrap().last_updated, f.clock.now());
    }

    #[tokio::test]
    async fn test_traffic_delay_sets_multiplier() {
        let f = fixture(
            StubRoutingProvider::new(20.0, 25.0).with_traffic_delay(90.0),
            Duration::from_secs(5),
        );
        let leg = f.cache.get_or_compute(request(Uuid::new_v4(), Uuid::new_v4())).await.unwrap();
        assert_eq!(leg.traffic_factor, TRAFFIC_MULTIPLIER);
    }

    #[tokio::test]
    async fn test_provider_failure_is_not_cached() {
        let f = fixture(StubRoutingProvider::new(20.0, 25.0), Duration::from_secs(5));
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        f.provider.set_failing(true);

        let err = f.cache.get_or_compute(request(a, b)).await.unwrap_err();
        assert!(matches!(err, PlannerError::RoutingUnavailable(_)));
        assert!(f.store.distance(a, b).is_none());

        f.provider.set_failing(false);
        f.cache.get_or_compute(request(a, b)).await.unwrap();
        assert_eq!(f.provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_timeout_is_routing_unavailable() {
        let f = fixture(
            StubRoutingProvider::new(20.0, 25.0).with_delay(Duration::from_secs(5)),
            Duration::from_millis(20),
        );
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let err = f.cache.get_or_compute(request(a, b)).await.unwrap_err();

        assert_eq!(err.code(), "ROUTING_UNAVAILABLE");
        assert!(f.store.distance(a, b).is_none());
    }

    #[tokio::test]
    async fn test_concurrent_misses_share_one_call() {
        let f = fixture(
            StubRoutingProvider::new(20.0, 25.0).with_delay(Duration::from_millis(50)),
            Duration::from_secs(5),
        );
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let (first, second, third) = tokio::join!(
            f.cache.get_or_compute(request(a, b)),
            f.cache.get_or_compute(request(a, b)),
            f.cache.get_or_compute(request(a, b)),
        );

        assert_eq!(first.unwrap(), second.unwrap());
        assert!(third.is_ok());
        assert_eq!(f.provider.calls(), 1);
        assert_eq!(f.store.distance_upserts(), 1);
        assert!(f.cache.inflight.lock().is_empty());
    }

    #[tokio::test]
    async fn test_dropped_waiter_leaves_fetch_for_later_callers() {
        let f = fixture(
            StubRoutingProvider::new(20.0, 25.0).with_delay(Duration::from_millis(100)),
            Duration::from_secs(5),
        );
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let abandoned =
            tokio::time::timeout(Duration::from_millis(20), f.cache.get_or_compute(request(a, b)))
                .await;
        assert!(abandoned.is_err());
        assert_eq!(f.cache.inflight.lock().len(), 1);

        let leg = f.cache.get_or_compute(request(a, b)).await.unwrap();

        assert_eq!(leg.distance_km, 20.0);
        assert_eq!(f.provider.calls(), 1);
        assert_eq!(f.store.distance_upserts(), 1);
        assert!(f.cache.inflight.lock().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let f = fixture(StubRoutingProvider::new(20.0, 25.0), Duration::from_secs(5));
        let now = f.clock.now();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        for (to, age) in [(b, 31), (c, 2)] {
            f.store.insert_distance(RouteDistanceCacheEntry {
                from_route_id: a,
                to_route_id: to,
                distance_km: 1.0,
                travel_time_minutes: 1.0,
                traffic_factor: 1.0,
                last_updated: now - chrono::Duration::days(age),
            });
        }

        assert_eq!(f.cache.sweep_expired().await.unwrap(), 1);
        assert!(f.store.distance(a, b).is_none());
        assert!(f.store.distance(a, c).is_some());
    }
}

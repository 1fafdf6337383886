//! Polling loop: fetch, store, sleep

use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use tracing::{error, info, warn};

use crate::{
    errors::{error_chain, RecorderError},
    feed::PositionFeed,
    store::PositionStore,
};

/// Outcome of one successful cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub captured_at: DateTime<Utc>,
    pub routes: usize,
    pub positions: usize,
    pub inserted: u64,
}

/// Drives the feed into the store on a fixed interval
pub struct Poller {
    feed: Box<dyn PositionFeed>,
    store: Box<dyn PositionStore>,
    interval: Duration,
}

impl Poller {
    pub fn new(
        feed: Box<dyn PositionFeed>,
        store: Box<dyn PositionStore>,
        interval: Duration,
    ) -> Self {
        Self {
            feed,
            store,
            interval,
        }
    }

    /// Fetch all routes once and write them with a single capture time
    pub async fn run_cycle(&self) -> Result<CycleReport, RecorderError> {
        let captured_at = Utc::now().trunc_subsecs(0);

        let snapshot = self.feed.fetch_all_positions().await?;
        if snapshot.is_empty() {
            warn!("Feed returned no vehicle positions at {}", captured_at);
        }
        let inserted = self.store.insert_snapshot(captured_at, &snapshot).await?;

        Ok(CycleReport {
            captured_at,
            routes: snapshot.route_count(),
            positions: snapshot.position_count(),
            inserted,
        })
    }

    /// Run cycles forever.
    ///
    /// A failed cycle is logged and the next one starts after the usual
    /// interval. The interval is measured from the end of a cycle, so cycles
    /// never overlap and missed ticks are not made up.
    pub async fn run(&self) {
        info!(
            "Polling every {:?} into {} store (duplicates suppressed: {})",
            self.interval,
            self.store.backend(),
            self.store.suppresses_duplicates()
        );

        loop {
            match self.run_cycle().await {
                Ok(report) => info!(
                    "Inserted positions: read_time={}, routes={}, positions={}, inserted={}",
                    report.captured_at, report.routes, report.positions, report.inserted
                ),
                Err(e) => error!("Poll cycle failed: {}", error_chain(&e)),
            }

            tokio::time::sleep(self.interval).await;
        }
    }

    /// Release the store once polling has stopped
    pub async fn close(self) {
        self.store.close().await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use reqwest::StatusCode;

    use super::*;
    use crate::models::{RouteSnapshot, VehiclePosition};

    /// Fails the first `failures` fetches with an HTTP 503
    struct FlakyFeed {
        calls: Arc<AtomicUsize>,
        failures: usize,
    }

    #[async_trait]
    impl PositionFeed for FlakyFeed {
        async fn fetch_all_positions(&self) -> Result<RouteSnapshot, RecorderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(RecorderError::Http {
                    url: "http://feed.test/TransitViewAll/".to_string(),
                    status: StatusCode::SERVICE_UNAVAILABLE,
                });
            }
            Ok([(
                "17".to_string(),
                vec![VehiclePosition::default(), VehiclePosition::default()],
            )]
            .into_iter()
            .collect())
        }

        async fn fetch_route_positions(
            &self,
            _route: &str,
        ) -> Result<Vec<VehiclePosition>, RecorderError> {
            Ok(Vec::new())
        }
    }

    /// Feed that is up but lists routes with no vehicles
    struct EmptyFeed;

    #[async_trait]
    impl PositionFeed for EmptyFeed {
        async fn fetch_all_positions(&self) -> Result<RouteSnapshot, RecorderError> {
            Ok([("17".to_string(), Vec::new())].into_iter().collect())
        }

        async fn fetch_route_positions(
            &self,
            _route: &str,
        ) -> Result<Vec<VehiclePosition>, RecorderError> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct MemoryStore {
        batches: Arc<Mutex<Vec<(DateTime<Utc>, usize)>>>,
    }

    #[async_trait]
    impl PositionStore for MemoryStore {
        async fn initialize(&self) -> Result<(), RecorderError> {
            Ok(())
        }

        async fn insert_snapshot(
            &self,
            captured_at: DateTime<Utc>,
            snapshot: &RouteSnapshot,
        ) -> Result<u64, RecorderError> {
            let count = snapshot.position_count();
            self.batches.lock().unwrap().push((captured_at, count));
            Ok(count as u64)
        }

        async fn close(&self) {}

        fn backend(&self) -> &'static str {
            "memory"
        }

        fn suppresses_duplicates(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_cycle_reports_counts() {
        let store = MemoryStore::default();
        let batches = store.batches.clone();
        let feed = FlakyFeed {
            calls: Arc::new(AtomicUsize::new(0)),
            failures: 0,
        };
        let poller = Poller::new(Box::new(feed), Box::new(store), Duration::from_secs(60));

        let report = poller.run_cycle().await.unwrap();

        assert_eq!(report.routes, 1);
        assert_eq!(report.positions, 2);
        assert_eq!(report.inserted, 2);
        assert_eq!(report.captured_at.timestamp_subsec_nanos(), 0);
        assert_eq!(*batches.lock().unwrap(), vec![(report.captured_at, 2)]);
    }

    #[tokio::test]
    async fn test_empty_snapshot_is_not_an_error() {
        let store = MemoryStore::default();
        let batches = store.batches.clone();
        let poller = Poller::new(Box::new(EmptyFeed), Box::new(store), Duration::from_secs(60));

        let report = poller.run_cycle().await.unwrap();

        assert_eq!(report.routes, 1);
        assert_eq!(report.positions, 0);
        assert_eq!(report.inserted, 0);
        assert_eq!(*batches.lock().unwrap(), vec![(report.captured_at, 0)]);
    }

    #[tokio::test]
    async fn test_failed_fetch_skips_store() {
        let store = MemoryStore::default();
        let batches = store.batches.clone();
        let feed = FlakyFeed {
            calls: Arc::new(AtomicUsize::new(0)),
            failures: 1,
        };
        let poller = Poller::new(Box::new(feed), Box::new(store), Duration::from_secs(60));

        let result = poller.run_cycle().await;

        assert!(matches!(result, Err(RecorderError::Http { .. })));
        assert!(batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_loop_survives_failed_cycles() {
        let store = MemoryStore::default();
        let batches = store.batches.clone();
        let calls = Arc::new(AtomicUsize::new(0));
        let feed = FlakyFeed {
            calls: calls.clone(),
            failures: 2,
        };
        let poller = Poller::new(Box::new(feed), Box::new(store), Duration::from_millis(5));

        let result = tokio::time::timeout(Duration::from_millis(500), poller.run()).await;

        assert!(result.is_err(), "poll loop returned");
        assert!(calls.load(Ordering::SeqCst) >= 3);
        assert!(!batches.lock().unwrap().is_empty());
    }
}

use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use velomap_common::{FilterCriteria, Station};

use crate::error::{ProviderError, Result, VeloError};
use crate::filter;
use crate::provider::StationProvider;

/// Outcome of one provider during a load
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceReport {
    pub name: String,
    /// Stations taken into the snapshot
    pub count: usize,
    /// Records rejected by validation at the provider boundary
    pub dropped: usize,
    /// Stations skipped because an earlier provider already had the id
    pub duplicates: usize,
    pub error: Option<String>,
}

/// Immutable merged view of all providers
#[derive(Debug, Clone, Default)]
pub struct StationSnapshot {
    pub stations: Vec<Station>,
    pub loaded_at: Option<DateTime<Utc>>,
    pub sources: Vec<SourceReport>,
    /// Issuance number of the load that produced this snapshot
    pub generation: u64,
}

impl StationSnapshot {
    /// Linear lookup by id
    pub fn get(&self, id: &str) -> Option<&Station> {
        self.stations.iter().find(|station| station.id == id)
    }
}

#[derive(Debug)]
pub struct LoadOutcome {
    pub snapshot: Arc<StationSnapshot>,
    /// Failures of individual providers that did not prevent the load
    pub errors: Vec<ProviderError>,
    /// False when a newer load had already been applied
    pub applied: bool,
}

/// Authoritative station list merged from all configured providers
///
/// Readers get an `Arc` to the current snapshot; a load replaces the
/// reference and never edits a published snapshot.
pub struct StationStore {
    providers: Vec<Arc<dyn StationProvider>>,
    snapshot: RwLock<Arc<StationSnapshot>>,
    load_seq: AtomicU64,
    closed: AtomicBool,
}

/// Provider name with its stations and validation drop count, or its failure
type Batch = (String, std::result::Result<(Vec<Station>, usize), ProviderError>);

/// Concatenate provider batches in provider order, first occurrence of an id wins
fn merge(batches: Vec<Batch>) -> (Vec<Station>, Vec<SourceReport>, Vec<ProviderError>) {
    let mut stations = Vec::new();
    let mut seen = HashSet::new();
    let mut reports = Vec::with_capacity(batches.len());
    let mut errors = Vec::new();

    for (name, batch) in batches {
        let mut report = SourceReport {
            name: name.clone(),
            ..Default::default()
        };

        match batch {
            Ok((data, dropped)) => {
                report.dropped = dropped;
                for station in data {
                    if seen.insert(station.id.clone()) {
                        stations.push(station);
                        report.count += 1;
                    } else {
                        tracing::warn!(
                            "Duplicate station id '{}' from {}, keeping the earlier record",
                            station.id,
                            name
                        );
                        report.duplicates += 1;
                    }
                }
            }
            Err(e) => {
                tracing::error!("Provider {} failed: {}", name, e);
                report.error = Some(e.to_string());
                errors.push(e);
            }
        }

        reports.push(report);
    }

    (stations, reports, errors)
}

impl StationStore {
    pub fn new(providers: Vec<Arc<dyn StationProvider>>) -> Self {
        Self {
            providers,
            snapshot: RwLock::new(Arc::new(StationSnapshot::default())),
            load_seq: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    pub async fn snapshot(&self) -> Arc<StationSnapshot> {
        self.snapshot.read().await.clone()
    }

    /// Fetch from every provider concurrently and publish the merged snapshot
    ///
    /// Partial failures are reported in the outcome. When every provider
    /// fails the previous snapshot stays in place and the first failure is
    /// returned as `DataFetch`.
    pub async fn load(&self) -> Result<LoadOutcome> {
        if self.is_closed() {
            return Err(VeloError::Closed);
        }

        let seq = self.load_seq.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!("Loading stations from {} providers (load #{})", self.providers.len(), seq);

        let fetches = self.providers.iter().map(|provider| async move {
            let result = provider.fetch_stations().await.map(|response| {
                let dropped = response.meta.map(|meta| meta.dropped).unwrap_or(0);
                (response.data, dropped)
            });
            (provider.name().to_string(), result)
        });
        let batches = join_all(fetches).await;

        if self.is_closed() {
            tracing::debug!("Store closed while load #{} was in flight, discarding", seq);
            return Err(VeloError::Closed);
        }

        let (stations, sources, mut errors) = merge(batches);

        if !self.providers.is_empty() && errors.len() == self.providers.len() {
            tracing::warn!("All providers failed, keeping previous snapshot");
            return Err(VeloError::DataFetch(errors.remove(0)));
        }

        let mut current = self.snapshot.write().await;
        if current.generation > seq {
            tracing::debug!(
                "Load #{} finished after newer load #{}, discarding",
                seq,
                current.generation
            );
            return Ok(LoadOutcome {
                snapshot: current.clone(),
                errors,
                applied: false,
            });
        }

        let snapshot = Arc::new(StationSnapshot {
            stations,
            loaded_at: Some(Utc::now()),
            sources,
            generation: seq,
        });
        *current = snapshot.clone();

        tracing::info!(
            "Loaded {} stations ({} provider errors)",
            snapshot.stations.len(),
            errors.len()
        );

        Ok(LoadOutcome {
            snapshot,
            errors,
            applied: true,
        })
    }

    /// Station by id from the current snapshot; a miss is `None`
    pub async fn get_by_id(&self, id: &str) -> Option<Station> {
        self.snapshot.read().await.get(id).cloned()
    }

    /// Ask the providers in order for a single station
    ///
    /// Errors only when no provider could answer at all.
    pub async fn fetch_by_id(&self, id: &str) -> Result<Option<Station>> {
        let mut first_error = None;
        let mut answered = false;

        for provider in &self.providers {
            match provider.fetch_station_by_id(id).await {
                Ok(Some(station)) => return Ok(Some(station)),
                Ok(None) => answered = true,
                Err(e) => {
                    tracing::warn!("{} could not look up '{}': {}", provider.name(), id, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) if !answered => Err(VeloError::DataFetch(e)),
            _ => Ok(None),
        }
    }

    /// Local lookup first, then the providers; `NotFound` when neither knows `id`
    pub async fn resolve(&self, id: &str) -> Result<Station> {
        if let Some(station) = self.get_by_id(id).await {
            return Ok(station);
        }

        tracing::debug!("Station '{}' not in snapshot, asking providers", id);
        match self.fetch_by_id(id).await {
            Ok(Some(station)) => Ok(station),
            Ok(None) => Err(VeloError::NotFound(id.to_string())),
            Err(e) => {
                tracing::warn!("Fallback lookup for '{}' failed: {}", id, e);
                Err(VeloError::NotFound(id.to_string()))
            }
        }
    }

    /// Current snapshot passed through the filter
    pub async fn displayed(&self, criteria: &FilterCriteria) -> Vec<Station> {
        filter::apply(&self.snapshot().await.stations, criteria)
    }

    /// True before the first load or once `max_age` has passed since it
    pub async fn is_stale(&self, max_age: Duration) -> bool {
        let Some(loaded_at) = self.snapshot().await.loaded_at else {
            return true;
        };
        let age = Utc::now().signed_duration_since(loaded_at);
        age.to_std().map_or(false, |age| age >= max_age)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop accepting loads; in-flight loads are discarded when they finish
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Reload every `interval` until the store is closed
    pub fn start_refresh_task(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tracing::info!("Scheduling station refresh every {:?}", interval);

        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if self.is_closed() {
                    tracing::debug!("Store closed, stopping refresh task");
                    break;
                }

                match self.load().await {
                    Ok(outcome) => tracing::info!(
                        "Refreshed stations: {} loaded, {} provider errors",
                        outcome.snapshot.stations.len(),
                        outcome.errors.len()
                    ),
                    Err(VeloError::Closed) => break,
                    Err(e) => tracing::error!("Station refresh failed: {}", e),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::tests::station;
    use crate::provider::MockProvider;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use velomap_common::StationsResponse;

    /// Serves a scripted (delay, stations) pair per call
    struct ScriptedProvider {
        name: String,
        script: Mutex<VecDeque<(Duration, Vec<Station>)>>,
    }

    impl ScriptedProvider {
        fn new(name: &str, script: Vec<(Duration, Vec<Station>)>) -> Self {
            Self {
                name: name.to_string(),
                script: Mutex::new(script.into()),
            }
        }
    }

    #[async_trait]
    impl StationProvider for ScriptedProvider {
        fn name(&self) -> &str {
            &self.name
        }

        async fn fetch_stations(&self) -> std::result::Result<StationsResponse, ProviderError> {
            let next = self.script.lock().unwrap().pop_front();
            let (delay, data) = next.ok_or_else(|| ProviderError::Unavailable {
                provider: self.name.clone(),
                reason: "script exhausted".to_string(),
            })?;
            tokio::time::sleep(delay).await;
            Ok(StationsResponse { data, meta: None })
        }
    }

    fn ids(stations: &[Station]) -> Vec<&str> {
        stations.iter().map(|s| s.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_load_merges_providers_in_order() {
        let store = StationStore::new(vec![
            Arc::new(MockProvider::primary()),
            Arc::new(MockProvider::secondary()),
        ]);
        let outcome = store.load().await.unwrap();

        assert!(outcome.applied);
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.snapshot.stations.len(), 9);
        assert_eq!(outcome.snapshot.stations[0].id, "rental-1");
        assert_eq!(outcome.snapshot.stations[6].id, "ovfiets-amstc");
        assert_eq!(outcome.snapshot.sources.len(), 2);
        assert_eq!(outcome.snapshot.sources[1].count, 3);
    }

    #[tokio::test]
    async fn test_duplicate_ids_first_provider_wins() {
        let mut shadow = station("a", 9, 9);
        shadow.name = "Shadow".to_string();
        let store = StationStore::new(vec![
            Arc::new(MockProvider::from_stations("first", &[station("a", 1, 1), station("b", 1, 1)])),
            Arc::new(MockProvider::from_stations("second", &[shadow, station("c", 1, 1)])),
        ]);
        let outcome = store.load().await.unwrap();

        assert_eq!(ids(&outcome.snapshot.stations), vec!["a", "b", "c"]);
        assert_eq!(outcome.snapshot.stations[0].name, "Station a");
        assert_eq!(outcome.snapshot.sources[1].duplicates, 1);
        assert_eq!(outcome.snapshot.sources[1].count, 1);
    }

    #[tokio::test]
    async fn test_partial_failure_still_loads() {
        let store = StationStore::new(vec![
            Arc::new(MockProvider::failing("down", "maintenance")),
            Arc::new(MockProvider::secondary()),
        ]);
        let outcome = store.load().await.unwrap();

        assert_eq!(outcome.snapshot.stations.len(), 3);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.snapshot.sources[0].error.is_some());
    }

    #[tokio::test]
    async fn test_total_failure_keeps_previous_snapshot() {
        let store = StationStore::new(vec![Arc::new(ScriptedProvider::new(
            "scripted",
            vec![(Duration::ZERO, vec![station("a", 1, 1)])],
        ))]);
        store.load().await.unwrap();

        let err = store.load().await.unwrap_err();
        assert!(matches!(err, VeloError::DataFetch(_)));
        assert_eq!(ids(&store.snapshot().await.stations), vec!["a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_load_does_not_overwrite_newer() {
        let store = Arc::new(StationStore::new(vec![Arc::new(ScriptedProvider::new(
            "scripted",
            vec![
                (Duration::from_millis(500), vec![station("old", 1, 1)]),
                (Duration::from_millis(10), vec![station("new", 1, 1)]),
            ],
        ))]));

        let slow = tokio::spawn({
            let store = store.clone();
            async move { store.load().await }
        });
        tokio::time::sleep(Duration::from_millis(1)).await;
        let fast = store.load().await.unwrap();
        assert!(fast.applied);

        let slow = slow.await.unwrap().unwrap();
        assert!(!slow.applied);
        assert_eq!(ids(&store.snapshot().await.stations), vec!["new"]);
        assert_eq!(store.snapshot().await.generation, 2);
    }

    #[tokio::test]
    async fn test_get_by_id_and_resolve() {
        let store = StationStore::new(vec![Arc::new(MockProvider::primary())]);
        assert!(store.get_by_id("rental-2").await.is_none());

        // not loaded yet: resolve falls back to the provider
        let station = store.resolve("rental-2").await.unwrap();
        assert_eq!(station.name, "MacBike Centraal");

        store.load().await.unwrap();
        assert!(store.get_by_id("rental-2").await.is_some());
        assert!(store.get_by_id("rental-99").await.is_none());

        let err = store.resolve("rental-99").await.unwrap_err();
        assert!(matches!(err, VeloError::NotFound(id) if id == "rental-99"));
    }

    #[tokio::test]
    async fn test_fetch_by_id_errors_only_without_answers() {
        let store = StationStore::new(vec![Arc::new(MockProvider::failing("down", "maintenance"))]);
        assert!(matches!(
            store.fetch_by_id("x").await,
            Err(VeloError::DataFetch(_))
        ));

        let store = StationStore::new(vec![
            Arc::new(MockProvider::failing("down", "maintenance")),
            Arc::new(MockProvider::secondary()),
        ]);
        assert!(store.fetch_by_id("x").await.unwrap().is_none());
        assert!(store.fetch_by_id("ovfiets-amsz").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_displayed_and_staleness() {
        let store = StationStore::new(vec![Arc::new(MockProvider::primary())]);
        assert!(store.is_stale(Duration::from_secs(300)).await);

        store.load().await.unwrap();
        assert!(!store.is_stale(Duration::from_secs(300)).await);
        assert!(store.is_stale(Duration::ZERO).await);

        let criteria = FilterCriteria {
            operators: ["MacBike".to_string()].into(),
            ..Default::default()
        };
        assert_eq!(ids(&store.displayed(&criteria).await), vec!["rental-2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_discards_in_flight_load() {
        let store = Arc::new(StationStore::new(vec![Arc::new(
            MockProvider::primary().with_delay(Duration::from_millis(800)),
        )]));

        let pending = tokio::spawn({
            let store = store.clone();
            async move { store.load().await }
        });
        tokio::time::sleep(Duration::from_millis(1)).await;
        store.close();

        assert!(matches!(pending.await.unwrap(), Err(VeloError::Closed)));
        assert!(store.snapshot().await.stations.is_empty());
        assert!(matches!(store.load().await, Err(VeloError::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_task_reloads_until_closed() {
        let store = Arc::new(StationStore::new(vec![Arc::new(MockProvider::primary())]));
        let handle = store.clone().start_refresh_task(Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(store.snapshot().await.generation, 1);

        store.close();
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(handle.is_finished());
    }
}

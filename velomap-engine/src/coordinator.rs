//! Selection coordinator
//!
//! Owns the map view state, the active filter, the open station detail and
//! the notices. The rendering layer sends `MapEvent`s and watches
//! `MapSnapshot`s; every processed event publishes a fresh snapshot.
//!
//! Station resolution and geolocation are asynchronous. Each carries a
//! sequence token: when a newer selection (or close/reset) or a newer
//! location request has been issued meanwhile, the late result is ignored.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

use velomap_common::{
    validate_location, validate_station, FilterCriteria, Location, SearchResult,
    SearchResultKind, Station,
};

use crate::card::StationCard;
use crate::config::AppConfig;
use crate::error::{Result, VeloError};
use crate::filter::{self, Facets};
use crate::geolocation::{self, GeolocationProvider};
use crate::notice::{Notice, NoticeBoard};
use crate::search::{SearchOptions, SearchSession, SearchUpdate};
use crate::store::StationStore;
use crate::view::MapViewState;

const NO_MATCHES_NOTICE: &str = "No bike rentals match your filters";
const LOCATION_FOUND_NOTICE: &str = "Location found!";
const LOCATION_FAILED_NOTICE: &str = "Couldn't get your location";

/// What to select: a full record, or an id to resolve through the store
#[derive(Debug, Clone, PartialEq)]
pub enum SelectTarget {
    Station(Box<Station>),
    Id(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    /// The store holds a new snapshot; recompute the displayed list
    StationsLoaded,
    FilterChanged(FilterCriteria),
    MarkerClicked(String),
    SearchPicked(SearchResult),
    /// `None` clears the selection
    Select(Option<SelectTarget>),
    CloseDetail,
    Pan { location: Location, zoom: Option<u8> },
    ResetView,
    LocateUser,
    DismissNotice(Uuid),
}

/// Everything the rendering layer draws
#[derive(Debug, Clone, PartialEq)]
pub struct MapSnapshot {
    pub stations: Vec<Station>,
    pub view: MapViewState,
    pub selected: Option<Station>,
    pub user_location: Option<Location>,
    pub criteria: FilterCriteria,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub defaults: MapViewState,
    pub search_pick_zoom: u8,
    pub locate_zoom: u8,
    pub geolocation_timeout: Duration,
    pub criteria: FilterCriteria,
    pub search: SearchOptions,
    pub debounce: Duration,
}

impl CoordinatorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            defaults: MapViewState::from_config(&config.map),
            search_pick_zoom: config.map.search_pick_zoom,
            locate_zoom: config.map.locate_zoom,
            geolocation_timeout: Duration::from_millis(config.map.geolocation_timeout_ms),
            criteria: config.filter.default_criteria(),
            search: SearchOptions::from(&config.search),
            debounce: Duration::from_millis(config.search.debounce_ms),
        }
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

struct CoordinatorState {
    view: MapViewState,
    criteria: FilterCriteria,
    displayed: Vec<Station>,
    selected: Option<Station>,
    user_location: Option<Location>,
    notices: NoticeBoard,
}

impl CoordinatorState {
    fn snapshot(&self) -> MapSnapshot {
        MapSnapshot {
            stations: self.displayed.clone(),
            view: self.view.clone(),
            selected: self.selected.clone(),
            user_location: self.user_location,
            criteria: self.criteria.clone(),
            notices: self.notices.notices().to_vec(),
        }
    }
}

pub struct MapCoordinator {
    store: Arc<StationStore>,
    geolocation: Arc<dyn GeolocationProvider>,
    settings: CoordinatorSettings,
    search: SearchSession,
    state: Mutex<CoordinatorState>,
    selection_seq: AtomicU64,
    locate_seq: AtomicU64,
    closed: AtomicBool,
    snapshot_tx: watch::Sender<MapSnapshot>,
}

impl MapCoordinator {
    pub fn new(
        store: Arc<StationStore>,
        geolocation: Arc<dyn GeolocationProvider>,
        settings: CoordinatorSettings,
    ) -> Self {
        let state = CoordinatorState {
            view: settings.defaults.clone(),
            criteria: settings.criteria.clone(),
            displayed: Vec::new(),
            selected: None,
            user_location: None,
            notices: NoticeBoard::default(),
        };
        let (snapshot_tx, _) = watch::channel(state.snapshot());
        let search = SearchSession::new(store.clone(), settings.search, settings.debounce);

        Self {
            store,
            geolocation,
            settings,
            search,
            state: Mutex::new(state),
            selection_seq: AtomicU64::new(0),
            locate_seq: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            snapshot_tx,
        }
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    pub fn subscribe(&self) -> watch::Receiver<MapSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Most recently published snapshot
    pub fn snapshot(&self) -> MapSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(VeloError::Closed)
        } else {
            Ok(())
        }
    }

    fn publish(&self, state: &CoordinatorState) {
        self.snapshot_tx.send_replace(state.snapshot());
    }

    fn next_selection(&self) -> u64 {
        self.selection_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current_selection(&self, seq: u64) -> bool {
        self.selection_seq.load(Ordering::SeqCst) == seq
    }

    /// Load all providers and display the result
    ///
    /// Provider failures become error notices. When nothing could be loaded
    /// the previous list stays on screen and `DataFetch` is returned.
    pub async fn load(&self) -> Result<()> {
        self.ensure_open()?;
        let loaded = self.store.load().await;
        self.ensure_open()?;

        let mut state = self.state.lock().await;
        match loaded {
            Ok(outcome) => {
                for e in &outcome.errors {
                    state
                        .notices
                        .error(format!("Failed to load bike rental locations: {}", e));
                }
                self.recompute(&mut state).await;
                self.publish(&state);
                Ok(())
            }
            Err(VeloError::DataFetch(e)) => {
                state
                    .notices
                    .error(format!("Failed to load bike rental data: {}", e));
                self.publish(&state);
                Err(VeloError::DataFetch(e))
            }
            Err(e) => Err(e),
        }
    }

    /// Process one UI event and publish the resulting snapshot
    pub async fn handle(&self, event: MapEvent) -> Result<()> {
        self.ensure_open()?;
        tracing::debug!("Handling {:?}", event);

        match event {
            MapEvent::StationsLoaded => {
                let mut state = self.state.lock().await;
                self.recompute(&mut state).await;
                self.publish(&state);
                Ok(())
            }
            MapEvent::FilterChanged(criteria) => {
                let mut state = self.state.lock().await;
                state.criteria = criteria;
                self.recompute(&mut state).await;
                self.publish(&state);
                Ok(())
            }
            MapEvent::MarkerClicked(id) => self.select_by_id(id, None).await,
            MapEvent::SearchPicked(result) => self.pick_search_result(result).await,
            MapEvent::Select(Some(SelectTarget::Station(station))) => {
                validate_station(&station)?;
                let seq = self.next_selection();
                self.apply_selection(seq, *station, None).await;
                Ok(())
            }
            MapEvent::Select(Some(SelectTarget::Id(id))) => self.select_by_id(id, None).await,
            MapEvent::Select(None) | MapEvent::CloseDetail => {
                self.next_selection();
                let mut state = self.state.lock().await;
                state.view = state.view.select(None);
                state.selected = None;
                self.publish(&state);
                Ok(())
            }
            MapEvent::Pan { location, zoom } => {
                validate_location(&location)?;
                let mut state = self.state.lock().await;
                state.view = state.view.pan_to(location, zoom);
                self.publish(&state);
                Ok(())
            }
            MapEvent::ResetView => {
                self.next_selection();
                let mut state = self.state.lock().await;
                state.view = state.view.reset(&self.settings.defaults);
                state.selected = None;
                self.publish(&state);
                Ok(())
            }
            MapEvent::LocateUser => self.locate_user().await,
            MapEvent::DismissNotice(id) => {
                let mut state = self.state.lock().await;
                if state.notices.dismiss(id) {
                    self.publish(&state);
                }
                Ok(())
            }
        }
    }

    /// Refilter the current store snapshot with the active criteria
    async fn recompute(&self, state: &mut CoordinatorState) {
        let snapshot = self.store.snapshot().await;
        state.displayed = filter::apply(&snapshot.stations, &state.criteria);

        if state.displayed.is_empty() && !snapshot.stations.is_empty() {
            state.notices.info(NO_MATCHES_NOTICE);
        }
    }

    async fn apply_selection(&self, seq: u64, station: Station, zoom: Option<u8>) {
        let mut state = self.state.lock().await;
        if !self.is_current_selection(seq) {
            tracing::debug!("Selection of '{}' superseded, ignoring", station.id);
            return;
        }

        state.view = state
            .view
            .select(Some(station.id.clone()))
            .pan_to(station.location, zoom);
        tracing::info!("Selected station '{}' ({})", station.id, station.name);
        state.selected = Some(station);
        self.publish(&state);
    }

    /// Resolve `id` (snapshot first, then providers) and select it
    ///
    /// On failure the current selection is left as it was.
    async fn select_by_id(&self, id: String, zoom: Option<u8>) -> Result<()> {
        let seq = self.next_selection();
        let resolved = self.store.resolve(&id).await;
        self.ensure_open()?;

        if !self.is_current_selection(seq) {
            tracing::debug!("Resolution of '{}' superseded, ignoring", id);
            return Ok(());
        }

        let station = resolved?;
        self.apply_selection(seq, station, zoom).await;
        Ok(())
    }

    async fn pick_search_result(&self, result: SearchResult) -> Result<()> {
        let zoom = Some(self.settings.search_pick_zoom);

        match result.kind {
            SearchResultKind::Station => self.select_by_id(result.id, zoom).await,
            SearchResultKind::Place | SearchResultKind::Address => {
                let mut state = self.state.lock().await;
                state.view = state.view.pan_to(result.location, zoom);
                self.publish(&state);
                Ok(())
            }
        }
    }

    async fn locate_user(&self) -> Result<()> {
        let seq = self.locate_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let located =
            geolocation::locate(self.geolocation.as_ref(), self.settings.geolocation_timeout)
                .await;
        self.ensure_open()?;

        if self.locate_seq.load(Ordering::SeqCst) != seq {
            tracing::debug!("Location request #{} superseded, ignoring", seq);
            return Ok(());
        }

        let mut state = self.state.lock().await;
        match located {
            Ok(location) => {
                state.user_location = Some(location);
                state.view = state.view.pan_to(location, Some(self.settings.locate_zoom));
                state.notices.success(LOCATION_FOUND_NOTICE);
                self.publish(&state);
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Geolocation failed: {}", e);
                state.notices.error(LOCATION_FAILED_NOTICE);
                self.publish(&state);
                Err(e.into())
            }
        }
    }

    /// Debounced free-text search; results arrive on `search_results`
    pub fn search(&self, query: impl Into<String>) -> Result<u64> {
        self.ensure_open()?;
        Ok(self.search.submit(query))
    }

    pub fn search_results(&self) -> watch::Receiver<SearchUpdate> {
        self.search.subscribe()
    }

    pub fn clear_search(&self) {
        self.search.clear();
    }

    /// Filter options offered for the current snapshot
    pub async fn facets(&self) -> Facets {
        Facets::from_stations(&self.store.snapshot().await.stations)
    }

    pub fn selected_card(&self) -> Option<StationCard> {
        self.snapshot_tx
            .borrow()
            .selected
            .as_ref()
            .map(StationCard::from_station)
    }

    /// Tear down: cancel the pending search, stop the store, and drop any
    /// async result that arrives afterwards
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.search.cancel();
        self.store.close();
        tracing::info!("Map coordinator shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GeolocationError;
    use crate::filter::tests::station;
    use crate::geolocation::FixedGeolocation;
    use crate::notice::NoticeLevel;
    use crate::provider::{MockProvider, StationProvider};
    use velomap_common::ValidationError;

    fn coordinator_with(
        providers: Vec<Arc<dyn StationProvider>>,
        geolocation: FixedGeolocation,
    ) -> MapCoordinator {
        let store = Arc::new(StationStore::new(providers));
        MapCoordinator::new(store, Arc::new(geolocation), CoordinatorSettings::default())
    }

    async fn loaded_coordinator() -> MapCoordinator {
        let coordinator = coordinator_with(
            vec![Arc::new(MockProvider::primary())],
            FixedGeolocation::failing(GeolocationError::PermissionDenied),
        );
        coordinator.load().await.unwrap();
        coordinator
    }

    fn has_notice(snapshot: &MapSnapshot, level: NoticeLevel, message: &str) -> bool {
        snapshot
            .notices
            .iter()
            .any(|notice| notice.level == level && notice.message == message)
    }

    #[tokio::test]
    async fn test_load_publishes_displayed_stations() {
        let coordinator = loaded_coordinator().await;
        let snapshot = coordinator.snapshot();

        assert_eq!(snapshot.stations.len(), 6);
        assert_eq!(snapshot.view, coordinator.settings().defaults);
        assert!(snapshot.notices.is_empty());
    }

    #[tokio::test]
    async fn test_marker_click_selects_and_pans() {
        let coordinator = loaded_coordinator().await;
        coordinator
            .handle(MapEvent::MarkerClicked("rental-2".to_string()))
            .await
            .unwrap();

        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.view.selected_station_id.as_deref(), Some("rental-2"));
        assert_eq!(snapshot.view.center, Location::new(52.3751, 4.9079));
        assert_eq!(snapshot.view.zoom, 14);
        assert_eq!(snapshot.selected.as_ref().map(|s| s.name.as_str()), Some("MacBike Centraal"));
        assert_eq!(
            coordinator.selected_card().map(|card| card.website_domain),
            Some("macbike.nl".to_string())
        );
    }

    #[tokio::test]
    async fn test_unknown_id_keeps_selection() {
        let coordinator = coordinator_with(
            vec![
                Arc::new(MockProvider::primary()),
                Arc::new(MockProvider::failing("ov-fiets", "offline")),
            ],
            FixedGeolocation::failing(GeolocationError::Unavailable),
        );
        coordinator.load().await.unwrap();
        coordinator
            .handle(MapEvent::MarkerClicked("rental-1".to_string()))
            .await
            .unwrap();
        let before = coordinator.snapshot();

        let result = coordinator
            .handle(MapEvent::Select(Some(SelectTarget::Id("missing".to_string()))))
            .await;
        assert!(matches!(result, Err(VeloError::NotFound(id)) if id == "missing"));

        let after = coordinator.snapshot();
        assert_eq!(after.view, before.view);
        assert_eq!(after.selected, before.selected);
    }

    #[tokio::test]
    async fn test_selection_falls_back_to_providers() {
        let coordinator = coordinator_with(
            vec![Arc::new(MockProvider::secondary())],
            FixedGeolocation::failing(GeolocationError::Unavailable),
        );

        // nothing loaded, the id is resolved through the provider
        coordinator
            .handle(MapEvent::Select(Some(SelectTarget::Id("ovfiets-amsz".to_string()))))
            .await
            .unwrap();
        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.view.selected_station_id.as_deref(), Some("ovfiets-amsz"));
        assert_eq!(snapshot.view.center, Location::new(52.3389, 4.8730));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_resolution_is_ignored() {
        let coordinator = Arc::new(coordinator_with(
            vec![Arc::new(
                MockProvider::secondary().with_delay(Duration::from_millis(500)),
            )],
            FixedGeolocation::failing(GeolocationError::Unavailable),
        ));

        let pending = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .handle(MapEvent::MarkerClicked("ovfiets-amsz".to_string()))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;

        let mut direct = station("b", 3, 5);
        direct.location = Location::new(52.36, 4.88);
        coordinator
            .handle(MapEvent::Select(Some(SelectTarget::Station(Box::new(direct)))))
            .await
            .unwrap();

        pending.await.unwrap().unwrap();
        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.view.selected_station_id.as_deref(), Some("b"));
        assert_eq!(snapshot.view.center, Location::new(52.36, 4.88));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_detail_wins_over_pending_resolution() {
        let coordinator = Arc::new(coordinator_with(
            vec![Arc::new(
                MockProvider::secondary().with_delay(Duration::from_millis(500)),
            )],
            FixedGeolocation::failing(GeolocationError::Unavailable),
        ));

        let pending = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .handle(MapEvent::MarkerClicked("ovfiets-amsb".to_string()))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;
        coordinator.handle(MapEvent::CloseDetail).await.unwrap();

        pending.await.unwrap().unwrap();
        let snapshot = coordinator.snapshot();
        assert!(snapshot.view.selected_station_id.is_none());
        assert!(snapshot.selected.is_none());
    }

    #[tokio::test]
    async fn test_search_pick_zooms_in() {
        let coordinator = loaded_coordinator().await;

        let hit = SearchResult {
            id: "rental-6".to_string(),
            name: "Yellow Bike".to_string(),
            address: None,
            location: Location::new(52.3758, 4.8932),
            kind: SearchResultKind::Station,
        };
        coordinator.handle(MapEvent::SearchPicked(hit)).await.unwrap();
        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.view.selected_station_id.as_deref(), Some("rental-6"));
        assert_eq!(snapshot.view.zoom, 16);

        coordinator.handle(MapEvent::CloseDetail).await.unwrap();
        let place = SearchResult {
            id: "place-1".to_string(),
            name: "Vondelpark".to_string(),
            address: None,
            location: Location::new(52.358, 4.868),
            kind: SearchResultKind::Place,
        };
        coordinator.handle(MapEvent::SearchPicked(place)).await.unwrap();
        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.view.center, Location::new(52.358, 4.868));
        assert!(snapshot.view.selected_station_id.is_none());
    }

    #[tokio::test]
    async fn test_filter_without_matches_notifies() {
        let coordinator = loaded_coordinator().await;

        let mut criteria = coordinator.snapshot().criteria;
        criteria.toggle_operator("Nobody Rentals");
        coordinator
            .handle(MapEvent::FilterChanged(criteria.clone()))
            .await
            .unwrap();

        let snapshot = coordinator.snapshot();
        assert!(snapshot.stations.is_empty());
        assert_eq!(snapshot.criteria, criteria);
        assert!(has_notice(&snapshot, NoticeLevel::Info, NO_MATCHES_NOTICE));

        let id = snapshot.notices[0].id;
        coordinator.handle(MapEvent::DismissNotice(id)).await.unwrap();
        assert!(coordinator.snapshot().notices.is_empty());
    }

    #[tokio::test]
    async fn test_total_load_failure_keeps_list() {
        let coordinator = coordinator_with(
            vec![Arc::new(MockProvider::failing("mock-data", "offline"))],
            FixedGeolocation::failing(GeolocationError::Unavailable),
        );

        let result = coordinator.load().await;
        assert!(matches!(result, Err(VeloError::DataFetch(_))));

        let snapshot = coordinator.snapshot();
        assert!(snapshot.stations.is_empty());
        assert!(snapshot
            .notices
            .iter()
            .any(|notice| notice.level == NoticeLevel::Error
                && notice.message.starts_with("Failed to load bike rental data")));
    }

    #[tokio::test]
    async fn test_locate_user() {
        let here = Location::new(52.36, 4.90);
        let coordinator = coordinator_with(
            vec![Arc::new(MockProvider::primary())],
            FixedGeolocation::at(here),
        );
        coordinator.handle(MapEvent::LocateUser).await.unwrap();

        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.user_location, Some(here));
        assert_eq!(snapshot.view.center, here);
        assert_eq!(snapshot.view.zoom, 15);
        assert!(has_notice(&snapshot, NoticeLevel::Success, LOCATION_FOUND_NOTICE));
    }

    /// Answers slowly at the first position, quickly at every later one
    struct SlowThenFast {
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl GeolocationProvider for SlowThenFast {
        async fn current_position(&self) -> std::result::Result<Location, GeolocationError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(800)).await;
                Ok(Location::new(52.30, 4.80))
            } else {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(Location::new(52.40, 4.95))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_location_is_ignored() {
        let store = Arc::new(StationStore::new(vec![Arc::new(MockProvider::primary())]));
        let geolocation = Arc::new(SlowThenFast {
            calls: std::sync::atomic::AtomicUsize::new(0),
        });
        let coordinator = Arc::new(MapCoordinator::new(
            store,
            geolocation,
            CoordinatorSettings::default(),
        ));

        let slow = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.handle(MapEvent::LocateUser).await })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;
        coordinator.handle(MapEvent::LocateUser).await.unwrap();

        slow.await.unwrap().unwrap();
        let snapshot = coordinator.snapshot();
        let latest = Location::new(52.40, 4.95);
        assert_eq!(snapshot.user_location, Some(latest));
        assert_eq!(snapshot.view.center, latest);
        let found = snapshot
            .notices
            .iter()
            .filter(|notice| notice.message == LOCATION_FOUND_NOTICE)
            .count();
        assert_eq!(found, 1);
    }

    #[tokio::test]
    async fn test_locate_failure_leaves_view() {
        let coordinator = coordinator_with(
            vec![Arc::new(MockProvider::primary())],
            FixedGeolocation::failing(GeolocationError::PermissionDenied),
        );
        let before = coordinator.snapshot().view;

        let result = coordinator.handle(MapEvent::LocateUser).await;
        assert!(matches!(
            result,
            Err(VeloError::Geolocation(GeolocationError::PermissionDenied))
        ));

        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.view, before);
        assert!(snapshot.user_location.is_none());
        assert!(has_notice(&snapshot, NoticeLevel::Error, LOCATION_FAILED_NOTICE));
    }

    #[tokio::test]
    async fn test_invalid_caller_input_is_rejected() {
        let coordinator = loaded_coordinator().await;
        coordinator
            .handle(MapEvent::MarkerClicked("rental-4".to_string()))
            .await
            .unwrap();
        let before = coordinator.snapshot();

        let mut broken = station("x", 1, 2);
        broken.location = Location::new(f64::NAN, 4.9);
        let result = coordinator
            .handle(MapEvent::Select(Some(SelectTarget::Station(Box::new(broken)))))
            .await;
        assert!(matches!(
            result,
            Err(VeloError::InvalidInput(ValidationError::NonFiniteCoordinate { .. }))
        ));

        let result = coordinator
            .handle(MapEvent::Pan {
                location: Location::new(120.0, 4.9),
                zoom: None,
            })
            .await;
        assert!(matches!(
            result,
            Err(VeloError::InvalidInput(ValidationError::CoordinateOutOfRange { .. }))
        ));

        assert_eq!(coordinator.snapshot().view, before.view);
        assert_eq!(coordinator.snapshot().selected, before.selected);
    }

    #[tokio::test]
    async fn test_pan_and_reset() {
        let coordinator = loaded_coordinator().await;
        coordinator
            .handle(MapEvent::MarkerClicked("rental-5".to_string()))
            .await
            .unwrap();
        coordinator
            .handle(MapEvent::Pan {
                location: Location::new(52.30, 4.95),
                zoom: Some(12),
            })
            .await
            .unwrap();
        assert_eq!(coordinator.snapshot().view.zoom, 12);

        coordinator.handle(MapEvent::ResetView).await.unwrap();
        let snapshot = coordinator.snapshot();
        assert_eq!(snapshot.view, coordinator.settings().defaults);
        assert!(snapshot.selected.is_none());
    }

    #[tokio::test]
    async fn test_subscribers_see_updates() {
        let coordinator = loaded_coordinator().await;
        let mut rx = coordinator.subscribe();
        rx.borrow_and_update();

        coordinator
            .handle(MapEvent::MarkerClicked("rental-3".to_string()))
            .await
            .unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(
            rx.borrow().view.selected_station_id.as_deref(),
            Some("rental-3")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drops_late_results() {
        let coordinator = Arc::new(coordinator_with(
            vec![Arc::new(MockProvider::primary())],
            FixedGeolocation::at(Location::new(52.36, 4.90)).with_delay(Duration::from_secs(1)),
        ));

        let pending = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.handle(MapEvent::LocateUser).await })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;
        coordinator.shutdown();

        assert!(matches!(pending.await.unwrap(), Err(VeloError::Closed)));
        assert!(coordinator.snapshot().user_location.is_none());
        assert!(matches!(
            coordinator.handle(MapEvent::ResetView).await,
            Err(VeloError::Closed)
        ));
        assert!(matches!(coordinator.search("macbike"), Err(VeloError::Closed)));
        assert!(matches!(coordinator.load().await, Err(VeloError::Closed)));
    }
}

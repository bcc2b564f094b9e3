use velomap_engine::config;
use velomap_engine::coordinator::{CoordinatorSettings, MapCoordinator, MapEvent};
use velomap_engine::geolocation::FixedGeolocation;
use velomap_engine::provider;
use velomap_engine::store::StationStore;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    let (config, source) = config::read_config("config.toml")?;

    let _logging_guard =
        velomap_engine::logging::init_logging(&config.log_dir, "velomap", &config.log_level)?;
    source.log();

    tracing::info!("Velomap starting...");

    let providers = provider::from_config(&config.providers)?;
    let store = Arc::new(StationStore::new(providers));
    tracing::info!("Providers: {}", store.provider_names().join(", "));

    let settings = CoordinatorSettings::from_config(config);
    // no positioning hardware on the command line, report the map center
    let geolocation = Arc::new(FixedGeolocation::at(settings.defaults.center));
    let coordinator = MapCoordinator::new(store.clone(), geolocation, settings);

    if let Err(e) = coordinator.load().await {
        tracing::error!("Initial load failed: {}", e);
    }

    let snapshot = coordinator.snapshot();
    tracing::info!(
        "Displaying {} stations ({} active filters)",
        snapshot.stations.len(),
        snapshot.criteria.active_count(config.filter.max_price)
    );
    for station in &snapshot.stations {
        tracing::info!(
            "  {} [{}] {} / {} bikes at {}",
            station.name,
            station.id,
            station.bikes.available,
            station.bikes.total,
            station.location
        );
    }

    let refresh = store.clone().start_refresh_task(Duration::from_secs(
        config.providers.refresh_interval_minutes * 60,
    ));

    if let Some(query) = std::env::args().nth(1) {
        let mut results = coordinator.search_results();
        let generation = coordinator.search(query.clone())?;

        let update = results
            .wait_for(|update| update.generation >= generation)
            .await?
            .clone();
        tracing::info!("{} results for '{}'", update.results.len(), query);

        match update.results.into_iter().next() {
            Some(first) => {
                coordinator.handle(MapEvent::SearchPicked(first)).await?;
                if let Some(card) = coordinator.selected_card() {
                    tracing::info!("{}", serde_json::to_string_pretty(&card)?);
                }
            }
            None => tracing::info!("Nothing matches '{}'", query),
        }
    }

    coordinator.shutdown();
    refresh.abort();
    tracing::info!("Velomap stopped");

    Ok(())
}

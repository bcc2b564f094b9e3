//! Station data providers
//!
//! A provider is an external source of station records with unspecified
//! latency. Every payload passes the validating parse in `velomap_common`
//! before it is handed to the store, so invalid records never leave here.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use velomap_common::{Station, StationsResponse};

use crate::config::ProvidersConfig;
use crate::error::ProviderError;

mod mock;
mod overpass;

pub use mock::MockProvider;
pub use overpass::{OverpassElement, OverpassProvider, overpass_query};

#[async_trait]
pub trait StationProvider: Send + Sync {
    /// Short source name used in logs, notices and response metadata
    fn name(&self) -> &str;

    async fn fetch_stations(&self) -> Result<StationsResponse, ProviderError>;

    /// Look up a single station; `Ok(None)` when the provider does not know it
    async fn fetch_station_by_id(&self, id: &str) -> Result<Option<Station>, ProviderError> {
        let response = self.fetch_stations().await?;
        Ok(response.data.into_iter().find(|station| station.id == id))
    }
}

/// Providers enabled in `config`, in merge order
///
/// Mock sources come first so their records win id collisions.
pub fn from_config(config: &ProvidersConfig) -> Result<Vec<Arc<dyn StationProvider>>, ProviderError> {
    let delay = Duration::from_millis(config.simulated_delay_ms);
    let mut providers: Vec<Arc<dyn StationProvider>> = Vec::new();

    if config.mock_primary {
        providers.push(Arc::new(MockProvider::primary().with_delay(delay)));
    }
    if config.mock_secondary {
        providers.push(Arc::new(MockProvider::secondary().with_delay(delay)));
    }
    if let Some(overpass) = config.overpass.as_ref().filter(|overpass| overpass.enable) {
        providers.push(Arc::new(OverpassProvider::new(overpass)?));
    }

    tracing::info!("Configured {} station providers", providers.len());
    Ok(providers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OverpassConfig;

    #[test]
    fn test_from_config_order() {
        let mut config = ProvidersConfig::default();
        config.overpass = Some(OverpassConfig {
            enable: true,
            ..OverpassConfig::default()
        });

        let names: Vec<String> = from_config(&config)
            .unwrap()
            .iter()
            .map(|provider| provider.name().to_string())
            .collect();
        assert_eq!(names, vec!["mock-data", "ov-fiets", "overpass"]);

        config.mock_primary = false;
        config.overpass = None;
        assert_eq!(from_config(&config).unwrap().len(), 1);
    }
}

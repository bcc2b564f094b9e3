use async_trait::async_trait;
use std::time::Duration;

use velomap_common::Location;

use crate::error::GeolocationError;

/// Source of the user's current position
#[async_trait]
pub trait GeolocationProvider: Send + Sync {
    async fn current_position(&self) -> Result<Location, GeolocationError>;
}

/// Answers with a fixed outcome, optionally after a delay
#[derive(Debug, Clone)]
pub struct FixedGeolocation {
    outcome: Result<Location, GeolocationError>,
    delay: Duration,
}

impl FixedGeolocation {
    pub fn at(location: Location) -> Self {
        Self {
            outcome: Ok(location),
            delay: Duration::ZERO,
        }
    }

    pub fn failing(error: GeolocationError) -> Self {
        Self {
            outcome: Err(error),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl GeolocationProvider for FixedGeolocation {
    async fn current_position(&self) -> Result<Location, GeolocationError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.outcome.clone()
    }
}

/// Position request bounded by `timeout`
pub async fn locate(
    provider: &dyn GeolocationProvider,
    timeout: Duration,
) -> Result<Location, GeolocationError> {
    let location = tokio::time::timeout(timeout, provider.current_position())
        .await
        .map_err(|_| GeolocationError::Timeout(timeout.as_millis() as u64))??;

    if !location.is_valid() {
        return Err(GeolocationError::Unavailable);
    }
    Ok(location)
}

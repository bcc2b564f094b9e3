use thiserror::Error;

use velomap_common::ValidationError;

/// Failure of a single station provider call
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request to {provider} failed: {source}")]
    Http {
        provider: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{provider} answered with HTTP {status}")]
    Status {
        provider: String,
        status: reqwest::StatusCode,
    },
    #[error("malformed payload from {provider}: {reason}")]
    Malformed { provider: String, reason: String },
    #[error("{provider} did not answer within {seconds}s")]
    Timeout { provider: String, seconds: u64 },
    #[error("{provider} is unavailable: {reason}")]
    Unavailable { provider: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeolocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("position unavailable")]
    Unavailable,
    #[error("location request timed out after {0} ms")]
    Timeout(u64),
}

/// Engine error taxonomy; every variant is recoverable by the caller
///
/// Invalid provider records never surface here: they are dropped one by one
/// in `velomap_common::parse`. `InvalidInput` is for records and locations a
/// caller hands in directly.
#[derive(Debug, Error)]
pub enum VeloError {
    #[error("failed to load station data: {0}")]
    DataFetch(#[from] ProviderError),
    #[error("station '{0}' not found")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(#[from] ValidationError),
    #[error("could not determine location: {0}")]
    Geolocation(#[from] GeolocationError),
    #[error("map coordinator has been shut down")]
    Closed,
}

pub type Result<T, E = VeloError> = std::result::Result<T, E>;

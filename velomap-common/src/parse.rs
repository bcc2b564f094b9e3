//! Validating parse from loose provider records into `Station`
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

use crate::types::{BikeAvailability, Location, OpeningHours, PriceInfo, Station};

/// Reasons a provider record cannot become a `Station`
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("station id is missing or empty")]
    MissingId,
    #[error("station name is missing or empty")]
    MissingName,
    #[error("station location is missing")]
    MissingLocation,
    #[error("non-finite coordinate ({lat}, {lng})")]
    NonFiniteCoordinate { lat: f64, lng: f64 },
    #[error("coordinate out of range ({lat}, {lng})")]
    CoordinateOutOfRange { lat: f64, lng: f64 },
    #[error("{available} bikes available but only {total} in total")]
    AvailableExceedsTotal { available: u32, total: u32 },
    #[error("rating {0} outside 0..=5")]
    RatingOutOfRange(f64),
    #[error("malformed record: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawLocation {
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawBikes {
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub available: u32,
    #[serde(default)]
    pub types: BTreeMap<String, u32>,
}

/// Station record as a provider delivers it, every field optional
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawStation {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub location: Option<RawLocation>,
    #[serde(default)]
    pub bikes: Option<RawBikes>,
    #[serde(default)]
    pub opening_hours: Option<Vec<OpeningHours>>,
    #[serde(default)]
    pub prices: Option<Vec<PriceInfo>>,
    #[serde(default)]
    pub amenities: Option<Vec<String>>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub images: Option<Vec<String>>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Finite coordinates inside the WGS84 ranges
pub fn validate_location(location: &Location) -> Result<(), ValidationError> {
    let Location { lat, lng } = *location;
    if !location.is_finite() {
        return Err(ValidationError::NonFiniteCoordinate { lat, lng });
    }
    if !location.is_valid() {
        return Err(ValidationError::CoordinateOutOfRange { lat, lng });
    }
    Ok(())
}

/// Re-check the record invariants of a station built outside the parse
pub fn validate_station(station: &Station) -> Result<(), ValidationError> {
    if station.id.trim().is_empty() {
        return Err(ValidationError::MissingId);
    }
    if station.name.trim().is_empty() {
        return Err(ValidationError::MissingName);
    }
    validate_location(&station.location)?;
    if station.bikes.available > station.bikes.total {
        return Err(ValidationError::AvailableExceedsTotal {
            available: station.bikes.available,
            total: station.bikes.total,
        });
    }
    match station.rating {
        Some(rating) if !(0.0..=5.0).contains(&rating) => {
            Err(ValidationError::RatingOutOfRange(rating))
        }
        _ => Ok(()),
    }
}

impl TryFrom<RawStation> for Station {
    type Error = ValidationError;

    fn try_from(raw: RawStation) -> Result<Self, Self::Error> {
        let id = non_empty(raw.id).ok_or(ValidationError::MissingId)?;
        let name = non_empty(raw.name).ok_or(ValidationError::MissingName)?;

        let (lat, lng) = match raw.location {
            Some(RawLocation {
                lat: Some(lat),
                lng: Some(lng),
            }) => (lat, lng),
            _ => return Err(ValidationError::MissingLocation),
        };
        let location = Location::new(lat, lng);
        validate_location(&location)?;

        let raw_bikes = raw.bikes.unwrap_or_default();
        if raw_bikes.available > raw_bikes.total {
            return Err(ValidationError::AvailableExceedsTotal {
                available: raw_bikes.available,
                total: raw_bikes.total,
            });
        }
        let bikes = BikeAvailability {
            total: raw_bikes.total,
            available: raw_bikes.available,
            types: raw_bikes.types,
        };
        if bikes.typed_count() > u64::from(bikes.available) {
            tracing::warn!(
                "Station '{}': bike type counts sum to {} but only {} available",
                id,
                bikes.typed_count(),
                bikes.available
            );
        }

        if let Some(rating) = raw.rating {
            if !(0.0..=5.0).contains(&rating) {
                return Err(ValidationError::RatingOutOfRange(rating));
            }
        }

        Ok(Station {
            id,
            name,
            operator: non_empty(raw.operator),
            address: non_empty(raw.address),
            location,
            bikes,
            opening_hours: raw.opening_hours.unwrap_or_default(),
            prices: raw.prices.unwrap_or_default(),
            amenities: raw
                .amenities
                .unwrap_or_default()
                .into_iter()
                .collect::<BTreeSet<_>>(),
            rating: raw.rating,
            images: raw.images.unwrap_or_default(),
            last_updated: raw.last_updated.unwrap_or_else(Utc::now),
        })
    }
}

/// A record that failed validation
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    /// Position in the provider payload
    pub index: usize,
    pub id: Option<String>,
    pub error: ValidationError,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedStations {
    pub stations: Vec<Station>,
    pub rejected: Vec<Rejection>,
}

impl ParsedStations {
    fn push(&mut self, index: usize, id: Option<String>, record: Result<Station, ValidationError>) {
        match record {
            Ok(station) => self.stations.push(station),
            Err(error) => {
                tracing::warn!(
                    "Dropping station record #{} ({}): {}",
                    index,
                    id.as_deref().unwrap_or("<no id>"),
                    error
                );
                self.rejected.push(Rejection { index, id, error });
            }
        }
    }
}

/// Validate a provider payload, keeping payload order for the valid records
///
/// Rejected records are logged and reported, never fatal for the batch.
pub fn parse_stations(raws: Vec<RawStation>) -> ParsedStations {
    let mut parsed = ParsedStations::default();

    for (index, raw) in raws.into_iter().enumerate() {
        let id = raw.id.clone();
        parsed.push(index, id, Station::try_from(raw));
    }

    parsed
}

/// Like `parse_stations`, but decodes each JSON record on its own so a
/// badly typed field only drops its own record
pub fn parse_json_records(values: Vec<serde_json::Value>) -> ParsedStations {
    let mut parsed = ParsedStations::default();

    for (index, value) in values.into_iter().enumerate() {
        let id = value
            .get("id")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);
        let record = serde_json::from_value::<RawStation>(value)
            .map_err(|e| ValidationError::Malformed(e.to_string()))
            .and_then(Station::try_from);
        parsed.push(index, id, record);
    }

    parsed
}

//! Multi-attribute station filtering
//!
//! All active constraints are AND'd. Within the bike type constraint any
//! selected type suffices; within the amenity constraint every selected
//! amenity is required. Output keeps input order.

use std::collections::BTreeSet;

use velomap_common::{FilterCriteria, Station};

/// Whether `station` passes every active constraint of `criteria`
pub fn matches(station: &Station, criteria: &FilterCriteria) -> bool {
    if !criteria.bike_types.is_empty()
        && !criteria
            .bike_types
            .iter()
            .any(|bike_type| station.bikes.has_type(bike_type))
    {
        return false;
    }

    if !criteria.operators.is_empty() {
        match &station.operator {
            Some(operator) if criteria.operators.contains(operator) => {}
            _ => return false,
        }
    }

    if !criteria.amenities.is_empty() && !station.amenities.is_superset(&criteria.amenities) {
        return false;
    }

    if criteria.only_available && !station.has_available_bikes() {
        return false;
    }

    // Stations without any parseable price always pass the price constraint
    if let Some(lowest) = station.lowest_price() {
        if !criteria.price_range.contains(lowest) {
            return false;
        }
    }

    true
}

/// Stations passing `criteria`, in input order
pub fn apply(stations: &[Station], criteria: &FilterCriteria) -> Vec<Station> {
    stations
        .iter()
        .filter(|station| matches(station, criteria))
        .cloned()
        .collect()
}

/// Filter options present in a snapshot, sorted
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Facets {
    pub bike_types: BTreeSet<String>,
    pub operators: BTreeSet<String>,
    pub amenities: BTreeSet<String>,
}

impl Facets {
    pub fn from_stations(stations: &[Station]) -> Self {
        let mut facets = Facets::default();
        for station in stations {
            facets.bike_types.extend(station.bikes.types.keys().cloned());
            facets.operators.extend(station.operator.iter().cloned());
            facets.amenities.extend(station.amenities.iter().cloned());
        }
        facets
    }
}

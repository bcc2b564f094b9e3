use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Geographic position in WGS84 degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }

    /// Both coordinates finite and inside the WGS84 ranges
    pub fn is_valid(&self) -> bool {
        self.is_finite() && (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}, {:.6}", self.lat, self.lng)
    }
}

/// Bike counts at a station
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BikeAvailability {
    pub total: u32,
    pub available: u32,
    /// Count per bike category, e.g. "city" -> 5, "electric" -> 3
    #[serde(default)]
    pub types: BTreeMap<String, u32>,
}

impl BikeAvailability {
    pub fn has_type(&self, bike_type: &str) -> bool {
        self.types.contains_key(bike_type)
    }

    pub fn typed_count(&self) -> u64 {
        self.types.values().map(|&count| u64::from(count)).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpeningHours {
    pub days: String,
    pub hours: String,
}

/// One tariff of a station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceInfo {
    #[serde(rename = "type")]
    pub kind: String,
    /// Decimal amount as delivered by the provider, e.g. "3.85"
    pub price: String,
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PriceInfo {
    /// Numeric amount, `None` when the price string is not a finite number
    pub fn amount(&self) -> Option<f64> {
        self.price
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
    }
}

/// A bicycle rental location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub location: Location,
    pub bikes: BikeAvailability,
    #[serde(default)]
    pub opening_hours: Vec<OpeningHours>,
    #[serde(default)]
    pub prices: Vec<PriceInfo>,
    #[serde(default)]
    pub amenities: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(default)]
    pub images: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

impl Station {
    /// Lowest parseable price across all tariffs
    pub fn lowest_price(&self) -> Option<f64> {
        self.prices
            .iter()
            .filter_map(PriceInfo::amount)
            .reduce(f64::min)
    }

    pub fn has_available_bikes(&self) -> bool {
        self.bikes.available > 0
    }
}

/// Inclusive price bounds used by the price filter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: f64,
    pub max: f64,
}

impl PriceRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, price: f64) -> bool {
        price >= self.min && price <= self.max
    }
}

impl Default for PriceRange {
    fn default() -> Self {
        Self {
            min: 0.0,
            max: f64::INFINITY,
        }
    }
}

/// The active set of user-selected filter constraints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriteria {
    #[serde(default)]
    pub bike_types: BTreeSet<String>,
    #[serde(default)]
    pub operators: BTreeSet<String>,
    /// Every selected amenity must be present at a station
    #[serde(default)]
    pub amenities: BTreeSet<String>,
    #[serde(default)]
    pub only_available: bool,
    #[serde(default)]
    pub price_range: PriceRange,
}

impl FilterCriteria {
    pub fn toggle_bike_type(&mut self, bike_type: &str) {
        toggle(&mut self.bike_types, bike_type);
    }

    pub fn toggle_operator(&mut self, operator: &str) {
        toggle(&mut self.operators, operator);
    }

    pub fn toggle_amenity(&mut self, amenity: &str) {
        toggle(&mut self.amenities, amenity);
    }

    pub fn set_max_price(&mut self, max: f64) {
        self.price_range.max = max;
    }

    /// Drop every selection, back to `defaults`
    pub fn clear(&mut self, defaults: &FilterCriteria) {
        self.clone_from(defaults);
    }

    /// Number of active constraints as shown on the filter badge
    ///
    /// Availability is not counted; the price constraint counts once when
    /// its upper bound is below `default_max`.
    pub fn active_count(&self, default_max: f64) -> usize {
        self.bike_types.len()
            + self.operators.len()
            + self.amenities.len()
            + usize::from(self.price_range.max < default_max)
    }
}

fn toggle(set: &mut BTreeSet<String>, value: &str) {
    if !set.remove(value) {
        set.insert(value.to_string());
    }
}

/// Kind of a search hit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchResultKind {
    Station,
    Place,
    Address,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub location: Location,
    #[serde(rename = "type")]
    pub kind: SearchResultKind,
}

impl From<&Station> for SearchResult {
    fn from(station: &Station) -> Self {
        Self {
            id: station.id.clone(),
            name: station.name.clone(),
            address: station.address.clone(),
            location: station.location,
            kind: SearchResultKind::Station,
        }
    }
}

/// Provider response metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    pub total_count: usize,
    pub source: String,
    pub last_updated: DateTime<Utc>,
    /// Records rejected by validation before they reached `data`
    #[serde(default)]
    pub dropped: usize,
}

/// Provider response: validated stations plus metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationsResponse {
    pub data: Vec<Station>,
    #[serde(default)]
    pub meta: Option<ResponseMeta>,
}

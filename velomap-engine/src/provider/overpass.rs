//! OpenStreetMap bike rental nodes via the Overpass API
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use velomap_common::{parse_stations, RawStation, ResponseMeta, StationsResponse};
use velomap_common::parse::{RawBikes, RawLocation};

use super::StationProvider;
use crate::config::OverpassConfig;
use crate::error::ProviderError;

const PROVIDER_NAME: &str = "overpass";

/// Capacity defaults for nodes without a `capacity` tag: (total, available)
const SHOP_DEFAULTS: (u32, u32) = (20, 15);
const STATION_DEFAULTS: (u32, u32) = (10, 6);
/// Share of capacity assumed available when only capacity is tagged
const ESTIMATED_AVAILABLE_PERCENT: u32 = 65;

#[derive(Debug, Clone, Deserialize)]
pub struct OverpassElement {
    pub id: i64,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    elements: Vec<serde_json::Value>,
}

/// Decode elements one at a time; undecodable ones are counted and skipped
fn decode_elements(values: Vec<serde_json::Value>) -> (Vec<OverpassElement>, usize) {
    let mut elements = Vec::with_capacity(values.len());
    let mut skipped = 0;

    for value in values {
        match serde_json::from_value::<OverpassElement>(value) {
            Ok(element) => elements.push(element),
            Err(e) => {
                tracing::warn!("Skipping undecodable Overpass element: {}", e);
                skipped += 1;
            }
        }
    }

    (elements, skipped)
}

/// Overpass QL selecting public rental and sharing nodes inside `area`
pub fn overpass_query(area: &str) -> String {
    format!(
        r#"[out:json][timeout:60];
area[name="{area}"][admin_level=8]->.searchArea;
(
  node["amenity"="bicycle_rental"]["access"!="private"](area.searchArea);
  node["amenity"="bicycle_sharing"](area.searchArea);
);
out body;"#
    )
}

pub struct OverpassProvider {
    client: reqwest::Client,
    url: String,
    area: String,
    timeout_seconds: u64,
}

impl OverpassProvider {
    pub fn new(config: &OverpassConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|source| ProviderError::Http {
                provider: PROVIDER_NAME.to_string(),
                source,
            })?;

        Ok(Self {
            client,
            url: config.url.clone(),
            area: config.area.clone(),
            timeout_seconds: config.timeout_seconds,
        })
    }

    fn http_error(&self, source: reqwest::Error) -> ProviderError {
        if source.is_timeout() {
            ProviderError::Timeout {
                provider: PROVIDER_NAME.to_string(),
                seconds: self.timeout_seconds,
            }
        } else {
            ProviderError::Http {
                provider: PROVIDER_NAME.to_string(),
                source,
            }
        }
    }

    /// Decoded elements plus the number that could not be decoded
    async fn fetch_elements(&self) -> Result<(Vec<OverpassElement>, usize), ProviderError> {
        let url = reqwest::Url::parse_with_params(&self.url, &[("data", overpass_query(&self.area))])
            .map_err(|e| ProviderError::Malformed {
                provider: PROVIDER_NAME.to_string(),
                reason: format!("invalid endpoint {}: {}", self.url, e),
            })?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.http_error(e))?;

        if !response.status().is_success() {
            return Err(ProviderError::Status {
                provider: PROVIDER_NAME.to_string(),
                status: response.status(),
            });
        }

        let body: OverpassResponse = response.json().await.map_err(|e| {
            if e.is_decode() {
                ProviderError::Malformed {
                    provider: PROVIDER_NAME.to_string(),
                    reason: e.to_string(),
                }
            } else {
                self.http_error(e)
            }
        })?;

        Ok(decode_elements(body.elements))
    }
}

#[async_trait]
impl StationProvider for OverpassProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn fetch_stations(&self) -> Result<StationsResponse, ProviderError> {
        tracing::info!("Querying Overpass for bike rentals in {}", self.area);

        let (elements, skipped) = self.fetch_elements().await?;
        let fetched_at = Utc::now();
        let raws = elements
            .iter()
            .map(|element| element_to_raw(element, fetched_at))
            .collect();
        let parsed = parse_stations(raws);

        tracing::info!(
            "Overpass returned {} elements, {} usable",
            elements.len() + skipped,
            parsed.stations.len()
        );

        Ok(StationsResponse {
            meta: Some(ResponseMeta {
                total_count: parsed.stations.len(),
                source: PROVIDER_NAME.to_string(),
                last_updated: fetched_at,
                dropped: parsed.rejected.len() + skipped,
            }),
            data: parsed.stations,
        })
    }
}

fn tag<'a>(element: &'a OverpassElement, key: &str) -> Option<&'a str> {
    element
        .tags
        .get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

fn parse_count(value: Option<&str>) -> Option<u32> {
    value.and_then(|v| v.parse::<u32>().ok())
}

fn is_shop(element: &OverpassElement) -> bool {
    tag(element, "bicycle_rental") == Some("shop")
        || matches!(tag(element, "shop"), Some("rental") | Some("bicycle"))
}

/// (total, available) from capacity tags
///
/// Without a usable capacity the shop or station defaults apply, even when
/// `available_bikes` is tagged.
fn bike_counts(element: &OverpassElement) -> (u32, u32) {
    let total = parse_count(tag(element, "capacity")).unwrap_or(0);
    if total == 0 {
        return if is_shop(element) {
            SHOP_DEFAULTS
        } else {
            STATION_DEFAULTS
        };
    }

    let available = parse_count(tag(element, "available_bikes"))
        .unwrap_or_else(|| estimated_available(total));
    (total, available.min(total))
}

fn estimated_available(total: u32) -> u32 {
    let estimate = u64::from(total) * u64::from(ESTIMATED_AVAILABLE_PERCENT) / 100;
    // never above total, so it fits
    u32::try_from(estimate).unwrap_or(total)
}

/// Spread `available` over the listed types, remainder to the first entries
fn split_types(types: &[&str], available: u32) -> BTreeMap<String, u32> {
    let mut remaining = available;
    let mut result = BTreeMap::new();

    for (index, bike_type) in types.iter().enumerate() {
        let slots = (types.len() - index) as u32;
        let count = remaining.div_ceil(slots);
        *result.entry(bike_type.to_string()).or_insert(0) += count;
        remaining -= count;
    }

    result
}

fn bike_types(element: &OverpassElement, available: u32) -> BTreeMap<String, u32> {
    if let Some(bike_type) = tag(element, "bicycle_types") {
        return BTreeMap::from([(bike_type.to_lowercase(), available)]);
    }

    if let Some(rental) = tag(element, "rental") {
        let types: Vec<&str> = rental
            .split(';')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect();
        if !types.is_empty() {
            return split_types(&types, available);
        }
    }

    BTreeMap::from([("city".to_string(), available)])
}

fn amenities(element: &OverpassElement) -> Vec<String> {
    let mut amenities = Vec::new();
    if let Some(service) = tag(element, "service") {
        amenities.push(service.to_string());
    }
    if tag(element, "service:bicycle:repair") == Some("yes") {
        amenities.push("Repair".to_string());
    }
    if tag(element, "service:bicycle:pump") == Some("yes") {
        amenities.push("Pump".to_string());
    }
    amenities
}

fn address(element: &OverpassElement) -> Option<String> {
    let street = tag(element, "addr:street")?;
    let number = tag(element, "addr:housenumber")?;

    let mut address = format!("{} {}", street, number);
    if let Some(postcode) = tag(element, "addr:postcode") {
        address.push_str(", ");
        address.push_str(postcode);
    }
    if let Some(city) = tag(element, "addr:city") {
        address.push(' ');
        address.push_str(city);
    }
    Some(address)
}

/// Map an OSM node onto the loose station record
pub(crate) fn element_to_raw(element: &OverpassElement, fetched_at: DateTime<Utc>) -> RawStation {
    let (total, available) = bike_counts(element);
    let operator = tag(element, "operator")
        .or_else(|| tag(element, "network"))
        .unwrap_or("Unknown");

    RawStation {
        id: Some(element.id.to_string()),
        name: Some(tag(element, "name").unwrap_or("Bike Rental").to_string()),
        operator: Some(operator.to_string()),
        address: address(element),
        location: Some(RawLocation {
            lat: element.lat,
            lng: element.lon,
        }),
        bikes: Some(RawBikes {
            total,
            available,
            types: bike_types(element, available),
        }),
        amenities: Some(amenities(element)),
        last_updated: Some(fetched_at),
        ..Default::default()
    }
}

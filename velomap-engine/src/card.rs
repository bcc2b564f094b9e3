//! Station detail card view model
use serde::Serialize;

use velomap_common::Station;

const PLACEHOLDER_WEBSITE: &str = "https://example.com";

/// Website of a rental operator, a web search for unknown ones
pub fn operator_website(operator: Option<&str>) -> String {
    let Some(operator) = operator else {
        return PLACEHOLDER_WEBSITE.to_string();
    };
    let name = operator.to_lowercase();

    let known = if name.contains("ov-fiets") || name.contains("ovfiets") || name.contains("ns") {
        Some("https://www.ns.nl/en/door-to-door/ov-fiets")
    } else if name.contains("macbike") {
        Some("https://www.macbike.nl/en/")
    } else if name.contains("yellow") && name.contains("bike") {
        Some("https://www.yellowbike.nl/en/")
    } else if name.contains("swapfiets") {
        Some("https://swapfiets.com/")
    } else if name.contains("a-bike") {
        Some("https://www.a-bike.eu/")
    } else if name.contains("green") && (name.contains("wheels") || name.contains("budget")) {
        Some("https://greenwheels.com/nl/en")
    } else if name.contains("b&s") || name.contains("bike & scooter") {
        Some("https://bikescootercity.com/")
    } else {
        None
    };

    match known {
        Some(url) => url.to_string(),
        None => {
            let query = format!("{} bike rental amsterdam", operator);
            reqwest::Url::parse_with_params("https://www.google.com/search", &[("q", query)])
                .map(|url| url.to_string())
                .unwrap_or_else(|_| PLACEHOLDER_WEBSITE.to_string())
        }
    }
}

/// Host of `url` without a leading `www.`, or `url` itself if it does not parse
pub fn domain_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_string))
        .map(|host| host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
        .unwrap_or_else(|| url.to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationCard {
    pub id: String,
    pub name: String,
    pub operator: Option<String>,
    pub address: Option<String>,
    pub image: Option<String>,
    pub rating: Option<String>,
    pub availability: String,
    pub has_bikes: bool,
    pub bike_types: Vec<String>,
    pub opening_hours: Vec<String>,
    pub prices: Vec<String>,
    pub amenities: Vec<String>,
    pub coordinates: String,
    pub website: String,
    pub website_domain: String,
    pub last_updated: String,
}

impl StationCard {
    pub fn from_station(station: &Station) -> Self {
        let website = operator_website(station.operator.as_deref());

        Self {
            id: station.id.clone(),
            name: station.name.clone(),
            operator: station.operator.clone(),
            address: station.address.clone(),
            image: station.images.first().cloned(),
            rating: station.rating.map(|rating| format!("{:.1}", rating)),
            availability: format!(
                "{} / {} available",
                station.bikes.available, station.bikes.total
            ),
            has_bikes: station.has_available_bikes(),
            bike_types: station
                .bikes
                .types
                .iter()
                .map(|(kind, count)| format!("{}: {}", kind, count))
                .collect(),
            opening_hours: station
                .opening_hours
                .iter()
                .map(|entry| format!("{}: {}", entry.days, entry.hours))
                .collect(),
            prices: station
                .prices
                .iter()
                .map(|price| match &price.description {
                    Some(description) => {
                        format!("{}: €{} / {} ({})", price.kind, price.price, price.unit, description)
                    }
                    None => format!("{}: €{} / {}", price.kind, price.price, price.unit),
                })
                .collect(),
            amenities: station.amenities.iter().cloned().collect(),
            coordinates: station.location.to_string(),
            website_domain: domain_from_url(&website),
            website,
            last_updated: station.last_updated.format("%Y-%m-%d %H:%M UTC").to_string(),
        }
    }
}

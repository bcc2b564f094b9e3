use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;

use velomap_common::{parse_json_records, ResponseMeta, Station, StationsResponse};

use super::StationProvider;
use crate::error::ProviderError;

/// Central Amsterdam rental shops
const PRIMARY_PAYLOAD: &str = r#"[
  {
    "id": "rental-1",
    "name": "Central Station Bike Rental",
    "operator": "OV-fiets",
    "address": "Stationsplein 9, 1012 AB Amsterdam",
    "location": { "lat": 52.3791, "lng": 4.9003 },
    "bikes": { "total": 120, "available": 45, "types": { "city": 30, "electric": 10, "cargo": 5 } },
    "openingHours": [
      { "days": "Monday-Friday", "hours": "06:00-01:00" },
      { "days": "Saturday-Sunday", "hours": "07:00-01:00" }
    ],
    "prices": [
      { "type": "Basic", "price": "3.85", "unit": "24h", "description": "City bike rental" },
      { "type": "Electric", "price": "5.85", "unit": "24h", "description": "Electric bike rental" }
    ],
    "amenities": ["Repair", "Helmets", "Baskets"],
    "rating": 4.7,
    "images": ["https://images.unsplash.com/photo-1592143245926-89b2265d2688?auto=format&fit=crop&w=600&q=80"]
  },
  {
    "id": "rental-2",
    "name": "MacBike Centraal",
    "operator": "MacBike",
    "address": "Oosterdokskade 10, 1011 AE Amsterdam",
    "location": { "lat": 52.3751, "lng": 4.9079 },
    "bikes": { "total": 200, "available": 85, "types": { "city": 50, "electric": 25, "tandem": 10 } },
    "openingHours": [{ "days": "Monday-Sunday", "hours": "09:00-18:00" }],
    "prices": [
      { "type": "Basic", "price": "9.75", "unit": "day", "description": "City bike rental" },
      { "type": "Electric", "price": "21.00", "unit": "day", "description": "Electric bike rental" }
    ],
    "amenities": ["Child seats", "Locks", "Maps"],
    "rating": 4.5,
    "images": ["https://images.unsplash.com/photo-1485965120184-e220f721d03e?auto=format&fit=crop&w=600&q=80"]
  },
  {
    "id": "rental-3",
    "name": "A-Bike Rental",
    "operator": "A-Bike",
    "address": "Piet Heinkade 11, 1019 BR Amsterdam",
    "location": { "lat": 52.3831, "lng": 4.9141 },
    "bikes": { "total": 85, "available": 28, "types": { "city": 20, "electric": 5, "child": 3 } },
    "openingHours": [{ "days": "Monday-Sunday", "hours": "08:30-19:30" }],
    "prices": [
      { "type": "Basic", "price": "8.50", "unit": "day", "description": "City bike rental" }
    ],
    "amenities": ["Guided tours", "Helmets"],
    "rating": 4.3,
    "images": ["https://images.unsplash.com/photo-1571068316344-75bc76f77890?auto=format&fit=crop&w=600&q=80"]
  },
  {
    "id": "rental-4",
    "name": "Green Budget Bikes",
    "operator": "Green Wheels",
    "address": "Raadhuisstraat 27, 1016 DB Amsterdam",
    "location": { "lat": 52.3730, "lng": 4.8830 },
    "bikes": { "total": 60, "available": 15, "types": { "city": 15 } },
    "openingHours": [{ "days": "Monday-Sunday", "hours": "10:00-18:00" }],
    "prices": [
      { "type": "Basic", "price": "7.50", "unit": "day", "description": "Budget city bike" }
    ],
    "amenities": ["Baskets", "Budget friendly"],
    "rating": 3.9,
    "images": ["https://images.unsplash.com/photo-1503669678209-c68d00b3765d?auto=format&fit=crop&w=600&q=80"]
  },
  {
    "id": "rental-5",
    "name": "Bike & Scooter City",
    "operator": "B&S Rentals",
    "address": "Jan van Galenstraat 115, 1056 BL Amsterdam",
    "location": { "lat": 52.3681, "lng": 4.8580 },
    "bikes": { "total": 120, "available": 60, "types": { "city": 30, "electric": 20, "cargo": 10 } },
    "openingHours": [
      { "days": "Monday-Friday", "hours": "08:00-20:00" },
      { "days": "Saturday-Sunday", "hours": "09:00-21:00" }
    ],
    "prices": [
      { "type": "Basic", "price": "12.00", "unit": "day", "description": "City bike rental" },
      { "type": "Electric", "price": "25.00", "unit": "day", "description": "Electric bike rental" }
    ],
    "amenities": ["Scooters", "Cargo bikes", "Child seats"],
    "rating": 4.1,
    "images": ["https://images.unsplash.com/photo-1507035895480-2b3156c31fc8?auto=format&fit=crop&w=600&q=80"]
  },
  {
    "id": "rental-6",
    "name": "Yellow Bike",
    "operator": "Yellow Bike Tours",
    "address": "Nieuwezijds Kolk 29, 1012 PV Amsterdam",
    "location": { "lat": 52.3758, "lng": 4.8932 },
    "bikes": { "total": 150, "available": 72, "types": { "city": 60, "tandem": 12 } },
    "openingHours": [{ "days": "Daily", "hours": "09:00-18:00" }],
    "prices": [
      { "type": "Basic", "price": "9.00", "unit": "day", "description": "City bike rental" },
      { "type": "Tandem", "price": "19.00", "unit": "day", "description": "Tandem bike rental" }
    ],
    "amenities": ["Guided tours", "Locks", "Maps"],
    "rating": 4.4,
    "images": ["https://images.unsplash.com/photo-1528629297340-d1d466945dc5?auto=format&fit=crop&w=600&q=80"]
  }
]"#;

/// OV-fiets stations of the national rail network
const SECONDARY_PAYLOAD: &str = r#"[
  {
    "id": "ovfiets-amstc",
    "name": "Amsterdam Centraal OV-fiets",
    "operator": "NS OV-fiets",
    "address": "Stationsplein 1, 1012 AB Amsterdam",
    "location": { "lat": 52.3790, "lng": 4.9000 },
    "bikes": { "total": 450, "available": 217, "types": { "city": 217 } },
    "openingHours": [
      { "days": "Monday-Friday", "hours": "05:00-01:30" },
      { "days": "Saturday-Sunday", "hours": "07:00-01:00" }
    ],
    "prices": [
      { "type": "OV-fiets", "price": "3.95", "unit": "24h", "description": "Standard OV-fiets rental" }
    ],
    "amenities": ["OV-chipkaart", "24h Return"],
    "rating": 4.5,
    "images": ["https://images.unsplash.com/photo-1592143245926-89b2265d2688?auto=format&fit=crop&w=600&q=80"]
  },
  {
    "id": "ovfiets-amsz",
    "name": "Amsterdam Zuid OV-fiets",
    "operator": "NS OV-fiets",
    "address": "Mathijs Vermeulenpad 1, 1077 XX Amsterdam",
    "location": { "lat": 52.3389, "lng": 4.8730 },
    "bikes": { "total": 250, "available": 124, "types": { "city": 124 } },
    "openingHours": [
      { "days": "Monday-Friday", "hours": "06:30-01:00" },
      { "days": "Saturday-Sunday", "hours": "07:00-01:00" }
    ],
    "prices": [
      { "type": "OV-fiets", "price": "3.95", "unit": "24h", "description": "Standard OV-fiets rental" }
    ],
    "amenities": ["OV-chipkaart", "Bicycle Parking"],
    "rating": 4.3,
    "images": ["https://images.unsplash.com/photo-1592143245926-89b2265d2688?auto=format&fit=crop&w=600&q=80"]
  },
  {
    "id": "ovfiets-amsb",
    "name": "Amsterdam Bijlmer OV-fiets",
    "operator": "NS OV-fiets",
    "address": "Hoekenrode 4, 1102 BR Amsterdam",
    "location": { "lat": 52.3121, "lng": 4.9468 },
    "bikes": { "total": 150, "available": 83, "types": { "city": 83 } },
    "openingHours": [
      { "days": "Monday-Friday", "hours": "06:30-00:30" },
      { "days": "Saturday-Sunday", "hours": "08:00-00:00" }
    ],
    "prices": [
      { "type": "OV-fiets", "price": "3.95", "unit": "24h", "description": "Standard OV-fiets rental" }
    ],
    "amenities": ["OV-chipkaart"],
    "rating": 4.1,
    "images": ["https://images.unsplash.com/photo-1592143245926-89b2265d2688?auto=format&fit=crop&w=600&q=80"]
  }
]"#;

/// In-memory provider serving a fixed JSON payload after a simulated delay
#[derive(Debug, Clone)]
pub struct MockProvider {
    name: String,
    payload: String,
    delay: Duration,
    failure: Option<String>,
}

impl MockProvider {
    pub fn from_payload(name: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: payload.into(),
            delay: Duration::ZERO,
            failure: None,
        }
    }

    pub fn primary() -> Self {
        Self::from_payload("mock-data", PRIMARY_PAYLOAD)
    }

    pub fn secondary() -> Self {
        Self::from_payload("ov-fiets", SECONDARY_PAYLOAD)
    }

    pub fn from_stations(name: impl Into<String>, stations: &[Station]) -> Self {
        // Station serialization has no fallible field types
        let payload = serde_json::to_string(stations).unwrap_or_else(|_| "[]".to_string());
        Self::from_payload(name, payload)
    }

    /// A provider whose every call fails with `reason`
    pub fn failing(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::from_payload(name, "[]")
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn check_available(&self) -> Result<(), ProviderError> {
        match &self.failure {
            Some(reason) => Err(ProviderError::Unavailable {
                provider: self.name.clone(),
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl StationProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_stations(&self) -> Result<StationsResponse, ProviderError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.check_available()?;

        let records: Vec<serde_json::Value> =
            serde_json::from_str(&self.payload).map_err(|e| ProviderError::Malformed {
                provider: self.name.clone(),
                reason: e.to_string(),
            })?;
        let parsed = parse_json_records(records);

        tracing::debug!(
            "{} returned {} stations ({} dropped)",
            self.name,
            parsed.stations.len(),
            parsed.rejected.len()
        );

        Ok(StationsResponse {
            meta: Some(ResponseMeta {
                total_count: parsed.stations.len(),
                source: self.name.clone(),
                last_updated: Utc::now(),
                dropped: parsed.rejected.len(),
            }),
            data: parsed.stations,
        })
    }
}

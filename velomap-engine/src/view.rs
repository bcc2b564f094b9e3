use serde::Serialize;

use velomap_common::Location;

use crate::config::MapConfig;

/// Whether a station detail is open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPhase {
    Idle,
    Selected,
}

/// Center, zoom and selected station of the map
///
/// Transitions are pure: each returns the next state and leaves `self`
/// untouched. The selection refers to a station by id only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapViewState {
    pub center: Location,
    pub zoom: u8,
    pub selected_station_id: Option<String>,
}

impl MapViewState {
    pub fn new(center: Location, zoom: u8) -> Self {
        Self {
            center,
            zoom,
            selected_station_id: None,
        }
    }

    pub fn from_config(config: &MapConfig) -> Self {
        Self::new(config.default_center, config.default_zoom)
    }

    /// Move the center; keeps the zoom unless one is given
    pub fn pan_to(&self, location: Location, zoom: Option<u8>) -> Self {
        Self {
            center: location,
            zoom: zoom.unwrap_or(self.zoom),
            selected_station_id: self.selected_station_id.clone(),
        }
    }

    pub fn select(&self, station_id: Option<String>) -> Self {
        Self {
            selected_station_id: station_id,
            ..self.clone()
        }
    }

    /// Default center and zoom, nothing selected
    pub fn reset(&self, defaults: &MapViewState) -> Self {
        Self::new(defaults.center, defaults.zoom)
    }

    pub fn phase(&self) -> SelectionPhase {
        match self.selected_station_id {
            Some(_) => SelectionPhase::Selected,
            None => SelectionPhase::Idle,
        }
    }
}

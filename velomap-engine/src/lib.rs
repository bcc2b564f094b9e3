//! Bike rental map engine
//!
//! Loads station records from one or more providers into a shared
//! snapshot, filters and searches them, and coordinates map selection,
//! panning, geolocation and notices for a rendering layer.

pub mod card;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod filter;
pub mod geolocation;
pub mod logging;
pub mod notice;
pub mod provider;
pub mod search;
pub mod store;
pub mod view;

pub use coordinator::{CoordinatorSettings, MapCoordinator, MapEvent, MapSnapshot, SelectTarget};
pub use error::{Result, VeloError};
pub use store::StationStore;
